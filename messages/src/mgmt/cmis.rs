// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Page rules for modules conforming to the Common Management Interface
//! Specification (CMIS) version 5.0.

use super::Address;
use crate::Error;

/// The first byte of the upper half of the 256-byte window.
pub const UPPER_PAGE_START: u8 = 128;

/// Build the address of a byte in the CMIS register space.
///
/// Page 0x00 may be addressed anywhere in the 256-byte window, since its
/// "lower" half is the fixed lower page. Every other page only exists in the
/// upper half, so offsets below 128 are rejected.
pub fn address(page: u8, offset: u8) -> Result<Address, Error> {
    if !is_valid_page(page) {
        return Err(Error::InvalidPage(page));
    }
    if page != 0 && offset < UPPER_PAGE_START {
        return Err(Error::InvalidMemoryAccess {
            address: Address::new(page, offset).get(),
            len: 1,
        });
    }
    Ok(Address::new(page, offset))
}

// See CMIS 5.0 rev 4.0 Figure 8-1 for details.
pub fn is_valid_page(page: u8) -> bool {
    matches!(
        page,
        // Identity, advertising, thresholds, laser control.
        0x00..=0x04 |
        // Banked pages.
        0x10..=0x3F | 0x9F | 0xA0..=0xAF |
        // Custom pages.
        0xB0..=0xFF
    )
}

#[cfg(test)]
mod tests {
    use super::address;
    use super::Error;

    #[test]
    fn test_address() {
        assert_eq!(address(0x00, 37).unwrap().get(), 37);
        assert_eq!(address(0x9f, 136).unwrap().get(), 0x9f * 128 + 136);
        assert!(matches!(address(0x05, 128), Err(Error::InvalidPage(0x05))));
        assert!(matches!(
            address(0x01, 100),
            Err(Error::InvalidMemoryAccess { .. })
        ));
    }
}
