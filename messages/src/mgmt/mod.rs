// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Addressing of a transceiver's paged register space.
//!
//! Paging
//! ------
//!
//! A CMIS module exposes a 256-byte window: a fixed lower page (bytes 0-127)
//! and an upper page (bytes 128-255), where the upper half is swapped in by
//! writing a page-select byte. Hosts generally don't care about the mechanics
//! of page selection, and address the map as one flat, linear space:
//!
//! ```text
//! address = page * PAGE_SIZE + offset
//! ```
//!
//! where `offset` is the byte offset within the 256-byte window. Under this
//! scheme the upper half of page `N` lands at `(N + 1) * 128`, so every
//! 128-byte aligned block of the flat space corresponds to exactly one
//! physical page. An access must never straddle such a block, since the
//! bytes on either side of the boundary are selected differently on the
//! module.
//!
//! It's the responsibility of the bus implementation to translate a flat
//! address back into page-select writes and offsets.

pub mod cmis;

use crate::Error;
use core::fmt;
use serde::Deserialize;
use serde::Serialize;

/// The size of a single page of the flattened register space, in bytes.
pub const PAGE_SIZE: u32 = 128;

/// An address in the flattened register space of a module.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[cfg_attr(feature = "api-traits", derive(schemars::JsonSchema))]
pub struct Address(u32);

impl Address {
    /// Construct an address from a page index and an offset within the
    /// 256-byte window.
    pub const fn new(page: u8, offset: u8) -> Self {
        Self(page as u32 * PAGE_SIZE + offset as u32)
    }

    /// Construct an address from a raw flattened value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Return the raw flattened address.
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Return the offset of this address within its 128-byte page.
    pub const fn in_page_offset(&self) -> u32 {
        self.0 % PAGE_SIZE
    }

    /// Return the number of bytes between this address and the next page
    /// boundary.
    pub const fn remaining_in_page(&self) -> u32 {
        PAGE_SIZE - self.in_page_offset()
    }

    /// Return the address `n` bytes after this one.
    pub const fn offset_by(&self, n: u32) -> Self {
        Self(self.0 + n)
    }

    /// Return true if an access of `len` bytes at this address stays within
    /// a single page.
    pub const fn fits_in_page(&self, len: usize) -> bool {
        len as u64 <= self.remaining_in_page() as u64
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:05x}", self.0)
    }
}

/// A contiguous region of the register space, contained in a single page.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MemoryRegion {
    address: Address,
    len: u8,
}

impl MemoryRegion {
    /// Construct a new memory region.
    ///
    /// The region must be non-empty and must not cross a page boundary.
    pub fn new(address: Address, len: usize) -> Result<Self, Error> {
        if len == 0 || !address.fits_in_page(len) {
            return Err(Error::InvalidMemoryAccess {
                address: address.get(),
                len,
            });
        }
        Ok(Self {
            address,
            len: len as u8,
        })
    }

    /// Return the first address of the region.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Return the length of the region, in bytes.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Regions are never empty, but clippy insists.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Split a single access of `len` bytes into consecutive regions of at most
/// `max` bytes each.
///
/// CMIS limits the size of a single sequential write, so a large write must
/// be issued as several smaller ones. The entire access must lie within one
/// page.
pub fn split_access(
    address: Address,
    len: usize,
    max: u8,
) -> Result<impl Iterator<Item = MemoryRegion>, Error> {
    if max == 0 || len == 0 || !address.fits_in_page(len) {
        return Err(Error::InvalidMemoryAccess {
            address: address.get(),
            len,
        });
    }
    let max = usize::from(max);
    Ok((0..len).step_by(max).map(move |start| {
        // The length is up to `max`, or the remainder of the entire
        // operation, whichever is smaller.
        let chunk = max.min(len - start);
        MemoryRegion {
            address: address.offset_by(start as u32),
            len: chunk as u8,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::split_access;
    use super::Address;
    use super::MemoryRegion;
    use super::PAGE_SIZE;
    use crate::Error;

    #[test]
    fn test_address_flattening() {
        assert_eq!(Address::new(0, 37).get(), 37);
        assert_eq!(Address::new(0x9f, 128).get(), 0x9f * 128 + 128);
        assert_eq!(Address::new(0x9f, 130).in_page_offset(), 2);
        assert_eq!(Address::new(0x11, 154).get(), 0x11 * PAGE_SIZE + 154);
    }

    #[test]
    fn test_memory_region() {
        let address = Address::new(0x01, 128);
        let region = MemoryRegion::new(address, 128).unwrap();
        assert_eq!(region.address(), address);
        assert_eq!(region.len(), 128);

        // Would cross into the next page.
        assert!(matches!(
            MemoryRegion::new(Address::new(0x00, 127), 2).unwrap_err(),
            Error::InvalidMemoryAccess { .. }
        ));
        assert!(MemoryRegion::new(Address::new(0x00, 0), 0).is_err());
    }

    #[test]
    fn test_split_access_even() {
        let start = Address::new(0xa0, 128);
        let regions: Vec<_> = split_access(start, 128, 8).unwrap().collect();
        assert_eq!(regions.len(), 16);
        for (i, region) in regions.iter().enumerate() {
            assert_eq!(region.address(), start.offset_by(8 * i as u32));
            assert_eq!(region.len(), 8);
        }
    }

    #[test]
    fn test_split_access_uneven() {
        let start = Address::new(0xa0, 128);
        let regions: Vec<_> = split_access(start, 63, 8).unwrap().collect();
        assert_eq!(regions.len(), 8);
        assert_eq!(regions.last().unwrap().len(), 7);
        assert_eq!(
            regions.iter().map(|r| r.len()).sum::<usize>(),
            63,
            "All regions need to sum to the full expected size",
        );
    }

    #[test]
    fn test_split_access_rejects_page_crossing() {
        assert!(split_access(Address::new(0xa0, 192), 65, 8).is_err());
        assert!(split_access(Address::new(0xa0, 192), 64, 8).is_ok());
        assert!(split_access(Address::new(0xa0, 128), 8, 0).is_err());
    }
}
