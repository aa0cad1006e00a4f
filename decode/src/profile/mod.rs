// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Declarative field tables for known kinds of modules.

pub mod cdb;
pub mod cmis;

use crate::Error;
use crate::MemoryMap;
use crate::Profile;
use xcvr_messages::mgmt::cmis as cmis_pages;
use xcvr_messages::mgmt::Address;

// Build an address, checking it against the CMIS page layout.
fn at(page: u8, offset: u8) -> Result<Address, Error> {
    cmis_pages::address(page, offset).map_err(Error::from)
}

impl Profile {
    /// A CMIS 5.0 module with CDB firmware management.
    pub fn cmis() -> Result<Self, Error> {
        let mut fields = cmis::fields()?;
        fields.extend(cdb::fields()?);
        Profile::new("CMIS 5.0", MemoryMap::new(fields)?, cdb::commands()?)
    }
}

#[cfg(test)]
mod tests {
    use super::at;
    use crate::Error;
    use crate::FieldRef;
    use crate::Profile;
    use xcvr_messages::cdb::id;

    #[test]
    fn test_cmis_profile() {
        let profile = Profile::cmis().unwrap();
        let info = profile.command(id::GET_FIRMWARE_INFO).unwrap();
        assert!(matches!(
            profile.reply_field(info),
            Some(FieldRef::Group(_))
        ));
        assert!(matches!(
            profile.map().get(super::cdb::IS_BUSY),
            Some(FieldRef::Bits { .. })
        ));
    }

    #[test]
    fn test_at_checks_pages() {
        assert!(at(0x9f, 136).is_ok());
        assert!(matches!(at(0x05, 128), Err(Error::Message(_))));
    }
}
