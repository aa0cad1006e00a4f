// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Tables mapping raw register values to names.
//!
//! Most tables come from SFF-8024 or CMIS 5.0. Values missing from a table
//! decode to [`crate::Value::UnknownCode`], never to an error.

use std::fmt;

/// A static mapping between raw integer codes and their names.
#[derive(Clone, Copy, PartialEq)]
pub struct CodeTable {
    pub name: &'static str,
    pub entries: &'static [(u64, &'static str)],
}

impl CodeTable {
    /// Return the name of a raw code, if it's known.
    pub fn lookup(&self, raw: u64) -> Option<&'static str> {
        self.entries
            .iter()
            .find_map(|(code, label)| (*code == raw).then_some(*label))
    }

    /// Return the raw code for a name, if it's known.
    pub fn raw_for(&self, label: &str) -> Option<u64> {
        self.entries
            .iter()
            .find_map(|(code, l)| (*l == label).then_some(*code))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CodeTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CodeTable({})", self.name)
    }
}

/// SFF-8024 Table 4-1, identifier values.
pub static XCVR_IDENTIFIERS: CodeTable = CodeTable {
    name: "XcvrIdentifiers",
    entries: &[
        (0x00, "Unknown or unspecified"),
        (0x01, "GBIC"),
        (0x02, "Module/connector soldered to motherboard"),
        (0x03, "SFP/SFP+/SFP28"),
        (0x04, "300 pin XBI"),
        (0x05, "XENPAK"),
        (0x06, "XFP"),
        (0x07, "XFF"),
        (0x08, "XFP-E"),
        (0x09, "XPAK"),
        (0x0a, "X2"),
        (0x0b, "DWDM-SFP/SFP+"),
        (0x0c, "QSFP"),
        (0x0d, "QSFP+ or later with SFF-8636 or SFF-8436"),
        (0x0e, "CXP or later"),
        (0x0f, "Shielded Mini Multilane HD 4X"),
        (0x10, "Shielded Mini Multilane HD 8X"),
        (0x11, "QSFP28 or later"),
        (0x12, "CXP2 (aka CXP28) or later"),
        (0x13, "CDFP (Style 1/Style2)"),
        (0x14, "Shielded Mini Multilane HD 4X Fanout Cable"),
        (0x15, "Shielded Mini Multilane HD 8X Fanout Cable"),
        (0x16, "CDFP (Style 3)"),
        (0x17, "microQSFP"),
        (0x18, "QSFP-DD Double Density 8X Pluggable Transceiver"),
        (0x19, "OSFP 8X Pluggable Transceiver"),
        (0x1a, "SFP-DD Double Density 2X Pluggable Transceiver"),
        (0x1b, "DSFP Dual Small Form Factor Pluggable Transceiver"),
        (0x1c, "x4 MiniLink/OcuLink"),
        (0x1d, "x8 MiniLink"),
        (0x1e, "QSFP+ or later with CMIS"),
    ],
};

/// CMIS 5.0 Table 8-31, module power classes, from bits 7-5 of byte 200.
pub static POWER_CLASSES: CodeTable = CodeTable {
    name: "PowerClasses",
    entries: &[
        (0, "Power Class 1"),
        (1, "Power Class 2"),
        (2, "Power Class 3"),
        (3, "Power Class 4"),
        (4, "Power Class 5"),
        (5, "Power Class 6"),
        (6, "Power Class 7"),
        (7, "Power Class 8"),
    ],
};

/// SFF-8024 Table 4-3, connector types.
pub static CONNECTORS: CodeTable = CodeTable {
    name: "Connectors",
    entries: &[
        (0x00, "Unknown or unspecified"),
        (0x01, "SC (Subscriber Connector)"),
        (0x02, "Fibre Channel Style 1 copper connector"),
        (0x03, "Fibre Channel Style 2 copper connector"),
        (0x04, "BNC/TNC (Bayonet/Threaded Neill-Concelman)"),
        (0x05, "Fibre Channel coax headers"),
        (0x06, "Fiber Jack"),
        (0x07, "LC (Lucent Connector)"),
        (0x08, "MT-RJ (Mechanical Transfer - Registered Jack)"),
        (0x09, "MU (Multiple Optical)"),
        (0x0a, "SG"),
        (0x0b, "Optical Pigtail"),
        (0x0c, "MPO 1x12 (Multifiber Parallel Optic)"),
        (0x0d, "MPO 2x16"),
        (0x20, "HSSDC II (High Speed Serial Data Connector)"),
        (0x21, "Copper pigtail"),
        (0x22, "RJ45 (Registered Jack)"),
        (0x23, "No separable connector"),
        (0x24, "MXC 2x16"),
        (0x25, "CS optical connector"),
        (0x26, "SN (previously Mini CS) optical connector"),
        (0x27, "MPO 2x12"),
        (0x28, "MPO 1x16"),
    ],
};

/// CMIS 5.0 Table 8-19, the media type of the module.
pub static MODULE_MEDIA_TYPE: CodeTable = CodeTable {
    name: "ModuleMediaType",
    entries: &[
        (0x00, "Undefined"),
        (0x01, "Optical Interfaces: MMF"),
        (0x02, "Optical Interfaces: SMF"),
        (0x03, "Passive Cu"),
        (0x04, "Active Cables"),
        (0x05, "BASE-T"),
    ],
};

/// CMIS 5.0 Table 8-40, the transmitter technology.
pub static MEDIA_INTERFACE_TECH: CodeTable = CodeTable {
    name: "MediaInterfaceTech",
    entries: &[
        (0x00, "850 nm VCSEL"),
        (0x01, "1310 nm VCSEL"),
        (0x02, "1550 nm VCSEL"),
        (0x03, "1310 nm FP"),
        (0x04, "1310 nm DFB"),
        (0x05, "1550 nm DFB"),
        (0x06, "1310 nm EML"),
        (0x07, "1550 nm EML"),
        (0x08, "Others"),
        (0x09, "1490 nm DFB"),
        (0x0a, "Copper cable unequalized"),
        (0x0b, "Copper cable passive equalized"),
        (0x0c, "Copper cable, near and far end limiting active equalizers"),
        (0x0d, "Copper cable, far end limiting active equalizers"),
        (0x0e, "Copper cable, near end limiting active equalizers"),
        (0x0f, "Copper cable, linear active equalizers"),
        (0x10, "C-band tunable laser"),
        (0x11, "L-band tunable laser"),
    ],
};

/// CMIS 5.0 Table 8-7, module state, from bits 3-1 of byte 3.
pub static MODULE_STATE: CodeTable = CodeTable {
    name: "ModuleState",
    entries: &[
        (1, "ModuleLowPwr"),
        (2, "ModulePwrUp"),
        (3, "ModuleReady"),
        (4, "ModulePwrDn"),
        (5, "ModuleFault"),
    ],
};

/// CMIS 5.0 Table 8-15, the cause of a module fault.
pub static MODULE_FAULT_CAUSE: CodeTable = CodeTable {
    name: "ModuleFaultCause",
    entries: &[
        (0, "No Fault detected"),
        (1, "TEC runaway"),
        (2, "Data memory corrupted"),
        (3, "Program memory corrupted"),
    ],
};

/// CMIS 5.0 Table 8-88, the state of a data path.
pub static DATAPATH_STATE: CodeTable = CodeTable {
    name: "DataPathState",
    entries: &[
        (1, "DataPathDeactivated"),
        (2, "DataPathInit"),
        (3, "DataPathDeinit"),
        (4, "DataPathActivated"),
        (5, "DataPathTxTurnOn"),
        (6, "DataPathTxTurnOff"),
        (7, "DataPathInitialized"),
    ],
};

/// CMIS 5.0 Table 9-13, the password status reported by the query status
/// command.
pub static CDB_QUERY_STATUS: CodeTable = CodeTable {
    name: "CdbQueryStatus",
    entries: &[
        (0x00, "Module Boot Up"),
        (0x01, "Host Password Accepted"),
        (0x80, "Module Boot Up, vendor password level"),
        (0x81, "Vendor Password Accepted"),
    ],
};

/// CMIS 5.0 Table 9-16, the firmware block write mechanisms a module
/// supports.
pub static FW_WRITE_MECHANISM: CodeTable = CodeTable {
    name: "FwWriteMechanism",
    entries: &[
        (0x00, "None Supported"),
        (0x01, "LPL Only"),
        (0x10, "EPL Only"),
        (0x11, "LPL and EPL"),
    ],
};

/// Every table shipped with this crate.
pub static ALL: &[&CodeTable] = &[
    &XCVR_IDENTIFIERS,
    &POWER_CLASSES,
    &CONNECTORS,
    &MODULE_MEDIA_TYPE,
    &MEDIA_INTERFACE_TECH,
    &MODULE_STATE,
    &MODULE_FAULT_CAUSE,
    &DATAPATH_STATE,
    &CDB_QUERY_STATUS,
    &FW_WRITE_MECHANISM,
];

#[cfg(test)]
mod tests {
    use super::ALL;
    use super::CONNECTORS;
    use std::collections::BTreeSet;

    #[test]
    fn test_code_tables_are_injective() {
        for table in ALL {
            let raws: BTreeSet<_> = table.entries.iter().map(|(raw, _)| *raw).collect();
            let labels: BTreeSet<_> = table.entries.iter().map(|(_, label)| *label).collect();
            assert_eq!(raws.len(), table.len(), "duplicate code in {}", table.name);
            assert_eq!(labels.len(), table.len(), "duplicate label in {}", table.name);
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(CONNECTORS.lookup(0x07), Some("LC (Lucent Connector)"));
        assert_eq!(CONNECTORS.lookup(0x0e), None);
        assert_eq!(CONNECTORS.raw_for("MPO 2x12"), Some(0x27));
        assert_eq!(CONNECTORS.raw_for("not a connector"), None);
    }
}
