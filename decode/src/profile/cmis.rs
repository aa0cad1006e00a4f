// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Fields of the Common Management Interface Specification (CMIS), version
//! 5.0.

use super::at;
use crate::codes;
use crate::Error;
use crate::Field;
use crate::GroupField;
use crate::NumberFormat;
use crate::RegisterField;

pub const IDENTIFIER: &str = "Identifier";
pub const VENDOR_NAME: &str = "VendorName";
pub const VENDOR_OUI: &str = "VendorOUI";
pub const VENDOR_PART: &str = "VendorPN";
pub const VENDOR_SERIAL: &str = "VendorSN";
pub const DATE_CODE: &str = "DateCode";
pub const TEMPERATURE: &str = "Temperature";
pub const VOLTAGE: &str = "Voltage";
pub const MODULE_STATE: &str = "ModuleState";
pub const MODULE_LEVEL_CONTROL: &str = "ModuleLevelControl";
pub const LOW_POWER_REQUEST_SW: &str = "LowPwrRequestSW";

fn number(name: &str, page: u8, offset: u8, format: NumberFormat) -> Result<Field, Error> {
    Ok(RegisterField::number(name, at(page, offset)?, format).into())
}

fn scaled(
    name: &str,
    page: u8,
    offset: u8,
    format: NumberFormat,
    scale: f64,
) -> Result<Field, Error> {
    Ok(RegisterField::scaled(name, at(page, offset)?, format, scale).into())
}

fn writable(name: &str, page: u8, offset: u8, format: NumberFormat) -> Result<Field, Error> {
    Ok(RegisterField::number(name, at(page, offset)?, format)
        .writable()
        .into())
}

fn management_characteristics() -> Result<GroupField, Error> {
    Ok(GroupField::new(
        "MgmtCharacteristics",
        [RegisterField::number("MgmtCharMisc", at(0x00, 2)?, NumberFormat::U8)
            .subfield("FlatMem", 7, 1)
            .into()],
    ))
}

fn admin_info() -> Result<GroupField, Error> {
    let extended_id = GroupField::new(
        "ExtendedIdentifier",
        [
            RegisterField::code("PowerClass", at(0x00, 200)?, &codes::POWER_CLASSES)
                .bits(5, 3)
                .into(),
            scaled("MaxPower", 0x00, 201, NumberFormat::U8, 4.0)?,
        ],
    );
    Ok(GroupField::new(
        "AdminInfo",
        [
            RegisterField::code(IDENTIFIER, at(0x00, 128)?, &codes::XCVR_IDENTIFIERS).into(),
            RegisterField::text(VENDOR_NAME, at(0x00, 129)?, 16).into(),
            RegisterField::hex(VENDOR_OUI, at(0x00, 145)?, 3).into(),
            RegisterField::text(VENDOR_PART, at(0x00, 148)?, 16).into(),
            RegisterField::text("VendorRev", at(0x00, 164)?, 2).into(),
            RegisterField::text(VENDOR_SERIAL, at(0x00, 166)?, 16).into(),
            RegisterField::date(DATE_CODE, at(0x00, 182)?).into(),
            extended_id.into(),
            RegisterField::number("LengthMultiplier", at(0x00, 202)?, NumberFormat::U8)
                .bits(6, 2)
                .into(),
            RegisterField::number("LengthAssembly", at(0x00, 202)?, NumberFormat::U8)
                .bits(0, 6)
                .into(),
            RegisterField::code("Connector", at(0x00, 203)?, &codes::CONNECTORS).into(),
            RegisterField::code("MediaType", at(0x00, 85)?, &codes::MODULE_MEDIA_TYPE).into(),
            number("LaneCount", 0x00, 88, NumberFormat::U8)?,
            number("HostLaneAssignmentOption", 0x00, 89, NumberFormat::U8)?,
            number("MediaLaneAssignmentOption", 0x01, 176, NumberFormat::U8)?,
            RegisterField::code(
                "MediaInterfaceTechnology",
                at(0x00, 212)?,
                &codes::MEDIA_INTERFACE_TECH,
            )
            .into(),
            number("HwMajorRev", 0x01, 130, NumberFormat::U8)?,
            number("HwMinorRev", 0x01, 131, NumberFormat::U8)?,
            number("CmisRevision", 0x00, 1, NumberFormat::U8)?,
            number("ActiveFwMajorRev", 0x00, 39, NumberFormat::U8)?,
            number("ActiveFwMinorRev", 0x00, 40, NumberFormat::U8)?,
            number("InactiveFwMajorRev", 0x01, 128, NumberFormat::U8)?,
            number("InactiveFwMinorRev", 0x01, 129, NumberFormat::U8)?,
        ],
    ))
}

fn module_monitors() -> Result<GroupField, Error> {
    Ok(GroupField::new(
        "ModuleMonitors",
        [
            scaled(TEMPERATURE, 0x00, 14, NumberFormat::I16, 256.0)?,
            scaled(VOLTAGE, 0x00, 16, NumberFormat::U16, 10000.0)?,
            number("Aux1Mon", 0x00, 18, NumberFormat::I16)?,
            number("Aux2Mon", 0x00, 20, NumberFormat::I16)?,
            number("Aux3Mon", 0x00, 22, NumberFormat::I16)?,
            number("CustomMon", 0x00, 24, NumberFormat::U16)?,
            writable("GridSpacing", 0x12, 128, NumberFormat::U8)?,
            writable("LaserConfigChannel", 0x12, 136, NumberFormat::I16)?,
            number("LaserCurrentFreq", 0x12, 168, NumberFormat::U32)?,
            RegisterField::scaled("TxConfigPower", at(0x12, 200)?, NumberFormat::I16, 100.0)
                .writable()
                .into(),
            number("AuxMonType", 0x01, 145, NumberFormat::U8)?,
        ],
    ))
}

fn module_advertising() -> Result<GroupField, Error> {
    // These two words are little-endian.
    let le16 = NumberFormat::U16.little_endian();
    Ok(GroupField::new(
        "ModuleCharAdvt",
        [
            RegisterField::number("CtrlsAdvt", at(0x01, 155)?, le16)
                .subfield("TxDisableSupport", 1, 1)
                .into(),
            RegisterField::number("FlagsAdvt", at(0x01, 157)?, le16)
                .subfield("TxFaultSupport", 0, 1)
                .into(),
        ],
    ))
}

fn thresholds() -> Result<GroupField, Error> {
    let mut children = Vec::new();
    let kinds: [(&str, u8, NumberFormat, Option<f64>); 8] = [
        ("Temp", 128, NumberFormat::I16, Some(256.0)),
        ("Voltage", 136, NumberFormat::U16, Some(10000.0)),
        ("Aux1", 144, NumberFormat::I16, None),
        ("Aux2", 152, NumberFormat::I16, None),
        ("Aux3", 160, NumberFormat::I16, None),
        ("TxPower", 176, NumberFormat::U16, Some(1000.0)),
        ("TxBias", 184, NumberFormat::U16, Some(500.0)),
        ("RxPower", 192, NumberFormat::U16, Some(1000.0)),
    ];
    for (prefix, start, format, scale) in kinds {
        for (i, suffix) in ["HighAlarm", "LowAlarm", "HighWarning", "LowWarning"]
            .iter()
            .enumerate()
        {
            let name = format!("{prefix}{suffix}");
            let offset = start + 2 * i as u8;
            let field = match scale {
                Some(scale) => scaled(&name, 0x02, offset, format, scale)?,
                None => number(&name, 0x02, offset, format)?,
            };
            children.push(field);
        }
    }
    children.push(number("SupportGrid", 0x04, 128, NumberFormat::U8)?);
    children.push(number("LowChannel", 0x04, 158, NumberFormat::I16)?);
    children.push(number("HighChannel", 0x04, 160, NumberFormat::I16)?);
    children.push(scaled("MinProgOutputPower", 0x04, 198, NumberFormat::I16, 100.0)?);
    children.push(scaled("MaxProgOutputPower", 0x04, 200, NumberFormat::I16, 100.0)?);
    Ok(GroupField::new("Thresholds", children))
}

fn lane_datapath_control() -> Result<GroupField, Error> {
    Ok(GroupField::new(
        "LaneDatapathCtrl",
        [writable("TxDisable", 0x10, 130, NumberFormat::U8)?],
    ))
}

fn lane_datapath_status() -> Result<GroupField, Error> {
    let per_lane = |group: &str, field: &str, start: u8, scale: f64| -> Result<Field, Error> {
        let children = (1..=8u8)
            .map(|lane| {
                scaled(
                    &format!("{field}{lane}Field"),
                    0x11,
                    start + 2 * (lane - 1),
                    NumberFormat::U16,
                    scale,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GroupField::new(group, children).into())
    };

    // Two lanes per byte, the odd lane in the low nibble.
    let dp_state = (1..=8u8)
        .map(|lane| -> Result<Field, Error> {
            let pos = if lane % 2 == 1 { 0 } else { 4 };
            Ok(RegisterField::code(
                format!("DP{lane}State"),
                at(0x11, 128 + (lane - 1) / 2)?,
                &codes::DATAPATH_STATE,
            )
            .bits(pos, 4)
            .into())
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut children = vec![
        number("TxFault", 0x11, 135, NumberFormat::U8)?,
        number("RxLos", 0x11, 147, NumberFormat::U8)?,
        per_lane("TxPower", "OpticalPowerTx", 154, 1000.0)?,
        per_lane("TxBias", "LaserBiasTx", 170, 500.0)?,
        per_lane("RxPower", "OpticalPowerRx", 186, 1000.0)?,
        GroupField::new("DataPathState", dp_state).into(),
    ];
    let flags = [
        ("RxOutputStatus", 132),
        ("TxOutputStatus", 133),
        ("TxLosFlag", 136),
        ("TxCdrLol", 137),
        ("TxPowerHighAlarmFlag", 139),
        ("TxPowerLowAlarmFlag", 140),
        ("TxPowerHighWarnFlag", 141),
        ("TxPowerLowWarnFlag", 142),
        ("TxBiasHighAlarmFlag", 143),
        ("TxBiasLowAlarmFlag", 144),
        ("TxBiasHighWarnFlag", 145),
        ("TxBiasLowWarnFlag", 146),
        ("RxCdrLol", 148),
        ("RxPowerHighAlarmFlag", 149),
        ("RxPowerLowAlarmFlag", 150),
        ("RxPowerHighWarnFlag", 151),
        ("RxPowerLowWarnFlag", 152),
    ];
    for (name, offset) in flags {
        children.push(number(name, 0x11, offset, NumberFormat::U8)?);
    }
    children.push(number("ConfigLaneStatus", 0x11, 202, NumberFormat::U32)?);
    children.push(number("DpInitPending", 0x11, 235, NumberFormat::U8)?);
    children.push(RegisterField::flag("TuningInProgress", at(0x12, 222)?, 1).into());
    children.push(RegisterField::flag("WavelengthUnlocked", at(0x12, 222)?, 0).into());
    children.push(number("LaserTuningDetail", 0x12, 231, NumberFormat::U8)?);
    Ok(GroupField::new("LaneDatapathStatus", children))
}

fn loopback() -> Result<GroupField, Error> {
    Ok(GroupField::new(
        "TransLoopback",
        [
            number("LoopbackCapability", 0x13, 128, NumberFormat::U8)?,
            writable("MediaOutputLoopback", 0x13, 180, NumberFormat::U8)?,
            writable("MediaInputLoopback", 0x13, 181, NumberFormat::U8)?,
            writable("HostOutputLoopback", 0x13, 182, NumberFormat::U8)?,
            writable("HostInputLoopback", 0x13, 183, NumberFormat::U8)?,
        ],
    ))
}

fn module_status() -> Result<GroupField, Error> {
    Ok(GroupField::new(
        "TransModuleStatus",
        [
            RegisterField::code(MODULE_STATE, at(0x00, 3)?, &codes::MODULE_STATE)
                .bits(1, 3)
                .into(),
            number("ModuleFirmwareFaultInfo", 0x00, 8, NumberFormat::U8)?,
            number("ModuleFlagByte1", 0x00, 9, NumberFormat::U8)?,
            number("ModuleFlagByte2", 0x00, 10, NumberFormat::U8)?,
            number("ModuleFlagByte3", 0x00, 11, NumberFormat::U8)?,
            RegisterField::code("ModuleFaultCause", at(0x00, 41)?, &codes::MODULE_FAULT_CAUSE)
                .into(),
        ],
    ))
}

fn module_config() -> Result<GroupField, Error> {
    let control = at(0x00, 26)?;
    Ok(GroupField::new(
        "TransConfig",
        [
            RegisterField::number(MODULE_LEVEL_CONTROL, control, NumberFormat::U8)
                .writable()
                .into(),
            RegisterField::flag(LOW_POWER_REQUEST_SW, control, 4)
                .writable()
                .into(),
            RegisterField::flag("SoftwareReset", control, 3)
                .writable()
                .into(),
        ],
    ))
}

fn performance_monitoring() -> Result<Vec<Field>, Error> {
    let vdm = GroupField::new(
        "TransPm",
        [
            writable("VdmSupportedPage", 0x2f, 128, NumberFormat::U8)?,
            writable("VdmControl", 0x2f, 144, NumberFormat::U8)?,
        ],
    );

    let fec = GroupField::new(
        "MediaLaneFecPm",
        [
            number("RxBitsPm", 0x34, 128, NumberFormat::U64)?,
            number("RxBitsSubIntervalPm", 0x34, 136, NumberFormat::U64)?,
            number("RxCorrBitsPm", 0x34, 144, NumberFormat::U64)?,
            number("RxMinCorrBitsSubIntervalPm", 0x34, 152, NumberFormat::U64)?,
            number("RxMaxCorrBitsSubIntervalPm", 0x34, 160, NumberFormat::U64)?,
            number("RxFramesPm", 0x34, 168, NumberFormat::U32)?,
            number("RxFramesSubIntervalPm", 0x34, 172, NumberFormat::U32)?,
            number("RxFramesUncorrErrPm", 0x34, 176, NumberFormat::U32)?,
            number("RxMinFramesUncorrErrSubIntervalPm", 0x34, 180, NumberFormat::U32)?,
            number("RxMaxFramesUncorrErrSubIntervalPm", 0x34, 184, NumberFormat::U32)?,
        ],
    );

    // Coherent link PMs from C-CMIS page 0x35, each an average, minimum and
    // maximum.
    let link_pms: [(&str, u8, NumberFormat, Option<f64>); 13] = [
        ("Cd", 128, NumberFormat::I32, None),
        ("Dgd", 140, NumberFormat::U16, Some(100.0)),
        ("Sopmd", 146, NumberFormat::U16, Some(100.0)),
        ("Pdl", 152, NumberFormat::U16, Some(10.0)),
        ("Osnr", 158, NumberFormat::U16, Some(10.0)),
        ("Esnr", 164, NumberFormat::U16, Some(10.0)),
        ("Cfo", 170, NumberFormat::I16, None),
        ("Evm", 176, NumberFormat::U16, Some(655.35)),
        ("TxPower", 182, NumberFormat::I16, Some(100.0)),
        ("RxPower", 188, NumberFormat::I16, Some(100.0)),
        ("RxSigPower", 194, NumberFormat::I16, Some(100.0)),
        ("Soproc", 200, NumberFormat::U16, None),
        ("Mer", 206, NumberFormat::U16, Some(10.0)),
    ];
    let mut children = Vec::new();
    for (metric, start, format, scale) in link_pms {
        for (i, stat) in ["Avg", "Min", "Max"].iter().enumerate() {
            let name = format!("Rx{stat}{metric}Pm");
            let offset = start + (i * format.width) as u8;
            let field = match scale {
                Some(scale) => scaled(&name, 0x35, offset, format, scale)?,
                None => number(&name, 0x35, offset, format)?,
            };
            children.push(field);
        }
    }
    let link = GroupField::new("MediaLaneLinkPm", children);

    Ok(vec![vdm.into(), fec.into(), link.into()])
}

fn cdb_support() -> Result<GroupField, Error> {
    Ok(GroupField::new(
        "TransCdb",
        [
            number("CdbSupport", 0x01, 163, NumberFormat::U8)?,
            number("CdbSeqWriteLengthExt", 0x01, 164, NumberFormat::U8)?,
            writable("CdbRplLength", 0x9f, 134, NumberFormat::U8)?,
            writable("CdbRplChkCode", 0x9f, 135, NumberFormat::U8)?,
        ],
    ))
}

/// The CMIS fields of a module, excluding CDB.
pub fn fields() -> Result<Vec<Field>, Error> {
    let mut fields: Vec<Field> = vec![
        management_characteristics()?.into(),
        admin_info()?.into(),
        module_monitors()?.into(),
        module_advertising()?.into(),
        thresholds()?.into(),
        lane_datapath_control()?.into(),
        lane_datapath_status()?.into(),
        loopback()?.into(),
        module_status()?.into(),
        module_config()?.into(),
    ];
    fields.extend(performance_monitoring()?);
    fields.push(cdb_support()?.into());
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::fields;
    use crate::FieldRef;
    use crate::MemoryMap;
    use crate::Record;
    use crate::Value;

    #[test]
    fn test_cmis_fields_are_valid() {
        MemoryMap::new(fields().unwrap()).unwrap();
    }

    #[test]
    fn test_datapath_state_nibbles() {
        let map = MemoryMap::new(fields().unwrap()).unwrap();
        let Some(FieldRef::Register(dp1)) = map.get("DP1State") else {
            panic!("DP1State should be a register");
        };
        let Some(FieldRef::Register(dp2)) = map.get("DP2State") else {
            panic!("DP2State should be a register");
        };
        assert_eq!(dp1.address(), dp2.address());
        let raw = [0x41];
        assert_eq!(
            dp1.decode(&raw, &Record::new()).unwrap(),
            Value::Code {
                raw: 1,
                label: "DataPathDeactivated"
            }
        );
        assert_eq!(
            dp2.decode(&raw, &Record::new()).unwrap(),
            Value::Code {
                raw: 4,
                label: "DataPathActivated"
            }
        );
    }

    #[test]
    fn test_link_pm_offsets() {
        let map = MemoryMap::new(fields().unwrap()).unwrap();
        let Some(FieldRef::Register(max_cd)) = map.get("RxMaxCdPm") else {
            panic!("RxMaxCdPm should be a register");
        };
        assert_eq!(max_cd.address().in_page_offset(), 136 - 128);
        let Some(FieldRef::Register(max_mer)) = map.get("RxMaxMerPm") else {
            panic!("RxMaxMerPm should be a register");
        };
        assert_eq!(max_mer.address().in_page_offset(), 210 - 128);
    }
}
