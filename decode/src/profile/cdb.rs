// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Fields and commands of the CDB messaging protocol.
//!
//! See CMIS 5.0 section 9.

use super::at;
use crate::codes;
use crate::Error;
use crate::Field;
use crate::GroupField;
use crate::NumberFormat;
use crate::RegisterField;
use static_assertions::const_assert;
use static_assertions::const_assert_eq;
use xcvr_messages::cdb;
use xcvr_messages::cdb::id;
use xcvr_messages::cdb::Command;
use xcvr_messages::cdb::CommandCatalog;
use xcvr_messages::cdb::LPL_PAGE;

// The reply area starts right after the command header.
const_assert_eq!(
    cdb::RPL_DATA_START_OFFSET as usize,
    cdb::CMD_START_OFFSET as usize + cdb::HEADER_SIZE
);
const_assert_eq!(cdb::EPL_MAX_PAGES, 16);
const_assert!(cdb::HEADER_SIZE + cdb::LPL_MAX_PAYLOAD_SIZE == 128);

pub const STATUS_GROUP: &str = "Cdb1CmdStatusGroup";
pub const CMD_STATUS: &str = "Cdb1CmdStatus";
pub const IS_BUSY: &str = "Cdb1IsBusy";
pub const HAS_FAILED: &str = "Cdb1HasFailed";
pub const STATUS: &str = "Cdb1Status";
pub const COMMAND_RESULT: &str = "Cdb1CommandResult";

pub const QUERY_STATUS: &str = "Cdb1QueryStatus";

pub const FIRMWARE_INFO: &str = "Cdb1FirmwareInfo";
pub const FIRMWARE_STATUS: &str = "Cdb1FirmwareStatus";
pub const BANKA_OPER_STATUS: &str = "CdbBankAOperStatus";
pub const BANKB_OPER_STATUS: &str = "CdbBankBOperStatus";
pub const BANKA_ADMIN_STATUS: &str = "CdbBankAAdminStatus";
pub const BANKB_ADMIN_STATUS: &str = "CdbBankBAdminStatus";
pub const BANKA_VALID_STATUS: &str = "CdbBankAValidStatus";
pub const BANKB_VALID_STATUS: &str = "CdbBankBValidStatus";
pub const IMAGE_INFO: &str = "CdbImageInfo";
pub const IMAGEA_VERSION_PRESENT: &str = "CdbImageAVersionPresent";
pub const IMAGEB_VERSION_PRESENT: &str = "CdbImageBVersionPresent";
pub const FACTORY_VERSION_PRESENT: &str = "CdbFactoryImgVersionPresent";
pub const BANKA_MAJOR_VERSION: &str = "CdbBankAMajorVersion";
pub const BANKA_MINOR_VERSION: &str = "CdbBankAMinorVersion";
pub const BANKA_BUILD_VERSION: &str = "CdbBankABuildVersion";
pub const BANKB_MAJOR_VERSION: &str = "CdbBankBMajorVersion";
pub const BANKB_MINOR_VERSION: &str = "CdbBankBMinorVersion";
pub const BANKB_BUILD_VERSION: &str = "CdbBankBBuildVersion";
pub const FACTORY_MAJOR_VERSION: &str = "CdbFactoryMajorVersion";
pub const FACTORY_MINOR_VERSION: &str = "CdbFactoryMinorVersion";
pub const FACTORY_BUILD_VERSION: &str = "CdbFactoryBuildVersion";

pub const FW_MGMT_FEATURES: &str = "CdbFwMgmtFeatures";
pub const FW_FEATURE_FLAGS: &str = "CdbFwFeatureFlags";
pub const FW_AUTO_PAGING: &str = "CdbFwAutoPaging";
pub const FW_START_PAYLOAD_SIZE: &str = "CdbFwStartPayloadSize";
pub const FW_ERASED_BYTE: &str = "CdbFwErasedByte";
pub const FW_MAX_BLOCK_SIZE: &str = "CdbFwMaxBlockSize";
pub const FW_WRITE_MECHANISM: &str = "CdbFwWriteMechanism";
pub const FW_READ_MECHANISM: &str = "CdbFwReadMechanism";
pub const FW_HITLESS_RESTART: &str = "CdbFwHitlessRestart";
pub const FW_MAX_DURATION_START: &str = "CdbFwMaxDurationStart";
pub const FW_MAX_DURATION_ABORT: &str = "CdbFwMaxDurationAbort";
pub const FW_MAX_DURATION_WRITE: &str = "CdbFwMaxDurationWrite";
pub const FW_MAX_DURATION_COMPLETE: &str = "CdbFwMaxDurationComplete";
pub const FW_MAX_DURATION_COPY: &str = "CdbFwMaxDurationCopy";

/// The CDB fields of a CMIS module.
pub fn fields() -> Result<Vec<Field>, Error> {
    let status = at(0x00, 37)?;
    let status_group = GroupField::new(
        STATUS_GROUP,
        [
            RegisterField::number(CMD_STATUS, status, NumberFormat::U8)
                .subfield(IS_BUSY, 7, 1)
                .subfield(HAS_FAILED, 6, 1)
                .subfield(STATUS, 0, 6)
                .into(),
            RegisterField::command_result(COMMAND_RESULT, status, [IS_BUSY, HAS_FAILED, STATUS])
                .into(),
        ],
    );

    let query_status = RegisterField::code(QUERY_STATUS, at(LPL_PAGE, 137)?, &codes::CDB_QUERY_STATUS);

    let version = |name: &str, offset: u8, format: NumberFormat| -> Result<Field, Error> {
        Ok(RegisterField::number(name, at(LPL_PAGE, offset)?, format).into())
    };
    let firmware_info = GroupField::new(
        FIRMWARE_INFO,
        [
            RegisterField::number(FIRMWARE_STATUS, at(LPL_PAGE, 136)?, NumberFormat::U8)
                .subfield(BANKA_OPER_STATUS, 0, 1)
                .subfield(BANKA_ADMIN_STATUS, 1, 1)
                .subfield(BANKA_VALID_STATUS, 2, 1)
                .subfield(BANKB_OPER_STATUS, 4, 1)
                .subfield(BANKB_ADMIN_STATUS, 5, 1)
                .subfield(BANKB_VALID_STATUS, 6, 1)
                .into(),
            RegisterField::number(IMAGE_INFO, at(LPL_PAGE, 137)?, NumberFormat::U8)
                .subfield(IMAGEA_VERSION_PRESENT, 0, 1)
                .subfield(IMAGEB_VERSION_PRESENT, 1, 1)
                .subfield(FACTORY_VERSION_PRESENT, 2, 1)
                .into(),
            version(BANKA_MAJOR_VERSION, 138, NumberFormat::U8)?,
            version(BANKA_MINOR_VERSION, 139, NumberFormat::U8)?,
            version(BANKA_BUILD_VERSION, 140, NumberFormat::U16)?,
            version(BANKB_MAJOR_VERSION, 174, NumberFormat::U8)?,
            version(BANKB_MINOR_VERSION, 175, NumberFormat::U8)?,
            version(BANKB_BUILD_VERSION, 176, NumberFormat::U16)?,
            version(FACTORY_MAJOR_VERSION, 210, NumberFormat::U8)?,
            version(FACTORY_MINOR_VERSION, 211, NumberFormat::U8)?,
            version(FACTORY_BUILD_VERSION, 212, NumberFormat::U16)?,
        ],
    );

    // Reply to the firmware management features command, CMIS 5.0 Table
    // 9-16.
    let fw_mgmt_features = GroupField::new(
        FW_MGMT_FEATURES,
        [
            RegisterField::number(FW_FEATURE_FLAGS, at(LPL_PAGE, 136)?, NumberFormat::U8)
                .subfield(FW_AUTO_PAGING, 4, 1)
                .into(),
            version(FW_START_PAYLOAD_SIZE, 138, NumberFormat::U8)?,
            RegisterField::hex(FW_ERASED_BYTE, at(LPL_PAGE, 139)?, 1).into(),
            version(FW_MAX_BLOCK_SIZE, 140, NumberFormat::U8)?,
            RegisterField::code(FW_WRITE_MECHANISM, at(LPL_PAGE, 141)?, &codes::FW_WRITE_MECHANISM)
                .into(),
            RegisterField::code(FW_READ_MECHANISM, at(LPL_PAGE, 142)?, &codes::FW_WRITE_MECHANISM)
                .into(),
            version(FW_HITLESS_RESTART, 143, NumberFormat::U8)?,
            version(FW_MAX_DURATION_START, 144, NumberFormat::U16)?,
            version(FW_MAX_DURATION_ABORT, 146, NumberFormat::U16)?,
            version(FW_MAX_DURATION_WRITE, 148, NumberFormat::U16)?,
            version(FW_MAX_DURATION_COMPLETE, 150, NumberFormat::U16)?,
            version(FW_MAX_DURATION_COPY, 152, NumberFormat::U16)?,
        ],
    );

    Ok(vec![
        status_group.into(),
        query_status.into(),
        firmware_info.into(),
        fw_mgmt_features.into(),
    ])
}

/// The CDB commands supported by a CMIS module.
///
/// Commands with variable-length payloads are listed with their shortest
/// payload, and resized with [`Command::with_lengths`] when issued.
pub fn commands() -> Result<CommandCatalog, Error> {
    let commands = [
        Command::new(id::QUERY_STATUS, "QueryStatus", 0, 2, Some(QUERY_STATUS)),
        Command::new(id::ENTER_PASSWORD, "EnterPassword", 0, 4, None),
        Command::new(id::CHANGE_PASSWORD, "ChangePassword", 0, 8, None),
        Command::new(id::ABORT_PROCESSING, "AbortProcessing", 0, 0, None),
        Command::new(id::MODULE_FEATURES, "ModuleFeatures", 0, 0, None),
        Command::new(
            id::FIRMWARE_MGMT_FEATURES,
            "FirmwareManagementFeatures",
            0,
            0,
            Some(FW_MGMT_FEATURES),
        ),
        Command::new(id::GET_FIRMWARE_INFO, "GetFirmwareInfo", 0, 0, Some(FIRMWARE_INFO)),
        Command::new(id::START_FIRMWARE_DOWNLOAD, "StartFirmwareDownload", 0, 8, None),
        Command::new(id::ABORT_FIRMWARE_DOWNLOAD, "AbortFirmwareDownload", 0, 0, None),
        Command::new(id::WRITE_FIRMWARE_LPL, "WriteFirmwareBlockLpl", 0, 4, None),
        Command::new(id::WRITE_FIRMWARE_EPL, "WriteFirmwareBlockEpl", 0, 4, None),
        Command::new(
            id::COMPLETE_FIRMWARE_DOWNLOAD,
            "CompleteFirmwareDownload",
            0,
            0,
            None,
        ),
        Command::new(id::RUN_FIRMWARE_IMAGE, "RunFirmwareImage", 0, 4, None),
        Command::new(id::COMMIT_FIRMWARE_IMAGE, "CommitFirmwareImage", 0, 0, None),
    ];
    let commands = commands.into_iter().collect::<Result<Vec<_>, _>>()?;
    Ok(CommandCatalog::new(commands))
}
