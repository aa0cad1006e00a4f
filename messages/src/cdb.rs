// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The Command Data Block (CDB) messaging protocol.
//!
//! CDB is the mechanism CMIS provides for issuing "commands" to a module,
//! such as downloading and activating firmware. A command is written into a
//! fixed area of page 0x9F, optionally followed by a local payload (LPL)
//! in the same page, or an extended payload (EPL) staged in pages 0xA0-0xAF.
//! The module signals progress through a status register in the lower page.
//!
//! See CMIS 5.0 section 9 for details.

use crate::mgmt::Address;
use crate::mgmt::PAGE_SIZE;
use crate::Error;
use core::fmt;
use core::time::Duration;
use serde::Deserialize;
use serde::Serialize;

/// The page containing the CDB command area and local payload.
pub const LPL_PAGE: u8 = 0x9F;

/// The offset in `LPL_PAGE` of the first byte of a command.
pub const CMD_START_OFFSET: u8 = 128;

/// The offset in `LPL_PAGE` of the first byte of reply data.
pub const RPL_DATA_START_OFFSET: u8 = 136;

/// The size of the command header, including the reply-length placeholder.
pub const HEADER_SIZE: usize = 8;

/// The size of a header decoded for inspection, which includes the first two
/// payload bytes (the response delay of a status query).
pub const DECODED_HEADER_SIZE: usize = 10;

/// The maximum size of a local payload.
pub const LPL_MAX_PAYLOAD_SIZE: usize = 120;

/// The maximum size of an extended payload.
pub const EPL_MAX_PAYLOAD_SIZE: usize = 2048;

/// The first page of the extended payload window.
pub const EPL_FIRST_PAGE: u8 = 0xA0;

/// The number of pages in the extended payload window.
pub const EPL_MAX_PAGES: usize = EPL_MAX_PAYLOAD_SIZE / PAGE_SIZE as usize;

/// The largest extended payload length a command header can carry.
pub const MAX_EPL: u16 = 2047;

/// The largest local payload length a command header can carry.
pub const MAX_LPL: u16 = 255;

/// The status code reported for a successfully completed command.
pub const SUCCESS_CODE: u8 = 0x01;

/// The address of the CDB status register, page 0x00 byte 37.
pub const STATUS_ADDRESS: Address = Address::new(0x00, 37);

/// Mask of the status code within the status register.
pub const STATUS_CODE_MASK: u8 = 0b0011_1111;

/// The longest time a module may hold off host accesses while it processes a
/// command.
pub const MAX_ACCESS_HOLD_OFF: Duration = Duration::from_secs(5);

/// The longest time a module may take to capture a single command.
pub const MAX_CAPTURE_TIME: Duration = Duration::from_millis(100);

/// Identifiers of known CDB commands.
pub mod id {
    pub const QUERY_STATUS: u16 = 0x0000;
    pub const ENTER_PASSWORD: u16 = 0x0001;
    pub const CHANGE_PASSWORD: u16 = 0x0002;
    pub const ABORT_PROCESSING: u16 = 0x0003;
    pub const MODULE_FEATURES: u16 = 0x0040;
    pub const FIRMWARE_MGMT_FEATURES: u16 = 0x0041;
    pub const GET_FIRMWARE_INFO: u16 = 0x0100;
    pub const START_FIRMWARE_DOWNLOAD: u16 = 0x0101;
    pub const ABORT_FIRMWARE_DOWNLOAD: u16 = 0x0102;
    pub const WRITE_FIRMWARE_LPL: u16 = 0x0103;
    pub const WRITE_FIRMWARE_EPL: u16 = 0x0104;
    pub const COMPLETE_FIRMWARE_DOWNLOAD: u16 = 0x0107;
    pub const RUN_FIRMWARE_IMAGE: u16 = 0x0109;
    pub const COMMIT_FIRMWARE_IMAGE: u16 = 0x010A;
}

/// Compute the CDB checksum over a sequence of byte slices.
///
/// This is the one's complement of the 8-bit sum of all bytes, i.e.,
/// `0xFF - (sum mod 256)`.
pub fn checksum<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> u8 {
    let sum = parts
        .into_iter()
        .flat_map(|part| part.iter())
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    0xFF - sum
}

/// The set of bytes covered by a command's checksum.
///
/// CMIS 5.0 computes the checksum over the header and the local payload.
/// Some earlier module firmware only covers the header, so this is
/// selectable per device revision.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "api-traits", derive(schemars::JsonSchema))]
#[cfg_attr(any(test, feature = "std"), derive(clap::ValueEnum))]
pub enum ChecksumCoverage {
    /// Only the id, EPL and LPL bytes.
    HeaderOnly,
    /// The id, EPL and LPL bytes, and the local payload.
    #[default]
    HeaderAndPayload,
}

/// A CDB command.
///
/// Commands are static descriptions, built once into a catalog. Issuing a
/// command produces a fresh encoding from its parameters and a payload, and
/// never modifies the command itself. Commands whose payload length varies
/// between invocations are re-parameterized with [`Command::with_lengths`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Command {
    id: u16,
    name: &'static str,
    epl: u16,
    lpl: u8,
    reply: Option<&'static str>,
}

impl Command {
    /// Construct a new command.
    ///
    /// `reply` names the field of the device profile which describes the
    /// command's reply data, if it has any.
    pub const fn new(
        id: u16,
        name: &'static str,
        epl: u16,
        lpl: u16,
        reply: Option<&'static str>,
    ) -> Result<Self, Error> {
        if epl > MAX_EPL || lpl > MAX_LPL {
            return Err(Error::InvalidCommandParameters { epl, lpl });
        }
        Ok(Self {
            id,
            name,
            epl,
            lpl: lpl as u8,
            reply,
        })
    }

    /// Return a copy of this command with different payload lengths.
    pub const fn with_lengths(&self, epl: u16, lpl: u16) -> Result<Self, Error> {
        Self::new(self.id, self.name, epl, lpl, self.reply)
    }

    pub const fn id(&self) -> u16 {
        self.id
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn epl(&self) -> u16 {
        self.epl
    }

    pub const fn lpl(&self) -> u8 {
        self.lpl
    }

    /// The name of the field describing this command's reply, if any.
    pub const fn reply(&self) -> Option<&'static str> {
        self.reply
    }

    /// The address at which commands are written.
    pub const fn address() -> Address {
        Address::new(LPL_PAGE, CMD_START_OFFSET)
    }

    /// The total number of bytes in the encoded command.
    pub const fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.lpl as usize
    }

    /// Encode the command and its local payload into `buf`, returning the
    /// number of bytes written.
    ///
    /// The payload must be exactly as long as the command's LPL.
    pub fn encode_into(
        &self,
        payload: &[u8],
        coverage: ChecksumCoverage,
        buf: &mut [u8],
    ) -> Result<usize, Error> {
        if payload.len() != usize::from(self.lpl) {
            return Err(Error::PayloadLengthMismatch {
                expected: self.lpl,
                actual: payload.len(),
            });
        }
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(Error::BufferTooSmall {
                needed: len,
                actual: buf.len(),
            });
        }
        buf[0..2].copy_from_slice(&self.id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.epl.to_be_bytes());
        buf[4] = self.lpl;
        let sum = match coverage {
            ChecksumCoverage::HeaderOnly => checksum([&buf[..5]]),
            ChecksumCoverage::HeaderAndPayload => checksum([&buf[..5], payload]),
        };
        buf[5] = sum;
        // The reply length is filled in by the module.
        buf[6..8].fill(0);
        buf[HEADER_SIZE..len].copy_from_slice(payload);
        Ok(len)
    }

    /// Encode the command with the default checksum coverage.
    #[cfg(any(test, feature = "std"))]
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        self.encode_with(payload, ChecksumCoverage::default())
    }

    /// Encode the command with an explicit checksum coverage.
    #[cfg(any(test, feature = "std"))]
    pub fn encode_with(&self, payload: &[u8], coverage: ChecksumCoverage) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0; self.encoded_len()];
        self.encode_into(payload, coverage, &mut buf)?;
        Ok(buf)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (0x{:04x})", self.name, self.id)
    }
}

/// A decoded command header, as echoed back by a module.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "api-traits", derive(schemars::JsonSchema))]
pub struct CommandHeader {
    pub id: u16,
    pub epl: u16,
    pub lpl: u8,
    pub checksum: u8,
    pub rpl: u16,
    pub delay: u16,
}

impl CommandHeader {
    /// Decode a header from the first [`DECODED_HEADER_SIZE`] bytes of the
    /// command area.
    pub fn decode(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() < DECODED_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                needed: DECODED_HEADER_SIZE,
                actual: raw.len(),
            });
        }
        Ok(Self {
            id: u16::from_be_bytes([raw[0], raw[1]]),
            epl: u16::from_be_bytes([raw[2], raw[3]]),
            lpl: raw[4],
            checksum: raw[5],
            rpl: u16::from_be_bytes([raw[6], raw[7]]),
            // Multi-byte payload fields are big-endian, like the rest of the
            // register space.
            delay: u16::from_be_bytes([raw[8], raw[9]]),
        })
    }

    /// Recompute the checksum of this header with the given local payload,
    /// and compare it to the one carried in the header.
    pub fn verify_checksum(&self, payload: &[u8], coverage: ChecksumCoverage) -> bool {
        let id = self.id.to_be_bytes();
        let epl = self.epl.to_be_bytes();
        let lpl = [self.lpl];
        let expected = match coverage {
            ChecksumCoverage::HeaderOnly => checksum([&id[..], &epl[..], &lpl[..]]),
            ChecksumCoverage::HeaderAndPayload => {
                checksum([&id[..], &epl[..], &lpl[..], payload])
            }
        };
        expected == self.checksum
    }
}

bitflags::bitflags! {
    /// Flags in the CDB status register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct StatusFlags: u8 {
        /// The module is processing a command.
        const BUSY      = 0b1000_0000;
        /// The last command failed.
        const FAILED    = 0b0100_0000;
    }
}

/// The decoded contents of the CDB status register.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusRegister {
    pub busy: bool,
    pub failed: bool,
    pub code: u8,
}

impl From<u8> for StatusRegister {
    fn from(x: u8) -> Self {
        let flags = StatusFlags::from_bits_truncate(x);
        Self {
            busy: flags.contains(StatusFlags::BUSY),
            failed: flags.contains(StatusFlags::FAILED),
            code: x & STATUS_CODE_MASK,
        }
    }
}

impl From<StatusRegister> for u8 {
    fn from(s: StatusRegister) -> u8 {
        let mut flags = StatusFlags::empty();
        flags.set(StatusFlags::BUSY, s.busy);
        flags.set(StatusFlags::FAILED, s.failed);
        flags.bits() | (s.code & STATUS_CODE_MASK)
    }
}

/// The result of the last CDB command, as reported by the status register.
///
/// A cleared busy bit alone does not mean the command succeeded, so this
/// always carries the status code alongside the classification.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "api-traits", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum CommandResult {
    /// The module is still processing the command.
    Pending { code: u8 },
    /// The command failed, with a detail code.
    Failed { detail: u8 },
    /// The command completed successfully.
    Succeeded { code: u8 },
}

impl CommandResult {
    /// Classify a status register, given the code that denotes success.
    pub const fn classify(status: StatusRegister, success_code: u8) -> Self {
        if status.busy {
            CommandResult::Pending { code: status.code }
        } else if status.failed {
            CommandResult::Failed {
                detail: status.code,
            }
        } else if status.code == success_code {
            CommandResult::Succeeded { code: status.code }
        } else {
            CommandResult::Failed {
                detail: status.code,
            }
        }
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self, CommandResult::Pending { .. })
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandResult::Pending { code } => write!(f, "Pending (0x{code:02x})"),
            CommandResult::Failed { detail } => {
                write!(f, "Failed: {}", FailureCode::from(*detail))
            }
            CommandResult::Succeeded { code } => write!(f, "Succeeded (0x{code:02x})"),
        }
    }
}

/// The reason a CDB command failed.
///
/// See CMIS 5.0 Table 9-3.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "api-traits", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    UnknownCommand,
    ParameterRange,
    PreviousNotAborted,
    CheckingTimeout,
    ChecksumError,
    PasswordError,
    IncompatibleState,
    Reserved(u8),
    CommandSpecific(u8),
    VendorSpecific(u8),
}

impl From<u8> for FailureCode {
    fn from(x: u8) -> Self {
        use FailureCode::*;
        match x & STATUS_CODE_MASK {
            0x01 => UnknownCommand,
            0x02 => ParameterRange,
            0x03 => PreviousNotAborted,
            0x04 => CheckingTimeout,
            0x05 => ChecksumError,
            0x06 => PasswordError,
            0x07 => IncompatibleState,
            x @ 0x20..=0x2f => CommandSpecific(x),
            x @ 0x30..=0x3f => VendorSpecific(x),
            x => Reserved(x),
        }
    }
}

impl From<FailureCode> for u8 {
    fn from(code: FailureCode) -> u8 {
        use FailureCode::*;
        match code {
            UnknownCommand => 0x01,
            ParameterRange => 0x02,
            PreviousNotAborted => 0x03,
            CheckingTimeout => 0x04,
            ChecksumError => 0x05,
            PasswordError => 0x06,
            IncompatibleState => 0x07,
            Reserved(x) | CommandSpecific(x) | VendorSpecific(x) => x,
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use FailureCode::*;
        match self {
            UnknownCommand => write!(f, "Command code unknown"),
            ParameterRange => write!(f, "Parameter range error or not supported"),
            PreviousNotAborted => write!(f, "Previous command was not properly aborted"),
            CheckingTimeout => write!(f, "Command checking timed out"),
            ChecksumError => write!(f, "Checksum error"),
            PasswordError => write!(f, "Password error"),
            IncompatibleState => write!(f, "Command not compatible with operating status"),
            Reserved(x) => write!(f, "Reserved (0x{x:02x})"),
            CommandSpecific(x) => write!(f, "Command-specific failure (0x{x:02x})"),
            VendorSpecific(x) => write!(f, "Vendor-specific failure (0x{x:02x})"),
        }
    }
}

/// How a module should switch to a firmware image.
///
/// See CMIS 5.0 section 9.7.7.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "api-traits", derive(schemars::JsonSchema))]
#[cfg_attr(any(test, feature = "std"), derive(clap::ValueEnum))]
pub enum RunMode {
    /// Reset to the inactive image, interrupting traffic.
    #[default]
    ResetToInactive,
    /// Attempt a hitless reset to the inactive image.
    HitlessToInactive,
    /// Reset to the running image, interrupting traffic.
    ResetToRunning,
    /// Attempt a hitless reset to the running image.
    HitlessToRunning,
}

impl From<RunMode> for u8 {
    fn from(mode: RunMode) -> u8 {
        match mode {
            RunMode::ResetToInactive => 0x00,
            RunMode::HitlessToInactive => 0x01,
            RunMode::ResetToRunning => 0x02,
            RunMode::HitlessToRunning => 0x03,
        }
    }
}

/// A static catalog of the commands a device profile supports, keyed by
/// command id.
#[cfg(any(test, feature = "std"))]
#[derive(Clone, Debug, Default)]
pub struct CommandCatalog {
    commands: std::collections::BTreeMap<u16, Command>,
}

#[cfg(any(test, feature = "std"))]
impl CommandCatalog {
    /// Build a catalog from a list of commands.
    ///
    /// A later command with the same id as an earlier one replaces it.
    pub fn new(commands: impl IntoIterator<Item = Command>) -> Self {
        Self {
            commands: commands.into_iter().map(|cmd| (cmd.id(), cmd)).collect(),
        }
    }

    /// Look up a command by id.
    pub fn get(&self, id: u16) -> Option<&Command> {
        self.commands.get(&id)
    }

    /// Look up a command by name.
    pub fn by_name(&self, name: &str) -> Option<&Command> {
        self.commands.values().find(|cmd| cmd.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> + '_ {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::checksum;
    use super::ChecksumCoverage;
    use super::Command;
    use super::CommandCatalog;
    use super::CommandHeader;
    use super::CommandResult;
    use super::FailureCode;
    use super::StatusRegister;
    use super::SUCCESS_CODE;
    use crate::Error;

    fn query_status() -> Command {
        Command::new(0x0000, "QueryStatus", 0, 2, Some("Cdb1QueryStatus")).unwrap()
    }

    #[test]
    fn test_checksum() {
        assert_eq!(checksum([&[][..]]), 0xff);
        assert_eq!(checksum([&[0x01, 0x02][..], &[0x03][..]]), 0xff - 6);
        // Sums wrap modulo 256.
        assert_eq!(checksum([&[0xff, 0x02][..]]), 0xff - 0x01);
    }

    #[test]
    fn test_encode_query_status() {
        let cmd = query_status();
        let payload = 0x0010u16.to_be_bytes();
        let bytes = cmd.encode(&payload).unwrap();
        assert_eq!(
            bytes,
            vec![0x00, 0x00, 0x00, 0x00, 0x02, 0xff - 0x02 - 0x10, 0x00, 0x00, 0x00, 0x10]
        );
    }

    #[test]
    fn test_encode_header_only_checksum() {
        let cmd = query_status();
        let payload = [0x00, 0x10];
        let bytes = cmd
            .encode_with(&payload, ChecksumCoverage::HeaderOnly)
            .unwrap();
        assert_eq!(bytes[5], 0xff - 0x02);
    }

    #[test]
    fn test_checksum_round_trip() {
        let payloads: [&[u8]; 4] = [&[], &[0xaa], &[0xde, 0xad, 0xbe, 0xef], &[0xff; 120]];
        for (id, epl) in [(0x0000, 0), (0x0103, 0), (0x0104, 2047), (0xffff, 17)] {
            for payload in payloads {
                for coverage in [ChecksumCoverage::HeaderOnly, ChecksumCoverage::HeaderAndPayload] {
                    let cmd = Command::new(id, "test", epl, payload.len() as u16, None).unwrap();
                    let mut bytes = cmd.encode_with(payload, coverage).unwrap();
                    // Pad so short payloads still cover the delay bytes.
                    bytes.resize(bytes.len().max(10), 0);
                    let header = CommandHeader::decode(&bytes).unwrap();
                    assert_eq!(header.checksum, bytes[5]);
                    assert_eq!(header.id, id);
                    assert_eq!(header.epl, epl);
                    assert_eq!(usize::from(header.lpl), payload.len());
                    assert_eq!(header.rpl, 0);
                    assert!(header.verify_checksum(payload, coverage));
                }
            }
        }
    }

    #[test]
    fn test_invalid_command_parameters() {
        assert_eq!(
            Command::new(0x0103, "test", 0, 256, None),
            Err(Error::InvalidCommandParameters { epl: 0, lpl: 256 })
        );
        assert_eq!(
            Command::new(0x0104, "test", 2048, 4, None),
            Err(Error::InvalidCommandParameters { epl: 2048, lpl: 4 })
        );
        let cmd = query_status();
        assert!(cmd.with_lengths(0, 256).is_err());
        let resized = cmd.with_lengths(12, 4).unwrap();
        assert_eq!(resized.lpl(), 4);
        assert_eq!(resized.epl(), 12);
        // The original is untouched.
        assert_eq!(cmd.lpl(), 2);
    }

    #[test]
    fn test_payload_length_mismatch() {
        let cmd = query_status();
        assert_eq!(
            cmd.encode(&[0x00]),
            Err(Error::PayloadLengthMismatch {
                expected: 2,
                actual: 1
            })
        );
        let mut buf = [0u8; 4];
        assert!(matches!(
            cmd.encode_into(&[0, 0], ChecksumCoverage::default(), &mut buf),
            Err(Error::BufferTooSmall { needed: 10, .. })
        ));
    }

    #[test]
    fn test_decode_header_too_short() {
        assert!(matches!(
            CommandHeader::decode(&[0; 9]),
            Err(Error::BufferTooSmall { needed: 10, actual: 9 })
        ));
    }

    #[test]
    fn test_decode_delay_is_big_endian() {
        let cmd = query_status();
        let bytes = cmd.encode(&0x1234u16.to_be_bytes()).unwrap();
        let header = CommandHeader::decode(&bytes).unwrap();
        assert_eq!(header.delay, 0x1234);

        // A 10 ms delay, as written by a module.
        let raw = [0x00, 0x04, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x0a];
        let header = CommandHeader::decode(&raw).unwrap();
        assert_eq!(header.id, 0x0004);
        assert_eq!(header.lpl, 2);
        assert_eq!(header.delay, 10);
    }

    #[test]
    fn test_status_register() {
        let status = StatusRegister::from(0b1100_0011);
        assert!(status.busy);
        assert!(status.failed);
        assert_eq!(status.code, 0b11);
        assert_eq!(u8::from(status), 0b1100_0011);
    }

    #[test]
    fn test_classify_status() {
        let classify = |x: u8| CommandResult::classify(StatusRegister::from(x), SUCCESS_CODE);

        // Busy, regardless of the other bits.
        for x in 0x80..=0xff {
            assert!(classify(x).is_pending());
        }

        // Failed, with the detail code.
        for code in 0..0x40 {
            assert_eq!(
                classify(0b0100_0000 | code),
                CommandResult::Failed { detail: code }
            );
        }

        assert_eq!(classify(0x01), CommandResult::Succeeded { code: 0x01 });

        // Not busy, not failed, but also not successful.
        for code in (0..0x40).filter(|c| *c != SUCCESS_CODE) {
            assert_eq!(classify(code), CommandResult::Failed { detail: code });
        }
    }

    #[test]
    fn test_classify_status_custom_success_code() {
        let status = StatusRegister::from(0x02);
        assert_eq!(
            CommandResult::classify(status, 0x02),
            CommandResult::Succeeded { code: 0x02 }
        );
    }

    #[test]
    fn test_failure_code_round_trip() {
        for x in 0..0x40u8 {
            assert_eq!(u8::from(FailureCode::from(x)), x);
        }
        assert_eq!(FailureCode::from(0x05), FailureCode::ChecksumError);
        assert_eq!(FailureCode::from(0x21), FailureCode::CommandSpecific(0x21));
    }

    #[test]
    fn test_command_catalog() {
        let catalog = CommandCatalog::new([
            query_status(),
            Command::new(0x0100, "GetFirmwareInfo", 0, 0, Some("Cdb1FirmwareInfo")).unwrap(),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(0x0100).unwrap().reply(), Some("Cdb1FirmwareInfo"));
        assert_eq!(catalog.by_name("QueryStatus").unwrap().id(), 0x0000);
        assert!(catalog.get(0x0200).is_none());
    }

    #[test]
    fn test_serialize_command_result() {
        assert_eq!(
            serde_json::to_string(&CommandResult::Failed { detail: 5 }).unwrap(),
            r#"{"failed":{"detail":5}}"#
        );
    }
}
