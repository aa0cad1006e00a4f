// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Host-side management of CMIS transceiver modules.
//!
//! This crate drives a module over a [`Bus`], which reads and writes its paged
//! register space. On top of that it provides:
//!
//! - [`RegisterAccess`], which reads and writes named fields of a module's
//!   [`MemoryMap`](xcvr_decode::MemoryMap).
//! - [`Cdb`], which issues CDB commands and polls the module for their
//!   completion.
//! - [`FirmwareUpdate`], which downloads, runs and commits a firmware image
//!   using the CDB firmware management commands.
//!
//! All operations on a single module are sequential. Each of these types
//! takes `&mut self`, so at most one command can be outstanding per module.

pub mod access;
pub mod bus;
pub mod cdb;
pub mod config;
pub mod firmware;
pub mod mock;

pub use access::RegisterAccess;
pub use bus::Bus;
pub use bus::BusError;
pub use cdb::Cdb;
pub use cdb::CdbState;
pub use cdb::CommandOutcome;
pub use cdb::Completion;
pub use config::CdbConfig;
pub use config::ConfigBuilder;
pub use firmware::DownloadError;
pub use firmware::DownloadErrorKind;
pub use firmware::DownloadSummary;
pub use firmware::FirmwareFeatures;
pub use firmware::FirmwareUpdate;
pub use firmware::PayloadMechanism;
pub use firmware::Step;
pub use firmware::TransferSession;
pub use mock::MockModule;
pub use xcvr_decode::Error as DecodeError;
pub use xcvr_messages::Error as MessageError;

/// An error managing a transceiver module.
#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error("Bus error")]
    Bus(#[from] BusError),

    #[error("Error decoding or encoding a field")]
    Decode(#[from] DecodeError),

    #[error("Error encoding a CDB command")]
    Message(#[from] MessageError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown CDB command 0x{0:04x}")]
    UnknownCommand(u16),

    #[error("CDB command {0} has no reply field")]
    NoReply(String),

    #[error("CDB command {command} did not succeed: {outcome}")]
    CommandUnsuccessful {
        command: String,
        outcome: CommandOutcome,
    },
}

#[cfg(test)]
pub(crate) mod test_utils {
    use slog::Logger;

    /// A logger that drops everything.
    pub fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }
}
