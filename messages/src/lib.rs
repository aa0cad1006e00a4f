// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]

//! Wire-level primitives for managing CMIS transceiver modules.
//!
//! This crate describes how a module's register space is addressed, and the
//! byte layout of the Command Data Block (CDB) messaging protocol used to
//! drive firmware operations on a module. It does no I/O of its own.

pub mod cdb;
pub mod mgmt;

use serde::Deserialize;
use serde::Serialize;

/// An error building or parsing a wire-level object.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(any(test, feature = "std"), derive(thiserror::Error))]
pub enum Error {
    /// Accessed an invalid upper memory page.
    #[cfg_attr(any(test, feature = "std"), error("Invalid page: 0x{0:02x}"))]
    InvalidPage(u8),

    /// An access that is empty, or that would cross a page boundary.
    #[cfg_attr(
        any(test, feature = "std"),
        error("Invalid memory access at address {address} with length {len}")
    )]
    InvalidMemoryAccess { address: u32, len: usize },

    /// The extended or local payload length of a CDB command is out of
    /// range.
    #[cfg_attr(
        any(test, feature = "std"),
        error("Invalid CDB command parameters: epl = {epl}, lpl = {lpl}")
    )]
    InvalidCommandParameters { epl: u16, lpl: u16 },

    /// The payload supplied with a CDB command does not match the local
    /// payload length advertised in its header.
    #[cfg_attr(
        any(test, feature = "std"),
        error("CDB payload length mismatch: header says {expected}, got {actual}")
    )]
    PayloadLengthMismatch { expected: u8, actual: usize },

    /// A buffer is too small to hold, or to contain, a CDB header.
    #[cfg_attr(
        any(test, feature = "std"),
        error("Buffer too small: need {needed} bytes, have {actual}")
    )]
    BufferTooSmall { needed: usize, actual: usize },
}
