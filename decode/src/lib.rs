// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Describe and decode the register map of a transceiver module.
//!
//! A module's memory map is described declaratively, as a tree of named
//! fields. Each [`RegisterField`] covers a few bytes at a fixed address, and
//! knows how to turn those bytes into a typed [`Value`] and back. Related
//! registers are collected into [`GroupField`]s, which decode to a
//! [`Record`]. A [`Profile`] bundles the fields of one kind of module with the
//! CDB commands it supports.
//!
//! Nothing in this crate performs I/O. Decoding and encoding are pure
//! functions of the raw bytes.

pub mod codes;
mod date;
pub mod field;
pub mod map;
pub mod profile;
pub mod utils;
mod value;

pub use codes::CodeTable;
pub use date::DateCode;
pub use field::BitField;
pub use field::BitRange;
pub use field::Endian;
pub use field::Field;
pub use field::FieldKind;
pub use field::GroupField;
pub use field::NumberFormat;
pub use field::RegisterField;
pub use map::FieldRef;
pub use map::MemoryMap;
pub use map::Profile;
pub use value::Record;
pub use value::Value;
pub use xcvr_messages::cdb::CommandResult;

use thiserror::Error;
use xcvr_messages::Error as MessageError;

/// An error describing, decoding, or encoding a field.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    #[error("Field '{0}' is read-only")]
    ReadOnlyViolation(String),

    #[error("Field '{field}' depends on '{dependency}', which is not available")]
    MissingDependency { field: String, dependency: String },

    #[error("Field '{field}' needs {expected} bytes, but only {actual} were provided")]
    ShortRead {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Field '{field}' expects a value of kind {expected}, found '{found}'")]
    ValueMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("Value '{value}' is out of range for field '{field}'")]
    ValueOutOfRange { field: String, value: String },

    #[error("Duplicate field name '{0}'")]
    DuplicateField(String),

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Invalid descriptor for field '{field}': {reason}")]
    InvalidDescriptor { field: String, reason: String },

    #[error("Invalid date code: {0:?}")]
    InvalidDate(Vec<u8>),

    #[error("Bit index out of range")]
    BitOutOfRange,

    #[error("Management or messaging error")]
    Message(#[from] MessageError),
}
