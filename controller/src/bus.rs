// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The transport used to reach a module's register space.

use crate::MessageError;
use xcvr_messages::mgmt::Address;

/// A failed access to a module.
#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum BusError {
    #[error("Module is not present")]
    NotPresent,

    #[error("Failed to read {len} bytes at address {address}")]
    ReadFailed { address: Address, len: usize },

    #[error("Failed to write {len} bytes at address {address}")]
    WriteFailed { address: Address, len: usize },

    #[error("Invalid access")]
    InvalidAccess(#[from] MessageError),
}

/// Read and write access to the flattened register space of one module.
///
/// Addresses are flattened as described in [`xcvr_messages::mgmt`], and no
/// single access crosses a page boundary. Selecting pages on the module is
/// the implementation's job, as is serializing accesses when several modules
/// share one physical bus.
#[allow(async_fn_in_trait)]
pub trait Bus {
    /// Read `len` bytes starting at `address`.
    async fn read(&mut self, address: Address, len: usize) -> Result<Vec<u8>, BusError>;

    /// Write `data` starting at `address`.
    async fn write(&mut self, address: Address, data: &[u8]) -> Result<(), BusError>;
}

impl<B: Bus> Bus for &mut B {
    async fn read(&mut self, address: Address, len: usize) -> Result<Vec<u8>, BusError> {
        (**self).read(address, len).await
    }

    async fn write(&mut self, address: Address, data: &[u8]) -> Result<(), BusError> {
        (**self).write(address, data).await
    }
}
