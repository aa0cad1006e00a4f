// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! An in-memory module, for testing and for operating on register dumps.

use crate::Bus;
use crate::BusError;
use std::collections::VecDeque;
use std::fmt;
use xcvr_messages::cdb;
use xcvr_messages::cdb::Command;
use xcvr_messages::cdb::CommandHeader;
use xcvr_messages::mgmt::Address;
use xcvr_messages::mgmt::MemoryRegion;
use xcvr_messages::mgmt::PAGE_SIZE;

/// The size of the flattened register space: the lower page, and the upper
/// half of each of 256 pages.
pub const MEMORY_SIZE: usize = (u8::MAX as usize + 2) * PAGE_SIZE as usize;

/// A CDB command received by a [`MockModule`].
#[derive(Clone, Debug, PartialEq)]
pub struct CdbRequest {
    pub header: CommandHeader,
    /// The local payload, as many bytes as the header advertises.
    pub lpl: Vec<u8>,
    /// The contents of the extended payload window, as many bytes as the
    /// header advertises.
    pub epl: Vec<u8>,
}

/// How a [`MockModule`] reacts to a CDB command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CdbResponse {
    /// Values taken on by the status register, one per read. The last value
    /// sticks.
    pub statuses: Vec<u8>,
    /// Reply data, placed at the start of the reply area.
    pub reply: Vec<u8>,
}

impl CdbResponse {
    /// Complete successfully after one read.
    pub fn success() -> Self {
        Self::busy_then(0, cdb::SUCCESS_CODE)
    }

    /// Report busy for `n` reads, then settle on `status`.
    pub fn busy_then(n: usize, status: u8) -> Self {
        let mut statuses = vec![0x80; n];
        statuses.push(status);
        Self {
            statuses,
            reply: Vec::new(),
        }
    }

    /// Fail with the given detail code.
    pub fn failed(detail: u8) -> Self {
        Self::busy_then(0, 0x40 | (detail & cdb::STATUS_CODE_MASK))
    }

    pub fn with_reply(mut self, reply: impl Into<Vec<u8>>) -> Self {
        self.reply = reply.into();
        self
    }
}

type Responder = Box<dyn FnMut(&CdbRequest) -> CdbResponse + Send>;

/// An emulated module, backed by an in-memory register space.
///
/// Writing the id bytes of a CDB command hands the command to the responder
/// installed with [`MockModule::on_command`], whose response scripts the
/// following reads of the status register.
pub struct MockModule {
    memory: Vec<u8>,
    statuses: VecDeque<u8>,
    responder: Option<Responder>,
    requests: Vec<CdbRequest>,
    writes: Vec<(Address, Vec<u8>)>,
    n_reads: usize,
    failed_reads: usize,
    failed_writes: usize,
    present: bool,
}

impl fmt::Debug for MockModule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MockModule")
            .field("statuses", &self.statuses)
            .field("requests", &self.requests.len())
            .field("writes", &self.writes.len())
            .field("present", &self.present)
            .finish_non_exhaustive()
    }
}

impl Default for MockModule {
    fn default() -> Self {
        Self::new()
    }
}

impl MockModule {
    /// Create a module with an all-zero register space.
    pub fn new() -> Self {
        Self {
            memory: vec![0; MEMORY_SIZE],
            statuses: VecDeque::new(),
            responder: None,
            requests: Vec::new(),
            writes: Vec::new(),
            n_reads: 0,
            failed_reads: 0,
            failed_writes: 0,
            present: true,
        }
    }

    /// Create a module from a dump of its flattened register space.
    ///
    /// A short dump leaves the remaining bytes zeroed.
    pub fn from_dump(dump: &[u8]) -> Result<Self, BusError> {
        if dump.len() > MEMORY_SIZE {
            return Err(BusError::ReadFailed {
                address: Address::from_raw(MEMORY_SIZE as u32),
                len: dump.len() - MEMORY_SIZE,
            });
        }
        let mut module = Self::new();
        module.memory[..dump.len()].copy_from_slice(dump);
        Ok(module)
    }

    /// Install a responder for CDB commands.
    pub fn on_command<F>(&mut self, responder: F)
    where
        F: FnMut(&CdbRequest) -> CdbResponse + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
    }

    /// Queue values for the next reads of the status register.
    pub fn script_status(&mut self, statuses: impl IntoIterator<Item = u8>) {
        self.statuses.extend(statuses);
    }

    /// Set bytes of the register space directly, without logging a write.
    pub fn load(&mut self, address: Address, data: &[u8]) -> Result<(), BusError> {
        let range = self.range(address, data.len())?;
        self.memory[range].copy_from_slice(data);
        Ok(())
    }

    /// Return bytes of the register space directly, without logging a read.
    pub fn peek(&self, address: Address, len: usize) -> Result<&[u8], BusError> {
        let range = self.range(address, len)?;
        Ok(&self.memory[range])
    }

    /// Fail the next `n` reads.
    pub fn fail_next_reads(&mut self, n: usize) {
        self.failed_reads = n;
    }

    /// Fail the next `n` writes.
    pub fn fail_next_writes(&mut self, n: usize) {
        self.failed_writes = n;
    }

    /// Simulate removal of the module.
    pub fn remove(&mut self) {
        self.present = false;
    }

    /// Simulate insertion of the module.
    pub fn insert(&mut self) {
        self.present = true;
    }

    /// The CDB commands received so far.
    pub fn requests(&self) -> &[CdbRequest] {
        &self.requests
    }

    /// Every write received so far, in order.
    pub fn writes(&self) -> &[(Address, Vec<u8>)] {
        &self.writes
    }

    /// The number of reads received so far, including failed ones.
    pub fn n_reads(&self) -> usize {
        self.n_reads
    }

    fn range(&self, address: Address, len: usize) -> Result<std::ops::Range<usize>, BusError> {
        let region = MemoryRegion::new(address, len)?;
        let start = region.address().get() as usize;
        let end = start + region.len();
        if end > self.memory.len() {
            return Err(BusError::ReadFailed { address, len });
        }
        Ok(start..end)
    }

    // Gather the command just triggered, and let the responder react.
    fn dispatch(&mut self) -> Result<(), BusError> {
        let cmd = Command::address();
        let header = CommandHeader::decode(self.peek(cmd, cdb::DECODED_HEADER_SIZE)?)?;
        let lpl = self
            .peek(cmd.offset_by(cdb::HEADER_SIZE as u32), usize::from(header.lpl))?
            .to_vec();
        // The extended payload window is contiguous in the flattened space.
        let epl_start = Address::new(cdb::EPL_FIRST_PAGE, cdb::CMD_START_OFFSET).get() as usize;
        let epl = self.memory[epl_start..epl_start + usize::from(header.epl)].to_vec();
        let request = CdbRequest { header, lpl, epl };

        let response = match self.responder.as_mut() {
            Some(responder) => responder(&request),
            None => CdbResponse::success(),
        };
        self.requests.push(request);
        if !response.reply.is_empty() {
            let reply = Address::new(cdb::LPL_PAGE, cdb::RPL_DATA_START_OFFSET);
            self.load(reply, &response.reply)?;
        }
        self.statuses = response.statuses.into();
        Ok(())
    }
}

impl Bus for MockModule {
    async fn read(&mut self, address: Address, len: usize) -> Result<Vec<u8>, BusError> {
        self.n_reads += 1;
        if !self.present {
            return Err(BusError::NotPresent);
        }
        if self.failed_reads > 0 {
            self.failed_reads -= 1;
            return Err(BusError::ReadFailed { address, len });
        }
        let range = self.range(address, len)?;
        if range.contains(&(cdb::STATUS_ADDRESS.get() as usize)) {
            if let Some(status) = self.statuses.pop_front() {
                self.memory[cdb::STATUS_ADDRESS.get() as usize] = status;
            }
        }
        Ok(self.memory[range].to_vec())
    }

    async fn write(&mut self, address: Address, data: &[u8]) -> Result<(), BusError> {
        if !self.present {
            return Err(BusError::NotPresent);
        }
        if self.failed_writes > 0 {
            self.failed_writes -= 1;
            return Err(BusError::WriteFailed {
                address,
                len: data.len(),
            });
        }
        let range = self.range(address, data.len())?;
        self.memory[range.clone()].copy_from_slice(data);
        self.writes.push((address, data.to_vec()));

        // Writing the first byte of the command id triggers execution.
        if range.contains(&(Command::address().get() as usize)) {
            self.dispatch()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CdbResponse;
    use super::MockModule;
    use super::MEMORY_SIZE;
    use crate::Bus;
    use crate::BusError;
    use xcvr_messages::cdb;
    use xcvr_messages::cdb::Command;
    use xcvr_messages::mgmt::Address;

    #[tokio::test]
    async fn test_mock_memory() {
        let mut module = MockModule::new();
        let addr = Address::new(0x00, 129);
        module.write(addr, b"Oxide").await.unwrap();
        assert_eq!(module.read(addr, 5).await.unwrap(), b"Oxide");
        assert_eq!(module.writes(), &[(addr, b"Oxide".to_vec())]);
        assert_eq!(module.n_reads(), 1);

        // Accesses may not cross a page.
        assert!(matches!(
            module.read(Address::new(0x00, 120), 16).await,
            Err(BusError::InvalidAccess(_))
        ));
        let last = Address::from_raw(MEMORY_SIZE as u32 - 1);
        assert_eq!(module.read(last, 1).await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let mut module = MockModule::new();
        module.fail_next_reads(2);
        assert!(module.read(Address::new(0, 0), 1).await.is_err());
        assert!(module.read(Address::new(0, 0), 1).await.is_err());
        assert!(module.read(Address::new(0, 0), 1).await.is_ok());

        module.fail_next_writes(1);
        assert!(module.write(Address::new(0, 26), &[1]).await.is_err());
        assert!(module.writes().is_empty());

        module.remove();
        assert_eq!(
            module.read(Address::new(0, 0), 1).await,
            Err(BusError::NotPresent)
        );
        module.insert();
        assert!(module.write(Address::new(0, 26), &[1]).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_status_script_sticks() {
        let mut module = MockModule::new();
        module.script_status([0x80, 0x01]);
        assert_eq!(module.read(cdb::STATUS_ADDRESS, 1).await.unwrap(), vec![0x80]);
        assert_eq!(module.read(cdb::STATUS_ADDRESS, 1).await.unwrap(), vec![0x01]);
        assert_eq!(module.read(cdb::STATUS_ADDRESS, 1).await.unwrap(), vec![0x01]);
    }

    #[tokio::test]
    async fn test_mock_dispatches_commands() {
        let mut module = MockModule::new();
        module.on_command(|req| {
            assert_eq!(req.header.id, cdb::id::QUERY_STATUS);
            CdbResponse::busy_then(1, cdb::SUCCESS_CODE).with_reply([0x01])
        });
        let cmd = Command::new(cdb::id::QUERY_STATUS, "QueryStatus", 0, 2, None).unwrap();
        let bytes = cmd.encode(&[0x00, 0x10]).unwrap();
        module
            .write(Command::address().offset_by(2), &bytes[2..])
            .await
            .unwrap();
        assert!(module.requests().is_empty());
        module.write(Command::address(), &bytes[..2]).await.unwrap();

        let req = &module.requests()[0];
        assert_eq!(req.lpl, vec![0x00, 0x10]);
        assert!(req.epl.is_empty());
        assert_eq!(module.read(cdb::STATUS_ADDRESS, 1).await.unwrap(), vec![0x80]);
        assert_eq!(module.read(cdb::STATUS_ADDRESS, 1).await.unwrap(), vec![0x01]);
        let reply = Address::new(cdb::LPL_PAGE, cdb::RPL_DATA_START_OFFSET);
        assert_eq!(module.peek(reply, 1).unwrap(), &[0x01]);
    }

    #[test]
    fn test_mock_from_dump() {
        let module = MockModule::from_dump(&[0x18, 0x00, 0x06]).unwrap();
        assert_eq!(module.peek(Address::new(0, 0), 4).unwrap(), &[0x18, 0x00, 0x06, 0x00]);
        assert!(MockModule::from_dump(&vec![0; MEMORY_SIZE + 1]).is_err());
    }
}
