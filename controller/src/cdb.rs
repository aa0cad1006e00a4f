// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Issue CDB commands and wait for their completion.

use crate::Bus;
use crate::CdbConfig;
use crate::Error;
use crate::RegisterAccess;
use serde::Deserialize;
use serde::Serialize;
use slog::debug;
use slog::trace;
use slog::warn;
use slog::Logger;
use std::fmt;
use xcvr_decode::profile::cdb::COMMAND_RESULT;
use xcvr_decode::CommandResult;
use xcvr_decode::Profile;
use xcvr_decode::Value;
use xcvr_messages::cdb;
use xcvr_messages::cdb::id;
use xcvr_messages::cdb::Command;
use xcvr_messages::cdb::FailureCode;
use xcvr_messages::cdb::StatusFlags;
use xcvr_messages::cdb::StatusRegister;
use xcvr_messages::mgmt::Address;
use xcvr_messages::mgmt::PAGE_SIZE;

/// Classify a raw status register value.
pub const fn classify(status: u8, success_code: u8) -> CommandResult {
    // `From` isn't const.
    let status = StatusRegister {
        busy: status & StatusFlags::BUSY.bits() != 0,
        failed: status & StatusFlags::FAILED.bits() != 0,
        code: status & cdb::STATUS_CODE_MASK,
    };
    CommandResult::classify(status, success_code)
}

/// The progress of the most recent command.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CdbState {
    /// No command has been issued.
    #[default]
    Idle,
    /// A command has been written to the module.
    Issued,
    /// The status register is being polled.
    Polling { attempt: u32 },
    Succeeded,
    Failed,
    TimedOut,
}

/// How a CDB command ended.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "api-traits", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Succeeded {
        code: u8,
    },
    /// The command failed. The detail is missing if it could not be read
    /// back from the module.
    Failed {
        detail: Option<FailureCode>,
    },
    /// The module was still busy, or unreachable, when the polling budget
    /// ran out.
    TimedOut,
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandOutcome::Succeeded { code } => write!(f, "succeeded (0x{code:02x})"),
            CommandOutcome::Failed { detail: Some(detail) } => write!(f, "failed: {detail}"),
            CommandOutcome::Failed { detail: None } => write!(f, "failed"),
            CommandOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

/// The outcome of a command, and the number of status reads it took.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Completion {
    pub outcome: CommandOutcome,
    pub polls: u32,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CommandOutcome::Succeeded { .. })
    }
}

/// The CDB interface of one module.
///
/// Only one command may be outstanding at a time, which `&mut self` on every
/// operation enforces. Dropping a future returned by any of these methods
/// stops polling, but the module may still be processing the command.
#[derive(Debug)]
pub struct Cdb<'a, B> {
    access: RegisterAccess<'a, B>,
    profile: &'a Profile,
    config: CdbConfig,
    state: CdbState,
    log: Logger,
}

impl<'a, B: Bus> Cdb<'a, B> {
    pub fn new(bus: B, profile: &'a Profile, config: CdbConfig, log: &Logger) -> Self {
        let log = log.new(slog::o!("component" => "cdb"));
        Self {
            access: RegisterAccess::new(bus, profile.map(), config.max_write_size, &log),
            profile,
            config,
            state: CdbState::Idle,
            log,
        }
    }

    pub fn state(&self) -> CdbState {
        self.state
    }

    pub fn config(&self) -> &CdbConfig {
        &self.config
    }

    pub fn profile(&self) -> &'a Profile {
        self.profile
    }

    pub fn access(&mut self) -> &mut RegisterAccess<'a, B> {
        &mut self.access
    }

    pub fn into_inner(self) -> B {
        self.access.into_inner()
    }

    /// Look up a command supported by the module's profile.
    pub fn command(&self, id: u16) -> Result<Command, Error> {
        self.profile
            .command(id)
            .copied()
            .ok_or(Error::UnknownCommand(id))
    }

    /// Write a command and its local payload to the module.
    ///
    /// The module starts processing once the command id is written, so the
    /// rest of the command is written first.
    pub async fn issue(&mut self, command: &Command, payload: &[u8]) -> Result<(), Error> {
        let bytes = command.encode_with(payload, self.config.checksum_coverage)?;
        let address = Command::address();
        debug!(
            self.log,
            "issuing command";
            "command" => %command,
            "epl" => command.epl(),
            "lpl" => command.lpl(),
        );
        self.access
            .write_bytes(address.offset_by(2), &bytes[2..])
            .await?;
        self.access.write_bytes(address, &bytes[..2]).await?;
        self.state = CdbState::Issued;
        Ok(())
    }

    /// Poll the status register until the current command completes, or the
    /// polling budget runs out.
    ///
    /// A failed read of the status register uses up an attempt like any
    /// other.
    pub async fn poll(&mut self) -> Completion {
        let max_attempts = self.config.max_attempts();
        let mut n_failed_reads = 0;
        for attempt in 1..=max_attempts {
            self.state = CdbState::Polling { attempt };
            tokio::time::sleep(self.config.poll_interval).await;
            let status = match self.access.read_bytes(cdb::STATUS_ADDRESS, 1).await {
                Ok(raw) => match raw.first() {
                    Some(status) => *status,
                    None => {
                        n_failed_reads += 1;
                        continue;
                    }
                },
                Err(e) => {
                    debug!(
                        self.log,
                        "failed to read status";
                        "attempt" => attempt,
                        "reason" => %e,
                    );
                    n_failed_reads += 1;
                    continue;
                }
            };
            trace!(
                self.log,
                "read status";
                "attempt" => attempt,
                "status" => format!("0x{status:02x}"),
            );
            match classify(status, self.config.success_code) {
                CommandResult::Pending { .. } => continue,
                CommandResult::Succeeded { code } => {
                    self.state = CdbState::Succeeded;
                    return Completion {
                        outcome: CommandOutcome::Succeeded { code },
                        polls: attempt,
                    };
                }
                CommandResult::Failed { detail } => {
                    let detail = self.failure_detail(detail).await;
                    self.state = CdbState::Failed;
                    return Completion {
                        outcome: CommandOutcome::Failed { detail },
                        polls: attempt,
                    };
                }
            }
        }
        warn!(
            self.log,
            "command timed out";
            "attempts" => max_attempts,
            "failed_reads" => n_failed_reads,
        );
        self.state = CdbState::TimedOut;
        Completion {
            outcome: CommandOutcome::TimedOut,
            polls: max_attempts,
        }
    }

    // Read back the command result for its detail code.
    async fn failure_detail(&mut self, polled: u8) -> Option<FailureCode> {
        if self.profile.map().get(COMMAND_RESULT).is_none() {
            return Some(FailureCode::from(polled));
        }
        match self.access.read_by_name(COMMAND_RESULT).await {
            Ok(Value::CommandResult(CommandResult::Failed { detail })) => {
                Some(FailureCode::from(detail))
            }
            Ok(other) => {
                debug!(
                    self.log,
                    "command result changed after failure";
                    "result" => %other,
                );
                Some(FailureCode::from(polled))
            }
            Err(e) => {
                warn!(self.log, "failed to read command result"; "reason" => %e);
                None
            }
        }
    }

    /// Issue a command and wait for it to complete.
    ///
    /// A command that fails or times out is not an error. Errors are only
    /// returned if the command can't be issued at all.
    pub async fn execute(&mut self, command: &Command, payload: &[u8]) -> Result<Completion, Error> {
        self.issue(command, payload).await?;
        let completion = self.poll().await;
        debug!(
            self.log,
            "command complete";
            "command" => %command,
            "outcome" => %completion.outcome,
            "polls" => completion.polls,
        );
        Ok(completion)
    }

    /// Execute a command, failing unless it succeeds.
    pub async fn execute_checked(
        &mut self,
        command: &Command,
        payload: &[u8],
    ) -> Result<Completion, Error> {
        let completion = self.execute(command, payload).await?;
        if completion.is_success() {
            Ok(completion)
        } else {
            Err(Error::CommandUnsuccessful {
                command: command.to_string(),
                outcome: completion.outcome,
            })
        }
    }

    /// Read and decode the reply to the last command.
    pub async fn read_reply(&mut self, command: &Command) -> Result<Value, Error> {
        let profile = self.profile;
        let field = profile
            .reply_field(command)
            .ok_or_else(|| Error::NoReply(command.to_string()))?;
        self.access.read_ref(field).await
    }

    /// Stage an extended payload in the EPL window.
    ///
    /// The payload is written one page at a time, starting at page 0xA0.
    pub async fn stage_epl(&mut self, payload: &[u8]) -> Result<(), Error> {
        if payload.len() > usize::from(cdb::MAX_EPL) {
            return Err(Error::Message(
                xcvr_messages::Error::InvalidCommandParameters {
                    epl: u16::try_from(payload.len()).unwrap_or(u16::MAX),
                    lpl: 0,
                },
            ));
        }
        for (page, chunk) in (cdb::EPL_FIRST_PAGE..).zip(payload.chunks(PAGE_SIZE as usize)) {
            let address = Address::new(page, cdb::CMD_START_OFFSET);
            trace!(
                self.log,
                "staging extended payload";
                "page" => page,
                "len" => chunk.len(),
            );
            self.access.write_bytes(address, chunk).await?;
        }
        Ok(())
    }

    /// Query the module's password status.
    ///
    /// `delay` asks the module to hold off its reply, in milliseconds.
    pub async fn query_status(&mut self, delay: u16) -> Result<Value, Error> {
        let command = self.command(id::QUERY_STATUS)?;
        self.execute_checked(&command, &delay.to_be_bytes()).await?;
        self.read_reply(&command).await
    }

    /// Read information about the module's firmware images.
    pub async fn firmware_info(&mut self) -> Result<Value, Error> {
        let command = self.command(id::GET_FIRMWARE_INFO)?;
        self.execute_checked(&command, &[]).await?;
        self.read_reply(&command).await
    }
}

#[cfg(test)]
mod tests {
    use super::classify;
    use super::Cdb;
    use super::CdbState;
    use super::CommandOutcome;
    use crate::mock::CdbResponse;
    use crate::test_utils::test_logger;
    use crate::Bus;
    use crate::BusError;
    use crate::CdbConfig;
    use crate::Error;
    use crate::MessageError;
    use crate::MockModule;
    use xcvr_decode::profile::cdb as cdb_fields;
    use xcvr_decode::CommandResult;
    use xcvr_decode::Profile;
    use xcvr_decode::Value;
    use xcvr_messages::cdb;
    use xcvr_messages::cdb::id;
    use xcvr_messages::cdb::Command;
    use xcvr_messages::cdb::FailureCode;
    use xcvr_messages::mgmt::Address;

    #[test]
    fn test_classify() {
        assert_eq!(classify(0x80, 1), CommandResult::Pending { code: 0 });
        assert_eq!(classify(0xc1, 1), CommandResult::Pending { code: 1 });
        assert_eq!(classify(0x42, 1), CommandResult::Failed { detail: 2 });
        assert_eq!(classify(0x01, 1), CommandResult::Succeeded { code: 1 });
        assert_eq!(classify(0x03, 1), CommandResult::Failed { detail: 3 });
        assert_eq!(classify(0x03, 3), CommandResult::Succeeded { code: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_then_success() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        module.on_command(|_| CdbResponse::busy_then(3, cdb::SUCCESS_CODE));
        let mut cdb = Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
        assert_eq!(cdb.state(), CdbState::Idle);

        let command = cdb.command(id::ABORT_PROCESSING).unwrap();
        let completion = cdb.execute(&command, &[]).await.unwrap();
        assert_eq!(completion.outcome, CommandOutcome::Succeeded { code: 1 });
        assert_eq!(completion.polls, 4);
        assert_eq!(cdb.state(), CdbState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_write_order() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        {
            let mut cdb =
                Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
            let command = cdb.command(id::QUERY_STATUS).unwrap();
            cdb.execute(&command, &[0x00, 0x10]).await.unwrap();
        }
        let writes = module.writes();
        let (last_address, last) = writes.last().unwrap();
        assert_eq!(*last_address, Command::address());
        assert_eq!(last, &[0x00, 0x00]);
        assert!(writes[..writes.len() - 1]
            .iter()
            .all(|(address, _)| *address > Command::address()));
        let request = &module.requests()[0];
        assert_eq!(request.lpl, vec![0x00, 0x10]);
        assert!(request.header.verify_checksum(&request.lpl, Default::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reads_detail() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        module.on_command(|_| {
            let mut response = CdbResponse::failed(0x05);
            response.statuses.insert(0, 0x80);
            response
        });
        let mut cdb = Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
        let command = cdb.command(id::ABORT_PROCESSING).unwrap();
        let completion = cdb.execute(&command, &[]).await.unwrap();
        assert_eq!(
            completion.outcome,
            CommandOutcome::Failed {
                detail: Some(FailureCode::ChecksumError)
            }
        );
        assert_eq!(completion.polls, 2);
        assert_eq!(cdb.state(), CdbState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_busy_but_not_success_is_failure() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        module.on_command(|_| CdbResponse::busy_then(0, 0x03));
        let mut cdb = Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
        let command = cdb.command(id::ABORT_PROCESSING).unwrap();
        let completion = cdb.execute(&command, &[]).await.unwrap();
        assert_eq!(
            completion.outcome,
            CommandOutcome::Failed {
                detail: Some(FailureCode::PreviousNotAborted)
            }
        );
    }

    // Passes through a fixed number of reads, then fails the rest.
    struct FailAfter {
        module: MockModule,
        ok_reads: usize,
    }

    impl Bus for FailAfter {
        async fn read(&mut self, address: Address, len: usize) -> Result<Vec<u8>, BusError> {
            if self.ok_reads == 0 {
                return Err(BusError::ReadFailed { address, len });
            }
            self.ok_reads -= 1;
            self.module.read(address, len).await
        }

        async fn write(&mut self, address: Address, data: &[u8]) -> Result<(), BusError> {
            self.module.write(address, data).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_detail_unreadable() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        module.on_command(|_| CdbResponse::failed(0x02));
        let bus = FailAfter { module, ok_reads: 1 };
        let mut cdb = Cdb::new(bus, &profile, CdbConfig::default(), &test_logger());
        let command = cdb.command(id::ABORT_PROCESSING).unwrap();
        let completion = cdb.execute(&command, &[]).await.unwrap();
        assert_eq!(completion.outcome, CommandOutcome::Failed { detail: None });
        assert_eq!(completion.polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_read_failing_times_out() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        let config = CdbConfig::default();
        let max_attempts = config.max_attempts();
        let mut cdb = Cdb::new(&mut module, &profile, config, &test_logger());
        let command = cdb.command(id::ABORT_PROCESSING).unwrap();
        cdb.issue(&command, &[]).await.unwrap();
        cdb.access().bus_mut().fail_next_reads(usize::MAX);

        let start = tokio::time::Instant::now();
        let completion = cdb.poll().await;
        assert_eq!(completion.outcome, CommandOutcome::TimedOut);
        assert_eq!(completion.polls, max_attempts);
        assert_eq!(cdb.state(), CdbState::TimedOut);
        assert!(start.elapsed() >= cdb::MAX_ACCESS_HOLD_OFF);
        assert_eq!(cdb.access().bus_mut().n_reads(), max_attempts as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_forever_times_out() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        module.on_command(|_| CdbResponse::busy_then(0, 0x80));
        let mut cdb = Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
        let command = cdb.command(id::ABORT_PROCESSING).unwrap();
        let completion = cdb.execute(&command, &[]).await.unwrap();
        assert_eq!(completion.outcome, CommandOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_lengths_rejected_before_bus() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        {
            let mut cdb =
                Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
            let command = cdb.command(id::WRITE_FIRMWARE_LPL).unwrap();
            assert_eq!(
                command.with_lengths(0, 256),
                Err(MessageError::InvalidCommandParameters { epl: 0, lpl: 256 })
            );
            // Payloads must match the advertised length.
            assert!(matches!(
                cdb.execute(&command, &[0; 3]).await,
                Err(Error::Message(MessageError::PayloadLengthMismatch { .. }))
            ));
        }
        assert!(module.writes().is_empty());
        assert_eq!(module.n_reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_write_failure() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        module.fail_next_writes(1);
        let mut cdb = Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
        let command = cdb.command(id::ABORT_PROCESSING).unwrap();
        assert!(matches!(
            cdb.execute(&command, &[]).await,
            Err(Error::Bus(_))
        ));
        assert_eq!(cdb.state(), CdbState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_status() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        module.on_command(|req| {
            assert_eq!(req.header.id, id::QUERY_STATUS);
            assert_eq!(req.lpl, vec![0x00, 0x00]);
            CdbResponse::success().with_reply([0x00, 0x01])
        });
        let mut cdb = Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
        assert!(matches!(
            cdb.query_status(0).await.unwrap(),
            Value::Code { raw: 0x01, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_firmware_info() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        let mut reply = vec![0; 48];
        reply[0] = 0b0000_0101;
        reply[1] = 0b0000_0001;
        reply[2] = 3;
        reply[3] = 1;
        reply[4..6].copy_from_slice(&0x0102u16.to_be_bytes());
        module.on_command(move |_| CdbResponse::success().with_reply(reply.clone()));
        let mut cdb = Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
        let info = cdb.firmware_info().await.unwrap();
        let info = info.as_record().unwrap();
        assert_eq!(info.get(cdb_fields::BANKA_OPER_STATUS), Some(&Value::Bool(true)));
        assert_eq!(info.get(cdb_fields::BANKA_ADMIN_STATUS), Some(&Value::Bool(false)));
        assert_eq!(info.get(cdb_fields::BANKA_VALID_STATUS), Some(&Value::Bool(true)));
        assert_eq!(info.get(cdb_fields::BANKA_MAJOR_VERSION), Some(&Value::Unsigned(3)));
        assert_eq!(
            info.get(cdb_fields::BANKA_BUILD_VERSION),
            Some(&Value::Unsigned(0x0102))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_firmware_info_failure() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        module.on_command(|_| CdbResponse::failed(0x01));
        let mut cdb = Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
        assert!(matches!(
            cdb.firmware_info().await,
            Err(Error::CommandUnsuccessful {
                outcome: CommandOutcome::Failed {
                    detail: Some(FailureCode::UnknownCommand)
                },
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_epl() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        let payload: Vec<u8> = (0..300).map(|x| x as u8).collect();
        {
            let mut cdb =
                Cdb::new(&mut module, &profile, CdbConfig::default(), &test_logger());
            cdb.stage_epl(&payload).await.unwrap();
            assert!(cdb.stage_epl(&[0; 2048]).await.is_err());
        }
        assert_eq!(module.peek(Address::new(0xa0, 128), 128).unwrap(), &payload[..128]);
        assert_eq!(module.peek(Address::new(0xa1, 128), 128).unwrap(), &payload[128..256]);
        assert_eq!(module.peek(Address::new(0xa2, 128), 44).unwrap(), &payload[256..]);
        // Each page is split into writes of the configured size.
        assert_eq!(module.writes().len(), 16 + 16 + 6);
    }
}
