// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Configuration of CDB command processing.

use crate::Error;
use std::time::Duration;
use xcvr_messages::cdb;
use xcvr_messages::cdb::ChecksumCoverage;
use xcvr_messages::cdb::RunMode;
use xcvr_messages::mgmt::PAGE_SIZE;

/// Return the default interval between reads of the CDB status register.
pub const fn default_poll_interval() -> Duration {
    cdb::MAX_CAPTURE_TIME
}

/// Return the default time a module may take to complete a command.
pub const fn default_max_hold_off() -> Duration {
    cdb::MAX_ACCESS_HOLD_OFF
}

/// Return the default status code denoting success.
pub const fn default_success_code() -> u8 {
    cdb::SUCCESS_CODE
}

/// Return the default checksum coverage of encoded commands.
pub const fn default_checksum_coverage() -> ChecksumCoverage {
    ChecksumCoverage::HeaderAndPayload
}

/// Return the default size of a single bus write.
///
/// Unless a module advertises otherwise, CMIS 5.0 section 5.2.2.1 limits
/// sequential writes to 8 bytes.
pub const fn default_max_write_size() -> u8 {
    8
}

/// Return the default mode used to run a new firmware image.
pub const fn default_run_mode() -> RunMode {
    RunMode::ResetToInactive
}

/// Return the default delay before a module resets into a new image.
pub const fn default_reset_delay() -> Duration {
    Duration::ZERO
}

/// Configuration for a [`crate::Cdb`].
///
/// The [`ConfigBuilder`] can be used to construct this with defaults that
/// conform to CMIS 5.0.
#[derive(Clone, Debug, PartialEq)]
pub struct CdbConfig {
    /// The interval between reads of the status register.
    ///
    /// This is also the longest time a module may take to capture a command.
    pub poll_interval: Duration,

    /// The longest time a module may take to complete a command.
    pub max_hold_off: Duration,

    /// The status code a module reports on success.
    pub success_code: u8,

    /// The bytes covered by the checksum of each command.
    pub checksum_coverage: ChecksumCoverage,

    /// The largest single write issued on the bus.
    pub max_write_size: u8,

    /// An upper bound on the size of a firmware block, below what the module
    /// advertises.
    pub max_block_size: Option<usize>,

    /// How a downloaded image is run.
    pub run_mode: RunMode,

    /// The delay before the module resets into a downloaded image.
    pub reset_delay: Duration,
}

impl CdbConfig {
    /// The number of status reads made before a command is considered timed
    /// out.
    pub fn max_attempts(&self) -> u32 {
        let attempts = self.max_hold_off.as_nanos() / self.poll_interval.as_nanos().max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }

    /// The reset delay in the units carried by the run command.
    pub fn reset_delay_ms(&self) -> u16 {
        u16::try_from(self.reset_delay.as_millis()).unwrap_or(u16::MAX)
    }
}

impl Default for CdbConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_hold_off: default_max_hold_off(),
            success_code: default_success_code(),
            checksum_coverage: default_checksum_coverage(),
            max_write_size: default_max_write_size(),
            max_block_size: None,
            run_mode: default_run_mode(),
            reset_delay: default_reset_delay(),
        }
    }
}

/// A builder interface for generating CDB configuration.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    poll_interval: Option<Duration>,
    max_hold_off: Option<Duration>,
    success_code: Option<u8>,
    checksum_coverage: Option<ChecksumCoverage>,
    max_write_size: Option<u8>,
    max_block_size: Option<usize>,
    run_mode: Option<RunMode>,
    reset_delay: Option<Duration>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interval between reads of the status register.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the longest time a command may take to complete.
    pub fn max_hold_off(mut self, hold_off: Duration) -> Self {
        self.max_hold_off = Some(hold_off);
        self
    }

    /// Set the status code denoting success.
    pub fn success_code(mut self, code: u8) -> Self {
        self.success_code = Some(code);
        self
    }

    /// Set the bytes covered by each command's checksum.
    pub fn checksum_coverage(mut self, coverage: ChecksumCoverage) -> Self {
        self.checksum_coverage = Some(coverage);
        self
    }

    /// Set the largest single write issued on the bus.
    pub fn max_write_size(mut self, size: u8) -> Self {
        self.max_write_size = Some(size);
        self
    }

    /// Limit the size of firmware blocks.
    pub fn max_block_size(mut self, size: usize) -> Self {
        self.max_block_size = Some(size);
        self
    }

    /// Set how a downloaded image is run.
    pub fn run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = Some(mode);
        self
    }

    /// Set the delay before the module resets into a downloaded image.
    pub fn reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = Some(delay);
        self
    }

    /// Build a `CdbConfig` from `self`.
    pub fn build(self) -> Result<CdbConfig, Error> {
        let poll_interval = self.poll_interval.unwrap_or_else(default_poll_interval);
        let max_hold_off = self.max_hold_off.unwrap_or_else(default_max_hold_off);
        if poll_interval.is_zero() {
            return Err(Error::InvalidConfig(String::from(
                "poll interval must be non-zero",
            )));
        }
        if max_hold_off < poll_interval {
            return Err(Error::InvalidConfig(format!(
                "hold-off {max_hold_off:?} is shorter than the poll interval {poll_interval:?}"
            )));
        }

        let max_write_size = self.max_write_size.unwrap_or_else(default_max_write_size);
        if max_write_size == 0 || u32::from(max_write_size) > PAGE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "write size must be in 1..={PAGE_SIZE}, found {max_write_size}"
            )));
        }
        if self.max_block_size == Some(0) {
            return Err(Error::InvalidConfig(String::from(
                "block size must be non-zero",
            )));
        }

        let reset_delay = self.reset_delay.unwrap_or_else(default_reset_delay);
        if reset_delay.as_millis() > u128::from(u16::MAX) {
            return Err(Error::InvalidConfig(format!(
                "reset delay {reset_delay:?} does not fit in 16 bits of milliseconds"
            )));
        }

        Ok(CdbConfig {
            poll_interval,
            max_hold_off,
            success_code: self.success_code.unwrap_or_else(default_success_code),
            checksum_coverage: self
                .checksum_coverage
                .unwrap_or_else(default_checksum_coverage),
            max_write_size,
            max_block_size: self.max_block_size,
            run_mode: self.run_mode.unwrap_or_else(default_run_mode),
            reset_delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::CdbConfig;
    use super::ConfigBuilder;
    use crate::Error;
    use std::time::Duration;

    #[test]
    fn test_config_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config, CdbConfig::default());
        assert_eq!(config.max_attempts(), 50);
        assert_eq!(config.max_write_size, 8);
        assert_eq!(config.reset_delay_ms(), 0);
    }

    #[test]
    fn test_config_builder_validates() {
        assert!(matches!(
            ConfigBuilder::new().poll_interval(Duration::ZERO).build(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            ConfigBuilder::new()
                .poll_interval(Duration::from_secs(2))
                .max_hold_off(Duration::from_secs(1))
                .build(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(ConfigBuilder::new().max_write_size(0).build().is_err());
        assert!(ConfigBuilder::new().max_write_size(129).build().is_err());
        assert!(ConfigBuilder::new().max_write_size(128).build().is_ok());
        assert!(ConfigBuilder::new().max_block_size(0).build().is_err());
        assert!(ConfigBuilder::new()
            .reset_delay(Duration::from_secs(70))
            .build()
            .is_err());
    }

    #[test]
    fn test_max_attempts() {
        let config = ConfigBuilder::new()
            .poll_interval(Duration::from_millis(30))
            .max_hold_off(Duration::from_millis(100))
            .build()
            .unwrap();
        assert_eq!(config.max_attempts(), 3);
    }
}
