// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Download, run and commit module firmware over CDB.
//!
//! A download proceeds through these steps, see CMIS 5.0 section 7.3.1:
//!
//! ```text
//! QueryFeatures -> StartDownload -> WriteBlock* -> CompleteDownload
//! ```
//!
//! after which the new image may be run, and then committed so the module
//! boots it by default. If any step of the download fails, the download is
//! aborted before the error is returned.

use crate::Bus;
use crate::Cdb;
use crate::CommandOutcome;
use crate::Completion;
use crate::DecodeError;
use crate::Error;
use crate::MessageError;
use serde::Deserialize;
use serde::Serialize;
use slog::debug;
use slog::info;
use slog::trace;
use slog::warn;
use slog::Logger;
use std::fmt;
use std::path::Path;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use xcvr_decode::profile::cdb as fields;
use xcvr_decode::Record;
use xcvr_decode::Value;
use xcvr_messages::cdb;
use xcvr_messages::cdb::id;
use xcvr_messages::cdb::Command;
use xcvr_messages::cdb::FailureCode;

/// The size of the block address leading each block write.
const BLOCK_ADDRESS_SIZE: usize = 4;

/// The size of the fixed part of the start command's payload.
const START_PAYLOAD_SIZE: usize = 8;

/// The largest vendor header carried by the start command.
pub const MAX_HEADER_SIZE: usize = cdb::LPL_MAX_PAYLOAD_SIZE - START_PAYLOAD_SIZE;

/// The largest block carried by a local payload.
pub const LPL_MAX_BLOCK_SIZE: usize = cdb::LPL_MAX_PAYLOAD_SIZE - BLOCK_ADDRESS_SIZE;

/// The largest block carried by an extended payload.
///
/// This is the largest multiple of 8 whose length fits in the EPL field of
/// a command header.
pub const EPL_MAX_BLOCK_SIZE: usize = (cdb::MAX_EPL as usize / 8) * 8;

/// How firmware blocks are transferred to the module.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "api-traits", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum PayloadMechanism {
    /// Blocks are carried in the command's local payload.
    Local,
    /// Blocks are staged in the extended payload pages.
    Extended,
}

impl PayloadMechanism {
    /// Decode the write mechanism advertised by a module.
    ///
    /// Modules supporting both mechanisms use extended payloads.
    pub const fn from_code(code: u64) -> Option<Self> {
        if code & 0x10 != 0 {
            Some(PayloadMechanism::Extended)
        } else if code & 0x01 != 0 {
            Some(PayloadMechanism::Local)
        } else {
            None
        }
    }

    /// The largest block a single write command can carry.
    pub const fn max_block_size(&self) -> usize {
        match self {
            PayloadMechanism::Local => LPL_MAX_BLOCK_SIZE,
            PayloadMechanism::Extended => EPL_MAX_BLOCK_SIZE,
        }
    }
}

impl fmt::Display for PayloadMechanism {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PayloadMechanism::Local => write!(f, "LPL"),
            PayloadMechanism::Extended => write!(f, "EPL"),
        }
    }
}

/// The firmware management features of a module.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FirmwareFeatures {
    /// The module pages the EPL window on its own.
    pub auto_paging: bool,
    /// The size of the vendor header leading each image.
    pub header_size: usize,
    /// The value of erased bytes in the module's image banks.
    pub erased_byte: u8,
    /// The largest block the module accepts.
    pub max_block_size: usize,
    /// The preferred write mechanism, if the module supports any.
    pub mechanism: Option<PayloadMechanism>,
}

impl FirmwareFeatures {
    /// Extract features from the decoded reply to the firmware management
    /// features command.
    pub fn from_record(record: &Record) -> Result<Self, DecodeError> {
        let get = |name: &str| {
            record
                .get(name)
                .ok_or_else(|| DecodeError::UnknownField(name.to_string()))
        };
        let number = |name: &str| {
            get(name).and_then(|value| {
                value.as_u64().ok_or_else(|| DecodeError::ValueMismatch {
                    field: name.to_string(),
                    expected: "number",
                    found: value.to_string(),
                })
            })
        };
        let auto_paging = get(fields::FW_AUTO_PAGING)?.as_bool().unwrap_or(false);
        let header_size = number(fields::FW_START_PAYLOAD_SIZE)? as usize;
        let erased_byte = match get(fields::FW_ERASED_BYTE)? {
            Value::Hex(bytes) if bytes.len() == 1 => bytes[0],
            other => {
                return Err(DecodeError::ValueMismatch {
                    field: fields::FW_ERASED_BYTE.to_string(),
                    expected: "byte",
                    found: other.to_string(),
                })
            }
        };
        // The block size is advertised in units of 8 bytes, less one.
        let max_block_size = (number(fields::FW_MAX_BLOCK_SIZE)? as usize + 1) * 8;
        let mechanism = PayloadMechanism::from_code(number(fields::FW_WRITE_MECHANISM)?);
        Ok(Self {
            auto_paging,
            header_size,
            erased_byte,
            max_block_size,
            mechanism,
        })
    }
}

/// The state of one download.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TransferSession {
    header_size: usize,
    mechanism: PayloadMechanism,
    chunk_size: usize,
    cursor: u32,
}

impl TransferSession {
    /// Start a session with the features of a module.
    ///
    /// Blocks are the largest the module and mechanism allow, further limited
    /// by `limit` if provided.
    pub fn new(features: &FirmwareFeatures, limit: Option<usize>) -> Result<Self, DownloadErrorKind> {
        let mechanism = features
            .mechanism
            .ok_or(DownloadErrorKind::NoWriteMechanism)?;
        let chunk_size = mechanism
            .max_block_size()
            .min(features.max_block_size)
            .min(limit.unwrap_or(usize::MAX));
        Ok(Self {
            header_size: features.header_size,
            mechanism,
            chunk_size,
            cursor: 0,
        })
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn mechanism(&self) -> PayloadMechanism {
        self.mechanism
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The address of the next block.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    fn advance(&mut self, n: usize) {
        // Images are sized by a u32, so blocks never wrap the cursor.
        self.cursor = self.cursor.saturating_add(n as u32);
    }
}

/// A step of a firmware update.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    Init,
    QueryFeatures,
    StartDownload,
    WriteBlock { address: u32 },
    CompleteDownload,
    RunImage,
    Commit,
    Abort,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Step::Init => write!(f, "init"),
            Step::QueryFeatures => write!(f, "query features"),
            Step::StartDownload => write!(f, "start download"),
            Step::WriteBlock { address } => write!(f, "write block at 0x{address:08x}"),
            Step::CompleteDownload => write!(f, "complete download"),
            Step::RunImage => write!(f, "run image"),
            Step::Commit => write!(f, "commit"),
            Step::Abort => write!(f, "abort"),
        }
    }
}

/// The reason a step of a firmware update failed.
#[derive(Debug, thiserror::Error)]
pub enum DownloadErrorKind {
    #[error("Command failed, detail: {detail:?}")]
    CommandFailed { detail: Option<FailureCode> },

    #[error("Command timed out")]
    CommandTimedOut,

    #[error("Bus error")]
    Bus(#[source] crate::BusError),

    #[error("Image is smaller than its {expected}-byte header, found {actual} bytes")]
    ImageTooSmall { expected: usize, actual: usize },

    #[error("Error reading image")]
    Io(#[from] std::io::Error),

    #[error("Image header of {size} bytes exceeds the {max}-byte limit")]
    HeaderTooLarge { size: usize, max: usize },

    #[error("Module supports no firmware write mechanism")]
    NoWriteMechanism,

    #[error("Error decoding a reply")]
    Decode(#[source] DecodeError),

    #[error("Protocol error")]
    Protocol(#[source] Error),
}

impl From<Error> for DownloadErrorKind {
    fn from(e: Error) -> Self {
        match e {
            Error::Bus(e) => DownloadErrorKind::Bus(e),
            Error::Decode(e) => DownloadErrorKind::Decode(e),
            Error::CommandUnsuccessful {
                outcome: CommandOutcome::Failed { detail },
                ..
            } => DownloadErrorKind::CommandFailed { detail },
            Error::CommandUnsuccessful {
                outcome: CommandOutcome::TimedOut,
                ..
            } => DownloadErrorKind::CommandTimedOut,
            other => DownloadErrorKind::Protocol(other),
        }
    }
}

impl From<MessageError> for DownloadErrorKind {
    fn from(e: MessageError) -> Self {
        DownloadErrorKind::Protocol(Error::Message(e))
    }
}

/// A failed firmware update, and the step at which it failed.
#[derive(Debug, thiserror::Error)]
#[error("Firmware update failed at step: {step}")]
pub struct DownloadError {
    pub step: Step,
    #[source]
    pub kind: DownloadErrorKind,
}

impl DownloadError {
    pub fn new(step: Step, kind: impl Into<DownloadErrorKind>) -> Self {
        Self {
            step,
            kind: kind.into(),
        }
    }
}

/// A description of a completed download.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "api-traits", derive(schemars::JsonSchema))]
pub struct DownloadSummary {
    /// The number of blocks written.
    pub blocks: usize,
    /// The number of bytes written after the header.
    pub bytes: u32,
    pub header_size: usize,
    pub mechanism: PayloadMechanism,
    pub chunk_size: usize,
}

// Read until `buf` is full or the reader is exhausted.
async fn read_up_to<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut n = 0;
    while n < buf.len() {
        match reader.read(&mut buf[n..]).await? {
            0 => break,
            k => n += k,
        }
    }
    Ok(n)
}

/// Firmware management of a single module.
#[derive(Debug)]
pub struct FirmwareUpdate<'a, B> {
    cdb: Cdb<'a, B>,
    log: Logger,
}

impl<'a, B: Bus> FirmwareUpdate<'a, B> {
    pub fn new(cdb: Cdb<'a, B>, log: &Logger) -> Self {
        Self {
            cdb,
            log: log.new(slog::o!("component" => "firmware")),
        }
    }

    pub fn cdb(&mut self) -> &mut Cdb<'a, B> {
        &mut self.cdb
    }

    pub fn into_inner(self) -> Cdb<'a, B> {
        self.cdb
    }

    fn command(&self, step: Step, id: u16) -> Result<Command, DownloadError> {
        self.cdb
            .command(id)
            .map_err(|e| DownloadError::new(step, e))
    }

    // Execute a command, treating anything but success as an error.
    async fn execute(
        &mut self,
        step: Step,
        command: &Command,
        payload: &[u8],
    ) -> Result<Completion, DownloadError> {
        let completion = self
            .cdb
            .execute(command, payload)
            .await
            .map_err(|e| DownloadError::new(step, e))?;
        match completion.outcome {
            CommandOutcome::Succeeded { .. } => Ok(completion),
            CommandOutcome::Failed { detail } => Err(DownloadError::new(
                step,
                DownloadErrorKind::CommandFailed { detail },
            )),
            CommandOutcome::TimedOut => {
                Err(DownloadError::new(step, DownloadErrorKind::CommandTimedOut))
            }
        }
    }

    /// Query the firmware management features of the module.
    pub async fn features(&mut self) -> Result<FirmwareFeatures, DownloadError> {
        let step = Step::QueryFeatures;
        let command = self.command(step, id::FIRMWARE_MGMT_FEATURES)?;
        self.execute(step, &command, &[]).await?;
        let reply = self
            .cdb
            .read_reply(&command)
            .await
            .map_err(|e| DownloadError::new(step, e))?;
        let record = reply.as_record().ok_or_else(|| {
            DownloadError::new(
                step,
                DownloadErrorKind::Decode(DecodeError::ValueMismatch {
                    field: fields::FW_MGMT_FEATURES.to_string(),
                    expected: "record",
                    found: reply.to_string(),
                }),
            )
        })?;
        let features = FirmwareFeatures::from_record(record)
            .map_err(|e| DownloadError::new(step, DownloadErrorKind::Decode(e)))?;
        debug!(
            self.log,
            "read firmware management features";
            "header_size" => features.header_size,
            "erased_byte" => features.erased_byte,
            "max_block_size" => features.max_block_size,
            "mechanism" => ?features.mechanism,
            "auto_paging" => features.auto_paging,
        );
        Ok(features)
    }

    /// Download a firmware image of `image_size` bytes to the module.
    ///
    /// The image is read in order: a vendor header whose size the module
    /// advertises, then the body in blocks. Any failure aborts the download.
    pub async fn download<R>(
        &mut self,
        mut image: R,
        image_size: u32,
    ) -> Result<DownloadSummary, DownloadError>
    where
        R: AsyncRead + Unpin,
    {
        let result = self.transfer(&mut image, image_size).await;
        if let Err(e) = &result {
            warn!(
                self.log,
                "firmware download failed, aborting";
                "step" => %e.step,
                "reason" => %e.kind,
            );
            self.abort().await;
        }
        result
    }

    async fn transfer<R>(
        &mut self,
        image: &mut R,
        image_size: u32,
    ) -> Result<DownloadSummary, DownloadError>
    where
        R: AsyncRead + Unpin,
    {
        let features = self.features().await?;
        let mut session = TransferSession::new(&features, self.cdb.config().max_block_size)
            .map_err(|kind| DownloadError::new(Step::QueryFeatures, kind))?;
        info!(
            self.log,
            "starting firmware download";
            "image_size" => image_size,
            "header_size" => session.header_size(),
            "mechanism" => %session.mechanism(),
            "chunk_size" => session.chunk_size(),
        );

        // Start the download with the image header.
        let step = Step::StartDownload;
        if session.header_size() > MAX_HEADER_SIZE {
            return Err(DownloadError::new(
                step,
                DownloadErrorKind::HeaderTooLarge {
                    size: session.header_size(),
                    max: MAX_HEADER_SIZE,
                },
            ));
        }
        let mut header = vec![0; session.header_size()];
        let n = read_up_to(image, &mut header)
            .await
            .map_err(|e| DownloadError::new(step, e))?;
        if n < header.len() {
            return Err(DownloadError::new(
                step,
                DownloadErrorKind::ImageTooSmall {
                    expected: header.len(),
                    actual: n,
                },
            ));
        }
        let mut payload = Vec::with_capacity(START_PAYLOAD_SIZE + header.len());
        payload.extend_from_slice(&image_size.to_be_bytes());
        payload.extend_from_slice(&[0; 4]);
        payload.extend_from_slice(&header);
        let lpl = u16::try_from(payload.len()).map_err(|_| {
            DownloadError::new(
                step,
                DownloadErrorKind::HeaderTooLarge {
                    size: header.len(),
                    max: MAX_HEADER_SIZE,
                },
            )
        })?;
        let command = self
            .command(step, id::START_FIRMWARE_DOWNLOAD)?
            .with_lengths(0, lpl)
            .map_err(|e| DownloadError::new(step, e))?;
        self.execute(step, &command, &payload).await?;
        debug!(self.log, "started firmware download");

        // Write the body in blocks, until the image is exhausted.
        let mut blocks = 0;
        let mut block = vec![0; session.chunk_size()];
        loop {
            let address = session.cursor();
            let step = Step::WriteBlock { address };
            let n = read_up_to(image, &mut block)
                .await
                .map_err(|e| DownloadError::new(step, e))?;
            if n == 0 {
                break;
            }
            self.write_block(&session, &block[..n]).await?;
            trace!(
                self.log,
                "wrote firmware block";
                "address" => address,
                "len" => n,
            );
            session.advance(n);
            blocks += 1;
        }

        let step = Step::CompleteDownload;
        let command = self.command(step, id::COMPLETE_FIRMWARE_DOWNLOAD)?;
        self.execute(step, &command, &[]).await?;

        let summary = DownloadSummary {
            blocks,
            bytes: session.cursor(),
            header_size: session.header_size(),
            mechanism: session.mechanism(),
            chunk_size: session.chunk_size(),
        };
        info!(
            self.log,
            "firmware download complete";
            "blocks" => summary.blocks,
            "bytes" => summary.bytes,
        );
        Ok(summary)
    }

    async fn write_block(
        &mut self,
        session: &TransferSession,
        data: &[u8],
    ) -> Result<(), DownloadError> {
        let address = session.cursor();
        let step = Step::WriteBlock { address };
        match session.mechanism() {
            PayloadMechanism::Local => {
                let mut payload = Vec::with_capacity(BLOCK_ADDRESS_SIZE + data.len());
                payload.extend_from_slice(&address.to_be_bytes());
                payload.extend_from_slice(data);
                let command = self
                    .command(step, id::WRITE_FIRMWARE_LPL)?
                    .with_lengths(0, payload.len() as u16)
                    .map_err(|e| DownloadError::new(step, e))?;
                self.execute(step, &command, &payload).await?;
            }
            PayloadMechanism::Extended => {
                let command = self
                    .command(step, id::WRITE_FIRMWARE_EPL)?
                    .with_lengths(data.len() as u16, BLOCK_ADDRESS_SIZE as u16)
                    .map_err(|e| DownloadError::new(step, e))?;
                self.cdb
                    .stage_epl(data)
                    .await
                    .map_err(|e| DownloadError::new(step, e))?;
                self.execute(step, &command, &address.to_be_bytes()).await?;
            }
        }
        Ok(())
    }

    /// Download a firmware image from a file.
    pub async fn download_file(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<DownloadSummary, DownloadError> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| DownloadError::new(Step::Init, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| DownloadError::new(Step::Init, e))?
            .len();
        let image_size = u32::try_from(len).map_err(|_| {
            DownloadError::new(
                Step::Init,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("image of {len} bytes is too large"),
                ),
            )
        })?;
        debug!(
            self.log,
            "opened firmware image";
            "path" => %path.display(),
            "size" => image_size,
        );
        self.download(file, image_size).await
    }

    /// Run the downloaded image, using the configured run mode and delay.
    ///
    /// A failure is returned as is. The caller decides whether to retry.
    pub async fn run_image(&mut self) -> Result<(), DownloadError> {
        let step = Step::RunImage;
        let config = self.cdb.config();
        let delay = config.reset_delay_ms().to_be_bytes();
        let payload = [0, u8::from(config.run_mode), delay[0], delay[1]];
        let command = self.command(step, id::RUN_FIRMWARE_IMAGE)?;
        self.execute(step, &command, &payload).await?;
        info!(self.log, "running firmware image"; "mode" => ?self.cdb.config().run_mode);
        Ok(())
    }

    /// Commit the running image, so the module boots it by default.
    pub async fn commit(&mut self) -> Result<(), DownloadError> {
        let step = Step::Commit;
        let command = self.command(step, id::COMMIT_FIRMWARE_IMAGE)?;
        self.execute(step, &command, &[]).await?;
        info!(self.log, "committed firmware image");
        Ok(())
    }

    /// Abort a download in progress.
    ///
    /// This is the last resort after a failure, so its own failure is only
    /// logged.
    pub async fn abort(&mut self) {
        let result = match self.cdb.command(id::ABORT_FIRMWARE_DOWNLOAD) {
            Ok(command) => self.cdb.execute(&command, &[]).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(completion) if completion.is_success() => {
                info!(self.log, "aborted firmware download");
            }
            Ok(completion) => {
                warn!(
                    self.log,
                    "failed to abort firmware download";
                    "outcome" => %completion.outcome,
                );
            }
            Err(e) => {
                warn!(self.log, "failed to abort firmware download"; "reason" => %e);
            }
        }
    }

    /// Download, run and commit an image from a file.
    pub async fn update(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<DownloadSummary, DownloadError> {
        let summary = self.download_file(path).await?;
        self.run_image().await?;
        self.commit().await?;
        Ok(summary)
    }
}
