// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use anyhow::anyhow;
use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use slog::Drain;
use slog::Level;
use std::path::PathBuf;
use tabled::settings::Style;
use tabled::Table;
use tabled::Tabled;
use xcvr_controller::mock::CdbResponse;
use xcvr_controller::Cdb;
use xcvr_controller::ConfigBuilder;
use xcvr_controller::FirmwareUpdate;
use xcvr_controller::MockModule;
use xcvr_controller::RegisterAccess;
use xcvr_decode::Field;
use xcvr_decode::Profile;
use xcvr_messages::cdb::id;
use xcvr_messages::cdb::ChecksumCoverage;
use xcvr_messages::cdb::Command;
use xcvr_messages::cdb::RunMode;

fn parse_log_level(s: &str) -> Result<Level, String> {
    s.parse().map_err(|_| String::from("invalid log level"))
}

fn parse_command_id(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|_| format!("invalid command id '{s}'"))
}

fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    if digits.len() % 2 != 0 {
        return Err(String::from("hex data must have an even number of digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

/// The firmware write mechanism of an emulated module.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mechanism {
    Lpl,
    Epl,
}

/// Administer CMIS optical transceiver modules.
///
/// This tool describes the CMIS register space, decodes fields from a dump
/// of a module's registers, encodes CDB commands, and exercises firmware
/// downloads against an emulated module.
#[derive(Parser)]
#[command(version, about, long_about)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,

    /// The log-level.
    #[arg(
        short,
        long,
        default_value_t = Level::Info,
        value_parser = parse_log_level
    )]
    log_level: Level,
}

#[derive(Subcommand)]
enum Cmd {
    /// List the fields of the CMIS register map.
    Fields,

    /// Decode named fields from a dump of a module's register space.
    ///
    /// The dump is the flattened register space, in which page N's upper
    /// half starts at byte (N + 1) * 128.
    Read {
        /// The file containing the register dump.
        #[arg(short, long)]
        dump: PathBuf,

        /// The fields to decode.
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Encode a CDB command, printing the bytes written to the command area.
    Encode {
        /// The command id, in hex.
        #[arg(value_parser = parse_command_id)]
        id: u16,

        /// The length of the extended payload.
        #[arg(long, default_value_t = 0)]
        epl: u16,

        /// The local payload, in hex.
        #[arg(short, long)]
        payload: Option<String>,

        /// The bytes covered by the checksum.
        #[arg(long, value_enum, default_value_t = ChecksumCoverage::HeaderAndPayload)]
        coverage: ChecksumCoverage,
    },

    /// Download a firmware image to an emulated module.
    Download {
        /// The image file.
        image: PathBuf,

        /// The size of the image header the module expects.
        #[arg(long, default_value_t = 0)]
        header_size: u8,

        /// The write mechanism the module advertises.
        #[arg(long, value_enum, default_value_t = Mechanism::Lpl)]
        mechanism: Mechanism,

        /// An upper bound on the size of each block.
        #[arg(long)]
        max_block_size: Option<usize>,

        /// How to run the image after downloading it.
        #[arg(long, value_enum)]
        run: Option<RunMode>,

        /// Commit the image after running it.
        #[arg(long, requires = "run")]
        commit: bool,
    },
}

#[derive(Tabled)]
struct FieldRow {
    name: String,
    address: String,
    width: usize,
    kind: &'static str,
    access: &'static str,
}

fn field_rows(field: &Field, rows: &mut Vec<FieldRow>) {
    match field {
        Field::Register(reg) => {
            rows.push(FieldRow {
                name: reg.name().to_string(),
                address: reg.address().to_string(),
                width: reg.width(),
                kind: reg.kind().name(),
                access: if reg.is_read_only() { "RO" } else { "RW" },
            });
            for bf in reg.subfields() {
                let bits = bf.bits();
                rows.push(FieldRow {
                    name: format!("  {}", bf.name()),
                    address: format!("{}[{}:{}]", reg.address(), bits.pos, bits.width),
                    width: reg.width(),
                    kind: if bits.width == 1 { "flag" } else { "number" },
                    access: if reg.is_read_only() { "RO" } else { "RW" },
                });
            }
        }
        Field::Group(group) => {
            for child in group.children() {
                field_rows(child, rows);
            }
        }
    }
}

// Module features reported by the emulated module.
fn features_reply(header_size: u8, mechanism: Mechanism) -> Vec<u8> {
    let mut reply = vec![0; 18];
    reply[2] = header_size;
    reply[3] = 0xff;
    reply[4] = 0xff;
    reply[5] = match mechanism {
        Mechanism::Lpl => 0x01,
        Mechanism::Epl => 0x11,
    };
    reply
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, args.log_level).fuse();
    let log = slog::Logger::root(drain, slog::o!());

    let profile = Profile::cmis().context("failed to build CMIS profile")?;

    match args.cmd {
        Cmd::Fields => {
            let mut rows = Vec::new();
            for field in profile.map().fields() {
                field_rows(field, &mut rows);
            }
            println!("{}", Table::new(rows).with(Style::psql()));
        }
        Cmd::Read { dump, names } => {
            let data = tokio::fs::read(&dump)
                .await
                .with_context(|| format!("failed to read dump '{}'", dump.display()))?;
            let mut module = MockModule::from_dump(&data)?;
            let mut access = RegisterAccess::new(&mut module, profile.map(), 8, &log);
            for name in names {
                match access.read_by_name(&name).await {
                    Ok(value) => println!("{name}: {value}"),
                    Err(e) => println!("{name}: error: {e}"),
                }
            }
        }
        Cmd::Encode {
            id,
            epl,
            payload,
            coverage,
        } => {
            let payload = match payload {
                Some(s) => parse_hex(&s).map_err(|e| anyhow!(e))?,
                None => Vec::new(),
            };
            let command = profile
                .command(id)
                .ok_or_else(|| anyhow!("unknown command 0x{id:04x}"))?
                .with_lengths(epl, u16::try_from(payload.len())?)?;
            let encoded = command.encode_with(&payload, coverage)?;
            let hex = encoded
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "{} (0x{:04x}) at {}",
                command.name(),
                command.id(),
                Command::address()
            );
            println!("{hex}");
        }
        Cmd::Download {
            image,
            header_size,
            mechanism,
            max_block_size,
            run,
            commit,
        } => {
            let mut module = MockModule::new();
            let reply = features_reply(header_size, mechanism);
            module.on_command(move |req| match req.header.id {
                id::FIRMWARE_MGMT_FEATURES => CdbResponse::success().with_reply(reply.clone()),
                _ => CdbResponse::success(),
            });

            let mut config = ConfigBuilder::new();
            if let Some(size) = max_block_size {
                config = config.max_block_size(size);
            }
            if let Some(mode) = run {
                config = config.run_mode(mode);
            }
            let cdb = Cdb::new(&mut module, &profile, config.build()?, &log);
            let mut update = FirmwareUpdate::new(cdb, &log);
            let summary = update.download_file(&image).await?;
            if run.is_some() {
                update.run_image().await?;
            }
            if commit {
                update.commit().await?;
            }
            println!(
                "wrote {} bytes in {} blocks of at most {} bytes ({})",
                summary.bytes, summary.blocks, summary.chunk_size, summary.mechanism,
            );
        }
    }
    Ok(())
}
