// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use embedded_hal::delay::DelayNs;
use log::info;

use ocmflash_common::regs::DEVICE_SPI;
use ocmflash_common::sim::SimTarget;
use ocmflash_common::{FlashController, RegisterBus, TargetPower, Verify};

use crate::bridge::{Bridge, StdDelay};
use crate::commands;
use crate::transport::{Transport, DEFAULT_BAUD, DEFAULT_TIMEOUT_MS};

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "ocmflash-upload")]
#[command(about = "Flash programming tool for the OCM companion chip")]
pub struct Cli {
    /// Serial port of the I2C bridge (e.g., /dev/ttyACM0)
    #[arg(short, long, required_unless_present = "dry_run")]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// Timeout for one bridge transaction in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// 7-bit I2C id of the flash controller
    #[arg(long, default_value_t = DEVICE_SPI, value_parser = parse_number::<u8>)]
    pub device: u8,

    /// Skip read-back verification after each write
    #[arg(long)]
    pub no_verify: bool,

    /// Run against a simulated target instead of the bridge
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Program a firmware record file (flash must already be erased)
    Program {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Update the main firmware from a raw image if it is newer
    AutoUpdate {
        /// Raw image laid out at main partition offsets
        #[arg(value_name = "IMAGE")]
        file: PathBuf,
    },

    /// Erase the 4 KiB sector containing an address
    EraseSector {
        #[arg(value_name = "ADDRESS", value_parser = parse_number::<u32>)]
        address: u32,
    },

    /// Erase a partition (0 = main firmware, 1 = secure firmware, 2 = keys)
    ErasePartition {
        #[arg(value_name = "ID")]
        id: u8,
    },

    /// Erase the whole flash chip
    EraseChip,

    /// Dump flash contents as firmware records
    Read {
        #[arg(value_name = "ADDRESS", value_parser = parse_number::<u32>)]
        address: u32,

        #[arg(value_name = "SIZE", value_parser = parse_number::<u32>)]
        size: u32,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the resident firmware version
    Version {
        /// Also compare against this image
        #[arg(value_name = "IMAGE")]
        image: Option<PathBuf>,
    },

    /// Show or change flash write protection
    Protect {
        #[arg(value_enum, default_value_t = ProtectMode::Status)]
        mode: ProtectMode,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProtectMode {
    Status,
    Off,
    Software,
    Hardware,
}

/// Parse a decimal or `0x` prefixed hexadecimal number.
fn parse_number<T>(s: &str) -> Result<T, String>
where
    T: TryFrom<u64>,
{
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid number {}: {}", s, e))?;

    T::try_from(value).map_err(|_| format!("{} is out of range", s))
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let verify = if cli.no_verify {
        Verify::Off
    } else {
        Verify::ReadBack
    };

    if cli.dry_run {
        info!("Dry run against a simulated target");
        let sim = SimTarget::new();
        let mut ctrl = FlashController::with_device(sim.bus(), cli.device);
        return dispatch(cli.command, &mut ctrl, &mut sim.power(), &mut sim.delay(), verify);
    }

    let port = cli.port.context("--port is required")?;
    let bridge = Bridge::new(Transport::open(&port, cli.baud, cli.timeout_ms)?);
    info!("Connected to bridge on {}", bridge.port_name());

    let mut ctrl = FlashController::with_device(bridge.bus(), cli.device);
    dispatch(
        cli.command,
        &mut ctrl,
        &mut bridge.power(),
        &mut StdDelay,
        verify,
    )
}

fn dispatch<B, P, D>(
    command: Commands,
    ctrl: &mut FlashController<B>,
    power: &mut P,
    delay: &mut D,
    verify: Verify,
) -> Result<()>
where
    B: RegisterBus,
    B::Error: Send + Sync + 'static,
    P: TargetPower,
    D: DelayNs,
{
    match command {
        Commands::Program { file } => commands::program(ctrl, &file, verify),
        Commands::AutoUpdate { file } => commands::auto_update(ctrl, power, delay, &file, verify),
        Commands::EraseSector { address } => commands::erase_sector(ctrl, address),
        Commands::ErasePartition { id } => commands::erase_partition(ctrl, id),
        Commands::EraseChip => commands::erase_chip(ctrl),
        Commands::Read {
            address,
            size,
            output,
        } => commands::read(ctrl, address, size, output.as_deref()),
        Commands::Version { image } => commands::version(ctrl, image.as_deref()),
        Commands::Protect { mode } => commands::protect(ctrl, mode),
    }
}
