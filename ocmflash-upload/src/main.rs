// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash programming tool for the OCM companion chip via a USB-serial I2C
//! bridge.
//!
//! Usage:
//!   ocmflash-upload --port /dev/ttyACM0 version firmware.bin
//!   ocmflash-upload --port /dev/ttyACM0 auto-update firmware.bin
//!   ocmflash-upload --port /dev/ttyACM0 erase-partition 0
//!   ocmflash-upload --port /dev/ttyACM0 program firmware.hex
//!   ocmflash-upload --dry-run read 0x1000 0x100

mod bridge;
mod cli;
mod commands;
mod transport;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

fn main() -> Result<()> {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let args = cli::Cli::parse();
    cli::run(args)
}
