// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for flash operations.
//!
//! Every command is generic over the bus so it runs unchanged against the
//! serial bridge or the simulated target.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use embedded_hal::delay::DelayNs;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use ocmflash_common::record::{encode, Line};
use ocmflash_common::{
    update_decision, FirmwareImage, FirmwareRecord, FlashController, Progress, ProtectionCheck,
    ProtectionState, RegisterBus, SessionReport, TargetPower, UpdateDecision, UpdateOutcome,
    Verification, Verify, WriteSession,
};

use crate::cli::ProtectMode;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn progress_bar(len: u64, template: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn print_protection(check: ProtectionCheck) {
    match check {
        ProtectionCheck::Confirmed => println!("Write protection: enabled"),
        ProtectionCheck::Mismatch { status } => println!(
            "Write protection: NOT confirmed (status 0x{:02X})",
            status.bits()
        ),
    }
}

fn print_report(report: &SessionReport) -> Result<()> {
    println!(
        "Bytes written:    {} ({} write transactions)",
        report.bytes_written, report.commits
    );
    match report.verification {
        Verification::Passed => println!("Verification:     passed"),
        Verification::Failed => println!("Verification:     FAILED"),
        Verification::Skipped => println!("Verification:     skipped"),
    }
    print_protection(report.protection);

    if report.verification == Verification::Failed {
        bail!("Read back data was not the same as write data. Please burn again.");
    }
    Ok(())
}

/// Program a firmware record file, one line per scheduler step.
pub fn program<B>(ctrl: &mut FlashController<B>, file: &Path, verify: Verify) -> Result<()>
where
    B: RegisterBus,
    B::Error: Send + Sync + 'static,
{
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    println!("Firmware: {} ({} records)", file.display(), lines.len());
    println!();

    let pb = progress_bar(
        lines.len() as u64,
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({eta})",
    )?;

    let mut session = WriteSession::begin(ctrl, verify)?;
    for (n, line) in lines.iter().enumerate() {
        let progress = session
            .feed_line(line.as_bytes())
            .with_context(|| format!("{}:{}", file.display(), n + 1));

        match progress {
            Ok(Progress::Continue) => pb.inc(1),
            Ok(Progress::Finished(report)) => {
                pb.finish_and_clear();
                return print_report(&report);
            }
            Err(e) => {
                pb.abandon();
                return Err(e);
            }
        }
    }

    pb.abandon();
    session.abort()?;
    bail!("{} ended without an end-of-file record", file.display());
}

/// Program an embedded firmware image if it is newer than the resident one.
pub fn auto_update<B, P, D>(
    ctrl: &mut FlashController<B>,
    power: &mut P,
    delay: &mut D,
    file: &Path,
    verify: Verify,
) -> Result<()>
where
    B: RegisterBus,
    B::Error: Send + Sync + 'static,
    P: TargetPower,
    D: DelayNs,
{
    let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let image = FirmwareImage::new(&data)
        .with_context(|| format!("{} is not a usable firmware image", file.display()))?;

    println!(
        "Image: {} ({} bytes, CRC32: 0x{:08x}, version {})",
        file.display(),
        image.size_bytes(),
        CRC32.checksum(&data),
        image.version()
    );

    let pb = progress_bar(
        image.size_bytes() as u64,
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    )?;

    let outcome = ocmflash_common::auto_update(ctrl, power, delay, &image, verify, |done, _| {
        pb.set_position(done as u64)
    });

    match outcome {
        Ok(UpdateOutcome::NoUpdateNeeded { resident, image }) => {
            pb.finish_and_clear();
            println!("Resident firmware {} is up to date (image {})", resident, image);
            Ok(())
        }
        Ok(UpdateOutcome::Updated {
            resident,
            image,
            report,
        }) => {
            pb.finish_and_clear();
            println!("Updated firmware {} -> {}", resident, image);
            print_report(&report)
        }
        Err(e) => {
            pb.abandon();
            Err(e).context("Auto-update failed")
        }
    }
}

pub fn erase_sector<B>(ctrl: &mut FlashController<B>, address: u32) -> Result<()>
where
    B: RegisterBus,
    B::Error: Send + Sync + 'static,
{
    let ((), check) = ctrl.with_protection_lifted(|c| c.erase_sector(address))?;
    println!("Erased sector containing 0x{:04X}", address);
    print_protection(check);
    Ok(())
}

pub fn erase_partition<B>(ctrl: &mut FlashController<B>, id: u8) -> Result<()>
where
    B: RegisterBus,
    B::Error: Send + Sync + 'static,
{
    let check = ctrl.erase_partition_id(id)?;
    println!("Erased partition {}", id);
    print_protection(check);
    Ok(())
}

pub fn erase_chip<B>(ctrl: &mut FlashController<B>) -> Result<()>
where
    B: RegisterBus,
    B::Error: Send + Sync + 'static,
{
    let ((), check) = ctrl.with_protection_lifted(|c| c.erase_chip())?;
    println!("Erased whole flash chip");
    print_protection(check);
    Ok(())
}

/// Dump flash as firmware record lines.
pub fn read<B>(
    ctrl: &mut FlashController<B>,
    address: u32,
    size: u32,
    output: Option<&Path>,
) -> Result<()>
where
    B: RegisterBus,
    B::Error: Send + Sync + 'static,
{
    let mut lines: Vec<Line> = Vec::new();
    ctrl.read_records(address, size, |record| lines.push(encode(record)))?;
    lines.push(encode(&FirmwareRecord::end_of_file()));

    let mut text = String::new();
    for line in &lines {
        text.push_str(line);
        text.push('\n');
    }

    match output {
        Some(path) => {
            fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Saved 0x{:X} bytes from 0x{:04X} to {}",
                size,
                address,
                path.display()
            );
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// Print the resident firmware version, and the image's if one is given.
pub fn version<B>(ctrl: &mut FlashController<B>, image: Option<&Path>) -> Result<()>
where
    B: RegisterBus,
    B::Error: Send + Sync + 'static,
{
    ctrl.probe().context("Target does not answer")?;
    let resident = ctrl.read_resident_version()?;
    println!("Resident firmware: {}", resident);

    if let Some(path) = image {
        let data =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let image = FirmwareImage::new(&data)
            .with_context(|| format!("{} is not a usable firmware image", path.display()))?;
        println!("Image firmware:    {}", image.version());

        match update_decision(resident, image.version()) {
            UpdateDecision::UpdateRequired => println!("Update required"),
            UpdateDecision::NoUpdateNeeded => println!("No update needed"),
        }
    }
    Ok(())
}

pub fn protect<B>(ctrl: &mut FlashController<B>, mode: ProtectMode) -> Result<()>
where
    B: RegisterBus,
    B::Error: Send + Sync + 'static,
{
    let check = match mode {
        ProtectMode::Status => None,
        ProtectMode::Off => Some(ctrl.disable_protection()?),
        ProtectMode::Software => Some(ctrl.enable_software_protection()?),
        ProtectMode::Hardware => Some(ctrl.enable_hardware_protection()?),
    };

    if let Some(ProtectionCheck::Mismatch { status }) = check {
        warn!("Status register reads 0x{:02X}", status.bits());
    }

    let state = ctrl.protection_state()?;
    match state {
        ProtectionState::Unprotected => println!("Flash is not write protected"),
        ProtectionState::SoftwareProtected => println!("Flash is software write protected"),
        ProtectionState::HardwareProtected => println!("Flash is hardware write protected"),
    }
    Ok(())
}
