// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Version-gated auto-update from an embedded firmware image.

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use log::{error, info};

use crate::bus::{RegisterBus, TargetPower};
use crate::controller::FlashController;
use crate::error::Error;
use crate::image::FirmwareImage;
use crate::protocol::PartitionId;
use crate::sched::{Progress, SessionReport, Verify, WriteSession};
use crate::version::{update_decision, UpdateDecision, VersionTriple};

/// Time for the controller to settle after session preparation.
pub const SETTLE_MS: u32 = 1000;
/// Pause between the steps of the closing power cycle.
pub const POWER_CYCLE_PAUSE_MS: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The resident firmware is as new as the image or newer. The target is
    /// left powered.
    NoUpdateNeeded {
        resident: VersionTriple,
        image: VersionTriple,
    },
    /// The image was programmed and the target power-cycled.
    Updated {
        resident: VersionTriple,
        image: VersionTriple,
        report: SessionReport,
    },
}

fn check_power<E, PE: Debug>(result: Result<(), PE>, what: &str) -> Result<(), Error<E>> {
    result.map_err(|e| {
        error!("{} failed: {:?}", what, e);
        Error::Power
    })
}

/// Program `image` into the main firmware partition if it is newer than
/// what the target runs.
///
/// `progress` is called with `(bytes_fed, total_bytes)` after every record.
pub fn auto_update<B, P, D>(
    ctrl: &mut FlashController<B>,
    target: &mut P,
    delay: &mut D,
    image: &FirmwareImage<'_>,
    verify: Verify,
    mut progress: impl FnMut(u32, u32),
) -> Result<UpdateOutcome, Error<B::Error>>
where
    B: RegisterBus,
    P: TargetPower,
    D: DelayNs,
{
    check_power::<B::Error, _>(target.set_target_power(true), "Power on")?;

    if ctrl.probe().is_err() {
        error!("Target does not answer, powering off");
        check_power::<B::Error, _>(target.set_target_power(false), "Power off")?;
        return Err(Error::BusUnreachable);
    }

    let resident = ctrl.read_resident_version()?;
    let image_version = image.version();
    info!(
        "Current firmware version: {}, image version: {}",
        resident, image_version
    );

    if update_decision(resident, image_version) == UpdateDecision::NoUpdateNeeded {
        info!("No update needed");
        return Ok(UpdateOutcome::NoUpdateNeeded {
            resident,
            image: image_version,
        });
    }

    info!("Updating firmware to {}", image_version);
    ctrl.erase_partition(PartitionId::MainFirmware)?;

    let report = program_image(ctrl, delay, image, verify, &mut progress)?;

    check_power::<B::Error, _>(target.set_target_power(false), "Power off")?;
    delay.delay_ms(POWER_CYCLE_PAUSE_MS);
    check_power::<B::Error, _>(target.set_supply_power(false), "Supply off")?;
    delay.delay_ms(POWER_CYCLE_PAUSE_MS);
    check_power::<B::Error, _>(target.set_supply_power(true), "Supply on")?;
    info!("Target power cycled");

    Ok(UpdateOutcome::Updated {
        resident,
        image: image_version,
        report,
    })
}

/// Feed every synthetic record of `image` through one write session.
fn program_image<B: RegisterBus, D: DelayNs>(
    ctrl: &mut FlashController<B>,
    delay: &mut D,
    image: &FirmwareImage<'_>,
    verify: Verify,
    progress: &mut impl FnMut(u32, u32),
) -> Result<SessionReport, Error<B::Error>> {
    let total = image.size_bytes();
    let mut session = WriteSession::begin(ctrl, verify)?;
    delay.delay_ms(SETTLE_MS);

    let mut fed = 0u32;
    for record in image.records() {
        match session.feed(&record)? {
            Progress::Continue => {
                fed += record.byte_count() as u32;
                progress(fed, total);
            }
            Progress::Finished(report) => return Ok(report),
        }
    }

    // `records` always ends with an end-of-file record
    session.abort()?;
    Err(Error::SessionClosed)
}
