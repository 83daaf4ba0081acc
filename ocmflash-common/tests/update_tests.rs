// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Tests for version comparison, image handling and auto-update.

use ocmflash_common::image::extract_version;
use ocmflash_common::protocol::IMAGE_VERSION_OFFSET;
use ocmflash_common::sim::{Event, SimTarget};
use ocmflash_common::update::{POWER_CYCLE_PAUSE_MS, SETTLE_MS};
use ocmflash_common::{
    auto_update, update_decision, Error, FirmwareImage, FlashController, ImageError, RecordType,
    UpdateDecision, UpdateOutcome, Verification, Verify, VersionTriple,
};

fn make_image(len: usize, version: (u8, u8, u8)) -> Vec<u8> {
    let mut image: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    image[IMAGE_VERSION_OFFSET] = version.0;
    image[IMAGE_VERSION_OFFSET + 1] = version.1;
    image[IMAGE_VERSION_OFFSET + 2] = version.2;
    image
}

fn v(major: u8, minor: u8, build: u8) -> VersionTriple {
    VersionTriple::new(major, minor, build)
}

// =============================================================================
// Version comparison
// =============================================================================

#[test]
fn test_equal_versions_need_no_update() {
    assert_eq!(
        update_decision(v(1, 2, 3), v(1, 2, 3)),
        UpdateDecision::NoUpdateNeeded
    );
}

#[test]
fn test_newer_build_needs_update() {
    assert_eq!(
        update_decision(v(1, 2, 3), v(1, 2, 4)),
        UpdateDecision::UpdateRequired
    );
}

#[test]
fn test_first_differing_component_decides() {
    assert_eq!(
        update_decision(v(2, 0, 0), v(1, 9, 9)),
        UpdateDecision::NoUpdateNeeded
    );
    assert_eq!(
        update_decision(v(1, 9, 9), v(2, 0, 0)),
        UpdateDecision::UpdateRequired
    );
    assert_eq!(
        update_decision(v(1, 3, 0), v(1, 2, 0xFF)),
        UpdateDecision::NoUpdateNeeded
    );
}

#[test]
fn test_build_wraparound_not_special_cased() {
    assert_eq!(
        update_decision(v(1, 2, 0xFF), v(1, 2, 0x00)),
        UpdateDecision::NoUpdateNeeded
    );
}

// =============================================================================
// Firmware image
// =============================================================================

#[test]
fn test_extract_version_masks_major_minor() {
    let image = make_image(0x200, (0x1A, 0xF3, 0x42));
    assert_eq!(
        extract_version(&image, IMAGE_VERSION_OFFSET),
        Some(v(0xA, 0x3, 0x42))
    );
    assert_eq!(extract_version(&image, 0x1FF), None);
}

#[test]
fn test_image_validation() {
    assert_eq!(FirmwareImage::new(&[]).unwrap_err(), ImageError::Empty);
    assert_eq!(
        FirmwareImage::new(&[0u8; 0x108]).unwrap_err(),
        ImageError::PartialRecord { len: 0x108 }
    );
    assert_eq!(
        FirmwareImage::new(&[0u8; 0x100]).unwrap_err(),
        ImageError::NoVersion { len: 0x100 }
    );
    assert_eq!(
        FirmwareImage::new(&vec![0u8; 0x8010]).unwrap_err(),
        ImageError::TooLarge {
            len: 0x8010,
            max: 0x8000
        }
    );
    assert!(FirmwareImage::new(&[0u8; 0x110]).is_ok());
}

#[test]
fn test_image_records_cover_partition_end() {
    let data = make_image(0x200, (1, 0, 0));
    let image = FirmwareImage::new(&data).unwrap();
    let records: Vec<_> = image.records().collect();

    assert_eq!(image.record_count(), 0x20);
    assert_eq!(records.len(), 0x21);
    assert_eq!(records[0].address, 0x1000);
    assert_eq!(records[0x1E].address, 0x11E0);
    assert_eq!(records[0x1F].address, 0x8FF0);
    assert_eq!(&records[0x1F].payload[..], &data[0x1F0..]);
    assert_eq!(records[0x20].record_type, RecordType::EndOfFile);
    assert_eq!(image.size_bytes(), 0x200);
}

#[test]
fn test_full_partition_image_is_contiguous() {
    let data = make_image(0x8000, (1, 0, 0));
    let image = FirmwareImage::new(&data).unwrap();
    let last = image.records().nth(0x7FF).unwrap();
    assert_eq!(last.address, 0x8FF0);
}

// =============================================================================
// Auto-update
// =============================================================================

#[test]
fn test_auto_update_same_version() {
    let sim = SimTarget::new();
    sim.chip_mut().set_resident_version(v(1, 2, 3));
    let data = make_image(0x200, (1, 2, 3));
    let image = FirmwareImage::new(&data).unwrap();
    let mut ctrl = FlashController::new(sim.bus());

    let outcome = auto_update(
        &mut ctrl,
        &mut sim.power(),
        &mut sim.delay(),
        &image,
        Verify::ReadBack,
        |_, _| {},
    )
    .unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::NoUpdateNeeded {
            resident: v(1, 2, 3),
            image: v(1, 2, 3)
        }
    );
    let chip = sim.chip();
    assert!(chip.commits().is_empty());
    assert!(!chip
        .events()
        .iter()
        .any(|e| matches!(e, Event::SectorErase { .. })));
    assert!(chip.is_powered());
}

#[test]
fn test_auto_update_newer_resident() {
    let sim = SimTarget::new();
    sim.chip_mut().set_resident_version(v(2, 0, 0));
    let data = make_image(0x200, (1, 9, 9));
    let image = FirmwareImage::new(&data).unwrap();
    let mut ctrl = FlashController::new(sim.bus());

    let outcome = auto_update(
        &mut ctrl,
        &mut sim.power(),
        &mut sim.delay(),
        &image,
        Verify::ReadBack,
        |_, _| {},
    )
    .unwrap();

    assert!(matches!(outcome, UpdateOutcome::NoUpdateNeeded { .. }));
    assert!(sim.chip().commits().is_empty());
}

#[test]
fn test_auto_update_programs_image() {
    let sim = SimTarget::new();
    sim.chip_mut().set_resident_version(v(1, 2, 3));
    sim.chip_mut().load_flash(0x2000, &[0x00; 64]);
    let data = make_image(0x200, (1, 2, 4));
    let image = FirmwareImage::new(&data).unwrap();
    let mut ctrl = FlashController::new(sim.bus());

    let mut last_progress = (0, 0);
    let outcome = auto_update(
        &mut ctrl,
        &mut sim.power(),
        &mut sim.delay(),
        &image,
        Verify::ReadBack,
        |done, total| last_progress = (done, total),
    )
    .unwrap();

    let UpdateOutcome::Updated {
        resident,
        image: image_version,
        report,
    } = outcome
    else {
        panic!("expected an update, got {:?}", outcome);
    };
    assert_eq!(resident, v(1, 2, 3));
    assert_eq!(image_version, v(1, 2, 4));
    assert_eq!(report.bytes_written, 0x200);
    assert_eq!(report.verification, Verification::Passed);
    assert!(report.protection.is_confirmed());
    assert_eq!(last_progress, (0x200, 0x200));

    let chip = sim.chip();
    assert_eq!(chip.read_flash(0x1000, 0x1F0), &data[..0x1F0]);
    assert_eq!(chip.read_flash(0x8FF0, 16), &data[0x1F0..]);
    // stale content inside the partition was erased
    assert_eq!(chip.read_flash(0x2000, 64), &[0xFF; 64][..]);
    assert!(chip.is_hardware_protected());
}

#[test]
fn test_auto_update_sequence() {
    let sim = SimTarget::new();
    sim.chip_mut().set_resident_version(v(0, 1, 0));
    let data = make_image(0x120, (0, 2, 0));
    let image = FirmwareImage::new(&data).unwrap();
    let mut ctrl = FlashController::new(sim.bus());

    auto_update(
        &mut ctrl,
        &mut sim.power(),
        &mut sim.delay(),
        &image,
        Verify::Off,
        |_, _| {},
    )
    .unwrap();

    let chip = sim.chip();
    let events = chip.events();
    assert_eq!(events.first(), Some(&Event::TargetPower { on: true }));

    let erases = events
        .iter()
        .filter(|e| matches!(e, Event::SectorErase { .. }))
        .count();
    assert_eq!(erases, 8);

    let last_erase = events
        .iter()
        .rposition(|e| matches!(e, Event::SectorErase { .. }))
        .unwrap();
    let settle = events
        .iter()
        .position(|e| *e == Event::Delay { ms: SETTLE_MS })
        .unwrap();
    let first_program = events
        .iter()
        .position(|e| matches!(e, Event::Program { .. }))
        .unwrap();
    assert!(last_erase < settle && settle < first_program);

    let tail = &events[events.len() - 5..];
    assert_eq!(
        tail,
        &[
            Event::TargetPower { on: false },
            Event::Delay {
                ms: POWER_CYCLE_PAUSE_MS
            },
            Event::SupplyPower { on: false },
            Event::Delay {
                ms: POWER_CYCLE_PAUSE_MS
            },
            Event::SupplyPower { on: true },
        ]
    );
}

#[test]
fn test_auto_update_unreachable_target() {
    let sim = SimTarget::new();
    sim.chip_mut().set_responsive(false);
    let data = make_image(0x200, (1, 0, 0));
    let image = FirmwareImage::new(&data).unwrap();
    let mut ctrl = FlashController::new(sim.bus());

    let result = auto_update(
        &mut ctrl,
        &mut sim.power(),
        &mut sim.delay(),
        &image,
        Verify::ReadBack,
        |_, _| {},
    );

    assert!(matches!(result, Err(Error::BusUnreachable)));
    let chip = sim.chip();
    assert!(!chip.is_powered());
    assert_eq!(
        chip.events(),
        &[
            Event::TargetPower { on: true },
            Event::TargetPower { on: false }
        ]
    );
}
