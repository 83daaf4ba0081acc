// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash programming core for the OCM companion chip.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - without default features it runs on any `embedded-hal` 1.0 host
//! - `std` (default) adds `std::error::Error` impls and the simulated target

#![cfg_attr(not(feature = "std"), no_std)]

pub mod bus;
pub mod controller;
pub mod error;
pub mod image;
pub mod protocol;
pub mod record;
pub mod regs;
pub mod sched;
pub mod update;
pub mod version;

#[cfg(feature = "std")]
pub mod sim;

// Re-export commonly used types
pub use bus::{I2cBus, PinPower, RegisterBus, TargetPower};
pub use controller::{FlashController, ProtectionCheck, ProtectionState};
pub use error::{DecodeError, Error, ImageError};
pub use image::FirmwareImage;
pub use protocol::{AckStatus, Command, Partition, PartitionId, Response};
pub use protocol::{FLASH_SECTOR_SIZE, RECORD_SIZE, WRITE_BUFFER_SIZE};
pub use record::{FirmwareRecord, RecordType};
pub use sched::{Progress, SessionReport, Verification, Verify, WriteSession};
pub use update::{auto_update, UpdateOutcome};
pub use version::{update_decision, UpdateDecision, VersionTriple};
