// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash layout of the OCM companion chip and the host <-> bridge protocol.
//!
//! The layout constants are shared by the programming core and the host tool.
//! The `Command`/`Response` types are what the host sends to the USB-serial
//! I2C bridge; they carry single register transactions and power control.

use core::fmt;

use serde::{Deserialize, Serialize};

// --- Flash geometry ---

/// Maximum payload of one firmware record (R).
pub const RECORD_SIZE: usize = 16;

/// Width of the controller's write buffer (W = 2 * R).
pub const WRITE_BUFFER_SIZE: usize = 2 * RECORD_SIZE;

/// Largest single read the controller returns.
pub const READ_BUFFER_SIZE: usize = 32;

pub const FLASH_SECTOR_SIZE: u32 = 4 * 1024;

/// Flash address space seen through the 16-bit address registers.
pub const FLASH_SIZE: u32 = 0x1_0000;

// --- Partition table ---

pub const MAIN_FW_ADDR_BASE: u32 = 0x1000;
pub const MAIN_FW_ADDR_END: u32 = 0x8FFF;

pub const KEY_STORE_ADDR_BASE: u32 = 0x9000;
pub const KEY_STORE_ADDR_END: u32 = 0x9FFF;

pub const SECURE_FW_ADDR_BASE: u32 = 0xA000;
pub const SECURE_FW_ADDR_END: u32 = 0xCFFF;

/// Offset of the 3-byte version field inside the embedded firmware image.
pub const IMAGE_VERSION_OFFSET: usize = 0x0100;

/// Flash partition identifiers, numbered as the operator console expects.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionId {
    MainFirmware = 0,
    SecureFirmware = 1,
    KeyStorage = 2,
}

impl PartitionId {
    pub const ALL: [PartitionId; 3] = [
        PartitionId::MainFirmware,
        PartitionId::SecureFirmware,
        PartitionId::KeyStorage,
    ];

    /// Look up a partition by its numeric id.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn partition(self) -> Partition {
        match self {
            PartitionId::MainFirmware => Partition {
                id: self,
                base: MAIN_FW_ADDR_BASE,
                end: MAIN_FW_ADDR_END,
            },
            PartitionId::SecureFirmware => Partition {
                id: self,
                base: SECURE_FW_ADDR_BASE,
                end: SECURE_FW_ADDR_END,
            },
            PartitionId::KeyStorage => Partition {
                id: self,
                base: KEY_STORE_ADDR_BASE,
                end: KEY_STORE_ADDR_END,
            },
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PartitionId::MainFirmware => "Main OCM firmware",
            PartitionId::SecureFirmware => "Secure OCM firmware",
            PartitionId::KeyStorage => "HDCP 1.4 & 2.2 key",
        })
    }
}

/// A statically defined flash range. `end` is inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    pub id: PartitionId,
    pub base: u32,
    pub end: u32,
}

impl Partition {
    pub fn size(&self) -> u32 {
        self.end - self.base + 1
    }

    /// Sector-aligned addresses covering the partition, base to end inclusive.
    pub fn sectors(&self) -> impl Iterator<Item = u32> {
        (self.base..=self.end).step_by(FLASH_SECTOR_SIZE as usize)
    }

    /// Address of the last R-byte record slot in the partition.
    pub fn last_record_addr(&self) -> u32 {
        self.end + 1 - RECORD_SIZE as u32
    }
}

// --- Host <-> bridge protocol ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read one register of an I2C device (7-bit address).
    ReadRegister { device: u8, register: u8 },
    /// Write one register of an I2C device.
    WriteRegister { device: u8, register: u8, value: u8 },
    /// Switch the companion chip's power enable.
    SetTargetPower { on: bool },
    /// Switch the companion chip's supply rail.
    SetSupplyPower { on: bool },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ack(AckStatus),
    Register(u8),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Ok,
    /// The addressed device did not acknowledge.
    Nack,
    BusError,
    BadCommand,
}
