// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Register model of the OCM flash controller.
//!
//! The controller sits behind the SPI-bridge I2C device. Flash instructions
//! are issued by loading an operand register and then setting one enable bit
//! in `FLASH_RW_CTRL`; completion is observed through the write-in-progress
//! bit of the flash status register and the controller's `FLASH_DONE` flag.

use bitflags::bitflags;

/// 7-bit I2C id of the flash controller (SPI bridge).
pub const DEVICE_SPI: u8 = 0x3F;
/// 7-bit I2C id of the DisplayPort IP block (secure OCM control).
pub const DEVICE_DP_IP: u8 = 0x38;

// --- SPI bridge registers ---

pub const R_VERSION: u8 = 0x00;
pub const OCM_VERSION_MAJOR: u8 = 0x01;
pub const OCM_BUILD_NUM: u8 = 0x02;
pub const R_RAM_CTRL: u8 = 0x05;
pub const OCM_DEBUG_CTRL: u8 = 0x06;
pub const GPIO_STATUS_1: u8 = 0x07;

pub const R_FLASH_ADDR_H: u8 = 0x0F;
pub const R_FLASH_ADDR_L: u8 = 0x10;
/// First byte of the W-byte write buffer.
pub const R_FLASH_ADDR_0: u8 = 0x11;
pub const R_FLASH_LEN_H: u8 = 0x31;
pub const R_FLASH_LEN_L: u8 = 0x32;
pub const R_FLASH_RW_CTRL: u8 = 0x33;
/// Value to load into the flash status register.
pub const R_FLASH_STATUS_0: u8 = 0x34;
/// General instruction opcode.
pub const R_FLASH_STATUS_2: u8 = 0x36;
/// Erase type opcode.
pub const R_FLASH_STATUS_3: u8 = 0x37;
/// Flash status register as last read by the controller.
pub const R_FLASH_STATUS_4: u8 = 0x38;
pub const R_DSC_CTRL_0: u8 = 0x3B;
/// First byte of the read buffer.
pub const FLASH_READ_D0: u8 = 0x60;

// --- DP IP registers ---

pub const ADDR_HDCP2_CTRL: u8 = 0x02;

// --- Flash instruction opcodes ---

pub const WRITE_ENABLE: u8 = 0x06;
pub const WRITE_DISABLE: u8 = 0x04;
pub const CHIP_ERASE: u8 = 0x60;
pub const SECTOR_ERASE: u8 = 0x20;

bitflags! {
    /// Flash die status register.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FlashStatus: u8 {
        const WIP = 0x01;
        const WEL = 0x02;
        const BP0 = 0x04;
        const BP1 = 0x08;
        const BP2 = 0x10;
        const BP3 = 0x20;
        const BP4 = 0x40;
        const SRP0 = 0x80;
    }
}

impl FlashStatus {
    /// All block-protect bits: the whole array is write protected.
    pub const PROTECT_ALL: Self = Self::BP4
        .union(Self::BP3)
        .union(Self::BP2)
        .union(Self::BP1)
        .union(Self::BP0);

    /// Bits compared when confirming a protection pattern.
    pub const PROTECTION_MASK: Self = Self::SRP0.union(Self::PROTECT_ALL);

    /// Status register locked by the WP# pin.
    pub const HW_PATTERN: Self = Self::SRP0.union(Self::PROTECT_ALL);

    /// Block protection only; the status register stays writable.
    pub const SW_PATTERN: Self = Self::PROTECT_ALL;

    pub fn protection(self) -> Self {
        self.intersection(Self::PROTECTION_MASK)
    }
}

bitflags! {
    /// `R_FLASH_RW_CTRL`: one bit starts one controller operation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RwCtrl: u8 {
        const FLASH_WRITE = 0x01;
        const FLASH_READ = 0x02;
        const WRITE_STATUS_EN = 0x04;
        const FLASH_ERASE_EN = 0x20;
        const GENERAL_INSTRUCTION_EN = 0x40;
    }
}

/// `R_RAM_CTRL`: controller state machine returned to idle.
pub const FLASH_DONE: u8 = 0x80;
/// `R_DSC_CTRL_0`: latch the flash status register into `R_FLASH_STATUS_4`.
pub const READ_STATUS_EN: u8 = 0x80;
/// `GPIO_STATUS_1`: 1 = WP# high (not protected), 0 = WP# asserted.
pub const FLASH_WP: u8 = 0x80;
/// `OCM_DEBUG_CTRL`: hold the main OCM in reset.
pub const OCM_RESET: u8 = 0x10;
/// `ADDR_HDCP2_CTRL`: secure OCM firmware enable.
pub const HDCP2_FW_EN: u8 = 0x01;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hw_pattern_includes_srp0() {
        assert_eq!(FlashStatus::HW_PATTERN.bits(), 0xFC);
        assert_eq!(FlashStatus::SW_PATTERN.bits(), 0x7C);
    }

    #[test]
    fn test_protection_ignores_wip_and_wel() {
        let status = FlashStatus::HW_PATTERN | FlashStatus::WIP | FlashStatus::WEL;
        assert_eq!(status.protection(), FlashStatus::HW_PATTERN);
    }
}
