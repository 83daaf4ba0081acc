// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash controller access: protection, erase, and the primitive transactions
//! the write scheduler is built from.
//!
//! Every operation is a blocking sequence of register transactions. Waits
//! poll until the hardware reports completion and have no timeout.

use log::{debug, info, trace, warn};

use crate::bus::RegisterBus;
use crate::error::Error;
use crate::protocol::{
    PartitionId, FLASH_SECTOR_SIZE, READ_BUFFER_SIZE, RECORD_SIZE, WRITE_BUFFER_SIZE,
};
use crate::record::FirmwareRecord;
use crate::regs::*;
use crate::version::VersionTriple;

/// Fill byte for write buffer bytes that carry no data.
pub const BLANK: u8 = 0xFF;

/// Write protection as read back from the flash die and the WP# pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtectionState {
    Unprotected,
    SoftwareProtected,
    HardwareProtected,
}

/// Outcome of a protection change: the status register read back after the
/// change either matches the requested pattern or it does not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtectionCheck {
    Confirmed,
    Mismatch { status: FlashStatus },
}

impl ProtectionCheck {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ProtectionCheck::Confirmed)
    }
}

/// Saved OCM control registers, restored after programming.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OcmState {
    hdcp2_ctrl: u8,
    debug_ctrl: u8,
}

/// The companion chip's flash controller, reached through `B`.
pub struct FlashController<B> {
    bus: B,
    device: u8,
}

impl<B: RegisterBus> FlashController<B> {
    pub fn new(bus: B) -> Self {
        Self::with_device(bus, DEVICE_SPI)
    }

    /// Use a non-default I2C id for the flash controller.
    pub fn with_device(bus: B, device: u8) -> Self {
        Self { bus, device }
    }

    pub fn into_inner(self) -> B {
        self.bus
    }

    // --- register access ---

    fn read(&mut self, register: u8) -> Result<u8, Error<B::Error>> {
        self.bus
            .read_register(self.device, register)
            .map_err(Error::Bus)
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), Error<B::Error>> {
        self.bus
            .write_register(self.device, register, value)
            .map_err(Error::Bus)
    }

    fn modify(&mut self, register: u8, f: impl FnOnce(u8) -> u8) -> Result<(), Error<B::Error>> {
        let value = self.read(register)?;
        self.write(register, f(value))
    }

    fn start(&mut self, op: RwCtrl) -> Result<(), Error<B::Error>> {
        self.write(R_FLASH_RW_CTRL, op.bits())
    }

    // --- status and completion ---

    /// Latch and read the flash die status register.
    pub fn read_status(&mut self) -> Result<FlashStatus, Error<B::Error>> {
        self.modify(R_DSC_CTRL_0, |v| v | READ_STATUS_EN)?;
        let raw = self.read(R_FLASH_STATUS_4)?;
        Ok(FlashStatus::from_bits_retain(raw))
    }

    /// Poll until the flash die clears write-in-progress.
    pub fn wait_write_done(&mut self) -> Result<(), Error<B::Error>> {
        while self.read_status()?.contains(FlashStatus::WIP) {}
        Ok(())
    }

    /// Poll until the controller state machine returns to idle.
    pub fn wait_idle(&mut self) -> Result<(), Error<B::Error>> {
        while self.read(R_RAM_CTRL)? & FLASH_DONE == 0 {}
        Ok(())
    }

    // --- instructions ---

    fn instruction(&mut self, opcode: u8) -> Result<(), Error<B::Error>> {
        self.write(R_FLASH_STATUS_2, opcode)?;
        self.start(RwCtrl::GENERAL_INSTRUCTION_EN)
    }

    /// Set the flash die's write enable latch.
    pub fn write_enable(&mut self) -> Result<(), Error<B::Error>> {
        self.instruction(WRITE_ENABLE)
    }

    pub fn write_disable(&mut self) -> Result<(), Error<B::Error>> {
        self.instruction(WRITE_DISABLE)
    }

    fn write_status(&mut self, status: FlashStatus) -> Result<(), Error<B::Error>> {
        self.write_enable()?;
        self.write(R_FLASH_STATUS_0, status.bits())?;
        self.start(RwCtrl::WRITE_STATUS_EN)
    }

    /// Load the 16-bit flash address registers.
    pub fn set_address(&mut self, address: u32) -> Result<(), Error<B::Error>> {
        self.write(R_FLASH_ADDR_H, (address >> 8) as u8)?;
        self.write(R_FLASH_ADDR_L, address as u8)
    }

    /// Load the transfer length register with `len - 1`.
    pub fn set_transfer_length(&mut self, len: usize) -> Result<(), Error<B::Error>> {
        let n = len.saturating_sub(1);
        self.write(R_FLASH_LEN_H, (n >> 8) as u8)?;
        self.write(R_FLASH_LEN_L, n as u8)
    }

    // --- write buffer ---

    /// Copy `data` into the write buffer starting at byte `offset`.
    pub fn stage(&mut self, offset: usize, data: &[u8]) -> Result<(), Error<B::Error>> {
        debug_assert!(offset + data.len() <= WRITE_BUFFER_SIZE);
        for (i, &b) in data.iter().enumerate() {
            self.write(R_FLASH_ADDR_0 + (offset + i) as u8, b)?;
        }
        Ok(())
    }

    /// Fill `len` write buffer bytes from `offset` with [`BLANK`].
    pub fn blank(&mut self, offset: usize, len: usize) -> Result<(), Error<B::Error>> {
        for i in offset..offset + len {
            self.write(R_FLASH_ADDR_0 + i as u8, BLANK)?;
        }
        Ok(())
    }

    /// Program the whole write buffer at the loaded address.
    pub fn commit(&mut self) -> Result<(), Error<B::Error>> {
        self.wait_write_done()?;
        self.start(RwCtrl::FLASH_WRITE)?;
        self.wait_write_done()?;
        self.wait_idle()
    }

    /// Read up to one read buffer of flash starting at `address`.
    pub fn read_window(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Error<B::Error>> {
        debug_assert!(buf.len() <= READ_BUFFER_SIZE);
        self.set_address(address)?;
        self.set_transfer_length(READ_BUFFER_SIZE)?;
        self.start(RwCtrl::FLASH_READ)?;
        self.wait_idle()?;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read(FLASH_READ_D0 + i as u8)?;
        }
        Ok(())
    }

    // --- write protection ---

    /// Drive the flash WP# pin. `released` = not hardware protected.
    fn set_wp_released(&mut self, released: bool) -> Result<(), Error<B::Error>> {
        self.modify(GPIO_STATUS_1, |v| {
            if released {
                v | FLASH_WP
            } else {
                v & !FLASH_WP
            }
        })
    }

    fn check_protection(
        &mut self,
        expected: FlashStatus,
    ) -> Result<ProtectionCheck, Error<B::Error>> {
        self.wait_idle()?;
        let status = self.read_status()?;
        self.wait_idle()?;

        if status.protection() == expected {
            Ok(ProtectionCheck::Confirmed)
        } else {
            Ok(ProtectionCheck::Mismatch { status })
        }
    }

    /// Clear all protection bits with WP# released.
    pub fn disable_protection(&mut self) -> Result<ProtectionCheck, Error<B::Error>> {
        self.set_wp_released(true)?;
        self.wait_idle()?;
        self.write_status(FlashStatus::empty())?;
        self.wait_write_done()?;

        let check = self.check_protection(FlashStatus::empty())?;
        match check {
            ProtectionCheck::Confirmed => info!("Flash write protection disabled"),
            ProtectionCheck::Mismatch { status } => warn!(
                "Disabling flash write protection FAILED (status 0x{:02X})",
                status.bits()
            ),
        }
        Ok(check)
    }

    /// Protect the whole array and lock the status register behind WP#.
    pub fn enable_hardware_protection(&mut self) -> Result<ProtectionCheck, Error<B::Error>> {
        self.set_wp_released(true)?;
        self.wait_idle()?;
        self.write_status(FlashStatus::HW_PATTERN)?;
        self.wait_write_done()?;
        self.set_wp_released(false)?;

        let check = self.check_protection(FlashStatus::HW_PATTERN)?;
        match check {
            ProtectionCheck::Confirmed => info!("Flash hardware write protection enabled"),
            ProtectionCheck::Mismatch { status } => warn!(
                "Enabling flash hardware write protection FAILED (status 0x{:02X})",
                status.bits()
            ),
        }
        Ok(check)
    }

    /// Protect the whole array; the status register stays writable.
    pub fn enable_software_protection(&mut self) -> Result<ProtectionCheck, Error<B::Error>> {
        self.set_wp_released(true)?;
        self.wait_idle()?;
        self.write_status(FlashStatus::SW_PATTERN)?;
        self.wait_write_done()?;

        let check = self.check_protection(FlashStatus::SW_PATTERN)?;
        match check {
            ProtectionCheck::Confirmed => info!("Flash software write protection enabled"),
            ProtectionCheck::Mismatch { status } => warn!(
                "Enabling flash software write protection FAILED (status 0x{:02X})",
                status.bits()
            ),
        }
        Ok(check)
    }

    pub fn protection_state(&mut self) -> Result<ProtectionState, Error<B::Error>> {
        let status = self.read_status()?.protection();
        let wp_asserted = self.read(GPIO_STATUS_1)? & FLASH_WP == 0;

        Ok(if status.is_empty() {
            ProtectionState::Unprotected
        } else if status.contains(FlashStatus::SRP0) && wp_asserted {
            ProtectionState::HardwareProtected
        } else {
            ProtectionState::SoftwareProtected
        })
    }

    /// Run `f` with protection disabled, then re-enable hardware protection.
    ///
    /// Protection is re-enabled even when `f` fails; the error of `f` wins.
    pub fn with_protection_lifted<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Error<B::Error>>,
    ) -> Result<(T, ProtectionCheck), Error<B::Error>> {
        self.disable_protection()?;
        match f(self) {
            Ok(value) => {
                let check = self.enable_hardware_protection()?;
                Ok((value, check))
            }
            Err(e) => {
                if let Err(reprotect) = self.enable_hardware_protection() {
                    warn!("Re-enabling protection after failure: {}", reprotect);
                }
                Err(e)
            }
        }
    }

    // --- erase ---

    /// Erase the 4 KiB sector containing `address`.
    pub fn erase_sector(&mut self, address: u32) -> Result<(), Error<B::Error>> {
        self.write_enable()?;
        self.set_address(address)?;
        self.write(R_FLASH_STATUS_3, SECTOR_ERASE)?;
        self.start(RwCtrl::FLASH_ERASE_EN)?;
        self.wait_write_done()?;
        self.wait_idle()?;

        let base = address & !(FLASH_SECTOR_SIZE - 1);
        debug!(
            "Sector erase done: 0x{:04X} ~ 0x{:04X}",
            base,
            base + FLASH_SECTOR_SIZE - 1
        );
        Ok(())
    }

    /// Erase the whole flash chip.
    pub fn erase_chip(&mut self) -> Result<(), Error<B::Error>> {
        self.write_enable()?;
        self.instruction(CHIP_ERASE)?;
        self.wait_write_done()?;
        self.wait_idle()?;
        info!("Whole flash chip erased");
        Ok(())
    }

    /// Erase every sector of a partition with protection lifted.
    pub fn erase_partition(
        &mut self,
        id: PartitionId,
    ) -> Result<ProtectionCheck, Error<B::Error>> {
        let partition = id.partition();
        let ((), check) = self.with_protection_lifted(|ctrl| {
            for sector in partition.sectors() {
                ctrl.erase_sector(sector)?;
            }
            Ok(())
        })?;
        info!("{} erased", id);
        Ok(check)
    }

    /// Like [`erase_partition`](Self::erase_partition), by numeric id.
    /// Nothing is erased when the id is out of range.
    pub fn erase_partition_id(&mut self, id: u8) -> Result<ProtectionCheck, Error<B::Error>> {
        let Some(partition) = PartitionId::from_id(id) else {
            warn!("Bad parameter! Partition ID {} is invalid", id);
            return Err(Error::InvalidPartitionId(id));
        };
        self.erase_partition(partition)
    }

    // --- OCM control ---

    /// Stop the secure OCM and hold the main OCM in reset so neither touches
    /// the flash controller's buffers.
    pub fn halt_ocm(&mut self) -> Result<OcmState, Error<B::Error>> {
        let hdcp2_ctrl = self
            .bus
            .read_register(DEVICE_DP_IP, ADDR_HDCP2_CTRL)
            .map_err(Error::Bus)?;
        self.bus
            .write_register(DEVICE_DP_IP, ADDR_HDCP2_CTRL, hdcp2_ctrl & !HDCP2_FW_EN)
            .map_err(Error::Bus)?;

        let debug_ctrl = self.read(OCM_DEBUG_CTRL)?;
        self.write(OCM_DEBUG_CTRL, debug_ctrl | OCM_RESET)?;
        trace!("OCM halted");

        Ok(OcmState {
            hdcp2_ctrl,
            debug_ctrl,
        })
    }

    pub fn resume_ocm(&mut self, saved: OcmState) -> Result<(), Error<B::Error>> {
        self.bus
            .write_register(DEVICE_DP_IP, ADDR_HDCP2_CTRL, saved.hdcp2_ctrl)
            .map_err(Error::Bus)?;
        self.write(OCM_DEBUG_CTRL, saved.debug_ctrl)?;
        trace!("OCM resumed");
        Ok(())
    }

    // --- identification ---

    /// Check that the target answers at all.
    pub fn probe(&mut self) -> Result<u8, Error<B::Error>> {
        self.read(R_VERSION)
    }

    /// Version of the firmware currently in flash, as reported by the OCM.
    pub fn read_resident_version(&mut self) -> Result<VersionTriple, Error<B::Error>> {
        let major_minor = self.read(OCM_VERSION_MAJOR)?;
        let build = self.read(OCM_BUILD_NUM)?;
        Ok(VersionTriple::from_registers(major_minor, build))
    }

    // --- read-back dump ---

    /// Read `size` bytes of flash from `address` and hand them to `sink` as
    /// R-byte data records. The final record may be shorter. `address` must
    /// be record aligned.
    pub fn read_records(
        &mut self,
        address: u32,
        size: u32,
        mut sink: impl FnMut(&FirmwareRecord),
    ) -> Result<u32, Error<B::Error>> {
        if address % RECORD_SIZE as u32 != 0 {
            return Err(Error::MisalignedAddress { address });
        }

        let saved = self.halt_ocm()?;
        let result = self.read_records_halted(address, size, &mut sink);
        match (result, self.resume_ocm(saved)) {
            (Ok(count), resumed) => resumed.map(|()| count),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(resume)) => {
                warn!("Could not resume OCM after failed read: {}", resume);
                Err(e)
            }
        }
    }

    fn read_records_halted(
        &mut self,
        mut address: u32,
        size: u32,
        sink: &mut impl FnMut(&FirmwareRecord),
    ) -> Result<u32, Error<B::Error>> {
        self.wait_idle()?;
        debug!("Reading flash from 0x{:04X}, size 0x{:X}", address, size);

        let mut remaining = size;
        let mut window = [0u8; READ_BUFFER_SIZE];
        while remaining > 0 {
            self.read_window(address, &mut window)?;
            for half in window.chunks(RECORD_SIZE) {
                if remaining == 0 {
                    break;
                }
                let n = (remaining as usize).min(RECORD_SIZE);
                if let Some(record) = FirmwareRecord::data(address, &half[..n]) {
                    sink(&record);
                }
                address += n as u32;
                remaining -= n as u32;
            }
        }
        Ok(size)
    }
}
