// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! In-memory model of the companion chip for tests and dry runs.
//!
//! The model covers what the programming core observes: the SPI bridge
//! register file, a 64 KiB NOR array (programming only clears bits, erase
//! sets them), the status register with its protection bits and write
//! enable latch, the WP# pin, busy polling, and power. Every flash operation
//! is appended to an event log so tests can check transaction order.
//!
//! [`SimTarget`] hands out bus, power and delay handles that share one chip.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use crate::bus::{RegisterBus, TargetPower};
use crate::protocol::{FLASH_SECTOR_SIZE, FLASH_SIZE, READ_BUFFER_SIZE, WRITE_BUFFER_SIZE};
use crate::regs::*;
use crate::version::VersionTriple;

/// Value of `R_VERSION` on the simulated chip.
pub const SIM_CHIP_VERSION: u8 = 0xA5;

/// Status polls that report write-in-progress after each flash operation.
const WIP_POLLS: u32 = 2;
/// Idle polls that report busy after each controller operation.
const IDLE_POLLS: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimError {
    /// The chip is unpowered or not answering.
    NoAck,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    WriteEnable,
    WriteDisable,
    StatusWrite(FlashStatus),
    SectorErase { address: u32 },
    ChipErase,
    /// Data is kept in [`SimChip::commits`].
    Program { address: u32 },
    Read { address: u32 },
    /// An operation was refused: no write enable, or protected.
    Blocked,
    /// A status poll saw write-in-progress clear after an operation.
    WriteDone,
    TargetPower { on: bool },
    SupplyPower { on: bool },
    Delay { ms: u32 },
}

/// One physical write transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub address: u32,
    pub data: Vec<u8>,
}

pub struct SimChip {
    spi: [u8; 256],
    dp_ip: [u8; 256],
    flash: Vec<u8>,
    status: FlashStatus,
    wip_polls: u32,
    idle_polls: u32,
    wip_seen: bool,
    powered: bool,
    responsive: bool,
    weak_bytes: Vec<u32>,
    events: Vec<Event>,
    commits: Vec<Commit>,
}

impl SimChip {
    /// A powered chip with blank flash and hardware protection enabled.
    pub fn new() -> Self {
        let mut spi = [0u8; 256];
        spi[R_VERSION as usize] = SIM_CHIP_VERSION;
        spi[R_RAM_CTRL as usize] = FLASH_DONE;
        // WP# asserted
        spi[GPIO_STATUS_1 as usize] = 0;

        let mut dp_ip = [0u8; 256];
        dp_ip[ADDR_HDCP2_CTRL as usize] = HDCP2_FW_EN;

        Self {
            spi,
            dp_ip,
            flash: vec![0xFF; FLASH_SIZE as usize],
            status: FlashStatus::HW_PATTERN,
            wip_polls: 0,
            idle_polls: 0,
            wip_seen: true,
            powered: true,
            responsive: true,
            weak_bytes: Vec::new(),
            events: Vec::new(),
            commits: Vec::new(),
        }
    }

    // --- test setup ---

    pub fn set_resident_version(&mut self, version: VersionTriple) {
        self.spi[OCM_VERSION_MAJOR as usize] = (version.major << 4) | version.minor;
        self.spi[OCM_BUILD_NUM as usize] = version.build;
    }

    /// Make the chip ignore every transaction even while powered.
    pub fn set_responsive(&mut self, responsive: bool) {
        self.responsive = responsive;
    }

    /// Make programming leave the byte at `address` erased.
    pub fn weaken(&mut self, address: u32) {
        self.weak_bytes.push(address);
    }

    /// Overwrite flash contents directly.
    pub fn load_flash(&mut self, address: u32, data: &[u8]) {
        let start = address as usize;
        self.flash[start..start + data.len()].copy_from_slice(data);
    }

    // --- inspection ---

    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    pub fn read_flash(&self, address: u32, len: usize) -> &[u8] {
        let start = address as usize;
        &self.flash[start..start + len]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    pub fn status(&self) -> FlashStatus {
        self.status
    }

    pub fn wp_asserted(&self) -> bool {
        self.spi[GPIO_STATUS_1 as usize] & FLASH_WP == 0
    }

    pub fn is_hardware_protected(&self) -> bool {
        self.status.protection() == FlashStatus::HW_PATTERN && self.wp_asserted()
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Secure OCM firmware enabled and main OCM out of reset.
    pub fn ocm_running(&self) -> bool {
        self.dp_ip[ADDR_HDCP2_CTRL as usize] & HDCP2_FW_EN != 0
            && self.spi[OCM_DEBUG_CTRL as usize] & OCM_RESET == 0
    }

    // --- bus side ---

    fn check_link(&self) -> Result<(), SimError> {
        if self.powered && self.responsive {
            Ok(())
        } else {
            Err(SimError::NoAck)
        }
    }

    fn read(&mut self, device: u8, register: u8) -> Result<u8, SimError> {
        self.check_link()?;
        match device {
            DEVICE_DP_IP => Ok(self.dp_ip[register as usize]),
            DEVICE_SPI => Ok(self.read_spi(register)),
            _ => Err(SimError::NoAck),
        }
    }

    fn read_spi(&mut self, register: u8) -> u8 {
        let value = self.spi[register as usize];
        if register == R_RAM_CTRL {
            if self.idle_polls > 0 {
                self.idle_polls -= 1;
                return value & !FLASH_DONE;
            }
            return value | FLASH_DONE;
        }
        value
    }

    fn write(&mut self, device: u8, register: u8, value: u8) -> Result<(), SimError> {
        self.check_link()?;
        match device {
            DEVICE_DP_IP => self.dp_ip[register as usize] = value,
            DEVICE_SPI => self.write_spi(register, value),
            _ => return Err(SimError::NoAck),
        }
        Ok(())
    }

    fn write_spi(&mut self, register: u8, value: u8) {
        match register {
            R_FLASH_RW_CTRL => self.execute(RwCtrl::from_bits_truncate(value)),
            R_DSC_CTRL_0 => {
                self.spi[register as usize] = value & !READ_STATUS_EN;
                if value & READ_STATUS_EN != 0 {
                    self.latch_status();
                }
            }
            _ => self.spi[register as usize] = value,
        }
    }

    fn latch_status(&mut self) {
        let mut status = self.status;
        if self.wip_polls > 0 {
            self.wip_polls -= 1;
            status |= FlashStatus::WIP;
        } else if !self.wip_seen {
            self.wip_seen = true;
            self.events.push(Event::WriteDone);
        }
        self.spi[R_FLASH_STATUS_4 as usize] = status.bits();
    }

    fn address(&self) -> u32 {
        ((self.spi[R_FLASH_ADDR_H as usize] as u32) << 8) | self.spi[R_FLASH_ADDR_L as usize] as u32
    }

    fn transfer_len(&self) -> usize {
        let n = ((self.spi[R_FLASH_LEN_H as usize] as usize) << 8)
            | self.spi[R_FLASH_LEN_L as usize] as usize;
        n + 1
    }

    fn array_locked(&self) -> bool {
        self.status.intersects(FlashStatus::PROTECT_ALL)
    }

    /// Start a flash operation that takes write-in-progress time.
    fn busy(&mut self) {
        self.wip_polls = WIP_POLLS;
        self.wip_seen = false;
        self.idle_polls = IDLE_POLLS;
    }

    /// Consume the write enable latch for an operation that needs it.
    fn take_wel(&mut self, allowed: bool) -> bool {
        let wel = self.status.contains(FlashStatus::WEL);
        self.status.remove(FlashStatus::WEL);
        if wel && allowed {
            true
        } else {
            self.events.push(Event::Blocked);
            false
        }
    }

    fn execute(&mut self, op: RwCtrl) {
        if op.contains(RwCtrl::GENERAL_INSTRUCTION_EN) {
            self.instruction(self.spi[R_FLASH_STATUS_2 as usize]);
        }
        if op.contains(RwCtrl::WRITE_STATUS_EN) {
            let locked = self.status.contains(FlashStatus::SRP0) && self.wp_asserted();
            if self.take_wel(!locked) {
                let requested = FlashStatus::from_bits_truncate(self.spi[R_FLASH_STATUS_0 as usize]);
                self.status = requested.protection();
                self.events.push(Event::StatusWrite(self.status));
                self.busy();
            }
        }
        if op.contains(RwCtrl::FLASH_ERASE_EN) {
            let address = self.address();
            let opcode = self.spi[R_FLASH_STATUS_3 as usize];
            if opcode == SECTOR_ERASE && self.take_wel(!self.array_locked()) {
                let base = (address & !(FLASH_SECTOR_SIZE - 1)) as usize;
                self.flash[base..base + FLASH_SECTOR_SIZE as usize].fill(0xFF);
                self.events.push(Event::SectorErase { address });
                self.busy();
            }
        }
        if op.contains(RwCtrl::FLASH_WRITE) {
            self.program();
        }
        if op.contains(RwCtrl::FLASH_READ) {
            let address = self.address();
            for i in 0..READ_BUFFER_SIZE {
                let a = (address as usize + i) % FLASH_SIZE as usize;
                self.spi[FLASH_READ_D0 as usize + i] = self.flash[a];
            }
            self.events.push(Event::Read { address });
            self.idle_polls = IDLE_POLLS;
        }
    }

    fn instruction(&mut self, opcode: u8) {
        match opcode {
            WRITE_ENABLE => {
                self.status.insert(FlashStatus::WEL);
                self.events.push(Event::WriteEnable);
            }
            WRITE_DISABLE => {
                self.status.remove(FlashStatus::WEL);
                self.events.push(Event::WriteDisable);
            }
            CHIP_ERASE => {
                if self.take_wel(!self.array_locked()) {
                    self.flash.fill(0xFF);
                    self.events.push(Event::ChipErase);
                    self.busy();
                }
            }
            _ => self.events.push(Event::Blocked),
        }
        self.idle_polls = IDLE_POLLS;
    }

    fn program(&mut self) {
        if !self.take_wel(!self.array_locked()) {
            return;
        }
        let address = self.address();
        let len = self.transfer_len().min(WRITE_BUFFER_SIZE);
        let mut data = Vec::with_capacity(len);
        for i in 0..len {
            let b = self.spi[R_FLASH_ADDR_0 as usize + i];
            data.push(b);
            let a = (address + i as u32) % FLASH_SIZE;
            if !self.weak_bytes.contains(&a) {
                self.flash[a as usize] &= b;
            }
        }
        self.events.push(Event::Program { address });
        self.commits.push(Commit { address, data });
        self.busy();
    }
}

impl Default for SimChip {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to one simulated chip.
#[derive(Clone, Default)]
pub struct SimTarget {
    chip: Rc<RefCell<SimChip>>,
}

impl SimTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus(&self) -> SimBus {
        SimBus {
            chip: self.chip.clone(),
        }
    }

    pub fn power(&self) -> SimPower {
        SimPower {
            chip: self.chip.clone(),
        }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay {
            chip: self.chip.clone(),
        }
    }

    pub fn chip(&self) -> Ref<'_, SimChip> {
        self.chip.borrow()
    }

    pub fn chip_mut(&self) -> RefMut<'_, SimChip> {
        self.chip.borrow_mut()
    }
}

pub struct SimBus {
    chip: Rc<RefCell<SimChip>>,
}

impl RegisterBus for SimBus {
    type Error = SimError;

    fn read_register(&mut self, device: u8, register: u8) -> Result<u8, SimError> {
        self.chip.borrow_mut().read(device, register)
    }

    fn write_register(&mut self, device: u8, register: u8, value: u8) -> Result<(), SimError> {
        self.chip.borrow_mut().write(device, register, value)
    }
}

pub struct SimPower {
    chip: Rc<RefCell<SimChip>>,
}

impl TargetPower for SimPower {
    type Error = SimError;

    fn set_target_power(&mut self, on: bool) -> Result<(), SimError> {
        let mut chip = self.chip.borrow_mut();
        chip.powered = on;
        chip.events.push(Event::TargetPower { on });
        Ok(())
    }

    fn set_supply_power(&mut self, on: bool) -> Result<(), SimError> {
        self.chip.borrow_mut().events.push(Event::SupplyPower { on });
        Ok(())
    }
}

/// Delay that returns at once and logs the requested pause.
pub struct SimDelay {
    chip: Rc<RefCell<SimChip>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_ms(ns / 1_000_000);
    }

    fn delay_us(&mut self, us: u32) {
        self.delay_ms(us / 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.chip.borrow_mut().events.push(Event::Delay { ms });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_only_clears_bits() {
        let mut chip = SimChip::new();
        chip.status = FlashStatus::empty();
        chip.load_flash(0x100, &[0xF0]);
        chip.spi[R_FLASH_ADDR_H as usize] = 0x01;
        chip.spi[R_FLASH_ADDR_L as usize] = 0x00;
        chip.spi[R_FLASH_LEN_L as usize] = 0;
        chip.spi[R_FLASH_ADDR_0 as usize] = 0x3C;
        chip.status.insert(FlashStatus::WEL);

        chip.program();
        assert_eq!(chip.read_flash(0x100, 1), &[0x30]);
    }

    #[test]
    fn test_program_refused_while_protected() {
        let mut chip = SimChip::new();
        chip.status.insert(FlashStatus::WEL);
        chip.program();
        assert!(chip.commits().is_empty());
        assert_eq!(chip.events(), &[Event::Blocked]);
    }
}
