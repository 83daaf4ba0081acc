// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Tests for the embedded-hal bus and power adapters.

use embedded_hal::i2c::ErrorKind;
use embedded_hal_mock::eh1::digital::{
    Mock as PinMock, State as PinState, Transaction as PinTransaction,
};
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

use ocmflash_common::regs::{FlashStatus, DEVICE_SPI, R_DSC_CTRL_0, R_FLASH_STATUS_4};
use ocmflash_common::{Error, FlashController, I2cBus, PinPower, RegisterBus, TargetPower};

// --- I2cBus ---

#[test]
fn test_i2c_read_register() {
    let expectations = [I2cTransaction::write_read(0x3F, vec![0x38], vec![0x7C])];
    let mut bus = I2cBus::new(I2cMock::new(&expectations));

    assert_eq!(bus.read_register(0x3F, 0x38).unwrap(), 0x7C);
    bus.release().done();
}

#[test]
fn test_i2c_write_register() {
    let expectations = [I2cTransaction::write(0x38, vec![0x02, 0x00])];
    let mut bus = I2cBus::new(I2cMock::new(&expectations));

    bus.write_register(0x38, 0x02, 0x00).unwrap();
    bus.release().done();
}

#[test]
fn test_controller_status_over_i2c() {
    let expectations = [
        I2cTransaction::write_read(DEVICE_SPI, vec![R_DSC_CTRL_0], vec![0x01]),
        I2cTransaction::write(DEVICE_SPI, vec![R_DSC_CTRL_0, 0x81]),
        I2cTransaction::write_read(DEVICE_SPI, vec![R_FLASH_STATUS_4], vec![0xFC]),
    ];
    let mut ctrl = FlashController::new(I2cBus::new(I2cMock::new(&expectations)));

    assert_eq!(ctrl.read_status().unwrap(), FlashStatus::HW_PATTERN);
    ctrl.into_inner().release().done();
}

#[test]
fn test_controller_probe_nack() {
    let expectations = [I2cTransaction::write_read(DEVICE_SPI, vec![0x00], vec![0x00])
        .with_error(ErrorKind::Other)];
    let mut ctrl = FlashController::new(I2cBus::new(I2cMock::new(&expectations)));

    assert!(matches!(ctrl.probe(), Err(Error::Bus(ErrorKind::Other))));
    ctrl.into_inner().release().done();
}

// --- PinPower ---

#[test]
fn test_pin_power_sequence() {
    let power_en = PinMock::new(&[
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::Low),
    ]);
    let supply_en = PinMock::new(&[
        PinTransaction::set(PinState::Low),
        PinTransaction::set(PinState::High),
    ]);
    let mut power_check = power_en.clone();
    let mut supply_check = supply_en.clone();

    let mut power = PinPower::new(power_en, supply_en);
    power.set_target_power(true).unwrap();
    power.set_target_power(false).unwrap();
    power.set_supply_power(false).unwrap();
    power.set_supply_power(true).unwrap();

    power_check.done();
    supply_check.done();
}
