// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Collaborator seams: single-register bus transactions and target power.
//!
//! The programming core only ever talks to the target through these two
//! traits. Adapters for `embedded-hal` 1.0 I2C masters and GPIO outputs are
//! provided for firmware hosts; the upload tool implements them over its
//! serial bridge.

use core::fmt::Debug;

use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;

/// Single-register read/write access to devices on the target's bus.
pub trait RegisterBus {
    type Error: Debug;

    fn read_register(&mut self, device: u8, register: u8) -> Result<u8, Self::Error>;

    fn write_register(&mut self, device: u8, register: u8, value: u8) -> Result<(), Self::Error>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    type Error = B::Error;

    fn read_register(&mut self, device: u8, register: u8) -> Result<u8, Self::Error> {
        (**self).read_register(device, register)
    }

    fn write_register(&mut self, device: u8, register: u8, value: u8) -> Result<(), Self::Error> {
        (**self).write_register(device, register, value)
    }
}

/// Power control of the companion chip.
pub trait TargetPower {
    type Error: Debug;

    fn set_target_power(&mut self, on: bool) -> Result<(), Self::Error>;

    fn set_supply_power(&mut self, on: bool) -> Result<(), Self::Error>;
}

/// [`RegisterBus`] over an `embedded-hal` I2C master.
pub struct I2cBus<I> {
    i2c: I,
}

impl<I: I2c> I2cBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c> RegisterBus for I2cBus<I> {
    type Error = I::Error;

    fn read_register(&mut self, device: u8, register: u8) -> Result<u8, Self::Error> {
        let mut value = [0u8; 1];
        self.i2c.write_read(device, &[register], &mut value)?;
        Ok(value[0])
    }

    fn write_register(&mut self, device: u8, register: u8, value: u8) -> Result<(), Self::Error> {
        self.i2c.write(device, &[register, value])
    }
}

/// [`TargetPower`] driven by two active-high GPIO outputs.
pub struct PinPower<P, S> {
    power_en: P,
    supply_en: S,
}

impl<P, S> PinPower<P, S>
where
    P: OutputPin,
    S: OutputPin<Error = P::Error>,
{
    pub fn new(power_en: P, supply_en: S) -> Self {
        Self {
            power_en,
            supply_en,
        }
    }
}

fn drive<O: OutputPin>(pin: &mut O, high: bool) -> Result<(), O::Error> {
    if high {
        pin.set_high()
    } else {
        pin.set_low()
    }
}

impl<P, S> TargetPower for PinPower<P, S>
where
    P: OutputPin,
    S: OutputPin<Error = P::Error>,
{
    type Error = P::Error;

    fn set_target_power(&mut self, on: bool) -> Result<(), Self::Error> {
        drive(&mut self.power_en, on)
    }

    fn set_supply_power(&mut self, on: bool) -> Result<(), Self::Error> {
        drive(&mut self.supply_en, on)
    }
}
