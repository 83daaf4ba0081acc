// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bus, power and delay collaborators backed by the serial bridge.
//!
//! Register access and power control share one serial port, so both handles
//! hold the same [`Transport`].

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Result};
use embedded_hal::delay::DelayNs;

use ocmflash_common::protocol::{AckStatus, Command, Response};
use ocmflash_common::{RegisterBus, TargetPower};

use crate::transport::Transport;

pub struct Bridge {
    transport: Rc<RefCell<Transport>>,
}

impl Bridge {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Rc::new(RefCell::new(transport)),
        }
    }

    pub fn bus(&self) -> BridgeBus {
        BridgeBus {
            transport: self.transport.clone(),
        }
    }

    pub fn power(&self) -> BridgePower {
        BridgePower {
            transport: self.transport.clone(),
        }
    }

    pub fn port_name(&self) -> String {
        self.transport.borrow().port_name()
    }
}

fn expect_ack(response: Response, what: &str) -> Result<()> {
    match response {
        Response::Ack(AckStatus::Ok) => Ok(()),
        Response::Ack(status) => bail!("{} failed: {:?}", what, status),
        _ => bail!("Unexpected response to {}: {:?}", what, response),
    }
}

pub struct BridgeBus {
    transport: Rc<RefCell<Transport>>,
}

impl RegisterBus for BridgeBus {
    type Error = anyhow::Error;

    fn read_register(&mut self, device: u8, register: u8) -> Result<u8> {
        let response = self
            .transport
            .borrow_mut()
            .send_recv(&Command::ReadRegister { device, register })?;

        match response {
            Response::Register(value) => Ok(value),
            Response::Ack(status) => bail!(
                "Read of 0x{:02X}:0x{:02X} failed: {:?}",
                device,
                register,
                status
            ),
        }
    }

    fn write_register(&mut self, device: u8, register: u8, value: u8) -> Result<()> {
        let response = self.transport.borrow_mut().send_recv(&Command::WriteRegister {
            device,
            register,
            value,
        })?;
        expect_ack(response, "WriteRegister")
    }
}

pub struct BridgePower {
    transport: Rc<RefCell<Transport>>,
}

impl TargetPower for BridgePower {
    type Error = anyhow::Error;

    fn set_target_power(&mut self, on: bool) -> Result<()> {
        let response = self
            .transport
            .borrow_mut()
            .send_recv(&Command::SetTargetPower { on })?;
        expect_ack(response, "SetTargetPower")
    }

    fn set_supply_power(&mut self, on: bool) -> Result<()> {
        let response = self
            .transport
            .borrow_mut()
            .send_recv(&Command::SetSupplyPower { on })?;
        expect_ack(response, "SetSupplyPower")
    }
}

/// Blocking delay on the host thread.
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}
