// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Serial transport layer for the USB-serial I2C bridge.

use anyhow::{bail, Context, Result};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

use ocmflash_common::protocol::{Command, Response};

/// Default timeout for serial operations in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

pub const DEFAULT_BAUD: u32 = 115200;

/// COBS framed postcard messages over a serial port.
pub struct Transport {
    port: Box<dyn SerialPort>,
    rx_buf: Vec<u8>,
}

impl Transport {
    /// Open `port_name` and discard anything the bridge sent before.
    pub fn open(port_name: &str, baud: u32, timeout_ms: u64) -> Result<Self> {
        let port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(timeout_ms))
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;

        let mut transport = Self {
            port,
            rx_buf: Vec::with_capacity(64),
        };
        transport.drain_rx();
        Ok(transport)
    }

    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".to_string())
    }

    /// Write one register command as a single COBS frame.
    pub fn send(&mut self, cmd: &Command) -> Result<()> {
        let mut frame = [0u8; 32];
        let frame = postcard::to_slice_cobs(cmd, &mut frame)
            .map_err(|e| anyhow::anyhow!("Cannot encode {:?}: {}", cmd, e))?;
        self.port
            .write_all(frame)
            .and_then(|()| self.port.flush())
            .context("Bridge write failed")?;
        Ok(())
    }

    /// Block until the bridge answers with one complete frame.
    pub fn receive(&mut self) -> Result<Response> {
        self.rx_buf.clear();
        let mut byte = [0u8; 1];

        // a frame ends at the first zero byte
        while self.rx_buf.last() != Some(&0) {
            match self.port.read(&mut byte) {
                Ok(0) => {}
                Ok(_) => self.rx_buf.push(byte[0]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    bail!("Bridge did not answer within the timeout");
                }
                Err(e) => return Err(e).context("Bridge read failed"),
            }
        }

        postcard::from_bytes_cobs(&mut self.rx_buf).map_err(|e| {
            anyhow::anyhow!(
                "Bridge sent an invalid frame: {} ({} bytes: {:02x?})",
                e,
                self.rx_buf.len(),
                &self.rx_buf[..self.rx_buf.len().min(32)]
            )
        })
    }

    /// Drop bytes the bridge queued before this session, e.g. a half frame
    /// from an interrupted run.
    fn drain_rx(&mut self) {
        let mut stale = [0u8; 64];
        let timeout = self.port.timeout();
        let _ = self.port.set_timeout(Duration::from_millis(10));
        while matches!(self.port.read(&mut stale), Ok(n) if n > 0) {}
        let _ = self.port.set_timeout(timeout);
    }

    /// One register transaction: command out, response back.
    pub fn send_recv(&mut self, cmd: &Command) -> Result<Response> {
        self.send(cmd)?;
        self.receive()
    }
}
