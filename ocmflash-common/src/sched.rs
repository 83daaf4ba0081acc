// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Ping-pong write scheduler.
//!
//! The controller's write buffer is W = 2 * R bytes wide and is always
//! programmed whole. Records arrive R bytes at a time, so the scheduler pairs
//! them: the first record of a pair ("ping") is staged in the low half, the
//! second ("pong") fills the high half and triggers the commit at the ping's
//! address.
//!
//! The address stream does not have to stay in phase with the W-byte
//! windows. A record that lands mid-window while the buffer is empty is
//! written alone as the high half of the window below it. A record that
//! breaks contiguity while a ping is pending first flushes the ping alone.
//! Bytes of a window that carry no data are written as 0xFF, which leaves
//! erased NOR flash untouched.
//!
//! One [`WriteSession`] owns all mutable state for one programming run and
//! consumes exactly one record per [`feed`](WriteSession::feed) call.

use log::{debug, info, trace, warn};

use crate::bus::RegisterBus;
use crate::controller::{FlashController, OcmState, ProtectionCheck, BLANK};
use crate::error::Error;
use crate::protocol::{RECORD_SIZE, WRITE_BUFFER_SIZE};
use crate::record::{self, FirmwareRecord};

const R: u32 = RECORD_SIZE as u32;
const W: u32 = WRITE_BUFFER_SIZE as u32;

/// Which half of the write buffer the next data record goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Buffer empty; the next record is staged in the low half.
    Ping,
    /// Low half holds a pending record; the next record completes the pair.
    Pong,
}

/// Mutable state of one programming session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteSessionState {
    pub total_bytes_written: u32,
    /// Address of the last record taken into the buffer.
    pub previous_address: u32,
    pub slot: Slot,
    /// Bytes staged in the low half, 0 when empty.
    pub accumulated_in_ping: u8,
}

impl WriteSessionState {
    pub fn new() -> Self {
        Self {
            total_bytes_written: 0,
            previous_address: 0,
            slot: Slot::Ping,
            accumulated_in_ping: 0,
        }
    }
}

impl Default for WriteSessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-back verification mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verify {
    /// Re-read every committed window and compare with what was staged.
    ReadBack,
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Passed,
    Failed,
    Skipped,
}

/// Summary of a finished session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub bytes_written: u32,
    /// Physical write transactions issued.
    pub commits: u32,
    pub verification: Verification,
    /// Hardware protection check after the session.
    pub protection: ProtectionCheck,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// The record was taken; feed the next one.
    Continue,
    /// End-of-file reached; the session is closed.
    Finished(SessionReport),
}

/// Byte range of the write buffer that carries data in the next commit.
#[derive(Clone, Copy, Debug)]
struct Span {
    start: usize,
    end: usize,
}

/// One programming session against a [`FlashController`].
pub struct WriteSession<'c, B: RegisterBus> {
    ctrl: &'c mut FlashController<B>,
    state: WriteSessionState,
    verify: Verify,
    readback_failed: bool,
    commits: u32,
    /// Mirror of the hardware write buffer.
    buffer: [u8; WRITE_BUFFER_SIZE],
    /// Saved OCM registers; `None` once the session is closed.
    ocm: Option<OcmState>,
}

impl<'c, B: RegisterBus> WriteSession<'c, B> {
    /// Prepare the controller and open a session with fresh state.
    ///
    /// Protection is lifted here and re-enabled when the session ends. The
    /// flash itself is not erased; that is the caller's responsibility.
    pub fn begin(ctrl: &'c mut FlashController<B>, verify: Verify) -> Result<Self, Error<B::Error>> {
        ctrl.disable_protection()?;
        let ocm = match ctrl.halt_ocm() {
            Ok(ocm) => ocm,
            Err(e) => {
                if let Err(reprotect) = ctrl.enable_hardware_protection() {
                    warn!("Could not re-enable protection: {}", reprotect);
                }
                return Err(e);
            }
        };

        let mut session = Self {
            ctrl,
            state: WriteSessionState::new(),
            verify,
            readback_failed: false,
            commits: 0,
            buffer: [BLANK; WRITE_BUFFER_SIZE],
            ocm: Some(ocm),
        };

        let prepared = session.prepare();
        if let Err(e) = prepared {
            session.close_after_failure();
            return Err(e);
        }
        debug!("Write session open (verify: {:?})", verify);
        Ok(session)
    }

    fn prepare(&mut self) -> Result<(), Error<B::Error>> {
        self.ctrl.wait_idle()?;
        self.ctrl.set_transfer_length(WRITE_BUFFER_SIZE)?;
        self.ctrl.blank(0, WRITE_BUFFER_SIZE)
    }

    pub fn state(&self) -> &WriteSessionState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.ocm.is_some()
    }

    /// Decode one text line and feed it.
    pub fn feed_line(&mut self, line: &[u8]) -> Result<Progress, Error<B::Error>> {
        if !self.is_open() {
            return Err(Error::SessionClosed);
        }
        match record::decode(line) {
            Ok(record) => self.feed(&record),
            Err(e) => {
                warn!("HEX file error at 0x{:04X}: {}", self.state.previous_address, e);
                self.close_after_failure();
                Err(Error::Decode(e))
            }
        }
    }

    /// Feed one record. Any error closes the session with protection
    /// re-enabled.
    pub fn feed(&mut self, record: &FirmwareRecord) -> Result<Progress, Error<B::Error>> {
        if !self.is_open() {
            return Err(Error::SessionClosed);
        }
        match self.step(record) {
            Ok(progress) => Ok(progress),
            Err(e) => {
                warn!("Write session failed: {}", e);
                self.close_after_failure();
                Err(e)
            }
        }
    }

    /// End the session without an end-of-file record.
    pub fn abort(mut self) -> Result<ProtectionCheck, Error<B::Error>> {
        let Some(ocm) = self.ocm.take() else {
            return Err(Error::SessionClosed);
        };
        warn!(
            "Write session aborted after {} bytes",
            self.state.total_bytes_written
        );
        let check = self.ctrl.enable_hardware_protection()?;
        self.ctrl.resume_ocm(ocm)?;
        Ok(check)
    }

    fn step(&mut self, record: &FirmwareRecord) -> Result<Progress, Error<B::Error>> {
        if record.address % R != 0 {
            return Err(Error::MisalignedAddress {
                address: record.address,
            });
        }

        match self.state.slot {
            Slot::Ping => self.ping(record),
            Slot::Pong => self.pong(record),
        }
    }

    fn ping(&mut self, record: &FirmwareRecord) -> Result<Progress, Error<B::Error>> {
        if record.is_eof() {
            return self.finish().map(Progress::Finished);
        }
        self.take_first_half(record)?;
        Ok(Progress::Continue)
    }

    fn pong(&mut self, record: &FirmwareRecord) -> Result<Progress, Error<B::Error>> {
        let pending = self.state.accumulated_in_ping as usize;

        if record.is_eof() {
            self.commit(
                self.state.previous_address,
                Span {
                    start: 0,
                    end: pending,
                },
            )?;
            self.state.total_bytes_written += pending as u32;
            self.state.accumulated_in_ping = 0;
            return self.finish().map(Progress::Finished);
        }

        let address = record.address;
        let aligned = address % W == 0;
        let contiguous = address == self.state.previous_address + R;

        match (aligned, contiguous) {
            (false, true) => {
                let n = record.payload.len();
                self.load(pending, &record.payload)?;
                self.commit(
                    self.state.previous_address,
                    Span {
                        start: 0,
                        end: pending + n,
                    },
                )?;
                self.state.total_bytes_written += (pending + n) as u32;
                self.state.accumulated_in_ping = 0;
                self.state.previous_address = address;
                self.state.slot = Slot::Ping;
            }
            (false, false) => {
                self.flush_ping()?;
                self.write_as_second_half(record)?;
            }
            (true, false) => {
                self.flush_ping()?;
                self.take_first_half(record)?;
            }
            (true, true) => {
                return Err(Error::Sequence {
                    address,
                    previous: self.state.previous_address,
                });
            }
        }
        Ok(Progress::Continue)
    }

    /// Take a record while the buffer is empty.
    fn take_first_half(&mut self, record: &FirmwareRecord) -> Result<(), Error<B::Error>> {
        if record.address % W != 0 {
            // Out of phase with the hardware windows: write it now as the
            // high half of the window below, which restores the cadence.
            return self.write_as_second_half(record);
        }

        self.load(0, &record.payload)?;
        self.state.previous_address = record.address;
        self.state.accumulated_in_ping = record.byte_count();
        self.state.slot = Slot::Pong;
        trace!("ping 0x{:04X} ({} bytes)", record.address, record.byte_count());
        Ok(())
    }

    /// Commit `record` alone as the high half of the window at
    /// `address - R`.
    fn write_as_second_half(&mut self, record: &FirmwareRecord) -> Result<(), Error<B::Error>> {
        let n = record.payload.len();
        self.load(RECORD_SIZE, &record.payload)?;
        self.commit(
            record.address - R,
            Span {
                start: RECORD_SIZE,
                end: RECORD_SIZE + n,
            },
        )?;
        self.state.total_bytes_written += n as u32;
        self.state.accumulated_in_ping = 0;
        self.state.previous_address = record.address;
        self.state.slot = Slot::Ping;
        Ok(())
    }

    /// Commit the pending ping half on its own.
    fn flush_ping(&mut self) -> Result<(), Error<B::Error>> {
        let pending = self.state.accumulated_in_ping as usize;
        self.commit(
            self.state.previous_address,
            Span {
                start: 0,
                end: pending,
            },
        )?;
        self.state.total_bytes_written += pending as u32;
        self.state.accumulated_in_ping = 0;
        self.state.slot = Slot::Ping;
        trace!("flushed ping 0x{:04X} alone", self.state.previous_address);
        Ok(())
    }

    /// Stage `data` into the write buffer at `offset`.
    fn load(&mut self, offset: usize, data: &[u8]) -> Result<(), Error<B::Error>> {
        self.ctrl.stage(offset, data)?;
        self.buffer[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Blank everything outside `span`, then program the buffer at
    /// `address`.
    fn commit(&mut self, address: u32, span: Span) -> Result<(), Error<B::Error>> {
        for i in (0..span.start).chain(span.end..WRITE_BUFFER_SIZE) {
            if self.buffer[i] != BLANK {
                self.ctrl.blank(i, 1)?;
                self.buffer[i] = BLANK;
            }
        }

        self.ctrl.write_enable()?;
        self.ctrl.set_address(address)?;
        self.ctrl.commit()?;
        self.commits += 1;
        trace!(
            "commit 0x{:04X} [{}..{}]",
            address,
            span.start,
            span.end
        );

        if self.verify == Verify::ReadBack {
            self.verify_window(address, span)?;
        }
        Ok(())
    }

    fn verify_window(&mut self, address: u32, span: Span) -> Result<(), Error<B::Error>> {
        let mut readback = [0u8; WRITE_BUFFER_SIZE];
        self.ctrl.read_window(address, &mut readback[..span.end])?;
        if readback[span.start..span.end] != self.buffer[span.start..span.end] {
            warn!(
                "Read back mismatch in window 0x{:04X}: {:02X?}",
                address,
                &readback[span.start..span.end]
            );
            self.readback_failed = true;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<SessionReport, Error<B::Error>> {
        let protection = self.ctrl.enable_hardware_protection()?;
        if let Some(ocm) = self.ocm.take() {
            self.ctrl.resume_ocm(ocm)?;
        }

        let verification = match (self.verify, self.readback_failed) {
            (Verify::Off, _) => Verification::Skipped,
            (Verify::ReadBack, false) => Verification::Passed,
            (Verify::ReadBack, true) => Verification::Failed,
        };

        if verification == Verification::Failed {
            warn!("Flash ERROR: read back data was not the same as write data. Please burn again.");
        } else {
            info!(
                "Flash program done. {} bytes written.",
                self.state.total_bytes_written
            );
        }

        Ok(SessionReport {
            bytes_written: self.state.total_bytes_written,
            commits: self.commits,
            verification,
            protection,
        })
    }

    /// Best effort: leave the flash protected and the OCM running.
    fn close_after_failure(&mut self) {
        let Some(ocm) = self.ocm.take() else {
            return;
        };
        if let Err(e) = self.ctrl.enable_hardware_protection() {
            warn!("Could not re-enable protection: {}", e);
        }
        if let Err(e) = self.ctrl.resume_ocm(ocm) {
            warn!("Could not resume OCM: {}", e);
        }
    }
}

impl<B: RegisterBus> Drop for WriteSession<'_, B> {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("Write session dropped while open");
            self.close_after_failure();
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::sim::SimTarget;

    #[test]
    fn test_aligned_contiguous_pong_is_a_sequence_error() {
        let sim = SimTarget::new();
        let mut ctrl = FlashController::new(sim.bus());
        let mut session = WriteSession::begin(&mut ctrl, Verify::Off).unwrap();

        // Unreachable through the public API: a pending ping at a
        // mid-window address.
        session.state = WriteSessionState {
            total_bytes_written: 0,
            previous_address: 0x1010,
            slot: Slot::Pong,
            accumulated_in_ping: 16,
        };

        let record = FirmwareRecord::data(0x1020, &[0u8; 16]).unwrap();
        let err = session.feed(&record).unwrap_err();
        assert!(matches!(
            err,
            Error::Sequence {
                address: 0x1020,
                previous: 0x1010
            }
        ));
        assert!(!session.is_open());
        assert!(sim.chip().is_hardware_protected());
    }

    #[test]
    fn test_short_ping_is_padded_with_blank() {
        let sim = SimTarget::new();
        let mut ctrl = FlashController::new(sim.bus());
        let mut session = WriteSession::begin(&mut ctrl, Verify::ReadBack).unwrap();

        session
            .feed(&FirmwareRecord::data(0x2000, &[0x11; 16]).unwrap())
            .unwrap();
        session
            .feed(&FirmwareRecord::data(0x2010, &[0x22; 16]).unwrap())
            .unwrap();
        // A short record leaves the rest of its window blank.
        session
            .feed(&FirmwareRecord::data(0x2020, &[0x33; 4]).unwrap())
            .unwrap();
        let Progress::Finished(report) = session.feed(&FirmwareRecord::end_of_file()).unwrap()
        else {
            panic!("session should finish on EOF");
        };

        assert_eq!(report.bytes_written, 36);
        let chip = sim.chip();
        let last = chip.commits().last().unwrap();
        assert_eq!(last.address, 0x2020);
        assert_eq!(&last.data[..4], &[0x33; 4]);
        assert!(last.data[4..].iter().all(|&b| b == 0xFF));
    }
}
