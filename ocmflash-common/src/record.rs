// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware record codec.
//!
//! One text line carries one record:
//!
//! ```text
//! :CCAAAATT[DD..]SS
//! ```
//!
//! `CC` byte count, `AAAA` address, `TT` record type, `DD` payload bytes and
//! `SS` the two's-complement checksum. Only data (00) and end-of-file (01)
//! records exist in this format. Hex digits must be uppercase.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::error::DecodeError;
use crate::protocol::RECORD_SIZE;

const START_CODE: u8 = b':';

const START_CODE_LEN: usize = 1;
const BYTE_COUNT_LEN: usize = 2;
const ADDRESS_LEN: usize = 4;
const RECORD_TYPE_LEN: usize = 2;
const HEADER_LEN: usize = START_CODE_LEN + BYTE_COUNT_LEN + ADDRESS_LEN + RECORD_TYPE_LEN;

/// Longest line `encode` can produce.
pub const MAX_LINE_LEN: usize = HEADER_LEN + 2 * RECORD_SIZE + 2;

pub type Payload = Vec<u8, RECORD_SIZE>;
pub type Line = String<MAX_LINE_LEN>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
    Data = 0x00,
    EndOfFile = 0x01,
}

/// One decoded firmware line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmwareRecord {
    /// Only the low 16 bits reach the target.
    pub address: u32,
    pub record_type: RecordType,
    pub payload: Payload,
}

impl FirmwareRecord {
    /// Build a data record. Returns `None` if `data` is longer than one record.
    pub fn data(address: u32, data: &[u8]) -> Option<Self> {
        Some(Self {
            address,
            record_type: RecordType::Data,
            payload: Vec::from_slice(data).ok()?,
        })
    }

    pub fn end_of_file() -> Self {
        Self {
            address: 0,
            record_type: RecordType::EndOfFile,
            payload: Vec::new(),
        }
    }

    pub fn byte_count(&self) -> u8 {
        self.payload.len() as u8
    }

    pub fn is_eof(&self) -> bool {
        self.record_type == RecordType::EndOfFile
    }

    /// Sum of all header and payload bytes, without the checksum.
    fn sum(&self) -> u8 {
        header_sum(self.byte_count(), self.address, self.record_type as u8)
            .wrapping_add(self.payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)))
    }

    pub fn checksum(&self) -> u8 {
        self.sum().wrapping_neg()
    }
}

fn header_sum(byte_count: u8, address: u32, record_type: u8) -> u8 {
    byte_count
        .wrapping_add((address >> 8) as u8)
        .wrapping_add(address as u8)
        .wrapping_add(record_type)
}

/// Value of one uppercase hex digit.
fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Parse `digits` hex characters at `pos`.
fn hex_field(line: &[u8], pos: usize, digits: usize) -> Result<u32, DecodeError> {
    let field = line.get(pos..pos + digits).ok_or(DecodeError::Truncated)?;
    let mut value = 0u32;
    for (i, &c) in field.iter().enumerate() {
        let n = nibble(c).ok_or(DecodeError::MalformedHexDigit {
            // report the start of the two-character pair
            position: pos + (i & !1),
        })?;
        value = (value << 4) | n as u32;
    }
    Ok(value)
}

fn hex_byte(line: &[u8], pos: usize) -> Result<u8, DecodeError> {
    hex_field(line, pos, 2).map(|v| v as u8)
}

/// The checksum pair at `pos` must be the last field on the line.
fn expect_line_end(line: &[u8], pos: usize) -> Result<(), DecodeError> {
    let end = pos + 2;
    if line.len() < end {
        return Err(DecodeError::Truncated);
    }
    if line.len() > end {
        return Err(DecodeError::TrailingData { position: end });
    }
    Ok(())
}

/// Decode one firmware line. Trailing CR/LF and spaces are ignored, any
/// other character after the checksum is an error.
pub fn decode(line: &[u8]) -> Result<FirmwareRecord, DecodeError> {
    let line = line.trim_ascii_end();

    match line.first() {
        Some(&START_CODE) => {}
        Some(_) => return Err(DecodeError::BadStartMarker),
        None => return Err(DecodeError::Truncated),
    }

    let mut pos = START_CODE_LEN;
    let byte_count = hex_byte(line, pos)?;
    pos += BYTE_COUNT_LEN;
    let address = hex_field(line, pos, ADDRESS_LEN)?;
    pos += ADDRESS_LEN;
    let raw_type = hex_byte(line, pos)?;
    pos += RECORD_TYPE_LEN;

    let record_type = match raw_type {
        0x00 => RecordType::Data,
        0x01 => RecordType::EndOfFile,
        other => return Err(DecodeError::UnsupportedRecordType(other)),
    };

    if record_type == RecordType::EndOfFile {
        // the checksum of an end-of-file line is optional and never checked
        if line.len() > pos {
            expect_line_end(line, pos)?;
        }
        return Ok(FirmwareRecord {
            address,
            record_type,
            payload: Vec::new(),
        });
    }

    if byte_count as usize > RECORD_SIZE {
        return Err(DecodeError::ByteCountTooLarge { count: byte_count });
    }

    let mut payload = Payload::new();
    let mut sum = header_sum(byte_count, address, raw_type);
    for _ in 0..byte_count {
        let b = hex_byte(line, pos)?;
        sum = sum.wrapping_add(b);
        // capacity checked above
        let _ = payload.push(b);
        pos += 2;
    }

    let checksum = hex_byte(line, pos)?;
    expect_line_end(line, pos)?;
    let sum = sum.wrapping_add(checksum);
    if sum != 0 {
        return Err(DecodeError::ChecksumMismatch { sum });
    }

    Ok(FirmwareRecord {
        address,
        record_type,
        payload,
    })
}

/// Format a record as one line: uppercase hex, fixed widths, no line ending.
pub fn encode(record: &FirmwareRecord) -> Line {
    let mut line = Line::new();
    // MAX_LINE_LEN covers a full record, so these writes cannot overflow.
    let _ = write!(
        line,
        ":{:02X}{:04X}{:02X}",
        record.byte_count(),
        record.address & 0xFFFF,
        record.record_type as u8
    );
    for b in &record.payload {
        let _ = write!(line, "{:02X}", b);
    }
    let _ = write!(line, "{:02X}", record.checksum());
    line
}
