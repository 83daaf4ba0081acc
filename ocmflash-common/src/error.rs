// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error types shared by the codec, the controller and the scheduler.

use core::fmt::{self, Debug, Display};

/// Why a firmware record line could not be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The line does not start with `:`.
    BadStartMarker,
    /// Only data (00) and end-of-file (01) records are supported.
    UnsupportedRecordType(u8),
    /// A two-character field at `position` is not uppercase hexadecimal.
    MalformedHexDigit { position: usize },
    /// The line ends before the fields its header announces.
    Truncated,
    /// The record carries more payload than the write buffer half can hold.
    ByteCountTooLarge { count: u8 },
    /// The 8-bit sum over the record is `sum` instead of zero.
    ChecksumMismatch { sum: u8 },
    /// Characters follow the checksum, starting at `position`.
    TrailingData { position: usize },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::BadStartMarker => write!(f, "bad start code"),
            DecodeError::UnsupportedRecordType(t) => write!(f, "unsupported record type {:02X}", t),
            DecodeError::MalformedHexDigit { position } => {
                write!(f, "malformed hex digit at column {}", position)
            }
            DecodeError::Truncated => write!(f, "record line is truncated"),
            DecodeError::ByteCountTooLarge { count } => write!(
                f,
                "byte count {} exceeds {}",
                count,
                crate::protocol::RECORD_SIZE
            ),
            DecodeError::ChecksumMismatch { sum } => {
                write!(f, "checksum error (sum = 0x{:02X})", sum)
            }
            DecodeError::TrailingData { position } => {
                write!(f, "unexpected data after checksum at column {}", position)
            }
        }
    }
}

/// Why an embedded firmware image cannot be used for auto-update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageError {
    Empty,
    /// The image length is not a whole number of records.
    PartialRecord { len: usize },
    /// The image does not fit the main firmware partition.
    TooLarge { len: usize, max: usize },
    /// The image ends before the version field.
    NoVersion { len: usize },
}

impl Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::Empty => write!(f, "firmware image is empty"),
            ImageError::PartialRecord { len } => write!(
                f,
                "image length {} is not a multiple of {}",
                len,
                crate::protocol::RECORD_SIZE
            ),
            ImageError::TooLarge { len, max } => {
                write!(f, "image length {} exceeds partition size {}", len, max)
            }
            ImageError::NoVersion { len } => {
                write!(f, "image length {} too short for version field", len)
            }
        }
    }
}

/// Errors of a flash operation against a target reached through a bus
/// whose transaction error type is `E`.
#[derive(Debug)]
pub enum Error<E> {
    /// A register transaction failed. Not retried.
    Bus(E),
    /// The power collaborator failed; details are logged.
    Power,
    /// The target did not answer the probe read.
    BusUnreachable,
    Decode(DecodeError),
    Image(ImageError),
    /// Record address is not a multiple of the record size.
    MisalignedAddress { address: u32 },
    /// The address stream fell outside the four ping/pong cases.
    Sequence { address: u32, previous: u32 },
    InvalidPartitionId(u8),
    /// The write session already ended.
    SessionClosed,
}

impl<E> From<DecodeError> for Error<E> {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl<E> From<ImageError> for Error<E> {
    fn from(e: ImageError) -> Self {
        Error::Image(e)
    }
}

impl<E: Debug> Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus transaction failed: {:?}", e),
            Error::Power => write!(f, "target power control failed"),
            Error::BusUnreachable => write!(f, "target does not answer on the bus"),
            Error::Decode(e) => write!(f, "HEX file error: {}", e),
            Error::Image(e) => write!(f, "{}", e),
            Error::MisalignedAddress { address } => write!(
                f,
                "address 0x{:04X} is not {} bytes aligned",
                address,
                crate::protocol::RECORD_SIZE
            ),
            Error::Sequence { address, previous } => write!(
                f,
                "internal error: record at 0x{:04X} after 0x{:04X} fits no write case",
                address, previous
            ),
            Error::InvalidPartitionId(id) => write!(f, "partition id {} is invalid", id),
            Error::SessionClosed => write!(f, "write session already finished"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

#[cfg(feature = "std")]
impl std::error::Error for ImageError {}

#[cfg(feature = "std")]
impl<E: Debug> std::error::Error for Error<E> {}
