// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Embedded firmware image: a raw byte blob laid out at the main firmware
//! partition's offsets, with the version field at `IMAGE_VERSION_OFFSET`.
//!
//! Auto-update does not parse text lines. It cuts the image into R-byte
//! synthetic records and feeds them to the write scheduler exactly as a
//! live stream would.

use crate::error::ImageError;
use crate::protocol::{PartitionId, IMAGE_VERSION_OFFSET, RECORD_SIZE};
use crate::record::FirmwareRecord;
use crate::version::VersionTriple;

/// Read the version triple stored at `offset`. Major and minor are masked to
/// four bits.
pub fn extract_version(image: &[u8], offset: usize) -> Option<VersionTriple> {
    let field = image.get(offset..offset + 3)?;
    Some(VersionTriple::new(field[0], field[1], field[2]))
}

pub fn image_size_bytes(image: &[u8]) -> u32 {
    image.len() as u32
}

/// A validated firmware image for the main firmware partition.
#[derive(Clone, Copy, Debug)]
pub struct FirmwareImage<'a> {
    data: &'a [u8],
    version: VersionTriple,
}

impl<'a> FirmwareImage<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, ImageError> {
        let max = PartitionId::MainFirmware.partition().size() as usize;
        if data.is_empty() {
            return Err(ImageError::Empty);
        }
        if data.len() % RECORD_SIZE != 0 {
            return Err(ImageError::PartialRecord { len: data.len() });
        }
        if data.len() > max {
            return Err(ImageError::TooLarge {
                len: data.len(),
                max,
            });
        }
        let version = extract_version(data, IMAGE_VERSION_OFFSET)
            .ok_or(ImageError::NoVersion { len: data.len() })?;

        Ok(Self { data, version })
    }

    pub fn version(&self) -> VersionTriple {
        self.version
    }

    pub fn size_bytes(&self) -> u32 {
        image_size_bytes(self.data)
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Number of data records, not counting the trailing end-of-file.
    pub fn record_count(&self) -> usize {
        self.data.len() / RECORD_SIZE
    }

    /// Synthetic records covering the image, then one end-of-file record.
    pub fn records(&self) -> ImageRecords<'a> {
        ImageRecords {
            chunks: self.data.chunks_exact(RECORD_SIZE),
            index: 0,
            count: self.record_count(),
            done: false,
        }
    }
}

/// Iterator returned by [`FirmwareImage::records`].
pub struct ImageRecords<'a> {
    chunks: core::slice::ChunksExact<'a, u8>,
    index: usize,
    count: usize,
    done: bool,
}

impl Iterator for ImageRecords<'_> {
    type Item = FirmwareRecord;

    fn next(&mut self) -> Option<FirmwareRecord> {
        if self.done {
            return None;
        }
        let Some(chunk) = self.chunks.next() else {
            self.done = true;
            return Some(FirmwareRecord::end_of_file());
        };

        let partition = PartitionId::MainFirmware.partition();
        // The last chunk always lands in the partition's last record slot.
        let address = if self.index + 1 == self.count {
            partition.last_record_addr()
        } else {
            partition.base + (self.index * RECORD_SIZE) as u32
        };
        self.index += 1;

        FirmwareRecord::data(address, chunk)
    }
}
