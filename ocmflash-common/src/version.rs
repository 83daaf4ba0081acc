// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware version triples and the update decision.

use core::fmt;

/// `major.minor.build`. Major and minor are 4-bit fields, build is 8 bits.
///
/// Field order makes the derived ordering compare major first, then minor,
/// then build: the first differing component decides.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionTriple {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
}

impl VersionTriple {
    pub fn new(major: u8, minor: u8, build: u8) -> Self {
        Self {
            major: major & 0x0F,
            minor: minor & 0x0F,
            build,
        }
    }

    /// Decode the resident version registers: major in the high nibble and
    /// minor in the low nibble of the first register, build in the second.
    pub fn from_registers(major_minor: u8, build: u8) -> Self {
        Self::new(major_minor >> 4, major_minor, build)
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}.{:X}.{:02X}", self.major, self.minor, self.build)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateDecision {
    NoUpdateNeeded,
    UpdateRequired,
}

/// Decide whether `image` should replace `resident`.
///
/// Walks major, minor, build and stops at the first component that differs.
/// The 8-bit build number is compared as-is, without wraparound handling.
pub fn update_decision(resident: VersionTriple, image: VersionTriple) -> UpdateDecision {
    if resident < image {
        UpdateDecision::UpdateRequired
    } else {
        UpdateDecision::NoUpdateNeeded
    }
}
