// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Tests for the firmware record codec.

use ocmflash_common::record::{decode, encode, FirmwareRecord, RecordType};
use ocmflash_common::DecodeError;

fn sample_record() -> FirmwareRecord {
    let payload: Vec<u8> = (0x00..0x10).collect();
    FirmwareRecord::data(0x1000, &payload).unwrap()
}

/// Replace the hex pair at `pos` with the byte `value`.
fn set_pair(line: &str, pos: usize, value: u8) -> String {
    let mut out = String::from(&line[..pos]);
    out.push_str(&format!("{:02X}", value));
    out.push_str(&line[pos + 2..]);
    out
}

fn pair_at(line: &str, pos: usize) -> u8 {
    u8::from_str_radix(&line[pos..pos + 2], 16).unwrap()
}

// =============================================================================
// encode tests
// =============================================================================

#[test]
fn test_encode_data_record() {
    let line = encode(&sample_record());
    assert_eq!(
        line.as_str(),
        ":10100000000102030405060708090A0B0C0D0E0F68"
    );
}

#[test]
fn test_encode_end_of_file() {
    let line = encode(&FirmwareRecord::end_of_file());
    assert_eq!(line.as_str(), ":00000001FF");
}

#[test]
fn test_encode_uses_low_16_address_bits() {
    let record = FirmwareRecord::data(0x0001_2340, &[0xAB]).unwrap();
    assert!(encode(&record).as_str().starts_with(":01234000AB"));
}

#[test]
fn test_data_rejects_oversized_payload() {
    assert!(FirmwareRecord::data(0, &[0u8; 17]).is_none());
}

// =============================================================================
// decode tests
// =============================================================================

#[test]
fn test_decode_data_record() {
    let record = decode(b":10100000000102030405060708090A0B0C0D0E0F68").unwrap();
    assert_eq!(record.address, 0x1000);
    assert_eq!(record.record_type, RecordType::Data);
    assert_eq!(record.byte_count(), 16);
    assert_eq!(record.payload[0x0F], 0x0F);
}

#[test]
fn test_decode_ignores_line_ending() {
    let record = decode(b":0400100001020304E2\r\n").unwrap();
    assert_eq!(record.address, 0x0010);
    assert_eq!(&record.payload[..], &[1, 2, 3, 4]);
}

#[test]
fn test_decode_end_of_file() {
    let record = decode(b":00000001FF").unwrap();
    assert!(record.is_eof());
    assert!(record.payload.is_empty());
}

#[test]
fn test_decode_end_of_file_skips_checksum() {
    let record = decode(b":0000000100").unwrap();
    assert!(record.is_eof());
}

#[test]
fn test_decode_bad_start_marker() {
    assert_eq!(
        decode(b";00000001FF"),
        Err(DecodeError::BadStartMarker)
    );
}

#[test]
fn test_decode_unsupported_record_type() {
    assert_eq!(
        decode(b":020000040800F2"),
        Err(DecodeError::UnsupportedRecordType(0x04))
    );
}

#[test]
fn test_decode_rejects_lowercase_hex() {
    assert_eq!(
        decode(b":0400100001020a04E2"),
        Err(DecodeError::MalformedHexDigit { position: 13 })
    );
}

#[test]
fn test_decode_malformed_checksum_digit() {
    assert_eq!(
        decode(b":0400100001020304EG"),
        Err(DecodeError::MalformedHexDigit { position: 17 })
    );
}

#[test]
fn test_decode_truncated_payload() {
    assert_eq!(decode(b":0400100001"), Err(DecodeError::Truncated));
}

#[test]
fn test_decode_missing_checksum() {
    assert_eq!(decode(b":0400100001020304"), Err(DecodeError::Truncated));
}

#[test]
fn test_decode_empty_line() {
    assert_eq!(decode(b""), Err(DecodeError::Truncated));
    assert_eq!(decode(b"\r\n"), Err(DecodeError::Truncated));
}

#[test]
fn test_decode_byte_count_too_large() {
    let line = format!(":11100000{}00", "00".repeat(17));
    assert_eq!(
        decode(line.as_bytes()),
        Err(DecodeError::ByteCountTooLarge { count: 0x11 })
    );
}

#[test]
fn test_decode_checksum_mismatch() {
    assert_eq!(
        decode(b":0400100001020304E3"),
        Err(DecodeError::ChecksumMismatch { sum: 0x01 })
    );
}

#[test]
fn test_decode_rejects_joined_records() {
    let first = FirmwareRecord::data(0x1000, &[0x11; 16]).unwrap();
    let second = FirmwareRecord::data(0x1010, &[0x22; 16]).unwrap();
    let joined = format!("{}{}", encode(&first), encode(&second));

    assert_eq!(
        decode(joined.as_bytes()),
        Err(DecodeError::TrailingData { position: 43 })
    );
}

#[test]
fn test_decode_rejects_junk_after_checksum() {
    assert_eq!(
        decode(b":0400100001020304E2DEADBEEF"),
        Err(DecodeError::TrailingData { position: 19 })
    );
    assert_eq!(
        decode(b":00000001FF:00000001FF"),
        Err(DecodeError::TrailingData { position: 11 })
    );
}

#[test]
fn test_decode_end_of_file_trailing_data() {
    assert!(decode(b":00000001").unwrap().is_eof());
    assert_eq!(
        decode(b":00000001FF00"),
        Err(DecodeError::TrailingData { position: 11 })
    );
}

// =============================================================================
// Round-trip and checksum properties
// =============================================================================

#[test]
fn test_round_trip_varied_records() {
    let records = [
        sample_record(),
        FirmwareRecord::data(0x8FF0, &[0xFF; 16]).unwrap(),
        FirmwareRecord::data(0x0000, &[]).unwrap(),
        FirmwareRecord::data(0xABCD, &[0x5A, 0xA5, 0x00]).unwrap(),
        FirmwareRecord::end_of_file(),
    ];
    for record in &records {
        let line = encode(record);
        assert_eq!(&decode(line.as_bytes()).unwrap(), record, "{}", line);
    }
}

#[test]
fn test_single_byte_mutation_breaks_checksum() {
    let record = sample_record();
    let line = encode(&record);
    let line = line.as_str();

    // address pairs, then every payload pair
    let positions = [3usize, 5]
        .into_iter()
        .chain((0..record.payload.len()).map(|i| 9 + 2 * i));

    for pos in positions {
        let original = pair_at(line, pos);
        for flip in [0x01u8, 0x80, 0xFF] {
            let mutated = set_pair(line, pos, original ^ flip);
            match decode(mutated.as_bytes()) {
                Err(DecodeError::ChecksumMismatch { sum }) => assert_ne!(sum, 0),
                other => panic!("{} at {} decoded to {:?}", mutated, pos, other),
            }
        }
    }
}

#[test]
fn test_checksum_is_twos_complement() {
    let record = sample_record();
    let sum = record
        .payload
        .iter()
        .fold(0x10u8 + 0x10 + 0x00 + 0x00, |acc, b| acc.wrapping_add(*b));
    assert_eq!(sum.wrapping_add(record.checksum()), 0);
}
