//! Sub-word lane arithmetic over the word-granular backing store.
//!
//! The backing store is an array of little-endian 32-bit words. Every
//! narrower access is a read/modify/write of the containing word. The merge
//! forms here are kept bit-for-bit identical to the reference memory model,
//! including the lane-3 byte form that masks with `0x00FF_FFFF` directly.

#![allow(clippy::cast_possible_truncation, clippy::cast_lossless)]

use crate::Fault;

/// Byte lanes per backing-store word.
pub const BYTE_LANES: u32 = 4;

/// Returns the byte lane (`0..=3`) an address selects within its word.
#[must_use]
pub const fn byte_lane(address: u32) -> u32 {
    address % BYTE_LANES
}

/// Extracts the byte in `lane` from a store word. Raw bit extraction,
/// never sign-extended.
#[must_use]
pub const fn extract_byte(word: u32, lane: u32) -> u8 {
    (word >> (8 * lane)) as u8
}

/// Merges `value` into the byte `lane` of a store word.
#[must_use]
pub const fn merge_byte(word: u32, lane: u32, value: u8) -> u32 {
    let value = value as u32;
    match lane {
        0 => (word & !0x0000_00FF) | value,
        1 => (word & !0x0000_FF00) | (value << 8),
        2 => (word & !0x00FF_0000) | (value << 16),
        // Reference form for the top lane; numerically the NOT-mask.
        _ => (word & 0x00FF_FFFF) | (value << 24),
    }
}

/// Extracts the halfword at word offset 0 or 2. Raw bit extraction.
#[must_use]
pub const fn extract_half(word: u32, lane: u32) -> u16 {
    if lane == 0 {
        word as u16
    } else {
        (word >> 16) as u16
    }
}

/// Merges `value` into the halfword at word offset 0 or 2.
#[must_use]
pub const fn merge_half(word: u32, lane: u32, value: u16) -> u32 {
    let value = value as u32;
    if lane == 0 {
        (word & !0x0000_FFFF) | value
    } else {
        (word & 0x0000_FFFF) | (value << 16)
    }
}

/// Validates alignment for 2-byte accesses: word offsets 0 and 2 only.
///
/// # Errors
///
/// Returns [`Fault::AlignmentFault`] when `address % 4` is odd.
pub const fn validate_half_alignment(address: u32) -> Result<(), Fault> {
    match byte_lane(address) {
        0 | 2 => Ok(()),
        _ => Err(Fault::AlignmentFault { address, size: 2 }),
    }
}

/// Validates alignment for 4-byte accesses: word offset 0 only.
///
/// # Errors
///
/// Returns [`Fault::AlignmentFault`] when `address % 4 != 0`.
pub const fn validate_word_alignment(address: u32) -> Result<(), Fault> {
    if byte_lane(address) == 0 {
        Ok(())
    } else {
        Err(Fault::AlignmentFault { address, size: 4 })
    }
}

/// Validates alignment for halfword code fetches: even addresses only.
///
/// # Errors
///
/// Returns [`Fault::AlignmentFault`] when `address` is odd.
pub const fn validate_fetch_alignment(address: u32) -> Result<(), Fault> {
    if address % 2 == 0 {
        Ok(())
    } else {
        Err(Fault::AlignmentFault { address, size: 2 })
    }
}
