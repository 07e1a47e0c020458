// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire-format primitives: varints, zigzag (svarint), fixed32/fixed64 and
//! tag framing. These are the only functions in the crate that know about
//! the actual byte layout Google's Protocol Buffers uses on the wire; every
//! higher-level module builds on top of them.
//!
//! Condensed reference:
//!
//! ```reference
//! message    := (tag value)*
//! tag        := (field << 3) bit-or wire_type; encoded as uint32 varint
//! value      := varint      for wire_type == VARINT,
//!               fixed32/64  for wire_type == BIT32/BIT64,
//!               len-prefix  for wire_type == STRING
//! ```

use crate::error::{Error, Result};

/// The 3-bit wire type carried in the low bits of every tag. Group types
/// (3, 4) are obsolete and rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Bit64 = 1,
    String = 2,
    Bit32 = 5,
}

impl WireType {
    pub fn from_u8(b: u8) -> Result<Self> {
        match b {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Bit64),
            2 => Ok(WireType::String),
            5 => Ok(WireType::Bit32),
            _ => Err(Error::InvalidWireType),
        }
    }
}

/// Splits a tag into `(field_number, wire_type)`. Field number 0 is only
/// legal as the null-terminator sentinel; callers that see it as a real
/// field must reject with [`Error::ZeroTag`].
#[inline]
pub fn split_tag(tag: u64) -> Result<(u32, WireType)> {
    let wire_type = WireType::from_u8((tag & 0x07) as u8)?;
    let field_number = (tag >> 3) as u32;
    Ok((field_number, wire_type))
}

#[inline]
pub fn make_tag(field_number: u32, wire_type: WireType) -> u64 {
    ((field_number as u64) << 3) | wire_type as u64
}

/// Number of bytes `encode_varint` would write for `value`.
#[inline]
pub fn varint_len(value: u64) -> usize {
    // Matches the bit-counting trick used by protobuf's C++ implementation:
    // one byte per 7 bits of significance, minimum one byte.
    (((value | 1).leading_zeros() ^ 63) as usize * 9 + 73) / 64
}

/// Encodes `value` as a base-128 varint, 7 bits per byte, continuation bit
/// `0x80`, into `out`.
pub fn encode_varint(value: u64, out: &mut Vec<u8>) {
    let mut value = value;
    loop {
        if value < 0x80 {
            out.push(value as u8);
            return;
        }
        out.push(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
}

/// Decodes a varint from `bytes` into a full 64-bit destination, returning
/// `(value, bytes_consumed)`. Rejects a 65-bit-or-wider encoding.
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut bitpos: u32 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if bitpos >= 64 {
            return Err(Error::VarintOverflow);
        }
        result |= ((byte & 0x7F) as u64) << bitpos;
        bitpos += 7;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }
    Err(Error::EndOfStream)
}

/// Decodes a varint into a 32-bit destination, tolerating the legacy
/// ten-byte sign-extended encoding that a conforming encoder still emits
/// for negative values stored in `int32`-or-narrower fields (a conforming
/// encoder always widens negative values to a full 64-bit two's
/// complement varint before writing, even when the destination field is
/// narrower).
///
/// Trailing bytes beyond the 32nd significant bit must either be zero
/// (harmless padding on a small positive value) or, once the running
/// result's top bit is already set, the canonical sign-extension byte
/// (`0xFF` for interior extension bytes, `0x01` for the 10th and final
/// byte) — this is how the widened negative varint is read back
/// correctly by a 32-bit or narrower decoder.
///
/// `decode_varint32(&encode_varint(-1i64 as u64)).0 as i16 == -1`, the
/// regression named in the testable-properties fixtures.
pub fn decode_varint32(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut iter = bytes.iter();
    let first = *iter.next().ok_or(Error::EndOfStream)?;
    if first & 0x80 == 0 {
        return Ok((first as u32, 1));
    }

    let mut result: u32 = (first & 0x7F) as u32;
    let mut bitpos: u32 = 7;
    let mut consumed = 1usize;
    loop {
        let byte = *iter.next().ok_or(Error::EndOfStream)?;
        consumed += 1;

        if bitpos >= 32 {
            // The varint could have trailing 0x80 bytes, or 0xFF for negative.
            let sign_extension: u8 = if bitpos < 63 { 0xFF } else { 0x01 };
            let valid_extension =
                (byte & 0x7F) == 0x00 || (result >> 31 != 0 && byte == sign_extension);
            if bitpos >= 64 || !valid_extension {
                return Err(Error::VarintOverflow);
            }
        } else {
            result |= ((byte & 0x7F) as u32) << bitpos;
        }
        bitpos += 7;

        if byte & 0x80 == 0 {
            if bitpos == 35 && (byte & 0x70) != 0 {
                // Last byte landed at bitpos=28, so only the bottom 4 bits fit.
                return Err(Error::VarintOverflow);
            }
            return Ok((result, consumed));
        }
    }
}

#[inline]
pub fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[inline]
pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

#[inline]
pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

pub fn encode_fixed32(value: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn encode_fixed64(value: u64, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn decode_fixed32(bytes: &[u8]) -> Result<u32> {
    let arr: [u8; 4] = bytes.try_into().map_err(|_| Error::EndOfStream)?;
    Ok(u32::from_le_bytes(arr))
}

pub fn decode_fixed64(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| Error::EndOfStream)?;
    Ok(u64::from_le_bytes(arr))
}

/// Narrows a `double` wire value to `f32` storage, IEEE-754-correct
/// round-to-nearest behavior via a native cast (Rust's `as` conversion
/// between float types is defined to round to nearest, ties to even,
/// and saturates out-of-range magnitudes to infinity, matching the
/// rounding contract described for `CONVERT_DOUBLE_FLOAT`).
#[inline]
pub fn narrow_double_to_float(value: f64) -> f32 {
    value as f32
}

/// Widens a float value to the `double` wire representation for encoding
/// a `float` storage field as a 64-bit wire value.
#[inline]
pub fn widen_float_to_double(value: f32) -> f64 {
    value as f64
}
