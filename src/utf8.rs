// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Strict UTF-8 grammar validation for `string` fields, gated behind the
//! `validate-utf8` feature.
//!
//! `str::from_utf8` in the standard library is already a correct UTF-8
//! validator, but proto3's `string` type is narrower than "valid UTF-8" in
//! one respect the reference implementation enforces explicitly: it also
//! rejects the two noncharacters `U+FFFE` and `U+FFFF`, which are
//! structurally valid UTF-8 but not valid Unicode scalar values for
//! interchange. This module ports that stricter grammar directly rather
//! than layering an extra noncharacter check on top of `str::from_utf8`,
//! so the accept/reject boundary matches the reference implementation
//! byte-for-byte.

use crate::error::{Error, Result};

/// Validates that `bytes` is both well-formed UTF-8 (no overlong
/// encodings, no encoded surrogate halves, no codepoint above `U+10FFFF`)
/// and free of the `U+FFFE`/`U+FFFF` noncharacters.
pub fn validate(bytes: &[u8]) -> Result<()> {
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        let len = if b0 & 0x80 == 0 {
            1
        } else if b0 & 0xE0 == 0xC0 {
            2
        } else if b0 & 0xF0 == 0xE0 {
            3
        } else if b0 & 0xF8 == 0xF0 {
            4
        } else {
            return Err(Error::InvalidUtf8);
        };

        if i + len > bytes.len() {
            return Err(Error::InvalidUtf8);
        }

        for &cont in &bytes[i + 1..i + len] {
            if cont & 0xC0 != 0x80 {
                return Err(Error::InvalidUtf8);
            }
        }

        let codepoint: u32 = match len {
            1 => b0 as u32,
            2 => ((b0 as u32 & 0x1F) << 6) | (bytes[i + 1] as u32 & 0x3F),
            3 => {
                ((b0 as u32 & 0x0F) << 12)
                    | ((bytes[i + 1] as u32 & 0x3F) << 6)
                    | (bytes[i + 2] as u32 & 0x3F)
            }
            _ => {
                ((b0 as u32 & 0x07) << 18)
                    | ((bytes[i + 1] as u32 & 0x3F) << 12)
                    | ((bytes[i + 2] as u32 & 0x3F) << 6)
                    | (bytes[i + 3] as u32 & 0x3F)
            }
        };

        let min_for_len = match len {
            1 => 0,
            2 => 0x80,
            3 => 0x800,
            _ => 0x10000,
        };
        if codepoint < min_for_len {
            // Overlong encoding: the same codepoint could have been
            // expressed in fewer bytes.
            return Err(Error::InvalidUtf8);
        }
        if (0xD800..=0xDFFF).contains(&codepoint) {
            // A lone (or even paired) UTF-16 surrogate half has no
            // business appearing in UTF-8 at all.
            return Err(Error::InvalidUtf8);
        }
        if codepoint > 0x10FFFF {
            return Err(Error::InvalidUtf8);
        }
        if codepoint == 0xFFFE || codepoint == 0xFFFF {
            return Err(Error::InvalidUtf8);
        }

        i += len;
    }
    Ok(())
}
