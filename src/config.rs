// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Compile-time limits and runtime decode/encode mode flags.
//!
//! Compile-time tunables (`alloc`, `without-64bit`, `errmsg`,
//! `encode-arrays-unpacked`, `convert-double-float`, `validate-utf8`) are
//! expressed as Cargo features rather than `#define`s; see the crate's
//! `Cargo.toml` for the full table. `MAX_REQUIRED_FIELDS` and the
//! decode/encode mode flags below are runtime values instead, since
//! nothing about them needs to vary the generated code shape.
//!
//! Two of the reference implementation's size knobs don't carry over:
//! `FIELD_32BIT` only widens the *struct* fields a C descriptor parser
//! stores its tag/offsets in, but [`crate::descriptor::FieldInfo`] already
//! uses native `u32`/`i32` fields unconditionally (it's a table generated
//! once, not a per-message-instance cost), so there is no narrower mode to
//! widen out of; `BUFFER_ONLY` would mean giving [`crate::stream`] a second,
//! concrete-slice-only set of stream types alongside its `dyn Read`/
//! `dyn Write`-based ones, which is a real structural fork left as a
//! follow-up rather than a flag that silently gates nothing.

use bitflags::bitflags;

/// Upper bound on how many `required` fields a single message may declare.
/// Backed by a fixed-width bitmap in the decoder so that required-field
/// tracking costs no heap allocation.
pub const MAX_REQUIRED_FIELDS: usize = 64;

bitflags! {
    /// Decode-time behavior flags, passed to `decode_ex`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct DecodeFlags: u32 {
        /// The destination struct is assumed already zero/default
        /// initialized; skip the defaulting-via-replay pass.
        const NOINIT = 0x01;
        /// The message is wrapped in its own length-prefixed outer frame:
        /// `decode_ex` reads a leading varint byte count and bounds the
        /// decode to exactly that many bytes, rather than assuming the
        /// caller already bounded `stream` to the message body.
        const DELIMITED = 0x02;
        /// The message is terminated by a zero tag byte rather than by a
        /// byte count or stream end.
        const NULLTERMINATED = 0x04;
    }
}

bitflags! {
    /// Encode-time behavior flags, passed to `encode_ex`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct EncodeFlags: u32 {
        /// Emit a zero tag byte after the last field instead of relying on
        /// the caller to track the message's length.
        const NULLTERMINATED = 0x04;
    }
}
