// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error kinds shared by the stream, encoder and decoder. Every internal
//! operation returns a `Result`; the first error produced for a given call
//! wins and is propagated unchanged to the caller ("sticky" in the spirit of
//! the original C implementation's `errmsg` pointer).
//!
//! The `errmsg` feature gates the per-variant diagnostic strings (and the
//! `Display`/`std::error::Error` impls that expose them) matching the
//! spec's `NO_ERRMSG` option: with the feature off, none of that text is
//! compiled in and a caller can still discriminate failures by matching on
//! the `Error` variant itself — "errors remain discoverable via return
//! value" rather than by string.

/// Crate-wide result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Every failure kind the wire codec can produce.
///
/// Variants are grouped the way the reference implementation groups its
/// error strings: stream exhaustion, wire format, schema, size/bounds,
/// encoding-side, content and dynamic-storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "errmsg", derive(thiserror::Error))]
#[non_exhaustive]
pub enum Error {
    #[cfg_attr(feature = "errmsg", error("end of stream"))]
    EndOfStream,
    #[cfg_attr(feature = "errmsg", error("io error"))]
    Io,
    #[cfg_attr(feature = "errmsg", error("stream full"))]
    StreamFull,
    #[cfg_attr(feature = "errmsg", error("parent stream too short"))]
    ParentStreamTooShort,

    #[cfg_attr(feature = "errmsg", error("varint overflow"))]
    VarintOverflow,
    #[cfg_attr(feature = "errmsg", error("invalid wire type"))]
    InvalidWireType,
    #[cfg_attr(feature = "errmsg", error("wrong wire type"))]
    WrongWireType,
    #[cfg_attr(feature = "errmsg", error("zero tag"))]
    ZeroTag,

    #[cfg_attr(feature = "errmsg", error("invalid field type"))]
    InvalidFieldType,
    #[cfg_attr(feature = "errmsg", error("invalid field descriptor"))]
    InvalidFieldDescriptor,
    #[cfg_attr(feature = "errmsg", error("invalid extension"))]
    InvalidExtension,
    #[cfg_attr(feature = "errmsg", error("missing required field"))]
    MissingRequiredField,
    #[cfg_attr(feature = "errmsg", error("invalid union tag"))]
    InvalidUnionTag,

    #[cfg_attr(feature = "errmsg", error("array overflow"))]
    ArrayOverflow,
    #[cfg_attr(feature = "errmsg", error("too many array entries"))]
    TooManyArrayEntries,
    #[cfg_attr(feature = "errmsg", error("array max size exceeded"))]
    ArrayMaxSizeExceeded,
    #[cfg_attr(feature = "errmsg", error("bytes overflow"))]
    BytesOverflow,
    #[cfg_attr(feature = "errmsg", error("string overflow"))]
    StringOverflow,
    #[cfg_attr(feature = "errmsg", error("size too large"))]
    SizeTooLarge,
    #[cfg_attr(feature = "errmsg", error("incorrect fixed length bytes size"))]
    IncorrectFixedLengthBytesSize,
    #[cfg_attr(feature = "errmsg", error("wrong size for fixed count field"))]
    WrongSizeForFixedCountField,

    #[cfg_attr(feature = "errmsg", error("submsg size changed"))]
    SubmsgSizeChanged,
    #[cfg_attr(feature = "errmsg", error("unterminated string"))]
    UnterminatedString,
    #[cfg_attr(feature = "errmsg", error("zero-length string"))]
    ZeroLengthString,

    #[cfg_attr(feature = "errmsg", error("invalid utf8"))]
    InvalidUtf8,

    #[cfg_attr(feature = "errmsg", error("realloc failed"))]
    AllocFailed,
    #[cfg_attr(feature = "errmsg", error("no malloc support"))]
    NoAllocSupport,

    #[cfg_attr(feature = "errmsg", error("callback failed"))]
    CallbackFailed,

    #[cfg_attr(feature = "errmsg", error("integer too large"))]
    IntegerTooLarge,
    #[cfg_attr(feature = "errmsg", error("invalid data_size"))]
    InvalidDataSize,
}
