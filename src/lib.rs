// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A size-conscious proto2/proto3 wire codec driven by a packed
//! field-descriptor table, rather than by generated per-message encode and
//! decode functions.
//!
//! A message type is described once, at compile time or by a build script,
//! as a [`descriptor::MessageDescriptor`]: a table of field records packing
//! wire type, repetition discipline, storage discipline and struct offsets
//! into a few `u32` words per field. [`encode::encode`] and
//! [`decode::decode`] then walk that table against a concrete `#[repr(C)]`
//! struct to serialize or parse it — the struct layout itself, and the code
//! that turns a `.proto` file into a descriptor table, are both out of
//! scope for this crate.
//!
//! ```text
//! wire       base varint/zigzag/fixed/tag primitives (no allocation)
//! stream     bounded input/output streams, substreams, sizing pass
//! descriptor packed field-type byte, variable-width field-info records
//! field_iter walks a descriptor against a message instance -> FieldView
//! encode     dispatch: per-field encode across storage/repetition kinds
//! decode     dispatch: per-field decode, defaulting, required tracking
//! storage    dynamic (heap) field allocation and release
//! extension  proto2 extension range records and resolution
//! utf8       strict UTF-8 grammar validation for `string` fields
//! config     compile-time limits and decode/encode mode flags
//! ```
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod extension;
pub mod field_iter;
pub mod storage;
pub mod stream;
pub mod utf8;
pub mod wire;

pub use decode::{decode, decode_ex};
pub use descriptor::{
    Allocation, DecodeCallback, EncodeCallback, FieldCallbacks, FieldInfo, FieldType, LogicalType,
    MessageDescriptor, Repetition, SubmessageInfo,
};
pub use encode::{encode, encode_ex};
pub use error::{Error, Result};
pub use field_iter::{FieldIter, FieldView};
