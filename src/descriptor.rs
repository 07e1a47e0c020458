// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The packed field-descriptor model: a per-message table of variable-width
//! records, each describing one field's wire type, repetition discipline,
//! storage discipline, tag number and in-struct offsets.
//!
//! A [`FieldType`] byte packs three 2-to-4-bit groups:
//!
//! ```text
//! bit:   7 6 5 4 3 2 1 0
//!        [ATYPE][HTYPE][  LTYPE  ]
//! ```
//!
//! `LTYPE` (bits 0-3) is the logical wire representation, `HTYPE` (bits 4-5)
//! is the repetition discipline, `ATYPE` (bits 6-7) is the storage/
//! allocation discipline. This mirrors the reference implementation's
//! `pb_type_t` byte exactly so that descriptor tables generated against the
//! C ABI could, in principle, be read by this crate unmodified.

use crate::error::{Error, Result};

pub const LTYPE_MASK: u8 = 0x0F;
pub const HTYPE_MASK: u8 = 0x30;
pub const ATYPE_MASK: u8 = 0xC0;

/// Logical wire representation of a single field value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LogicalType {
    Bool = 0x00,
    Varint = 0x01,
    UVarint = 0x02,
    SVarint = 0x03,
    Fixed32 = 0x04,
    Fixed64 = 0x05,
    Bytes = 0x06,
    String = 0x07,
    Submessage = 0x08,
    SubmsgWithCallback = 0x09,
    Extension = 0x0A,
    FixedLengthBytes = 0x0B,
}

impl LogicalType {
    pub const LAST_PACKABLE: u8 = LogicalType::Fixed64 as u8;

    fn from_u8(b: u8) -> Result<Self> {
        use LogicalType::*;
        Ok(match b {
            0x00 => Bool,
            0x01 => Varint,
            0x02 => UVarint,
            0x03 => SVarint,
            0x04 => Fixed32,
            0x05 => Fixed64,
            0x06 => Bytes,
            0x07 => String,
            0x08 => Submessage,
            0x09 => SubmsgWithCallback,
            0x0A => Extension,
            0x0B => FixedLengthBytes,
            _ => return Err(Error::InvalidFieldType),
        })
    }

    /// Whether this logical type is eligible for packed-array encoding
    /// (scalar, fixed-width-on-the-wire types only; strings/bytes/
    /// submessages are never packable).
    pub fn is_packable(self) -> bool {
        (self as u8) <= Self::LAST_PACKABLE
    }

    pub fn is_submessage(self) -> bool {
        matches!(self, LogicalType::Submessage | LogicalType::SubmsgWithCallback)
    }
}

/// Repetition discipline: how many instances of the field a message may
/// carry and how presence is tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Repetition {
    /// Proto2 `required`: decode fails if absent, encode always emits it.
    Required = 0x00,
    /// Proto2 `optional` / proto3 singular field: a `has_*` flag or
    /// zero-suppression decides presence.
    Optional = 0x10,
    /// `repeated`: backed by an array plus a running element count.
    Repeated = 0x20,
    /// A `oneof` arm: storage shared with its siblings, discriminated by
    /// a tag stored alongside.
    Oneof = 0x30,
}

impl Repetition {
    fn from_u8(b: u8) -> Self {
        match b {
            0x00 => Repetition::Required,
            0x10 => Repetition::Optional,
            0x20 => Repetition::Repeated,
            _ => Repetition::Oneof,
        }
    }
}

/// Storage discipline: where the field's bytes live relative to the
/// enclosing struct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Allocation {
    /// Inline in the struct (fixed-size array for repeated fields).
    Static = 0x00,
    /// A user-supplied callback owns encoding/decoding; the struct only
    /// stores the callback's state pointer.
    Callback = 0x40,
    /// Heap-allocated and owned by the struct (`alloc` feature); released
    /// recursively when the message is dropped or re-decoded.
    Pointer = 0x80,
}

impl Allocation {
    fn from_u8(b: u8) -> Self {
        match b {
            0x00 => Allocation::Static,
            0x40 => Allocation::Callback,
            _ => Allocation::Pointer,
        }
    }
}

/// The packed type byte for one field, plus accessors that unpack its
/// three component disciplines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldType(pub u8);

impl FieldType {
    pub const fn new(logical: LogicalType, repetition: Repetition, allocation: Allocation) -> Self {
        FieldType(logical as u8 | repetition as u8 | allocation as u8)
    }

    pub fn logical(self) -> Result<LogicalType> {
        LogicalType::from_u8(self.0 & LTYPE_MASK)
    }

    pub fn repetition(self) -> Repetition {
        Repetition::from_u8(self.0 & HTYPE_MASK)
    }

    pub fn allocation(self) -> Allocation {
        Allocation::from_u8(self.0 & ATYPE_MASK)
    }

    pub fn is_packable(self) -> bool {
        self.logical().map(LogicalType::is_packable).unwrap_or(false)
    }

    pub fn is_submessage(self) -> bool {
        self.logical().map(LogicalType::is_submessage).unwrap_or(false)
    }
}

/// One decoded field-info record: the fully unpacked form of a descriptor
/// table entry, as produced by [`decode_field_info`].
///
/// `data_offset`/`size_offset`/`array_size` are offsets and counts measured
/// in bytes/elements within the enclosing Rust struct; [`crate::field_iter`]
/// turns these into raw pointers against a concrete message instance.
#[derive(Clone, Copy, Debug)]
pub struct FieldInfo {
    pub tag: u32,
    pub field_type: FieldType,
    /// Byte offset of the field's own storage, relative to the previous
    /// field's data offset (as in the reference format) — resolved to an
    /// absolute offset by the caller that walks the table.
    pub data_offset: i32,
    /// Offset from `data_offset` to the field's `size`/`has` companion
    /// value (repeated-count, oneof discriminator, or presence flag).
    /// Absent for `Required` scalar fields, which carry no companion.
    pub size_offset: i32,
    /// For `Repeated`/`FixArray`, the capacity of the inline array. For
    /// `FixedLengthBytes`, the fixed byte length. Unused otherwise.
    pub array_size: u32,
    /// Size in bytes of a single element (or, for `FixedLengthBytes`, of
    /// the whole field).
    pub data_size: u32,
    /// For submessage fields: the nested message's own descriptor index,
    /// resolved by the caller against [`MessageDescriptor::submessages`].
    pub submsg_index: Option<usize>,
}

/// Decodes one field-info record from a `u32`-word descriptor slice,
/// returning the parsed [`FieldInfo`] and the number of words consumed (1,
/// 2, 4 or 8) — ported field-for-field from the reference implementation's
/// `load_descriptor_values`.
///
/// Word 0's low byte is always the size-in-words selector: a field whose
/// tag, offsets and array size all fit in the narrowest encoding only
/// consumes 1 word; a submessage with a large tag or with pointer offsets
/// spanning more than 15 bytes needs the widest, 8-word encoding.
pub fn decode_field_info(words: &[u32]) -> Result<(FieldInfo, usize)> {
    if words.is_empty() {
        return Err(Error::InvalidFieldDescriptor);
    }
    let w0 = words[0];
    let field_type = FieldType((w0 & 0xFF) as u8);
    let size_selector = (w0 >> 8) & 0x03;

    match size_selector {
        // 1-word format: tiny tag, data_offset, a 0-15 size_offset
        // magnitude (no sign, so size_offset can never be negative in
        // this width) and array_size, all packed into the remaining 24
        // bits of word 0.
        0 => {
            let tag = (w0 >> 10) & 0x3F;
            let data_offset = ((w0 >> 16) & 0x0F) as i32;
            let size_offset = ((w0 >> 20) & 0x0F) as i32;
            let array_size = (w0 >> 24) & 0x0F;
            if tag == 0 {
                return Err(Error::InvalidFieldDescriptor);
            }
            Ok((
                FieldInfo {
                    tag,
                    field_type,
                    data_offset,
                    size_offset,
                    array_size,
                    data_size: builtin_data_size(field_type)?,
                    submsg_index: None,
                },
                1,
            ))
        }
        // 2-word format: wider tag and array_size in word 0, offsets
        // promoted into word 1 as two signed 16-bit halves.
        1 => {
            if words.len() < 2 {
                return Err(Error::InvalidFieldDescriptor);
            }
            let tag = (w0 >> 10) & 0x3FF;
            let array_size = (w0 >> 20) & 0xFFF;
            let w1 = words[1];
            let data_offset = (w1 & 0xFFFF) as i16 as i32;
            let size_offset = ((w1 >> 16) & 0xFFFF) as i16 as i32;
            if tag == 0 {
                return Err(Error::InvalidFieldDescriptor);
            }
            Ok((
                FieldInfo {
                    tag,
                    field_type,
                    data_offset,
                    size_offset,
                    array_size,
                    data_size: builtin_data_size(field_type)?,
                    submsg_index: None,
                },
                2,
            ))
        }
        // 4-word format: full 32-bit tag, array_size and data_size each
        // get their own word; size_offset is a true signed byte
        // (negative size_offset marks "no companion value", used for
        // e.g. a STATIC oneof arm that reuses a shared discriminator
        // living before the union in struct layout order).
        2 => {
            if words.len() < 4 {
                return Err(Error::InvalidFieldDescriptor);
            }
            let tag = w0 >> 16;
            let data_offset = words[1] as i32;
            let size_offset = (words[2] & 0xFF) as i8 as i32;
            let array_size = words[2] >> 8;
            let data_size = words[3];
            if tag == 0 {
                return Err(Error::InvalidFieldDescriptor);
            }
            Ok((
                FieldInfo {
                    tag,
                    field_type,
                    data_offset,
                    size_offset,
                    array_size,
                    data_size,
                    submsg_index: None,
                },
                4,
            ))
        }
        // 8-word format: as 4-word, plus a trailing submsg_index word for
        // submessage/submsg-with-callback fields whose nested descriptor
        // needs an explicit out-of-band index (the widest, least common
        // encoding).
        _ => {
            if words.len() < 8 {
                return Err(Error::InvalidFieldDescriptor);
            }
            let tag = w0 >> 16;
            let data_offset = words[1] as i32;
            let size_offset = (words[2] & 0xFF) as i8 as i32;
            let array_size = words[2] >> 8;
            let data_size = words[3];
            let submsg_index = if field_type.is_submessage() {
                Some(words[4] as usize)
            } else {
                None
            };
            if tag == 0 {
                return Err(Error::InvalidFieldDescriptor);
            }
            Ok((
                FieldInfo {
                    tag,
                    field_type,
                    data_offset,
                    size_offset,
                    array_size,
                    data_size,
                    submsg_index,
                },
                8,
            ))
        }
    }
}

/// The built-in storage size, in bytes, of scalar logical types that carry
/// no explicit `data_size` word (1/2-word descriptor formats). Submessage,
/// bytes, string and fixed-length-bytes fields always use a wider format
/// that carries an explicit `data_size`, so they never reach here.
fn builtin_data_size(field_type: FieldType) -> Result<u32> {
    use LogicalType::*;
    Ok(match field_type.logical()? {
        Bool | Varint | UVarint | SVarint => 4,
        Fixed32 => 4,
        Fixed64 => 8,
        _ => return Err(Error::InvalidFieldDescriptor),
    })
}

/// A user-supplied field callback: invoked for `Allocation::Callback`
/// fields during encode or decode. `state` is an opaque, type-erased
/// pointer into the enclosing message struct's callback-state slot.
///
/// Stored as a plain function pointer (not a boxed closure) so that
/// [`MessageDescriptor`] can remain `'static` and `Sync`, shared freely
/// across threads without any per-call allocation.
pub type EncodeCallback =
    fn(stream: &mut crate::stream::OutputStream<'_>, field: &FieldInfo, state: *const ()) -> Result<()>;
pub type DecodeCallback =
    fn(stream: &mut crate::stream::InputStream<'_>, field: &FieldInfo, state: *mut ()) -> Result<()>;

/// One nested submessage reference, resolved from a field's
/// `submsg_index`.
#[derive(Clone, Copy)]
pub struct SubmessageInfo {
    pub descriptor: &'static MessageDescriptor,
}

/// The pair of callbacks a message registers to implement every
/// `Allocation::Callback` field generically: one dispatcher handles every
/// callback-typed field in the message, switching on [`FieldInfo::tag`]
/// internally, rather than each field carrying its own function pointer.
#[derive(Clone, Copy)]
pub struct FieldCallbacks {
    pub encode: EncodeCallback,
    pub decode: DecodeCallback,
}

/// A complete, immutable description of one message type: its field table,
/// nested-submessage table, serialized-defaults blob and required-field
/// count. Built once (by a code generator, out of scope here) and shared
/// as a `'static` reference by every encode/decode call against that
/// message type.
pub struct MessageDescriptor {
    pub fields: &'static [FieldInfo],
    pub submessages: &'static [SubmessageInfo],
    /// A message serialized with every field at its declared default,
    /// replayed by the decoder to seed defaults before decoding begins.
    pub default_value: &'static [u8],
    pub required_field_count: u32,
    pub largest_tag: u32,
    /// Dispatcher for every `Allocation::Callback` field this message
    /// declares, or `None` if it declares none.
    pub field_callback: Option<FieldCallbacks>,
}

impl MessageDescriptor {
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
