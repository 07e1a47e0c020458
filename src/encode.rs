// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Encoder dispatch: walks a message's field table, emitting each present
//! field in tag order, with packed-array and two-pass submessage-sizing
//! support.

use crate::config::EncodeFlags;
use crate::descriptor::{Allocation, FieldCallbacks, FieldInfo, LogicalType, MessageDescriptor, Repetition};
use crate::error::{Error, Result};
use crate::extension::ExtensionRange;
use crate::field_iter::{self, FieldIter, FieldView};
use crate::stream::OutputStream;
use crate::wire::{self, WireType};

/// Encodes `base` (an instance of the message type `descriptor` describes)
/// into `stream`.
///
/// # Safety
/// `base` must point to a valid, initialized instance of the message type
/// `descriptor` describes, and must remain valid for the call's duration.
pub unsafe fn encode(
    stream: &mut OutputStream<'_>,
    descriptor: &MessageDescriptor,
    base: *const u8,
) -> Result<()> {
    encode_ex(stream, descriptor, base, None, EncodeFlags::empty())
}

/// As [`encode`], with an optional extension list and mode flags.
///
/// # Safety
/// Same preconditions as [`encode`].
pub unsafe fn encode_ex(
    stream: &mut OutputStream<'_>,
    descriptor: &MessageDescriptor,
    base: *const u8,
    extensions: Option<&ExtensionRange<'_>>,
    flags: EncodeFlags,
) -> Result<()> {
    #[cfg(feature = "tracing")]
    tracing::trace!(field_count = descriptor.field_count(), "encoding message");

    let mut iter = FieldIter::begin(descriptor, base as *mut u8);
    while let Some(view) = iter.next() {
        encode_field(stream, &view, descriptor.field_callback)?;
    }

    let mut ext = extensions;
    while let Some(node) = ext {
        if !node.found.get() {
            encode_extension(stream, node)?;
        }
        ext = node.next;
    }

    if flags.contains(EncodeFlags::NULLTERMINATED) {
        stream.encode_varint(0)?;
    }

    Ok(())
}

fn encode_extension(stream: &mut OutputStream<'_>, node: &ExtensionRange<'_>) -> Result<()> {
    let view = FieldView {
        tag: node.info.tag,
        info: node.info,
        p_data: node.destination,
        p_size: None,
        submsg_desc: None,
    };
    unsafe { encode_field(stream, &view, None) }
}

unsafe fn encode_field(
    stream: &mut OutputStream<'_>,
    view: &FieldView,
    field_callback: Option<FieldCallbacks>,
) -> Result<()> {
    let info = view.info;
    let logical = info.field_type.logical()?;
    let repetition = info.field_type.repetition();
    let allocation = info.field_type.allocation();

    if allocation == Allocation::Callback {
        return encode_callback_field(stream, view, field_callback);
    }

    match repetition {
        Repetition::Repeated => encode_repeated(stream, view, logical, allocation),
        Repetition::Oneof => {
            if view.read_size() == 0 {
                return Ok(());
            }
            encode_single(stream, view, logical, allocation)
        }
        Repetition::Optional => {
            if !is_present(view, logical) {
                return Ok(());
            }
            encode_single(stream, view, logical, allocation)
        }
        Repetition::Required => encode_single(stream, view, logical, allocation),
    }
}

/// `Allocation::Callback` dispatch: the struct stores only an opaque state
/// pointer at the field's location, and a single message-level dispatcher
/// (switching on `field.tag` internally) writes everything — including the
/// tag itself — for every callback-typed field.
unsafe fn encode_callback_field(
    stream: &mut OutputStream<'_>,
    view: &FieldView,
    field_callback: Option<FieldCallbacks>,
) -> Result<()> {
    let Some(callbacks) = field_callback else {
        return Ok(());
    };
    let state = *(view.p_data as *const *const ());
    if state.is_null() {
        return Ok(());
    }
    (callbacks.encode)(stream, &view.info, state)
}

/// Proto3 zero-suppression: a singular, non-`has`-tracked scalar field is
/// only emitted when its value differs from the all-zero default. A
/// singular submessage is "present" only when at least one of its own
/// fields would itself be emitted (checked recursively), matching the
/// reference implementation's `pb_check_proto3_default_value`.
unsafe fn is_present(view: &FieldView, logical: LogicalType) -> bool {
    if matches!(logical, LogicalType::Bytes | LogicalType::String) {
        // `p_size` for these two types holds a byte length, not a has-flag
        // (see `byte_slice`), so the generic bool fast path below would
        // misread it; presence is non-emptiness instead.
        return !byte_slice(view).is_empty();
    }

    if view.p_size.is_some() {
        // The field has an explicit has-flag (proto2 optional, or a
        // message-typed proto3 field with presence tracking): trust it.
        return view.read_size() != 0;
    }

    if logical.is_submessage() {
        if let Some(submsg) = view.submsg_desc {
            let mut sub_iter = FieldIter::begin(submsg, view.p_data);
            while let Some(sub_view) = sub_iter.next() {
                let sub_logical = match sub_view.info.field_type.logical() {
                    Ok(l) => l,
                    Err(_) => continue,
                };
                if is_present(&sub_view, sub_logical) {
                    return true;
                }
            }
            return false;
        }
        return false;
    }

    match logical {
        LogicalType::Bool => *(view.p_data as *const bool),
        LogicalType::Varint | LogicalType::SVarint => {
            field_iter::read_signed(view.p_data, view.info.data_size) != 0
        }
        LogicalType::UVarint => field_iter::read_unsigned(view.p_data, view.info.data_size) != 0,
        LogicalType::Fixed32 => *(view.p_data as *const u32) != 0,
        LogicalType::Fixed64 => fixed64_is_nonzero(view.p_data, view.info.data_size),
        LogicalType::Bytes | LogicalType::String | LogicalType::FixedLengthBytes => {
            !byte_slice(view).is_empty()
        }
        LogicalType::Extension | LogicalType::SubmsgWithCallback => true,
    }
}

/// Reads a `Fixed64`-typed field's storage as "is it the all-zero value",
/// honoring `convert-double-float`'s narrow `f32` storage (`data_size ==
/// 4`) alongside the ordinary 8-byte `u64`/`i64`/`f64` storage.
///
/// # Safety
/// `ptr` must be valid for a read of `data_size` bytes.
unsafe fn fixed64_is_nonzero(ptr: *const u8, data_size: u32) -> bool {
    #[cfg(feature = "convert-double-float")]
    {
        if data_size == 4 {
            return *(ptr as *const f32) != 0.0;
        }
    }
    #[cfg(not(feature = "convert-double-float"))]
    let _ = data_size;
    *(ptr as *const u64) != 0
}

/// Reads a `Bytes`/`String`/`FixedLengthBytes` field's content as a slice.
/// `FixedLengthBytes` has no length companion (the length is the
/// descriptor's `array_size`, fixed at compile time); the other two use
/// a heap- or inline-allocated buffer prefixed or companioned by a length.
unsafe fn byte_slice<'a>(view: &FieldView) -> &'a [u8] {
    let logical = view.info.field_type.logical().unwrap_or(LogicalType::Bytes);
    if logical == LogicalType::FixedLengthBytes {
        return core::slice::from_raw_parts(view.p_data, view.info.array_size as usize);
    }
    let len = match view.p_size {
        Some(p) => *(p as *const usize),
        None => 0,
    };
    let data_ptr = match view.info.field_type.allocation() {
        Allocation::Pointer => *(view.p_data as *const *const u8),
        _ => view.p_data,
    };
    if data_ptr.is_null() {
        return &[];
    }
    core::slice::from_raw_parts(data_ptr, len)
}

unsafe fn encode_repeated(
    stream: &mut OutputStream<'_>,
    view: &FieldView,
    logical: LogicalType,
    allocation: Allocation,
) -> Result<()> {
    let count = view.read_size();
    if count == 0 {
        return Ok(());
    }

    let base_ptr = match allocation {
        Allocation::Pointer => *(view.p_data as *const *const u8),
        _ => view.p_data,
    };
    if base_ptr.is_null() {
        return Ok(());
    }

    let packed = logical.is_packable() && !cfg!(feature = "encode-arrays-unpacked");

    if packed {
        stream.encode_tag(WireType::String, view.tag)?;
        stream.encode_length_delimited(|inner| {
            for i in 0..count {
                let elem_ptr = base_ptr.add(i * view.info.data_size as usize);
                encode_scalar_value(inner, elem_ptr, logical, view.info.data_size)?;
            }
            Ok(())
        })
    } else {
        for i in 0..count {
            let elem_ptr = base_ptr.add(i * view.info.data_size as usize);
            encode_one_value(stream, view, elem_ptr, logical)?;
        }
        Ok(())
    }
}

unsafe fn encode_single(
    stream: &mut OutputStream<'_>,
    view: &FieldView,
    logical: LogicalType,
    allocation: Allocation,
) -> Result<()> {
    // A pointer-allocated submessage, bytes or string field stores the
    // heap buffer's address at `p_data`, not the buffer itself — every
    // other allocation/logical-type combination keeps its bytes inline at
    // `p_data` directly.
    let is_heap_pointer = allocation == Allocation::Pointer
        && matches!(
            logical,
            LogicalType::Submessage
                | LogicalType::SubmsgWithCallback
                | LogicalType::Bytes
                | LogicalType::String
        );
    let data_ptr = if is_heap_pointer {
        *(view.p_data as *const *const u8)
    } else {
        view.p_data
    };
    if is_heap_pointer && data_ptr.is_null() {
        // "Pointer field with null pointer: skip" — except a `required`
        // field with no payload at all is a hard encode error.
        if view.info.field_type.repetition() == Repetition::Required {
            return Err(Error::MissingRequiredField);
        }
        return Ok(());
    }
    encode_one_value(stream, view, data_ptr, logical)
}

unsafe fn encode_one_value(
    stream: &mut OutputStream<'_>,
    view: &FieldView,
    data_ptr: *const u8,
    logical: LogicalType,
) -> Result<()> {
    match logical {
        LogicalType::Submessage | LogicalType::SubmsgWithCallback => {
            stream.encode_tag(WireType::String, view.tag)?;
            let submsg = view.submsg_desc.ok_or(Error::InvalidFieldDescriptor)?;
            stream.encode_length_delimited(|inner| encode_ex(
                inner,
                submsg,
                data_ptr,
                None,
                EncodeFlags::empty(),
            ))
        }
        LogicalType::Bytes | LogicalType::String | LogicalType::FixedLengthBytes => {
            let bytes = byte_slice_for_ptr(view, data_ptr, logical);
            #[cfg(feature = "validate-utf8")]
            if logical == LogicalType::String {
                crate::utf8::validate(bytes)?;
            }
            stream.encode_tag(WireType::String, view.tag)?;
            stream.encode_string(bytes)
        }
        _ => {
            stream.encode_tag(wire_type_for(logical), view.tag)?;
            encode_scalar_value(stream, data_ptr, logical, view.info.data_size)
        }
    }
}

unsafe fn byte_slice_for_ptr<'a>(view: &FieldView, data_ptr: *const u8, logical: LogicalType) -> &'a [u8] {
    if logical == LogicalType::FixedLengthBytes {
        return core::slice::from_raw_parts(data_ptr, view.info.array_size as usize);
    }
    if view.info.field_type.repetition() == Repetition::Repeated {
        // Each slot of a repeated bytes/string array is self-describing: an
        // embedded length prefix followed by up to `data_size -
        // size_of::<usize>()` content bytes. There is only one `p_size`
        // companion per field, shared by every element as the element
        // count, so a per-element length has nowhere else to live.
        if data_ptr.is_null() {
            return &[];
        }
        let len = *(data_ptr as *const usize);
        let content = data_ptr.add(core::mem::size_of::<usize>());
        return core::slice::from_raw_parts(content, len);
    }
    let len = match view.p_size {
        Some(p) => *(p as *const usize),
        None => 0,
    };
    if data_ptr.is_null() {
        return &[];
    }
    core::slice::from_raw_parts(data_ptr, len)
}

fn wire_type_for(logical: LogicalType) -> WireType {
    match logical {
        LogicalType::Fixed32 => WireType::Bit32,
        LogicalType::Fixed64 => WireType::Bit64,
        _ => WireType::Varint,
    }
}

unsafe fn encode_scalar_value(
    stream: &mut OutputStream<'_>,
    ptr: *const u8,
    logical: LogicalType,
    data_size: u32,
) -> Result<()> {
    #[cfg(feature = "without-64bit")]
    if data_size == 8 {
        return Err(Error::InvalidDataSize);
    }
    match logical {
        LogicalType::Bool => stream.encode_varint(*(ptr as *const bool) as u64),
        LogicalType::Varint => stream.encode_varint(field_iter::read_signed(ptr, data_size) as u64),
        LogicalType::UVarint => stream.encode_varint(field_iter::read_unsigned(ptr, data_size)),
        LogicalType::SVarint => stream.encode_svarint(field_iter::read_signed(ptr, data_size)),
        LogicalType::Fixed32 => stream.encode_fixed32(*(ptr as *const u32)),
        LogicalType::Fixed64 => encode_fixed64_value(stream, ptr, data_size),
        _ => Err(Error::InvalidFieldType),
    }
}

/// Writes a `Fixed64` field's 8-byte wire value, narrowing `f32` storage
/// (`data_size == 4`, under `convert-double-float`) up to the `double`
/// wire representation first; ordinary 8-byte storage is written as its
/// raw bit pattern, same as every other `Fixed64`-typed value.
///
/// # Safety
/// `ptr` must be valid for a read of `data_size` bytes.
unsafe fn encode_fixed64_value(stream: &mut OutputStream<'_>, ptr: *const u8, data_size: u32) -> Result<()> {
    #[cfg(feature = "convert-double-float")]
    {
        if data_size == 4 {
            let narrow = *(ptr as *const f32);
            return stream.encode_fixed64(wire::widen_float_to_double(narrow).to_bits());
        }
    }
    #[cfg(not(feature = "convert-double-float"))]
    let _ = data_size;
    stream.encode_fixed64(*(ptr as *const u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Allocation as A, FieldType, LogicalType as L, Repetition as R};

    #[repr(C)]
    struct Simple {
        value: u64,
    }

    static FIELDS: [FieldInfo; 1] = [FieldInfo {
        tag: 1,
        field_type: FieldType::new(L::UVarint, R::Required, A::Static),
        data_offset: 0,
        size_offset: 0,
        array_size: 0,
        data_size: 8,
        submsg_index: None,
    }];

    static DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &FIELDS,
        submessages: &[],
        default_value: &[],
        required_field_count: 1,
        largest_tag: 1,
        field_callback: None,
    };

    #[test]
    fn encodes_uint32_150_scenario() {
        // Scenario 1 from the testable-properties fixtures: uint32 = 150,
        // field 1 -> 08 96 01.
        let msg = Simple { value: 150 };
        let mut buf = Vec::new();
        let mut stream = OutputStream::new(&mut buf, 16);
        unsafe {
            encode(&mut stream, &DESCRIPTOR, &msg as *const Simple as *const u8).unwrap();
        }
        assert_eq!(buf, vec![0x08, 0x96, 0x01]);
    }

    #[test]
    fn sizing_pass_matches_real_pass() {
        let msg = Simple { value: 300 };
        let mut sizing = OutputStream::sizing();
        unsafe {
            encode(&mut sizing, &DESCRIPTOR, &msg as *const Simple as *const u8).unwrap();
        }
        let mut buf = Vec::new();
        let mut real = OutputStream::new(&mut buf, 16);
        unsafe {
            encode(&mut real, &DESCRIPTOR, &msg as *const Simple as *const u8).unwrap();
        }
        assert_eq!(sizing.bytes_written(), real.bytes_written());
        assert_eq!(buf.len() as u64, sizing.bytes_written());
    }

    #[repr(C)]
    struct Proto3Singular {
        value: u32,
    }

    static PROTO3_FIELDS: [FieldInfo; 1] = [FieldInfo {
        tag: 1,
        field_type: FieldType::new(L::UVarint, R::Optional, A::Static),
        data_offset: 0,
        size_offset: 0,
        array_size: 0,
        data_size: 4,
        submsg_index: None,
    }];

    static PROTO3_DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &PROTO3_FIELDS,
        submessages: &[],
        default_value: &[],
        required_field_count: 0,
        largest_tag: 1,
        field_callback: None,
    };

    #[test]
    fn proto3_singular_with_zero_low_byte_is_not_suppressed() {
        // A has-flag-less `Optional` field is "present" iff its value is
        // non-zero, not iff its first byte is non-zero. 256 is 0x00 0x01
        // 0x00 0x00 little-endian: a buggy has-flag read of the low byte
        // would wrongly treat this as absent and suppress it.
        let msg = Proto3Singular { value: 256 };
        let mut buf = Vec::new();
        let mut stream = OutputStream::new(&mut buf, 16);
        unsafe {
            encode(&mut stream, &PROTO3_DESCRIPTOR, &msg as *const Proto3Singular as *const u8)
                .unwrap();
        }
        assert_eq!(buf, vec![0x08, 0x80, 0x02]);
    }

    #[test]
    fn proto3_singular_zero_value_is_suppressed() {
        let msg = Proto3Singular { value: 0 };
        let mut buf = Vec::new();
        let mut stream = OutputStream::new(&mut buf, 16);
        unsafe {
            encode(&mut stream, &PROTO3_DESCRIPTOR, &msg as *const Proto3Singular as *const u8)
                .unwrap();
        }
        assert!(buf.is_empty());
    }

    #[cfg(feature = "convert-double-float")]
    #[repr(C)]
    struct NarrowedDouble {
        value: f32,
    }

    #[cfg(feature = "convert-double-float")]
    static NARROWED_FIELDS: [FieldInfo; 1] = [FieldInfo {
        tag: 1,
        field_type: FieldType::new(L::Fixed64, R::Required, A::Static),
        data_offset: 0,
        size_offset: 0,
        array_size: 0,
        data_size: 4,
        submsg_index: None,
    }];

    #[cfg(feature = "convert-double-float")]
    static NARROWED_DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &NARROWED_FIELDS,
        submessages: &[],
        default_value: &[],
        required_field_count: 1,
        largest_tag: 1,
        field_callback: None,
    };

    #[cfg(feature = "convert-double-float")]
    #[test]
    fn f32_storage_widens_to_double_on_the_wire() {
        // `data_size == 4` on a `Fixed64` field means the struct stores
        // `f32`; the wire value is still a full 8-byte `double`.
        let msg = NarrowedDouble { value: 1.5 };
        let mut buf = Vec::new();
        let mut stream = OutputStream::new(&mut buf, 16);
        unsafe {
            encode(&mut stream, &NARROWED_DESCRIPTOR, &msg as *const NarrowedDouble as *const u8)
                .unwrap();
        }
        assert_eq!(buf[0], (1u8 << 3) | 1);
        assert_eq!(f64::from_le_bytes(buf[1..9].try_into().unwrap()), 1.5f64);
    }
}
