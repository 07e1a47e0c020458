// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoder dispatch: walks a message's field table against the wire,
//! seeding proto2 defaults before the first byte is read, tracking which
//! `required` fields showed up, and growing heap storage for `Pointer`
//! fields on demand.
//!
//! This mirrors [`crate::encode`] field for field: the same
//! [`crate::field_iter::FieldIter`] walk, the same three storage
//! disciplines, the same explicit [`crate::extension::ExtensionRange`]
//! parameter instead of descriptor-embedded extension slots.

use crate::config::DecodeFlags;
use crate::descriptor::{Allocation, FieldCallbacks, LogicalType, MessageDescriptor, Repetition};
use crate::error::{Error, Result};
use crate::extension::ExtensionRange;
use crate::field_iter::{self, FieldIter, FieldView};
use crate::stream::InputStream;
use crate::wire::{self, WireType};

/// Decodes into `base` (an instance of the message type `descriptor`
/// describes), first seeding every field with its declared default.
///
/// # Safety
/// `base` must point to storage large enough and correctly laid out for
/// the message type `descriptor` describes, valid for the call's duration.
pub unsafe fn decode(
    stream: &mut InputStream<'_>,
    descriptor: &MessageDescriptor,
    base: *mut u8,
) -> Result<()> {
    decode_ex(stream, descriptor, base, None, DecodeFlags::empty())
}

/// As [`decode`], with an optional extension list and mode flags.
///
/// # Safety
/// Same preconditions as [`decode`].
pub unsafe fn decode_ex(
    stream: &mut InputStream<'_>,
    descriptor: &MessageDescriptor,
    base: *mut u8,
    extensions: Option<&ExtensionRange<'_>>,
    flags: DecodeFlags,
) -> Result<()> {
    #[cfg(feature = "tracing")]
    tracing::trace!(field_count = descriptor.field_count(), "decoding message");

    if !flags.contains(DecodeFlags::NOINIT) {
        apply_defaults(descriptor, base)?;
    }

    let result = decode_body(stream, descriptor, base, extensions, flags);

    if result.is_err() {
        // Whatever got decoded before the failure may have grown heap
        // storage (pointer fields, extensions); release it rather than
        // leaving the caller with a half-populated, leak-prone message.
        #[cfg(feature = "alloc")]
        crate::storage::release(descriptor, base);
    }

    result
}

fn decode_body(
    stream: &mut InputStream<'_>,
    descriptor: &MessageDescriptor,
    base: *mut u8,
    extensions: Option<&ExtensionRange<'_>>,
    flags: DecodeFlags,
) -> Result<()> {
    if flags.contains(DecodeFlags::DELIMITED) {
        let mut sub = stream.make_string_substream()?;
        match unsafe { decode_loop(&mut sub, descriptor, base, extensions, flags) } {
            Ok(mask) => {
                stream.close_string_substream(sub)?;
                check_required(descriptor, mask)
            }
            Err(e) => Err(e),
        }
    } else {
        let mask = unsafe { decode_loop(stream, descriptor, base, extensions, flags) }?;
        check_required(descriptor, mask)
    }
}

fn check_required(descriptor: &MessageDescriptor, mask: u64) -> Result<()> {
    let count = descriptor.required_field_count;
    let all = if count >= 64 { u64::MAX } else { (1u64 << count) - 1 };
    if mask & all == all {
        Ok(())
    } else {
        Err(Error::MissingRequiredField)
    }
}

/// Returns the bit index a `Required` field's tag should set in the
/// tracking bitmap, counting required fields in descriptor table order
/// (stable regardless of the order fields actually arrive on the wire).
fn required_bit_index(descriptor: &MessageDescriptor, tag: u32) -> Option<u32> {
    let mut index = 0u32;
    for field in descriptor.fields {
        if field.field_type.repetition() == Repetition::Required {
            if field.tag == tag {
                return Some(index);
            }
            index += 1;
        }
    }
    None
}

/// The per-call dispatch loop: reads tags until the stream (or an explicit
/// zero tag, under `NULLTERMINATED`) runs out, returning the accumulated
/// required-field bitmap for the caller to check.
unsafe fn decode_loop(
    stream: &mut InputStream<'_>,
    descriptor: &MessageDescriptor,
    base: *mut u8,
    extensions: Option<&ExtensionRange<'_>>,
    flags: DecodeFlags,
) -> Result<u64> {
    let mut iter = FieldIter::begin(descriptor, base);
    let mut required_mask: u64 = 0;
    let mut pointer_state = PointerArrayState::default();

    loop {
        // A tag right at the message boundary is a clean end-of-message;
        // only a tag byte actually read as zero is the NULLTERMINATED
        // sentinel, handled below.
        if stream.bytes_left() == 0 {
            break;
        }

        let Some((tag, wire_type)) = stream.decode_tag()? else {
            if flags.contains(DecodeFlags::NULLTERMINATED) {
                break;
            }
            return Err(Error::ZeroTag);
        };

        if let Some(bit) = required_bit_index(descriptor, tag) {
            required_mask |= 1u64 << bit;
        }

        match iter.find(tag)? {
            Some(view) => {
                decode_field(
                    stream,
                    descriptor,
                    base,
                    &view,
                    wire_type,
                    descriptor.field_callback,
                    &mut pointer_state,
                )?;
            }
            None => match ExtensionRange::find(extensions, tag) {
                Some(ext) => {
                    ext.found.set(true);
                    let view = FieldView {
                        tag: ext.info.tag,
                        info: ext.info,
                        p_data: ext.destination,
                        p_size: None,
                        submsg_desc: None,
                    };
                    decode_field(stream, descriptor, base, &view, wire_type, None, &mut pointer_state)?;
                }
                None => stream.skip_field(wire_type)?,
            },
        }
    }

    Ok(required_mask)
}

unsafe fn decode_field(
    stream: &mut InputStream<'_>,
    descriptor: &MessageDescriptor,
    base: *mut u8,
    view: &FieldView,
    wire_type: WireType,
    field_callback: Option<FieldCallbacks>,
    pointer_state: &mut PointerArrayState,
) -> Result<()> {
    let info = view.info;
    let logical = info.field_type.logical()?;
    let repetition = info.field_type.repetition();
    let allocation = info.field_type.allocation();

    if allocation == Allocation::Callback {
        return decode_callback_field(stream, view, field_callback, wire_type);
    }

    match repetition {
        Repetition::Repeated => decode_repeated(stream, view, logical, allocation, wire_type, pointer_state),
        Repetition::Oneof => decode_oneof(stream, descriptor, base, view, logical, allocation, wire_type),
        Repetition::Optional => {
            decode_single(stream, view, logical, allocation, wire_type)?;
            if !matches!(logical, LogicalType::Bytes | LogicalType::String) {
                view.write_size(1);
            }
            Ok(())
        }
        Repetition::Required => decode_single(stream, view, logical, allocation, wire_type),
    }
}

/// `Allocation::Callback` dispatch: a single message-level function handles
/// every callback-typed field, switching on `field.tag` internally. A field
/// whose state pointer is null, or a message with no registered
/// dispatcher, has the wire value skipped rather than discarded as an
/// error — an unregistered callback field behaves like an unknown field.
unsafe fn decode_callback_field(
    stream: &mut InputStream<'_>,
    view: &FieldView,
    field_callback: Option<FieldCallbacks>,
    wire_type: WireType,
) -> Result<()> {
    let Some(callbacks) = field_callback else {
        return stream.skip_field(wire_type);
    };
    let state = *(view.p_data as *const *mut ());
    if state.is_null() {
        return stream.skip_field(wire_type);
    }
    (callbacks.decode)(stream, &view.info, state)
}

/// A `oneof`'s shared union storage is switched to a new arm: release the
/// previous arm's heap payload (if any) and, for a static submessage arm,
/// zero and re-default the payload before decoding into it. Re-decoding
/// the *same* arm twice in a row (a legal merge) skips all of this.
unsafe fn decode_oneof(
    stream: &mut InputStream<'_>,
    descriptor: &MessageDescriptor,
    base: *mut u8,
    view: &FieldView,
    logical: LogicalType,
    allocation: Allocation,
    wire_type: WireType,
) -> Result<()> {
    let current_tag = match view.p_size {
        Some(p) => *(p as *const u32),
        None => 0,
    };

    #[cfg(not(feature = "alloc"))]
    let _ = (descriptor, base);

    if current_tag != view.tag {
        #[cfg(feature = "alloc")]
        if current_tag != 0 && allocation == Allocation::Pointer {
            release_previous_oneof_arm(descriptor, base, current_tag);
        }
        if allocation == Allocation::Static && logical.is_submessage() {
            core::ptr::write_bytes(view.p_data, 0, view.info.data_size as usize);
            if let Some(submsg) = view.submsg_desc {
                apply_defaults(submsg, view.p_data)?;
            }
        }
    }

    view.write_size(1);
    decode_single(stream, view, logical, allocation, wire_type)
}

#[cfg(feature = "alloc")]
unsafe fn release_previous_oneof_arm(descriptor: &MessageDescriptor, base: *mut u8, old_tag: u32) {
    let mut lookup = FieldIter::begin(descriptor, base);
    if let Ok(Some(old_view)) = lookup.find(old_tag) {
        crate::storage::release_field(&old_view);
    }
}

unsafe fn decode_single(
    stream: &mut InputStream<'_>,
    view: &FieldView,
    logical: LogicalType,
    allocation: Allocation,
    wire_type: WireType,
) -> Result<()> {
    match logical {
        LogicalType::Submessage | LogicalType::SubmsgWithCallback => {
            expect_wire_type(wire_type, WireType::String)?;
            let submsg = view.submsg_desc.ok_or(Error::InvalidFieldDescriptor)?;
            let data_ptr = match allocation {
                Allocation::Pointer => {
                    let slot = view.p_data as *mut *mut u8;
                    if (*slot).is_null() {
                        #[cfg(feature = "alloc")]
                        {
                            let ptr = crate::storage::allocate(view.info.data_size as usize, 1)?;
                            core::ptr::write_bytes(ptr.as_ptr(), 0, view.info.data_size as usize);
                            apply_defaults(submsg, ptr.as_ptr())?;
                            *slot = ptr.as_ptr();
                        }
                        #[cfg(not(feature = "alloc"))]
                        {
                            return Err(Error::NoAllocSupport);
                        }
                    }
                    *slot
                }
                _ => view.p_data,
            };
            let mut sub = stream.make_string_substream()?;
            decode_ex(&mut sub, submsg, data_ptr, None, DecodeFlags::NOINIT)?;
            stream.close_string_substream(sub)
        }
        LogicalType::Bytes | LogicalType::String | LogicalType::FixedLengthBytes => {
            decode_bytes_field(stream, view, logical, allocation, wire_type)
        }
        LogicalType::Extension => Err(Error::InvalidFieldType),
        _ => {
            expect_wire_type(wire_type, wire_type_for(logical))?;
            decode_scalar_into(stream, view.p_data, logical, view.info.data_size)
        }
    }
}

/// Decodes a singular (non-repeated) `Bytes`/`String`/`FixedLengthBytes`
/// field. Unlike a repeated element, a singular field's length lives in
/// its own `p_size` companion rather than an embedded prefix.
unsafe fn decode_bytes_field(
    stream: &mut InputStream<'_>,
    view: &FieldView,
    logical: LogicalType,
    allocation: Allocation,
    wire_type: WireType,
) -> Result<()> {
    expect_wire_type(wire_type, WireType::String)?;
    let len = stream.decode_varint32()? as usize;

    if logical == LogicalType::FixedLengthBytes {
        if len != view.info.array_size as usize {
            return Err(Error::IncorrectFixedLengthBytesSize);
        }
        let mut body = vec![0u8; len];
        stream.read(&mut body)?;
        core::ptr::copy_nonoverlapping(body.as_ptr(), view.p_data, len);
        return Ok(());
    }

    let content_ptr: *const u8 = match allocation {
        Allocation::Pointer => {
            #[cfg(feature = "alloc")]
            {
                let slot = view.p_data as *mut *mut u8;
                let old = *slot;
                let new_ptr = crate::storage::allocate(1, len)?;
                let mut body = vec![0u8; len];
                stream.read(&mut body)?;
                core::ptr::copy_nonoverlapping(body.as_ptr(), new_ptr.as_ptr(), len);
                if let Some(old_nn) = core::ptr::NonNull::new(old) {
                    let old_len = match view.p_size {
                        Some(p) => *(p as *const usize),
                        None => 0,
                    };
                    crate::storage::deallocate(old_nn, 1, old_len);
                }
                *slot = new_ptr.as_ptr();
                new_ptr.as_ptr()
            }
            #[cfg(not(feature = "alloc"))]
            {
                return Err(Error::NoAllocSupport);
            }
        }
        _ => {
            let capacity = view.info.data_size as usize;
            if len > capacity {
                return Err(if logical == LogicalType::String {
                    Error::StringOverflow
                } else {
                    Error::BytesOverflow
                });
            }
            let mut body = vec![0u8; len];
            stream.read(&mut body)?;
            core::ptr::copy_nonoverlapping(body.as_ptr(), view.p_data, len);
            view.p_data
        }
    };

    #[cfg(feature = "validate-utf8")]
    if logical == LogicalType::String {
        let slice = core::slice::from_raw_parts(content_ptr, len);
        crate::utf8::validate(slice)?;
    }
    #[cfg(not(feature = "validate-utf8"))]
    let _ = content_ptr;

    if let Some(p) = view.p_size {
        *(p as *mut usize) = len;
    }
    Ok(())
}

unsafe fn decode_repeated(
    stream: &mut InputStream<'_>,
    view: &FieldView,
    logical: LogicalType,
    allocation: Allocation,
    wire_type: WireType,
    pointer_state: &mut PointerArrayState,
) -> Result<()> {
    if logical.is_packable() && wire_type == WireType::String {
        let mut sub = stream.make_string_substream()?;
        let scalar_wire = wire_type_for(logical);
        while sub.bytes_left() > 0 {
            append_repeated_element(&mut sub, view, logical, allocation, scalar_wire, pointer_state)?;
        }
        return stream.close_string_substream(sub);
    }
    append_repeated_element(stream, view, logical, allocation, wire_type, pointer_state)
}

/// Appends one element to a repeated field, growing `Pointer` storage via
/// [`PointerArrayState`] or rejecting an over-capacity `Static` array with
/// [`Error::ArrayOverflow`].
unsafe fn append_repeated_element(
    stream: &mut InputStream<'_>,
    view: &FieldView,
    logical: LogicalType,
    allocation: Allocation,
    wire_type: WireType,
    pointer_state: &mut PointerArrayState,
) -> Result<()> {
    let info = view.info;
    let current = view.read_size();

    match allocation {
        Allocation::Static => {
            let capacity = info.array_size as usize;
            if current >= capacity {
                return Err(Error::ArrayOverflow);
            }
            let elem_ptr = view.p_data.add(current * info.data_size as usize);
            if logical.is_submessage() {
                core::ptr::write_bytes(elem_ptr, 0, info.data_size as usize);
                if let Some(submsg) = view.submsg_desc {
                    apply_defaults(submsg, elem_ptr)?;
                }
            }
            decode_element_value(stream, elem_ptr, view, logical, wire_type)?;
            view.write_size(current + 1);
        }
        Allocation::Pointer => {
            #[cfg(feature = "alloc")]
            {
                let slot = view.p_data as *mut *mut u8;
                let needed = current + 1;
                let elem_base = pointer_state.ensure(view.tag, slot, info.data_size, current, needed)?;
                let elem_ptr = elem_base.add(current * info.data_size as usize);
                if logical.is_submessage() {
                    core::ptr::write_bytes(elem_ptr, 0, info.data_size as usize);
                    if let Some(submsg) = view.submsg_desc {
                        apply_defaults(submsg, elem_ptr)?;
                    }
                }
                decode_element_value(stream, elem_ptr, view, logical, wire_type)?;
                view.write_size(needed);
            }
            #[cfg(not(feature = "alloc"))]
            {
                return Err(Error::NoAllocSupport);
            }
        }
        Allocation::Callback => return Err(Error::InvalidFieldType),
    }
    Ok(())
}

/// Decodes one repeated-array element's value at `elem_ptr`, which must
/// already be zeroed (and, for a submessage element, re-defaulted) by the
/// caller. `Bytes`/`String` elements carry their own embedded length
/// prefix; see [`crate::encode::byte_slice_for_ptr`]'s matching read.
unsafe fn decode_element_value(
    stream: &mut InputStream<'_>,
    elem_ptr: *mut u8,
    view: &FieldView,
    logical: LogicalType,
    wire_type: WireType,
) -> Result<()> {
    match logical {
        LogicalType::Submessage | LogicalType::SubmsgWithCallback => {
            expect_wire_type(wire_type, WireType::String)?;
            let submsg = view.submsg_desc.ok_or(Error::InvalidFieldDescriptor)?;
            let mut sub = stream.make_string_substream()?;
            decode_ex(&mut sub, submsg, elem_ptr, None, DecodeFlags::NOINIT)?;
            stream.close_string_substream(sub)
        }
        LogicalType::FixedLengthBytes => {
            expect_wire_type(wire_type, WireType::String)?;
            let len = stream.decode_varint32()? as usize;
            if len != view.info.array_size as usize {
                return Err(Error::IncorrectFixedLengthBytesSize);
            }
            let mut body = vec![0u8; len];
            stream.read(&mut body)?;
            core::ptr::copy_nonoverlapping(body.as_ptr(), elem_ptr, len);
            Ok(())
        }
        LogicalType::Bytes | LogicalType::String => {
            expect_wire_type(wire_type, WireType::String)?;
            let len = stream.decode_varint32()? as usize;
            let capacity = (view.info.data_size as usize).saturating_sub(core::mem::size_of::<usize>());
            if len > capacity {
                return Err(if logical == LogicalType::String {
                    Error::StringOverflow
                } else {
                    Error::BytesOverflow
                });
            }
            let mut body = vec![0u8; len];
            stream.read(&mut body)?;
            let content = elem_ptr.add(core::mem::size_of::<usize>());
            core::ptr::copy_nonoverlapping(body.as_ptr(), content, len);
            *(elem_ptr as *mut usize) = len;
            #[cfg(feature = "validate-utf8")]
            if logical == LogicalType::String {
                let slice = core::slice::from_raw_parts(content, len);
                crate::utf8::validate(slice)?;
            }
            Ok(())
        }
        LogicalType::Extension => Err(Error::InvalidFieldType),
        _ => {
            expect_wire_type(wire_type, wire_type_for(logical))?;
            decode_scalar_into(stream, elem_ptr, logical, view.info.data_size)
        }
    }
}

/// Geometric-growth tracker for one `Pointer`+`Repeated` field across a
/// single [`decode_loop`] call. Unlike a `Static` array, pointer storage
/// carries no persistent capacity of its own (only the element count at
/// `p_size`), so this scopes the amortized-doubling assumption to one
/// decode call: it starts from whatever count the field already held
/// (normally zero) and doubles from there, rather than remembering
/// capacity across separate `decode_ex` invocations.
#[derive(Default)]
struct PointerArrayState {
    tag: u32,
    capacity: usize,
}

impl PointerArrayState {
    #[cfg(feature = "alloc")]
    unsafe fn ensure(
        &mut self,
        tag: u32,
        slot: *mut *mut u8,
        data_size: u32,
        current_count: usize,
        needed: usize,
    ) -> Result<*mut u8> {
        if self.tag != tag {
            self.tag = tag;
            self.capacity = current_count;
        }

        let existing = *slot;
        if needed <= self.capacity && !existing.is_null() {
            return Ok(existing);
        }

        if existing.is_null() {
            let new_capacity = needed.max(4);
            let ptr = crate::storage::allocate(data_size as usize, new_capacity)?;
            *slot = ptr.as_ptr();
            self.capacity = new_capacity;
            return Ok(ptr.as_ptr());
        }

        let non_null = core::ptr::NonNull::new(existing).ok_or(Error::AllocFailed)?;
        let (grown, new_capacity) =
            crate::storage::grow(non_null, data_size as usize, self.capacity, needed)?;
        self.capacity = new_capacity;
        *slot = grown.as_ptr();
        Ok(grown.as_ptr())
    }
}

/// Decodes one `Bool`/`Varint`/`UVarint`/`SVarint`/`Fixed32`/`Fixed64`
/// value into `ptr`, honoring `data_size`'s narrow-int width the same way
/// [`crate::encode::encode_scalar_value`] does on the way out. Values for
/// anything narrower than 8 bytes go through
/// [`crate::wire::decode_varint32`]'s legacy sign-extension handling
/// rather than the full 64-bit decode.
unsafe fn decode_scalar_into(
    stream: &mut InputStream<'_>,
    ptr: *mut u8,
    logical: LogicalType,
    data_size: u32,
) -> Result<()> {
    #[cfg(feature = "without-64bit")]
    if data_size == 8 {
        return Err(Error::InvalidDataSize);
    }
    match logical {
        LogicalType::Bool => {
            let v = stream.decode_varint()?;
            *(ptr as *mut bool) = v != 0;
            Ok(())
        }
        LogicalType::Varint => {
            let v = if data_size == 8 {
                stream.decode_varint()? as i64
            } else {
                stream.decode_varint32()? as i32 as i64
            };
            field_iter::write_signed(ptr, data_size, v);
            Ok(())
        }
        LogicalType::UVarint => {
            let v = if data_size == 8 {
                stream.decode_varint()?
            } else {
                stream.decode_varint32()? as u64
            };
            field_iter::write_unsigned(ptr, data_size, v);
            Ok(())
        }
        LogicalType::SVarint => {
            let v = if data_size == 8 {
                wire::zigzag_decode64(stream.decode_varint()?)
            } else {
                wire::zigzag_decode32(stream.decode_varint32()?) as i64
            };
            field_iter::write_signed(ptr, data_size, v);
            Ok(())
        }
        LogicalType::Fixed32 => {
            *(ptr as *mut u32) = stream.decode_fixed32()?;
            Ok(())
        }
        LogicalType::Fixed64 => decode_fixed64_value(stream, ptr, data_size),
        _ => Err(Error::InvalidFieldType),
    }
}

/// Reads a `Fixed64` field's 8-byte wire value into storage, narrowing to
/// `f32` (`data_size == 4`, under `convert-double-float`) as
/// [`crate::wire::narrow_double_to_float`] specifies; ordinary 8-byte
/// storage gets the raw bit pattern, same as every other `Fixed64`-typed
/// value.
///
/// # Safety
/// `ptr` must be valid for a write of `data_size` bytes.
unsafe fn decode_fixed64_value(stream: &mut InputStream<'_>, ptr: *mut u8, data_size: u32) -> Result<()> {
    let bits = stream.decode_fixed64()?;
    #[cfg(feature = "convert-double-float")]
    {
        if data_size == 4 {
            *(ptr as *mut f32) = wire::narrow_double_to_float(f64::from_bits(bits));
            return Ok(());
        }
    }
    #[cfg(not(feature = "convert-double-float"))]
    let _ = data_size;
    *(ptr as *mut u64) = bits;
    Ok(())
}

fn expect_wire_type(actual: WireType, expected: WireType) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::WrongWireType)
    }
}

fn wire_type_for(logical: LogicalType) -> WireType {
    match logical {
        LogicalType::Fixed32 => WireType::Bit32,
        LogicalType::Fixed64 => WireType::Bit64,
        _ => WireType::Varint,
    }
}

/// Seeds every field of `base` with its declared default: zero/null first,
/// then (if the message declares a non-empty serialized-defaults blob)
/// replays it as an ordinary decode pass. Presence flags the replay sets
/// are cleared afterward — seeding a proto2 `[default = 5]` value is not
/// the same as the wire having actually set the field.
unsafe fn apply_defaults(descriptor: &MessageDescriptor, base: *mut u8) -> Result<()> {
    zero_initialize(descriptor, base)?;

    if descriptor.default_value.is_empty() {
        return Ok(());
    }

    let mut buf: &[u8] = descriptor.default_value;
    let mut defaults_stream = InputStream::from_buffer(&mut buf);
    decode_loop(&mut defaults_stream, descriptor, base, None, DecodeFlags::empty())?;

    let mut iter = FieldIter::begin(descriptor, base);
    while let Some(view) = iter.next() {
        let logical = match view.info.field_type.logical() {
            Ok(l) => l,
            Err(_) => continue,
        };
        match view.info.field_type.repetition() {
            Repetition::Optional => {
                if matches!(logical, LogicalType::Bytes | LogicalType::String) {
                    if let Some(p) = view.p_size {
                        *(p as *mut usize) = 0;
                    }
                } else {
                    view.write_size(0);
                }
            }
            Repetition::Oneof => view.write_size(0),
            _ => {}
        }
    }

    Ok(())
}

unsafe fn zero_initialize(descriptor: &MessageDescriptor, base: *mut u8) -> Result<()> {
    let mut iter = FieldIter::begin(descriptor, base);
    while let Some(view) = iter.next() {
        zero_field(&view)?;
    }
    Ok(())
}

unsafe fn zero_field(view: &FieldView) -> Result<()> {
    let info = view.info;
    let allocation = info.field_type.allocation();
    let repetition = info.field_type.repetition();

    view.write_size(0);

    match allocation {
        Allocation::Callback => {
            core::ptr::write_bytes(view.p_data, 0, core::mem::size_of::<*const ()>());
        }
        Allocation::Pointer => {
            core::ptr::write_bytes(view.p_data, 0, core::mem::size_of::<*mut u8>());
        }
        Allocation::Static => {
            let byte_len = match repetition {
                Repetition::Repeated => {
                    (info.data_size as usize).saturating_mul(info.array_size as usize)
                }
                _ => info.data_size as usize,
            };
            core::ptr::write_bytes(view.p_data, 0, byte_len);

            // A oneof arm's union is re-defaulted on demand when the wire
            // actually switches to it (see `decode_oneof`); defaulting it
            // here too would just be overwritten by whichever sibling arm
            // zeroes the same shared storage next.
            if matches!(repetition, Repetition::Required | Repetition::Optional) {
                if let Ok(logical) = info.field_type.logical() {
                    if logical.is_submessage() {
                        if let Some(submsg) = view.submsg_desc {
                            apply_defaults(submsg, view.p_data)?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Allocation as A, FieldInfo, FieldType, LogicalType as L, MessageDescriptor, Repetition as R, SubmessageInfo};
    use crate::stream::OutputStream;

    #[repr(C)]
    struct Simple {
        value: u32,
    }

    static SIMPLE_FIELDS: [FieldInfo; 1] = [FieldInfo {
        tag: 1,
        field_type: FieldType::new(L::UVarint, R::Required, A::Static),
        data_offset: 0,
        size_offset: 0,
        array_size: 0,
        data_size: 4,
        submsg_index: None,
    }];

    static SIMPLE_DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &SIMPLE_FIELDS,
        submessages: &[],
        default_value: &[],
        required_field_count: 1,
        largest_tag: 1,
        field_callback: None,
    };

    #[test]
    fn decodes_uint32_150_scenario() {
        let bytes = [0x08u8, 0x96, 0x01];
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = Simple { value: 0 };
        unsafe {
            decode(&mut stream, &SIMPLE_DESCRIPTOR, &mut msg as *mut Simple as *mut u8).unwrap();
        }
        assert_eq!(msg.value, 150);
    }

    #[repr(C)]
    struct WithSint {
        value: i32,
    }

    static SINT_FIELDS: [FieldInfo; 1] = [FieldInfo {
        tag: 1,
        field_type: FieldType::new(L::SVarint, R::Required, A::Static),
        data_offset: 0,
        size_offset: 0,
        array_size: 0,
        data_size: 4,
        submsg_index: None,
    }];

    static SINT_DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &SINT_FIELDS,
        submessages: &[],
        default_value: &[],
        required_field_count: 1,
        largest_tag: 1,
        field_callback: None,
    };

    #[test]
    fn decodes_sint32_minus_one() {
        let bytes = [0x08u8, 0x01];
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = WithSint { value: 0 };
        unsafe {
            decode(&mut stream, &SINT_DESCRIPTOR, &mut msg as *mut WithSint as *mut u8).unwrap();
        }
        assert_eq!(msg.value, -1);
    }

    #[repr(C)]
    struct Repeated {
        values: [u32; 4],
        count: usize,
    }

    static REPEATED_FIELDS: [FieldInfo; 1] = [FieldInfo {
        tag: 1,
        field_type: FieldType::new(L::UVarint, R::Repeated, A::Static),
        data_offset: 0,
        size_offset: 16,
        array_size: 4,
        data_size: 4,
        submsg_index: None,
    }];

    static REPEATED_DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &REPEATED_FIELDS,
        submessages: &[],
        default_value: &[],
        required_field_count: 0,
        largest_tag: 1,
        field_callback: None,
    };

    #[test]
    fn decodes_packed_repeated_uint32() {
        // field 1, wire type STRING (packed), length 3, bytes [1,2,3].
        let bytes = [0x0Au8, 0x03, 0x01, 0x02, 0x03];
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = Repeated {
            values: [0; 4],
            count: 0,
        };
        unsafe {
            decode(&mut stream, &REPEATED_DESCRIPTOR, &mut msg as *mut Repeated as *mut u8).unwrap();
        }
        assert_eq!(msg.count, 3);
        assert_eq!(&msg.values[..3], &[1, 2, 3]);
    }

    #[test]
    fn decodes_unpacked_repeated_uint32() {
        // field 1 three times, each a plain varint value.
        let bytes = [0x08u8, 0x01, 0x08, 0x02, 0x08, 0x03];
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = Repeated {
            values: [0; 4],
            count: 0,
        };
        unsafe {
            decode(&mut stream, &REPEATED_DESCRIPTOR, &mut msg as *mut Repeated as *mut u8).unwrap();
        }
        assert_eq!(msg.count, 3);
        assert_eq!(&msg.values[..3], &[1, 2, 3]);
    }

    #[test]
    fn repeated_array_overflow_is_rejected() {
        let bytes = [
            0x08u8, 1, 0x08, 2, 0x08, 3, 0x08, 4, 0x08, 5,
        ];
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = Repeated {
            values: [0; 4],
            count: 0,
        };
        unsafe {
            let result = decode(&mut stream, &REPEATED_DESCRIPTOR, &mut msg as *mut Repeated as *mut u8);
            assert!(matches!(result, Err(Error::ArrayOverflow)));
        }
    }

    #[repr(C)]
    struct WithString {
        buf: [u8; 8],
        len: usize,
    }

    static STRING_FIELDS: [FieldInfo; 1] = [FieldInfo {
        tag: 1,
        field_type: FieldType::new(L::String, R::Optional, A::Static),
        data_offset: 0,
        size_offset: 8,
        array_size: 0,
        data_size: 8,
        submsg_index: None,
    }];

    static STRING_DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &STRING_FIELDS,
        submessages: &[],
        default_value: &[],
        required_field_count: 0,
        largest_tag: 1,
        field_callback: None,
    };

    #[test]
    fn decodes_string_abc() {
        // field 1, wire type STRING, length 3, "abc".
        let bytes = [0x0Au8, 0x03, b'a', b'b', b'c'];
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = WithString {
            buf: [0; 8],
            len: 0,
        };
        unsafe {
            decode(&mut stream, &STRING_DESCRIPTOR, &mut msg as *mut WithString as *mut u8).unwrap();
        }
        assert_eq!(msg.len, 3);
        assert_eq!(&msg.buf[..3], b"abc");
    }

    #[cfg(feature = "validate-utf8")]
    #[test]
    fn rejects_invalid_utf8_string_content() {
        let bytes = [0x0Au8, 0x01, 0xFF];
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = WithString {
            buf: [0; 8],
            len: 0,
        };
        unsafe {
            let result = decode(&mut stream, &STRING_DESCRIPTOR, &mut msg as *mut WithString as *mut u8);
            assert!(matches!(result, Err(Error::InvalidUtf8)));
        }
    }

    #[repr(C)]
    struct Inner {
        value: u32,
    }

    #[repr(C)]
    struct Outer {
        inner: Inner,
        has_inner: bool,
    }

    static INNER_FIELDS: [FieldInfo; 1] = [FieldInfo {
        tag: 1,
        field_type: FieldType::new(L::UVarint, R::Required, A::Static),
        data_offset: 0,
        size_offset: 0,
        array_size: 0,
        data_size: 4,
        submsg_index: None,
    }];

    static INNER_DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &INNER_FIELDS,
        submessages: &[],
        default_value: &[],
        required_field_count: 1,
        largest_tag: 1,
        field_callback: None,
    };

    static OUTER_SUBMESSAGES: [SubmessageInfo; 1] = [SubmessageInfo {
        descriptor: &INNER_DESCRIPTOR,
    }];

    static OUTER_FIELDS: [FieldInfo; 1] = [FieldInfo {
        tag: 1,
        field_type: FieldType::new(L::Submessage, R::Optional, A::Static),
        data_offset: 0,
        size_offset: 4,
        array_size: 0,
        data_size: 4,
        submsg_index: Some(0),
    }];

    static OUTER_DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &OUTER_FIELDS,
        submessages: &OUTER_SUBMESSAGES,
        default_value: &[],
        required_field_count: 0,
        largest_tag: 1,
        field_callback: None,
    };

    #[test]
    fn decodes_nested_submessage() {
        let mut outer = Vec::new();
        let mut out_stream = OutputStream::new(&mut outer, 32);
        out_stream
            .encode_length_delimited(|inner| {
                inner.encode_tag(WireType::Varint, 1)?;
                inner.encode_varint(42)
            })
            .unwrap();
        // Wrap with the outer field's own tag (field 1, STRING).
        let mut framed = Vec::new();
        framed.push((1u64 << 3) | 2);
        framed.extend_from_slice(&outer);

        let mut data: &[u8] = &framed;
        let mut stream = InputStream::new(&mut data, framed.len() as u64);
        let mut msg = Outer {
            inner: Inner { value: 0 },
            has_inner: false,
        };
        unsafe {
            decode(&mut stream, &OUTER_DESCRIPTOR, &mut msg as *mut Outer as *mut u8).unwrap();
        }
        assert!(msg.has_inner);
        assert_eq!(msg.inner.value, 42);
    }

    #[test]
    fn submessage_parent_stream_too_short_is_rejected() {
        // Claims a length-3 body but only supplies 1 byte.
        let bytes = [0x0Au8, 0x03, 0x08];
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = Outer {
            inner: Inner { value: 0 },
            has_inner: false,
        };
        unsafe {
            let result = decode(&mut stream, &OUTER_DESCRIPTOR, &mut msg as *mut Outer as *mut u8);
            assert!(result.is_err());
        }
    }

    #[repr(C)]
    struct WithOneof {
        discriminant: u32,
        payload: u64,
    }

    static ONEOF_FIELDS: [FieldInfo; 2] = [
        FieldInfo {
            tag: 1,
            field_type: FieldType::new(L::UVarint, R::Oneof, A::Static),
            data_offset: 8,
            size_offset: -8,
            array_size: 0,
            data_size: 4,
            submsg_index: None,
        },
        FieldInfo {
            tag: 2,
            field_type: FieldType::new(L::Fixed64, R::Oneof, A::Static),
            data_offset: 0,
            size_offset: -8,
            array_size: 0,
            data_size: 8,
            submsg_index: None,
        },
    ];

    static ONEOF_DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &ONEOF_FIELDS,
        submessages: &[],
        default_value: &[],
        required_field_count: 0,
        largest_tag: 2,
        field_callback: None,
    };

    #[test]
    fn oneof_arm_switch_sets_discriminant_and_payload() {
        // field 2 (Fixed64), value 0x0102030405060708.
        let mut bytes = vec![(2u8 << 3) | 1];
        bytes.extend_from_slice(&0x0102030405060708u64.to_le_bytes());
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = WithOneof {
            discriminant: 0,
            payload: 0,
        };
        unsafe {
            decode(&mut stream, &ONEOF_DESCRIPTOR, &mut msg as *mut WithOneof as *mut u8).unwrap();
        }
        assert_eq!(msg.discriminant, 2);
        assert_eq!(msg.payload, 0x0102030405060708);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let bytes: [u8; 0] = [];
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, 0);
        let mut msg = Simple { value: 0 };
        unsafe {
            let result = decode(&mut stream, &SIMPLE_DESCRIPTOR, &mut msg as *mut Simple as *mut u8);
            assert!(matches!(result, Err(Error::MissingRequiredField)));
        }
    }

    #[test]
    fn zero_tag_without_nullterminated_flag_is_rejected() {
        let bytes = [0x00u8];
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = Simple { value: 0 };
        unsafe {
            let result = decode(&mut stream, &SIMPLE_DESCRIPTOR, &mut msg as *mut Simple as *mut u8);
            assert!(matches!(result, Err(Error::ZeroTag)));
        }
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
    fn fixed64_wire_value_narrows_to_f32_storage() {
        // Wire carries a `double` (8 bytes); `data_size == 4` tells the
        // decoder this field's storage is `f32`, so it must narrow
        // rather than overwrite 8 bytes of a 4-byte field.
        let mut bytes = vec![(1u8 << 3) | 1];
        bytes.extend_from_slice(&1.5f64.to_bits().to_le_bytes());
        let mut data: &[u8] = &bytes;
        let mut stream = InputStream::new(&mut data, bytes.len() as u64);
        let mut msg = NarrowedDouble { value: 0.0 };
        unsafe {
            decode(&mut stream, &NARROWED_DESCRIPTOR, &mut msg as *mut NarrowedDouble as *mut u8)
                .unwrap();
        }
        assert_eq!(msg.value, 1.5f32);
    }
}
