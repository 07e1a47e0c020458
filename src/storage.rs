// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dynamic (heap-owned) field storage, gated behind the `alloc` feature.
//!
//! `Allocation::Pointer` fields own a heap block the decoder grows on
//! demand and the message's drop path must release recursively — there is
//! no generation-time struct to attach a `Drop` impl to (struct layout is
//! out of scope for this crate), so callers invoke [`release`] explicitly
//! wherever they would otherwise rely on RAII. This mirrors the reference
//! implementation's explicit `pb_release` call, which exists for exactly
//! the same reason: a descriptor-driven codec can't assume the host
//! language's destructor runs over fields it doesn't know the type of.

#![cfg(feature = "alloc")]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::descriptor::{Allocation, FieldInfo, LogicalType, MessageDescriptor, Repetition};
use crate::error::{Error, Result};
use crate::field_iter::FieldView;

/// Allocates (or grows) the backing storage for one field instance,
/// guarding every size computation against overflow the way the
/// reference implementation's `allocate_field` does — a crafted `count`
/// or `data_size` from the wire must never be able to wrap a `usize`
/// multiplication into a too-small allocation.
pub fn allocate(data_size: usize, count: usize) -> Result<NonNull<u8>> {
    let total = data_size
        .checked_mul(count)
        .ok_or(Error::ArrayMaxSizeExceeded)?;
    let layout = Layout::array::<u8>(total).map_err(|_| Error::ArrayMaxSizeExceeded)?;
    if layout.size() == 0 {
        // A zero-sized allocation request still needs a valid, unique
        // pointer for `release` to later deallocate correctly — this
        // happens for a freshly-declared-but-empty repeated field.
        return Ok(NonNull::dangling());
    }
    let raw = unsafe { alloc::alloc(layout) };
    NonNull::new(raw).ok_or(Error::AllocFailed)
}

/// Grows an existing pointer-array allocation geometrically (doubling)
/// rather than to the exact new size, matching the reference
/// implementation's amortized-growth strategy for repeated pointer
/// fields appended to one element at a time during decode.
///
/// # Safety
/// `ptr` must have been allocated with [`allocate`] (or a prior call to
/// this function) using `data_size` as the per-element stride and
/// `old_count` as the element count.
pub unsafe fn grow(
    ptr: NonNull<u8>,
    data_size: usize,
    old_count: usize,
    min_new_count: usize,
) -> Result<(NonNull<u8>, usize)> {
    let new_count = old_count.saturating_mul(2).max(min_new_count).max(4);
    let old_total = data_size
        .checked_mul(old_count)
        .ok_or(Error::ArrayMaxSizeExceeded)?;
    let new_total = data_size
        .checked_mul(new_count)
        .ok_or(Error::ArrayMaxSizeExceeded)?;
    let old_layout = Layout::array::<u8>(old_total).map_err(|_| Error::ArrayMaxSizeExceeded)?;
    let new_layout = Layout::array::<u8>(new_total).map_err(|_| Error::ArrayMaxSizeExceeded)?;
    let raw = alloc::realloc(ptr.as_ptr(), old_layout, new_layout.size());
    let new_ptr = NonNull::new(raw).ok_or(Error::AllocFailed)?;
    Ok((new_ptr, new_count))
}

/// # Safety
/// `ptr` must have been allocated by [`allocate`]/[`grow`] with exactly
/// `data_size * count` bytes live.
pub unsafe fn deallocate(ptr: NonNull<u8>, data_size: usize, count: usize) {
    let total = data_size.saturating_mul(count);
    if total == 0 {
        return;
    }
    if let Ok(layout) = Layout::array::<u8>(total) {
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}

/// Recursively releases a single message instance's `Pointer`-allocation
/// fields: heap-owned bytes/strings are freed directly, and submessage
/// fields recurse into their own descriptor first.
///
/// # Safety
/// `base` must point to a valid, initialized instance of the message type
/// `descriptor` describes.
pub unsafe fn release(descriptor: &MessageDescriptor, base: *mut u8) {
    let mut iter = crate::field_iter::FieldIter::begin(descriptor, base);
    while let Some(view) = iter.next() {
        release_field(&view);
    }
}

/// # Safety
/// `view` must have been produced against a live message instance.
pub(crate) unsafe fn release_field(view: &FieldView) {
    if view.info.field_type.allocation() != Allocation::Pointer {
        return;
    }

    // Pointer-allocation fields store a heap pointer in place of the
    // inline value; `p_data` points at that pointer slot, not at the
    // heap block itself.
    let slot = view.p_data as *mut *mut u8;
    let heap_ptr = *slot;
    if heap_ptr.is_null() {
        return;
    }

    let repetition = view.info.field_type.repetition();
    let logical = view.info.field_type.logical();
    let is_scalar_bytes = matches!(logical, Ok(LogicalType::Bytes) | Ok(LogicalType::String));

    if repetition != Repetition::Repeated && is_scalar_bytes {
        // A singular pointer-allocated bytes/string field is an exact-size
        // allocation of its content length (see
        // `decode::decode_bytes_field`), not a `data_size`-strided
        // element — its length lives at `p_size`, not in `data_size`.
        let len = match view.p_size {
            Some(p) => *(p as *const usize),
            None => 0,
        };
        if let Some(non_null) = NonNull::new(heap_ptr) {
            deallocate(non_null, 1, len);
        }
        *slot = core::ptr::null_mut();
        return;
    }

    let count = match repetition {
        Repetition::Repeated => view.read_size(),
        _ => 1,
    };
    if count == 0 {
        return;
    }

    let is_submessage = matches!(
        logical,
        Ok(LogicalType::Submessage) | Ok(LogicalType::SubmsgWithCallback)
    );

    if is_submessage {
        if let Some(submsg) = view.submsg_desc {
            for i in 0..count {
                let elem = heap_ptr.add(i * view.info.data_size as usize);
                release(submsg, elem);
            }
        }
    }

    if let Some(non_null) = NonNull::new(heap_ptr) {
        deallocate(non_null, view.info.data_size as usize, count);
    }
    *slot = core::ptr::null_mut();
}
