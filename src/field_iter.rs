// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Walks a [`MessageDescriptor`]'s field table against a concrete message
//! instance, producing raw-pointer views into that instance's storage.
//!
//! This is the one module in the crate that deals in raw pointers: the
//! descriptor table only carries byte offsets, so turning "field 3 lives at
//! offset 24" into something the encoder/decoder can read or write needs
//! pointer arithmetic against the caller-supplied `*mut u8` base. Every
//! unsafe operation here requires only that `base` actually point to a
//! struct laid out the way the descriptor claims — the struct-layout
//! choice itself is out of scope for this crate, left to whatever caller
//! pairs a descriptor with a matching `#[repr(C)]` struct.

use crate::descriptor::{FieldInfo, LogicalType, MessageDescriptor, Repetition};
use crate::error::Result;

/// Reads a signed integer of `data_size` bytes (1/2/4/8) at `ptr`, widened
/// to `i64`. Shared by the encoder and decoder so narrow `int32`/`sint32`
/// storage and the legacy ≤32-bit varint sign-extension rule (see
/// [`crate::wire::decode_varint32`]) stay consistent in both directions.
///
/// # Safety
/// `ptr` must be valid for a read of `data_size` bytes.
pub unsafe fn read_signed(ptr: *const u8, data_size: u32) -> i64 {
    match data_size {
        1 => *(ptr as *const i8) as i64,
        2 => *(ptr as *const i16) as i64,
        4 => *(ptr as *const i32) as i64,
        _ => *(ptr as *const i64),
    }
}

/// # Safety
/// `ptr` must be valid for a write of `data_size` bytes.
pub unsafe fn write_signed(ptr: *mut u8, data_size: u32, value: i64) {
    match data_size {
        1 => *(ptr as *mut i8) = value as i8,
        2 => *(ptr as *mut i16) = value as i16,
        4 => *(ptr as *mut i32) = value as i32,
        _ => *(ptr as *mut i64) = value,
    }
}

/// # Safety
/// `ptr` must be valid for a read of `data_size` bytes.
pub unsafe fn read_unsigned(ptr: *const u8, data_size: u32) -> u64 {
    match data_size {
        1 => *(ptr as *const u8) as u64,
        2 => *(ptr as *const u16) as u64,
        4 => *(ptr as *const u32) as u64,
        _ => *(ptr as *const u64),
    }
}

/// # Safety
/// `ptr` must be valid for a write of `data_size` bytes.
pub unsafe fn write_unsigned(ptr: *mut u8, data_size: u32, value: u64) {
    match data_size {
        1 => *(ptr as *mut u8) = value as u8,
        2 => *(ptr as *mut u16) = value as u16,
        4 => *(ptr as *mut u32) = value as u32,
        _ => *(ptr as *mut u64) = value,
    }
}

/// A view onto one field's storage within a concrete message instance, with
/// the generic offsets of [`FieldInfo`] resolved to real pointers against
/// `base`.
#[derive(Clone, Copy)]
pub struct FieldView {
    pub tag: u32,
    pub info: FieldInfo,
    /// Pointer to the field's own value/array storage.
    pub p_data: *mut u8,
    /// Pointer to the field's size/has/oneof-discriminator companion, if
    /// it has one (`Required` fields with no presence tracking do not).
    pub p_size: Option<*mut u8>,
    pub submsg_desc: Option<&'static MessageDescriptor>,
}

impl FieldView {
    /// Reads the repeated-field element count, or 1 for a present
    /// `Optional`/`Required` field, or 0 for an absent `Optional` field.
    ///
    /// # Safety
    /// `p_size` must point to a valid, initialized `usize` for `Repeated`
    /// fields, or a valid `bool`-sized flag for `Optional` fields.
    pub unsafe fn read_size(&self) -> usize {
        match self.info.field_type.repetition() {
            Repetition::Required => 1,
            Repetition::Repeated => match self.p_size {
                Some(p) => *(p as *const usize),
                // Fixed-count repeated: the element count is the
                // descriptor's `array_size`, not a stored counter.
                None => self.info.array_size as usize,
            },
            Repetition::Optional => match self.p_size {
                Some(p) => {
                    if *(p as *const bool) {
                        1
                    } else {
                        0
                    }
                }
                None => 1,
            },
            Repetition::Oneof => match self.p_size {
                Some(p) => {
                    if *(p as *const u32) == self.tag {
                        1
                    } else {
                        0
                    }
                }
                None => 0,
            },
        }
    }

    /// # Safety
    /// Same preconditions as [`Self::read_size`]; additionally valid only
    /// for `Repeated`/`Optional` fields with a companion slot.
    pub unsafe fn write_size(&self, value: usize) {
        match self.info.field_type.repetition() {
            Repetition::Required => {}
            Repetition::Repeated => {
                if let Some(p) = self.p_size {
                    *(p as *mut usize) = value;
                }
            }
            Repetition::Optional => {
                if let Some(p) = self.p_size {
                    *(p as *mut bool) = value != 0;
                }
            }
            Repetition::Oneof => {
                if let Some(p) = self.p_size {
                    *(p as *mut u32) = if value != 0 { self.tag } else { 0 };
                }
            }
        }
    }
}

/// Walks a message descriptor's field table, tracking the running
/// data-offset accumulation the reference descriptor format relies on (each
/// entry's `data_offset` is relative to the previous field, not absolute).
pub struct FieldIter<'a> {
    descriptor: &'a MessageDescriptor,
    base: *mut u8,
    index: usize,
    data_base: usize,
    /// Last tag successfully resolved by [`Self::find`], used to decide
    /// whether the next lookup should restart from the top.
    last_tag_seen: u32,
}

impl<'a> FieldIter<'a> {
    /// # Safety
    /// `base` must point to the start of a message instance laid out to
    /// match `descriptor`'s field offsets, valid for the lifetime of the
    /// returned iterator's use.
    pub unsafe fn begin(descriptor: &'a MessageDescriptor, base: *mut u8) -> Self {
        FieldIter {
            descriptor,
            base,
            index: 0,
            data_base: 0,
            last_tag_seen: 0,
        }
    }

    fn view_at(&self, index: usize, data_base: usize) -> FieldView {
        let info = self.descriptor.fields[index];
        let abs_offset = (data_base as i64 + info.data_offset as i64) as usize;
        let p_data = unsafe { self.base.add(abs_offset) };
        // `size_offset == 0` means "no companion slot": always true for a
        // `Required` scalar, for a fixed-count repeated field (one whose
        // element count is `array_size`, not a stored counter), and for a
        // proto3 singular `Optional` field with no has-flag — that last
        // case is the spec's "`OPTIONAL` static without flag" presence
        // mode, where presence is defined by non-zeroness rather than a
        // stored bit (see `encode::is_present`) — see `read_size`/
        // `write_size` below.
        let p_size = if info.size_offset == 0
            && matches!(
                info.field_type.repetition(),
                Repetition::Required | Repetition::Repeated | Repetition::Optional
            ) {
            None
        } else {
            Some(unsafe { p_data.offset(info.size_offset as isize) })
        };
        let submsg_desc = info
            .submsg_index
            .and_then(|i| self.descriptor.submessages.get(i))
            .map(|s| s.descriptor);
        FieldView {
            tag: info.tag,
            info,
            p_data,
            p_size,
            submsg_desc,
        }
    }

    /// Advances to the next field, or `None` once the table is exhausted.
    ///
    /// # Safety
    /// `base` passed to [`Self::begin`] must remain valid for the whole
    /// walk.
    pub unsafe fn next(&mut self) -> Option<FieldView> {
        if self.index >= self.descriptor.fields.len() {
            return None;
        }
        let view = self.view_at(self.index, self.data_base);
        self.data_base = (self.data_base as i64 + view.info.data_offset as i64) as usize;
        self.index += 1;
        Some(view)
    }

    /// Rewinds to the first field (decode and encode both need to walk the
    /// table twice: once for defaulting, once for the real pass).
    pub fn reset(&mut self) {
        self.index = 0;
        self.data_base = 0;
    }

    /// Finds the field with the given wire tag, resuming the search from
    /// the iterator's current position and wrapping around once — fields
    /// on the wire are usually encountered in ascending tag order, so this
    /// avoids rescanning from the top on every lookup in the common case.
    ///
    /// # Safety
    /// Same precondition as [`Self::next`].
    pub unsafe fn find(&mut self, tag: u32) -> Result<Option<FieldView>> {
        let total = self.descriptor.fields.len();
        if total == 0 || tag > self.descriptor.largest_tag {
            return Ok(None);
        }
        if tag < self.last_tag_seen {
            // The wire usually arrives in ascending tag order; a tag lower
            // than the last one we matched means we're starting a new
            // lookup sweep, so restart from the top rather than wrapping
            // through the tail first.
            self.reset();
        }
        let start_index = self.index;
        let start_base = self.data_base;
        for _ in 0..total {
            if self.index >= total {
                self.reset();
            }
            let Some(view) = self.next() else {
                break;
            };
            // Extension placeholder entries are resolved through the
            // caller-supplied extension list, never by a direct tag match.
            if view.tag == tag && view.info.field_type.logical() != Ok(LogicalType::Extension) {
                self.last_tag_seen = tag;
                return Ok(Some(view));
            }
        }
        self.index = start_index;
        self.data_base = start_base;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Allocation, FieldType, LogicalType};

    #[repr(C)]
    struct TestMessage {
        a: u32,
        b: u32,
        has_b: bool,
    }

    static FIELDS: [FieldInfo; 2] = [
        FieldInfo {
            tag: 1,
            field_type: FieldType::new(LogicalType::UVarint, Repetition::Required, Allocation::Static),
            data_offset: 0,
            size_offset: 0,
            array_size: 0,
            data_size: 4,
            submsg_index: None,
        },
        FieldInfo {
            tag: 2,
            field_type: FieldType::new(LogicalType::UVarint, Repetition::Optional, Allocation::Static),
            data_offset: 4,
            size_offset: 4,
            array_size: 0,
            data_size: 4,
            submsg_index: None,
        },
    ];

    static DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        fields: &FIELDS,
        submessages: &[],
        default_value: &[],
        required_field_count: 1,
        largest_tag: 2,
        field_callback: None,
    };

    #[test]
    fn iterates_fields_in_table_order_and_resolves_pointers() {
        let mut msg = TestMessage {
            a: 42,
            b: 7,
            has_b: true,
        };
        let base = &mut msg as *mut TestMessage as *mut u8;
        unsafe {
            let mut iter = FieldIter::begin(&DESCRIPTOR, base);
            let first = iter.next().unwrap();
            assert_eq!(first.tag, 1);
            assert_eq!(*(first.p_data as *const u32), 42);
            assert_eq!(first.read_size(), 1);

            let second = iter.next().unwrap();
            assert_eq!(second.tag, 2);
            assert_eq!(*(second.p_data as *const u32), 7);
            assert_eq!(second.read_size(), 1);

            assert!(iter.next().is_none());
        }
    }

    #[test]
    fn optional_field_absent_reads_zero_size() {
        let mut msg = TestMessage {
            a: 1,
            b: 0,
            has_b: false,
        };
        let base = &mut msg as *mut TestMessage as *mut u8;
        unsafe {
            let mut iter = FieldIter::begin(&DESCRIPTOR, base);
            iter.next().unwrap();
            let second = iter.next().unwrap();
            assert_eq!(second.read_size(), 0);
        }
    }

    #[test]
    fn find_locates_field_by_tag() {
        let mut msg = TestMessage {
            a: 1,
            b: 2,
            has_b: true,
        };
        let base = &mut msg as *mut TestMessage as *mut u8;
        unsafe {
            let mut iter = FieldIter::begin(&DESCRIPTOR, base);
            let found = iter.find(2).unwrap().unwrap();
            assert_eq!(found.tag, 2);
        }
    }
}
