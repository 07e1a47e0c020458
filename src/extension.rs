// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Proto2 extension fields: a message that declares an extension range
//! carries a singly-linked list of extension records instead of a fixed
//! field table entry, since the set of extensions isn't known until link
//! time.
//!
//! Unlike [`crate::descriptor::MessageDescriptor`], which is built once and
//! shared `'static` across every call, an [`ExtensionRange`] list is
//! per-message-instance: its `found` flag is mutated as the decoder walks
//! the wire, so the list is constructed fresh (typically on the stack) by
//! whatever code owns the host message for the duration of one decode or
//! encode call.

use core::cell::Cell;

use crate::descriptor::FieldInfo;
use crate::error::Result;

/// One registered extension field, forming a node in the host message's
/// extension list. `next` lets several extensions share a single
/// `extension_fields` head pointer stored in the host struct, the same way
/// the reference implementation threads `pb_extension_t` records.
pub struct ExtensionRange<'a> {
    pub info: FieldInfo,
    /// Destination storage for this extension's value, resolved the same
    /// way a regular field's `p_data` is (an offset into whatever struct
    /// the extension's owner declares, cast by the caller).
    pub destination: *mut u8,
    pub next: Option<&'a ExtensionRange<'a>>,
    /// Set once this extension has been matched against an incoming tag,
    /// so a second occurrence on the wire merges into the existing value
    /// rather than reinitializing it.
    pub found: Cell<bool>,
}

impl<'a> ExtensionRange<'a> {
    pub fn new(info: FieldInfo, destination: *mut u8) -> Self {
        ExtensionRange {
            info,
            destination,
            next: None,
            found: Cell::new(false),
        }
    }

    /// Walks the list looking for the extension registered under `tag`.
    /// Mirrors the reference implementation's linear scan: extension
    /// lists are expected to stay small (most messages declare at most a
    /// handful of extension fields), so no secondary index is built.
    pub fn find(list: Option<&'a ExtensionRange<'a>>, tag: u32) -> Option<&'a ExtensionRange<'a>> {
        let mut current = list;
        while let Some(node) = current {
            if node.info.tag == tag {
                return Some(node);
            }
            current = node.next;
        }
        None
    }
}

/// A host message's `[min_tag, max_tag]` extension window, checked before
/// falling back to the (more expensive) linked-list walk on a genuinely
/// unrecognized tag.
#[derive(Clone, Copy, Debug)]
pub struct ExtensionDeclaration {
    pub min_tag: u32,
    pub max_tag: u32,
}

impl ExtensionDeclaration {
    pub fn contains(self, tag: u32) -> bool {
        tag >= self.min_tag && tag <= self.max_tag
    }
}

/// Resolves a tag against the extension list only if it first falls
/// within at least one declared range — avoids walking the full list for
/// tags that could never be an extension of this message type.
pub fn resolve<'a>(
    declarations: &[ExtensionDeclaration],
    list: Option<&'a ExtensionRange<'a>>,
    tag: u32,
) -> Result<Option<&'a ExtensionRange<'a>>> {
    if !declarations.iter().any(|d| d.contains(tag)) {
        return Ok(None);
    }
    Ok(ExtensionRange::find(list, tag))
}
