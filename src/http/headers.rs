//! Two-tier header store: fixed-capacity inline table with overflow fallback.

use crate::{
    errors::Error,
    limits::{MAX_HEADER_VALUE, MAX_INLINE_HEADERS, MAX_INLINE_NAME, MAX_INLINE_VALUE},
};
use std::fmt;

/// Ordered header multimap with case-insensitive lookup.
///
/// The first [`MAX_INLINE_HEADERS`] entries whose values fit
/// [`MAX_INLINE_VALUE`] live in a fixed-capacity inline table allocated once
/// per store; everything else spills into a heap-backed overflow list capped
/// at [`MAX_HEADER_VALUE`] bytes per value. Repeated names are kept as
/// repeated entries.
///
/// Names and values never contain CR or LF, and names never contain SP or
/// HTAB; [`add`](Headers::add) enforces this, which makes header injection
/// through the store impossible.
///
/// Iteration order is deterministic: the inline tier in insertion order,
/// then the overflow tier in insertion order.
pub struct Headers {
    inline: Box<[InlineEntry; MAX_INLINE_HEADERS]>,
    inline_len: usize,
    overflow: Vec<OverflowEntry>,
}

#[derive(Clone, Copy)]
struct InlineEntry {
    name: [u8; MAX_INLINE_NAME],
    value: [u8; MAX_INLINE_VALUE],
    name_len: u8,
    value_len: u8,
}

impl InlineEntry {
    const EMPTY: Self = Self {
        name: [0; MAX_INLINE_NAME],
        value: [0; MAX_INLINE_VALUE],
        name_len: 0,
        value_len: 0,
    };

    #[inline(always)]
    fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }

    #[inline(always)]
    fn value(&self) -> &[u8] {
        &self.value[..self.value_len as usize]
    }
}

struct OverflowEntry {
    name: Vec<u8>,
    value: Vec<u8>,
}

impl Headers {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            inline: Box::new([InlineEntry::EMPTY; MAX_INLINE_HEADERS]),
            inline_len: 0,
            overflow: Vec::new(),
        }
    }

    /// Appends an entry, preserving any prior entries with the same name.
    ///
    /// Fails with [`Error::InvalidHeader`] if the name is empty, either
    /// argument contains CR or LF, or the name contains SP or HTAB; with
    /// [`Error::HeaderTooLarge`] if the name exceeds [`MAX_INLINE_NAME`] or
    /// the value exceeds [`MAX_HEADER_VALUE`].
    pub fn add(&mut self, name: &[u8], value: &[u8]) -> Result<(), Error> {
        validate(name, value)?;

        if value.len() <= MAX_INLINE_VALUE && self.inline_len < MAX_INLINE_HEADERS {
            let entry = &mut self.inline[self.inline_len];
            entry.name[..name.len()].copy_from_slice(name);
            entry.value[..value.len()].copy_from_slice(value);
            entry.name_len = name.len() as u8;
            entry.value_len = value.len() as u8;
            self.inline_len += 1;
        } else {
            self.overflow.push(OverflowEntry {
                name: name.to_vec(),
                value: value.to_vec(),
            });
        }

        Ok(())
    }

    /// Replaces all entries with this name (case-insensitive) by a single
    /// entry. Validation is identical to [`add`](Headers::add).
    pub fn set(&mut self, name: &[u8], value: &[u8]) -> Result<(), Error> {
        validate(name, value)?;
        self.del(name);
        self.add(name, value)
    }

    /// First value for the name in iteration order, case-insensitive.
    #[inline]
    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.entries()
            .find(|&(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// As [`get`](Headers::get), but only reports presence.
    #[inline]
    pub fn has(&self, name: &[u8]) -> bool {
        self.get(name).is_some()
    }

    /// Removes every entry with this name, inline and overflow.
    pub fn del(&mut self, name: &[u8]) {
        let mut kept = 0;
        for i in 0..self.inline_len {
            if !self.inline[i].name().eq_ignore_ascii_case(name) {
                if kept != i {
                    self.inline[kept] = self.inline[i];
                }
                kept += 1;
            }
        }
        self.inline_len = kept;

        self.overflow
            .retain(|entry| !entry.name.eq_ignore_ascii_case(name));
    }

    /// Total entry count, inline plus overflow.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.inline_len + self.overflow.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes `f(name, value)` for each entry; stops early when `f`
    /// returns `false`.
    pub fn visit<F: FnMut(&[u8], &[u8]) -> bool>(&self, mut f: F) {
        for (name, value) in self.entries() {
            if !f(name, value) {
                return;
            }
        }
    }

    /// Clears all entries; inline capacity is retained, overflow storage
    /// is released.
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.inline_len = 0;
        self.overflow.clear();
    }

    #[inline]
    pub(crate) fn entries(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.inline[..self.inline_len]
            .iter()
            .map(|e| (e.name(), e.value()))
            .chain(self.overflow.iter().map(|e| (&e.name[..], &e.value[..])))
    }
}

#[inline]
fn validate(name: &[u8], value: &[u8]) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::InvalidHeader);
    }
    if name.len() > MAX_INLINE_NAME || value.len() > MAX_HEADER_VALUE {
        return Err(Error::HeaderTooLarge);
    }
    if name
        .iter()
        .any(|&b| matches!(b, b'\r' | b'\n' | b' ' | b'\t'))
    {
        return Err(Error::InvalidHeader);
    }
    if value.iter().any(|&b| matches!(b, b'\r' | b'\n')) {
        return Err(Error::InvalidHeader);
    }
    Ok(())
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.entries() {
            map.entry(
                &String::from_utf8_lossy(name),
                &String::from_utf8_lossy(value),
            );
        }
        map.finish()
    }
}
