/*
 * Created on Thu Jul 30 2026
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! `CachedValue`: a single heap allocation carrying an atomic refcount
//! header plus inline key and value bytes, and `Finding`: the scoped,
//! move-only lease over one such allocation. Buckets store raw
//! `*mut CachedValue` pointers directly (the spec's option (a) layout),
//! which keeps a bucket's 10 slots to a pointer-width each rather than
//! routing through an arena/slab indirection.

use {
    crate::error::CacheErrorKind,
    core::{
        ptr::NonNull,
        sync::atomic::{AtomicU32, Ordering},
    },
    std::alloc::{self, Layout},
};

/// Keys longer than this are rejected outright; the top 8 bits of
/// `key_size_and_offset` are reserved for alignment-padding recovery.
pub const MAX_KEY_SIZE: usize = (1 << 24) - 1;
pub const MAX_VALUE_SIZE: usize = u32::MAX as usize;

#[repr(C)]
struct Header {
    refcount: AtomicU32,
    /// low 24 bits: key length; high 8 bits: alignment padding placed
    /// before this header, recorded so `delete` can recover the original
    /// allocation base.
    key_size_and_offset: u32,
    value_size: u32,
}

const HEADER_ALIGN: usize = core::mem::align_of::<Header>();

/// An opaque heap-allocated entry. Always handled behind a raw pointer;
/// there is deliberately no safe owned value, since buckets store these by
/// pointer and the refcount is the only thing that can authorize a free.
pub struct CachedValue {
    _private: (),
}

impl CachedValue {
    fn header(ptr: *mut CachedValue) -> *mut Header {
        ptr as *mut Header
    }

    fn key_len(header: &Header) -> usize {
        (header.key_size_and_offset & 0x00FF_FFFF) as usize
    }

    fn padding(header: &Header) -> usize {
        (header.key_size_and_offset >> 24) as usize
    }

    fn key_ptr(ptr: *mut CachedValue) -> *mut u8 {
        unsafe { (ptr as *mut u8).add(core::mem::size_of::<Header>()) }
    }

    fn value_ptr(ptr: *mut CachedValue, key_len: usize) -> *mut u8 {
        unsafe { Self::key_ptr(ptr).add(key_len) }
    }

    fn layout_for(key_size: usize, value_size: usize) -> Layout {
        let body = core::mem::size_of::<Header>() + key_size + value_size;
        // pad the allocation out to the header's alignment; no extra
        // padding is needed at this alignment so the padding field is 0,
        // but the field exists so a future higher-alignment allocation
        // strategy can populate it without changing the layout.
        Layout::from_size_align(body, HEADER_ALIGN).unwrap()
    }

    /// Allocates one contiguous block for `key` and `value`, with refcount
    /// initialized to 0. Returns null on invalid arguments or allocator
    /// failure; never panics.
    pub fn construct(key: &[u8], value: &[u8]) -> *mut CachedValue {
        if key.is_empty() || key.len() > MAX_KEY_SIZE || value.len() > MAX_VALUE_SIZE {
            return core::ptr::null_mut();
        }
        let layout = Self::layout_for(key.len(), value.len());
        let raw = unsafe { alloc::alloc(layout) };
        if raw.is_null() {
            return core::ptr::null_mut();
        }
        let ptr = raw as *mut CachedValue;
        unsafe {
            let header = Self::header(ptr);
            header.write(Header {
                refcount: AtomicU32::new(0),
                key_size_and_offset: key.len() as u32, // padding bits are 0
                value_size: value.len() as u32,
            });
            core::ptr::copy_nonoverlapping(key.as_ptr(), Self::key_ptr(ptr), key.len());
            if !value.is_empty() {
                core::ptr::copy_nonoverlapping(
                    value.as_ptr(),
                    Self::value_ptr(ptr, key.len()),
                    value.len(),
                );
            }
        }
        ptr
    }

    /// Deep copy: fresh allocation, fresh refcount of 0. Returns null on
    /// allocator failure.
    ///
    /// # Safety
    /// `ptr` must point to a live `CachedValue`.
    pub unsafe fn copy(ptr: *mut CachedValue) -> *mut CachedValue {
        Self::construct(Self::key(ptr), Self::value(ptr))
    }

    /// # Safety
    /// `ptr` must point to a live `CachedValue`.
    pub unsafe fn lease(ptr: *mut CachedValue) {
        (*Self::header(ptr)).refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Must never be called without a matching `lease`.
    ///
    /// # Safety
    /// `ptr` must point to a live `CachedValue` that was `lease`d.
    pub unsafe fn release(ptr: *mut CachedValue) {
        let prev = (*Self::header(ptr)).refcount.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "release without a matching lease");
    }

    /// # Safety
    /// `ptr` must point to a live `CachedValue`.
    pub unsafe fn is_freeable(ptr: *mut CachedValue) -> bool {
        (*Self::header(ptr)).refcount.load(Ordering::Acquire) == 0
    }

    /// # Safety
    /// `ptr` must point to a live `CachedValue` with `is_freeable(ptr)`.
    pub unsafe fn delete(ptr: *mut CachedValue) {
        debug_assert!(Self::is_freeable(ptr));
        let header = &*Self::header(ptr);
        let key_len = Self::key_len(header);
        let value_len = header.value_size as usize;
        let padding = Self::padding(header);
        let layout = Self::layout_for(key_len, value_len);
        let base = (ptr as *mut u8).sub(padding);
        alloc::dealloc(base, layout);
    }

    /// # Safety
    /// `ptr` must point to a live `CachedValue`.
    pub unsafe fn key<'a>(ptr: *mut CachedValue) -> &'a [u8] {
        let header = &*Self::header(ptr);
        let len = Self::key_len(header);
        core::slice::from_raw_parts(Self::key_ptr(ptr), len)
    }

    /// # Safety
    /// `ptr` must point to a live `CachedValue`.
    pub unsafe fn value<'a>(ptr: *mut CachedValue) -> &'a [u8] {
        let header = &*Self::header(ptr);
        let key_len = Self::key_len(header);
        let value_len = header.value_size as usize;
        if value_len == 0 {
            &[]
        } else {
            core::slice::from_raw_parts(Self::value_ptr(ptr, key_len), value_len)
        }
    }

    /// Total bytes of the allocation backing this entry, for `Metadata`
    /// accounting.
    ///
    /// # Safety
    /// `ptr` must point to a live `CachedValue`.
    pub unsafe fn size_bytes(ptr: *mut CachedValue) -> usize {
        let header = &*Self::header(ptr);
        core::mem::size_of::<Header>() + Self::key_len(header) + header.value_size as usize
    }

    /// # Safety
    /// `ptr` must point to a live `CachedValue`.
    pub unsafe fn same_key(
        ptr: *mut CachedValue,
        other_key: &[u8],
        hasher: &dyn crate::hash::Hasher,
    ) -> bool {
        hasher.same_key(Self::key(ptr), other_key)
    }
}

/// A scoped, move-only borrow of a `CachedValue`. Leases on construction
/// from a live pointer, releases on drop. Cloning is deliberately not
/// implemented: call [`Finding::copy`] for an explicit deep copy.
pub struct Finding {
    ptr: Option<NonNull<CachedValue>>,
    code: CacheErrorKind,
}

impl Finding {
    /// Leases `ptr` and wraps it as a hit.
    ///
    /// # Safety
    /// `ptr` must point to a live `CachedValue`.
    pub(crate) unsafe fn hit(ptr: NonNull<CachedValue>) -> Self {
        CachedValue::lease(ptr.as_ptr());
        Self {
            ptr: Some(ptr),
            code: CacheErrorKind::NotFound,
        }
    }

    pub(crate) fn miss(code: CacheErrorKind) -> Self {
        Self { ptr: None, code }
    }

    pub fn found(&self) -> bool {
        self.ptr.is_some()
    }

    /// The error code describing why this `Finding` is not a hit. Carries
    /// no meaning when `found()` is true.
    pub fn error(&self) -> CacheErrorKind {
        self.code
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.ptr.map(|p| unsafe { CachedValue::key(p.as_ptr()) })
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.ptr.map(|p| unsafe { CachedValue::value(p.as_ptr()) })
    }

    /// Deep copy of the underlying entry: a fresh allocation with refcount
    /// 0, independent of this `Finding`'s lease. Returns `None` if this is
    /// a miss or the allocator failed.
    pub fn copy(&self) -> Option<*mut CachedValue> {
        self.ptr.map(|p| {
            let copied = unsafe { CachedValue::copy(p.as_ptr()) };
            copied
        })
    }
}

impl Drop for Finding {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr {
            unsafe { CachedValue::release(ptr.as_ptr()) };
        }
    }
}
