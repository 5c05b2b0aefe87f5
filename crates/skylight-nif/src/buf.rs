//! Byte-buffer adapter
//!
//! Host bytes go to native code as a borrowed [`SkyBuf`] view with no copy.
//! Native bytes come back as an owned `Vec<u8>`, which is always a copy
//! because the host does not manage that memory. The bytes are never
//! interpreted.

use std::marker::PhantomData;

use crate::sys::SkyBuf;

/// A [`SkyBuf`] borrowing host bytes for the duration of one call.
///
/// `repr(transparent)`, so a slice of these can be handed to native code
/// as a `sky_buf_t` array.
#[repr(transparent)]
#[derive(Debug, Clone, Copy)]
pub struct BufRef<'a> {
    raw: SkyBuf,
    _bytes: PhantomData<&'a [u8]>,
}

impl<'a> BufRef<'a> {
    /// Borrow `bytes` as a native buffer view
    #[inline]
    pub fn new(bytes: &'a [u8]) -> Self {
        BufRef {
            raw: SkyBuf {
                data: bytes.as_ptr(),
                len: bytes.len(),
            },
            _bytes: PhantomData,
        }
    }

    /// The raw view, valid while `'a` lasts
    #[inline]
    pub fn raw(&self) -> SkyBuf {
        self.raw
    }
}

/// Borrow every entry of `items` as a contiguous `sky_buf_t` array.
pub fn borrow_all<S: AsRef<[u8]>>(items: &[S]) -> Vec<BufRef<'_>> {
    items.iter().map(|item| BufRef::new(item.as_ref())).collect()
}

/// Writable scratch space handed to native code as an out-buffer.
///
/// Native code writes at most `capacity` bytes and shrinks `len` to the
/// number actually written.
pub struct OutBuf {
    store: Vec<u8>,
    raw: SkyBuf,
}

impl OutBuf {
    /// Allocate `capacity` zeroed bytes
    pub fn with_capacity(capacity: usize) -> Self {
        let mut store = vec![0u8; capacity];
        let raw = SkyBuf {
            data: store.as_mut_ptr().cast_const(),
            len: store.len(),
        };
        OutBuf { store, raw }
    }

    /// Pointer handed to native code
    pub fn as_mut_ptr(&mut self) -> *mut SkyBuf {
        &mut self.raw
    }

    /// Bytes written by native code.
    ///
    /// A `len` larger than the allocation (a misbehaving library) is
    /// clamped rather than trusted.
    pub fn into_written(mut self) -> Vec<u8> {
        let written = self.raw.len.min(self.store.len());
        self.store.truncate(written);
        self.store
    }
}

/// Copy a native buffer into host-owned bytes.
///
/// # Safety
///
/// `buf.data` must be readable for `buf.len` bytes, or `buf.len` must be 0.
pub unsafe fn copy_out(buf: SkyBuf) -> Vec<u8> {
    if buf.len == 0 || buf.data.is_null() {
        return Vec::new();
    }
    std::slice::from_raw_parts(buf.data, buf.len).to_vec()
}
