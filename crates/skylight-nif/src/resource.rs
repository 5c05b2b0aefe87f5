//! Opaque handle cells and their release hooks
//!
//! Each native pointer lives in exactly one cell. Cells sit behind an `Arc`
//! handed to the host; when the last host reference goes away `Drop` runs
//! the release hook. The bridge decides *whether* release frees native
//! memory; the host decides *when* it runs.
//!
//! A trace cell has three states:
//!
//! ```text
//! Owned(ptr) --submit ok--> Submitted (null sentinel, release is a no-op)
//! Owned(ptr) --unreachable--> Reclaimed (release calls sky_trace_free)
//! ```
//!
//! The sentinel lives in an `AtomicPtr` so a submission on one thread is
//! visible to a release running on another.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::gate::Libskylight;
use crate::sys::{SkyInstrumenter, SkyTrace, SkylightApi};

// ============================================================================
// Instrumenter
// ============================================================================

/// Cell owning one native instrumenter for its whole life.
///
/// The instrumenter is always the terminal owner: release unconditionally
/// calls `sky_instrumenter_free`.
pub struct InstrumenterCell {
    lib: Arc<Libskylight>,
    ptr: NonNull<SkyInstrumenter>,
}

// libskylight's instrumenter is safe to share across threads; concurrent
// use of one handle is otherwise the caller's business.
unsafe impl Send for InstrumenterCell {}
unsafe impl Sync for InstrumenterCell {}

impl InstrumenterCell {
    /// Take ownership of a freshly constructed instrumenter
    pub(crate) fn new(lib: Arc<Libskylight>, ptr: NonNull<SkyInstrumenter>) -> Self {
        tracing::trace!(ptr = ?ptr, "instrumenter handle created");
        InstrumenterCell { lib, ptr }
    }

    #[inline]
    pub(crate) fn api(&self) -> &SkylightApi {
        self.lib.api()
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut SkyInstrumenter {
        self.ptr.as_ptr()
    }
}

impl Drop for InstrumenterCell {
    fn drop(&mut self) {
        tracing::trace!(ptr = ?self.ptr, "releasing instrumenter");
        unsafe { (self.lib.api().instrumenter_free)(self.ptr.as_ptr()) }
    }
}

// ============================================================================
// Trace
// ============================================================================

/// Where a trace cell is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceState {
    /// The cell owns a live native trace
    Owned,
    /// Ownership moved into libskylight; the cell holds the sentinel
    Submitted,
}

/// Cell owning a native trace until it is either released or submitted.
pub struct TraceCell {
    lib: Arc<Libskylight>,
    // Null is the "already consumed" sentinel.
    ptr: AtomicPtr<SkyTrace>,
}

unsafe impl Send for TraceCell {}
unsafe impl Sync for TraceCell {}

impl TraceCell {
    /// Take ownership of a freshly constructed trace
    pub(crate) fn new(lib: Arc<Libskylight>, ptr: NonNull<SkyTrace>) -> Self {
        tracing::trace!(ptr = ?ptr, "trace handle created");
        TraceCell {
            lib,
            ptr: AtomicPtr::new(ptr.as_ptr()),
        }
    }

    #[inline]
    pub(crate) fn api(&self) -> &SkylightApi {
        self.lib.api()
    }

    /// Current state
    pub fn state(&self) -> TraceState {
        if self.ptr.load(Ordering::Acquire).is_null() {
            TraceState::Submitted
        } else {
            TraceState::Owned
        }
    }

    /// The live pointer, or [`BridgeError::TraceSubmitted`].
    #[inline]
    pub(crate) fn live(&self) -> BridgeResult<NonNull<SkyTrace>> {
        NonNull::new(self.ptr.load(Ordering::Acquire)).ok_or(BridgeError::TraceSubmitted)
    }

    /// Swap in the sentinel and hand back the pointer for a submission.
    ///
    /// From here until [`TraceCell::restore`] the cell looks consumed, so
    /// no other path can free or use the pointer while native code may be
    /// freeing it.
    pub(crate) fn take(&self) -> BridgeResult<NonNull<SkyTrace>> {
        NonNull::new(self.ptr.swap(ptr::null_mut(), Ordering::AcqRel))
            .ok_or(BridgeError::TraceSubmitted)
    }

    /// Put back a pointer whose submission was refused.
    pub(crate) fn restore(&self, ptr: NonNull<SkyTrace>) {
        self.ptr.store(ptr.as_ptr(), Ordering::Release);
    }
}

impl Drop for TraceCell {
    fn drop(&mut self) {
        let ptr = *self.ptr.get_mut();
        if ptr.is_null() {
            tracing::trace!("trace already submitted, release is a no-op");
            return;
        }
        tracing::trace!(ptr = ?ptr, "releasing trace");
        unsafe { (self.lib.api().trace_free)(ptr) }
    }
}
