//! Raw libskylight C ABI
//!
//! Mirrors the symbols exported by the closed-source libskylight shared
//! library. Nothing here is linked at build time: [`SkylightApi`] is filled
//! in from a [`Library`] at runtime (or handed a prebuilt table) and every
//! native call goes through it.
//!
//! Every `c_int` status uses `0` for success. `sky_lex_sql` is the one
//! exception: only a negative status is a failure.

use std::os::raw::c_int;

use crate::loader::{Library, LoadError};

// ============================================================================
// Opaque Types
// ============================================================================

/// `sky_buf_t`: a `(pointer, length)` view over bytes owned by someone else.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SkyBuf {
    /// First byte of the view (may be null when `len` is 0)
    pub data: *const u8,
    /// Number of bytes in the view
    pub len: usize,
}

/// Opaque `sky_instrumenter_t`
#[repr(C)]
pub struct SkyInstrumenter {
    _private: [u8; 0],
}

/// Opaque `sky_trace_t`
#[repr(C)]
pub struct SkyTrace {
    _private: [u8; 0],
}

// ============================================================================
// Function Signatures
// ============================================================================

/// `uint64_t sky_hrtime()`
pub type HrtimeFn = unsafe extern "C" fn() -> u64;
/// `int sky_instrumenter_new(sky_buf_t* env, int envc, sky_instrumenter_t** out)`
pub type InstrumenterNewFn =
    unsafe extern "C" fn(*const SkyBuf, c_int, *mut *mut SkyInstrumenter) -> c_int;
/// `void sky_instrumenter_free(sky_instrumenter_t* inst)`
pub type InstrumenterFreeFn = unsafe extern "C" fn(*mut SkyInstrumenter);
/// `int sky_instrumenter_start(const sky_instrumenter_t* inst)`
pub type InstrumenterStartFn = unsafe extern "C" fn(*const SkyInstrumenter) -> c_int;
/// `int sky_instrumenter_stop(sky_instrumenter_t* inst)`
pub type InstrumenterStopFn = unsafe extern "C" fn(*mut SkyInstrumenter) -> c_int;
/// `int sky_instrumenter_submit_trace(const sky_instrumenter_t* inst, sky_trace_t* trace)`
///
/// Takes ownership of the trace when it returns 0.
pub type InstrumenterSubmitTraceFn =
    unsafe extern "C" fn(*const SkyInstrumenter, *mut SkyTrace) -> c_int;
/// `int sky_instrumenter_track_desc(sky_instrumenter_t* inst, sky_buf_t endpoint, sky_buf_t desc, int* out)`
pub type InstrumenterTrackDescFn =
    unsafe extern "C" fn(*mut SkyInstrumenter, SkyBuf, SkyBuf, *mut c_int) -> c_int;
/// `int sky_trace_new(uint64_t start, sky_buf_t uuid, sky_buf_t endpoint, sky_trace_t** out)`
pub type TraceNewFn = unsafe extern "C" fn(u64, SkyBuf, SkyBuf, *mut *mut SkyTrace) -> c_int;
/// `void sky_trace_free(sky_trace_t* trace)`
pub type TraceFreeFn = unsafe extern "C" fn(*mut SkyTrace);
/// `int sky_trace_start(const sky_trace_t* trace, uint64_t* out)`
pub type TraceStartFn = unsafe extern "C" fn(*const SkyTrace, *mut u64) -> c_int;
/// `int sky_trace_endpoint(const sky_trace_t* trace, sky_buf_t* out)`, also `sky_trace_uuid`
pub type TraceGetBufFn = unsafe extern "C" fn(*const SkyTrace, *mut SkyBuf) -> c_int;
/// `int sky_trace_set_endpoint(sky_trace_t* trace, sky_buf_t endpoint)`, also `sky_trace_set_uuid`
pub type TraceSetBufFn = unsafe extern "C" fn(*mut SkyTrace, SkyBuf) -> c_int;
/// `int sky_trace_instrument(sky_trace_t* trace, uint64_t time, sky_buf_t category, uint32_t* out)`
pub type TraceInstrumentFn = unsafe extern "C" fn(*mut SkyTrace, u64, SkyBuf, *mut u32) -> c_int;
/// `int sky_trace_span_set_title(sky_trace_t* trace, uint32_t handle, sky_buf_t title)`, also `_desc`
pub type TraceSpanSetBufFn = unsafe extern "C" fn(*mut SkyTrace, u32, SkyBuf) -> c_int;
/// `int sky_trace_span_done(sky_trace_t* trace, uint32_t handle, uint64_t time)`
pub type TraceSpanDoneFn = unsafe extern "C" fn(*mut SkyTrace, u32, u64) -> c_int;
/// `int sky_lex_sql(sky_buf_t sql, sky_buf_t* title, sky_buf_t* statement)`
pub type LexSqlFn = unsafe extern "C" fn(SkyBuf, *mut SkyBuf, *mut SkyBuf) -> c_int;

// ============================================================================
// Function Table
// ============================================================================

/// Every libskylight entry point the bridge calls. There are no optional
/// entries: a table either exists with all of them or does not exist.
#[allow(missing_docs)] // fields are named after their `sky_` symbols
#[derive(Debug, Clone, Copy)]
pub struct SkylightApi {
    pub hrtime: HrtimeFn,
    pub instrumenter_new: InstrumenterNewFn,
    pub instrumenter_free: InstrumenterFreeFn,
    pub instrumenter_start: InstrumenterStartFn,
    pub instrumenter_stop: InstrumenterStopFn,
    pub instrumenter_submit_trace: InstrumenterSubmitTraceFn,
    pub instrumenter_track_desc: InstrumenterTrackDescFn,
    pub trace_new: TraceNewFn,
    pub trace_free: TraceFreeFn,
    pub trace_start: TraceStartFn,
    pub trace_endpoint: TraceGetBufFn,
    pub trace_set_endpoint: TraceSetBufFn,
    pub trace_uuid: TraceGetBufFn,
    pub trace_set_uuid: TraceSetBufFn,
    pub trace_instrument: TraceInstrumentFn,
    pub trace_span_set_title: TraceSpanSetBufFn,
    pub trace_span_set_desc: TraceSpanSetBufFn,
    pub trace_span_done: TraceSpanDoneFn,
    pub lex_sql: LexSqlFn,
}

/// Symbol names resolved by [`SkylightApi::resolve`], in table order.
pub const SYMBOLS: [&str; 19] = [
    "sky_hrtime",
    "sky_instrumenter_new",
    "sky_instrumenter_free",
    "sky_instrumenter_start",
    "sky_instrumenter_stop",
    "sky_instrumenter_submit_trace",
    "sky_instrumenter_track_desc",
    "sky_trace_new",
    "sky_trace_free",
    "sky_trace_start",
    "sky_trace_endpoint",
    "sky_trace_set_endpoint",
    "sky_trace_uuid",
    "sky_trace_set_uuid",
    "sky_trace_instrument",
    "sky_trace_span_set_title",
    "sky_trace_span_set_desc",
    "sky_trace_span_done",
    "sky_lex_sql",
];

impl SkylightApi {
    /// Resolve every entry point from an opened library.
    ///
    /// Fails on the first missing symbol; no partially filled table is
    /// ever produced.
    ///
    /// # Safety
    ///
    /// The library must be a libskylight build exporting [`SYMBOLS`] with
    /// the signatures declared in this module, and it must stay loaded for
    /// as long as the returned table (or anything created through it) is
    /// in use.
    pub unsafe fn resolve(library: &Library) -> Result<Self, LoadError> {
        Ok(SkylightApi {
            hrtime: library.get("sky_hrtime")?,
            instrumenter_new: library.get("sky_instrumenter_new")?,
            instrumenter_free: library.get("sky_instrumenter_free")?,
            instrumenter_start: library.get("sky_instrumenter_start")?,
            instrumenter_stop: library.get("sky_instrumenter_stop")?,
            instrumenter_submit_trace: library.get("sky_instrumenter_submit_trace")?,
            instrumenter_track_desc: library.get("sky_instrumenter_track_desc")?,
            trace_new: library.get("sky_trace_new")?,
            trace_free: library.get("sky_trace_free")?,
            trace_start: library.get("sky_trace_start")?,
            trace_endpoint: library.get("sky_trace_endpoint")?,
            trace_set_endpoint: library.get("sky_trace_set_endpoint")?,
            trace_uuid: library.get("sky_trace_uuid")?,
            trace_set_uuid: library.get("sky_trace_set_uuid")?,
            trace_instrument: library.get("sky_trace_instrument")?,
            trace_span_set_title: library.get("sky_trace_span_set_title")?,
            trace_span_set_desc: library.get("sky_trace_span_set_desc")?,
            trace_span_done: library.get("sky_trace_span_done")?,
            lex_sql: library.get("sky_lex_sql")?,
        })
    }
}
