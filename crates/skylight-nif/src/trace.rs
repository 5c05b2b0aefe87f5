//! Trace handles and spans
//!
//! A trace is one profiling session, typically one request. It is owned by
//! its handle until it is either dropped (and freed) or submitted to an
//! instrumenter (and owned by libskylight from then on). Every operation
//! on a submitted trace fails with [`BridgeError::TraceSubmitted`] before
//! reaching native code.
//!
//! Spans are not resources. They are numeric handles scoped to their
//! trace and die with it.

use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::buf::{self, BufRef};
use crate::error::{check, BridgeError, BridgeResult, Status};
use crate::gate::Gate;
use crate::resource::{TraceCell, TraceState};
use crate::sys::{SkyBuf, TraceGetBufFn, TraceSetBufFn};

/// Opaque span handle returned by [`Trace::instrument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanHandle(u32);

impl SpanHandle {
    /// Wrap a raw handle received from the host
    pub const fn from_raw(raw: u32) -> Self {
        SpanHandle(raw)
    }

    /// The raw handle
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Host handle to a native trace
#[derive(Clone)]
pub struct Trace {
    cell: Arc<TraceCell>,
}

impl Trace {
    /// Create a trace.
    ///
    /// # Arguments
    /// * `start` - start time on the native clock (see [`Gate::hrtime`])
    /// * `uuid` - request identifier
    /// * `endpoint` - endpoint name, e.g. `UsersController#show`
    pub fn new(gate: &Gate, start: u64, uuid: &[u8], endpoint: &[u8]) -> BridgeResult<Self> {
        let lib = gate.libskylight()?;
        let uuid = BufRef::new(uuid);
        let endpoint = BufRef::new(endpoint);

        let mut out = ptr::null_mut();
        let code = unsafe { (lib.api().trace_new)(start, uuid.raw(), endpoint.raw(), &mut out) };
        check("sky_trace_new", code)?;
        let ptr = NonNull::new(out).ok_or(BridgeError::NativeCallFailed {
            function: "sky_trace_new",
            code,
        })?;

        Ok(Trace {
            cell: Arc::new(TraceCell::new(Arc::clone(lib), ptr)),
        })
    }

    pub(crate) fn cell(&self) -> &TraceCell {
        &self.cell
    }

    /// Lifecycle state of the underlying native trace
    pub fn state(&self) -> TraceState {
        self.cell.state()
    }

    /// Mark the trace started; returns the native clock value used
    pub fn start(&self) -> BridgeResult<u64> {
        let trace = self.cell.live()?;
        let mut out = 0u64;
        let code = unsafe { (self.cell.api().trace_start)(trace.as_ptr(), &mut out) };
        check("sky_trace_start", code)?;
        Ok(out)
    }

    /// Current endpoint name
    pub fn endpoint(&self) -> BridgeResult<Vec<u8>> {
        self.get_buf(self.cell.api().trace_endpoint, "sky_trace_endpoint")
    }

    /// Replace the endpoint name; a refusal leaves the old one in place
    pub fn set_endpoint(&self, endpoint: &[u8]) -> BridgeResult<Status> {
        self.set_buf(self.cell.api().trace_set_endpoint, endpoint)
    }

    /// Current request identifier
    pub fn uuid(&self) -> BridgeResult<Vec<u8>> {
        self.get_buf(self.cell.api().trace_uuid, "sky_trace_uuid")
    }

    /// Replace the request identifier
    pub fn set_uuid(&self, uuid: &[u8]) -> BridgeResult<Status> {
        self.set_buf(self.cell.api().trace_set_uuid, uuid)
    }

    /// Open a span at `time`, tagged with `category` (e.g. `db.sql.query`)
    pub fn instrument(&self, time: u64, category: &[u8]) -> BridgeResult<SpanHandle> {
        let trace = self.cell.live()?;
        let category = BufRef::new(category);
        let mut out = 0u32;

        let code = unsafe {
            (self.cell.api().trace_instrument)(trace.as_ptr(), time, category.raw(), &mut out)
        };
        check("sky_trace_instrument", code)?;

        Ok(SpanHandle(out))
    }

    /// Set the title of an open span
    pub fn span_set_title(&self, span: SpanHandle, title: &[u8]) -> BridgeResult<Status> {
        let trace = self.cell.live()?;
        let title = BufRef::new(title);
        let code =
            unsafe { (self.cell.api().trace_span_set_title)(trace.as_ptr(), span.0, title.raw()) };
        Ok(Status::from_code(code))
    }

    /// Set the description of an open span
    pub fn span_set_description(&self, span: SpanHandle, desc: &[u8]) -> BridgeResult<Status> {
        let trace = self.cell.live()?;
        let desc = BufRef::new(desc);
        let code =
            unsafe { (self.cell.api().trace_span_set_desc)(trace.as_ptr(), span.0, desc.raw()) };
        Ok(Status::from_code(code))
    }

    /// Close a span at `time`.
    ///
    /// Closing a span twice, or one the trace never issued, is refused by
    /// libskylight and comes back as `Status::Error`.
    pub fn span_done(&self, span: SpanHandle, time: u64) -> BridgeResult<Status> {
        let trace = self.cell.live()?;
        let code = unsafe { (self.cell.api().trace_span_done)(trace.as_ptr(), span.0, time) };
        Ok(Status::from_code(code))
    }

    /// Whether two handles refer to the same native trace
    pub fn ptr_eq(&self, other: &Trace) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    fn get_buf(&self, getter: TraceGetBufFn, function: &'static str) -> BridgeResult<Vec<u8>> {
        let trace = self.cell.live()?;
        let mut out = SkyBuf {
            data: ptr::null(),
            len: 0,
        };
        let code = unsafe { getter(trace.as_ptr(), &mut out) };
        check(function, code)?;
        // The view points into the trace; copy before anything can change it.
        Ok(unsafe { buf::copy_out(out) })
    }

    fn set_buf(&self, setter: TraceSetBufFn, value: &[u8]) -> BridgeResult<Status> {
        let trace = self.cell.live()?;
        let value = BufRef::new(value);
        let code = unsafe { setter(trace.as_ptr(), value.raw()) };
        Ok(Status::from_code(code))
    }

    #[cfg(any(test, feature = "test-support"))]
    pub(crate) fn as_raw(&self) -> BridgeResult<NonNull<crate::sys::SkyTrace>> {
        self.cell.live()
    }
}

impl PartialEq for Trace {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#Reference<trace {:p} {:?}>",
            Arc::as_ptr(&self.cell),
            self.state()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrumenter::Instrumenter;
    use crate::testing;

    fn new_trace(gate: &Gate) -> Trace {
        Trace::new(gate, 100, b"b5b7c2c6-uuid", b"UsersController#show").unwrap()
    }

    #[test]
    fn test_new_requires_loaded_gate() {
        let gate = Gate::new();
        assert!(matches!(
            Trace::new(&gate, 0, b"uuid", b"endpoint"),
            Err(BridgeError::NotLoaded)
        ));
    }

    #[test]
    fn test_native_refusal_produces_no_handle() {
        let gate = testing::loaded_gate();
        let before = testing::counters();
        let result = Trace::new(&gate, 0, testing::REJECT, b"endpoint");
        assert!(matches!(result, Err(BridgeError::NativeCallFailed { .. })));
        let delta = testing::counters().since(&before);
        assert_eq!(delta.traces_created, 0);
        assert_eq!(delta.traces_freed, 0);
    }

    #[test]
    fn test_accessors() {
        let gate = testing::loaded_gate();
        let trace = new_trace(&gate);

        assert_eq!(trace.endpoint().unwrap(), b"UsersController#show");
        assert_eq!(trace.uuid().unwrap(), b"b5b7c2c6-uuid");

        assert_eq!(trace.set_endpoint(b"UsersController#index").unwrap(), Status::Ok);
        assert_eq!(trace.endpoint().unwrap(), b"UsersController#index");

        assert_eq!(trace.set_uuid(b"other-uuid").unwrap(), Status::Ok);
        assert_eq!(trace.uuid().unwrap(), b"other-uuid");
    }

    #[test]
    fn test_failed_set_endpoint_keeps_old_value() {
        let gate = testing::loaded_gate();
        let trace = new_trace(&gate);

        let before = trace.endpoint().unwrap();
        assert_eq!(trace.set_endpoint(testing::REJECT).unwrap(), Status::Error);
        assert_eq!(trace.endpoint().unwrap(), before);
    }

    #[test]
    fn test_start_returns_native_clock() {
        let gate = testing::loaded_gate();
        let trace = new_trace(&gate);
        let before = gate.hrtime().unwrap();
        let started = trace.start().unwrap();
        assert!(started > before);
    }

    #[test]
    fn test_span_handles_are_distinct() {
        let gate = testing::loaded_gate();
        let trace = new_trace(&gate);

        let a = trace.instrument(110, b"app.controller.request").unwrap();
        let b = trace.instrument(120, b"db.sql.query").unwrap();
        let c = trace.instrument(130, b"view.render.template").unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_span_annotation_and_done() {
        let gate = testing::loaded_gate();
        let trace = new_trace(&gate);
        let span = trace.instrument(110, b"db.sql.query").unwrap();

        assert_eq!(trace.span_set_title(span, b"SELECT FROM users").unwrap(), Status::Ok);
        assert_eq!(
            trace.span_set_description(span, b"SELECT * FROM users WHERE id = ?").unwrap(),
            Status::Ok
        );
        assert_eq!(trace.span_done(span, 150).unwrap(), Status::Ok);
        assert_eq!(trace.span_done(span, 160).unwrap(), Status::Error);

        let unknown = SpanHandle::from_raw(9_999);
        assert_eq!(trace.span_set_title(unknown, b"x").unwrap(), Status::Error);
        assert_eq!(trace.span_set_description(unknown, b"x").unwrap(), Status::Error);
        assert_eq!(trace.span_done(unknown, 170).unwrap(), Status::Error);
    }

    #[test]
    fn test_drop_without_submit_frees_once() {
        let gate = testing::loaded_gate();
        let before = testing::counters();

        let trace = new_trace(&gate);
        let alias = trace.clone();
        drop(trace);
        assert_eq!(testing::counters().since(&before).traces_freed, 0);
        drop(alias);

        let delta = testing::counters().since(&before);
        assert_eq!(delta.traces_freed, 1);
        assert_eq!(delta.traces_submitted, 0);
    }

    #[test]
    fn test_submitted_trace_rejects_operations() {
        let gate = testing::loaded_gate();
        let inst = Instrumenter::new(&gate, &["SKYLIGHT_VERSION", "5.0.0"]).unwrap();
        assert_eq!(inst.start(), Status::Ok);

        let trace = new_trace(&gate);
        let span = trace.instrument(110, b"db.sql.query").unwrap();
        assert_eq!(inst.submit_trace(&trace).unwrap(), Status::Ok);
        assert_eq!(trace.state(), TraceState::Submitted);

        assert!(matches!(trace.start(), Err(BridgeError::TraceSubmitted)));
        assert!(matches!(trace.endpoint(), Err(BridgeError::TraceSubmitted)));
        assert!(matches!(trace.set_uuid(b"x"), Err(BridgeError::TraceSubmitted)));
        assert!(matches!(trace.instrument(1, b"x"), Err(BridgeError::TraceSubmitted)));
        assert!(matches!(trace.span_done(span, 1), Err(BridgeError::TraceSubmitted)));
        assert!(matches!(inst.submit_trace(&trace), Err(BridgeError::TraceSubmitted)));
    }
}
