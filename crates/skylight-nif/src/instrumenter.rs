//! Instrumenter handles
//!
//! The instrumenter is libskylight's process-wide profiling agent. A handle
//! is a cheap, cloneable reference; the native instrumenter is freed when
//! the last clone is dropped.

use std::os::raw::c_int;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::buf::{self, BufRef};
use crate::error::{check, BridgeError, BridgeResult, Status};
use crate::gate::Gate;
use crate::resource::InstrumenterCell;
use crate::sys::SkyBuf;
use crate::trace::Trace;

/// Largest number of env entries `instrumenter_new` accepts
pub const MAX_ENV_ENTRIES: usize = 255;

/// Host handle to a native instrumenter
#[derive(Clone)]
pub struct Instrumenter {
    cell: Arc<InstrumenterCell>,
}

impl Instrumenter {
    /// Create an instrumenter from env entries.
    ///
    /// `env` is the flat `[KEY, VALUE, KEY, VALUE, ...]` list libskylight
    /// reads its settings from, e.g.
    /// `["SKYLIGHT_VERSION", "5.0.0", "SKYLIGHT_LAZY_START", "true"]`.
    /// Pairing is not checked here; libskylight does that.
    ///
    /// # Errors
    /// * `NotLoaded` - the gate is empty
    /// * `TooManyEnvPairs` - 256 or more entries; nothing is allocated
    /// * `NativeCallFailed` - `sky_instrumenter_new` refused; no handle exists
    pub fn new<S: AsRef<[u8]>>(gate: &Gate, env: &[S]) -> BridgeResult<Self> {
        let lib = gate.libskylight()?;

        if env.len() > MAX_ENV_ENTRIES {
            return Err(BridgeError::TooManyEnvPairs {
                count: env.len(),
                max: MAX_ENV_ENTRIES,
            });
        }

        let bufs = buf::borrow_all(env);
        let mut out = ptr::null_mut();
        let code = unsafe {
            (lib.api().instrumenter_new)(
                bufs.as_ptr().cast::<SkyBuf>(),
                bufs.len() as c_int,
                &mut out,
            )
        };
        check("sky_instrumenter_new", code)?;
        let ptr = NonNull::new(out).ok_or(BridgeError::NativeCallFailed {
            function: "sky_instrumenter_new",
            code,
        })?;

        Ok(Instrumenter {
            cell: Arc::new(InstrumenterCell::new(Arc::clone(lib), ptr)),
        })
    }

    /// Start the agent
    pub fn start(&self) -> Status {
        let code = unsafe { (self.cell.api().instrumenter_start)(self.cell.as_ptr()) };
        Status::from_code(code)
    }

    /// Stop the agent
    pub fn stop(&self) -> Status {
        let code = unsafe { (self.cell.api().instrumenter_stop)(self.cell.as_ptr()) };
        Status::from_code(code)
    }

    /// Hand `trace` over to libskylight.
    ///
    /// On `Status::Ok` the native trace belongs to libskylight and `trace`
    /// is in the submitted state; dropping it frees nothing. On
    /// `Status::Error` the trace is untouched and still owned by its handle.
    ///
    /// # Errors
    /// * `TraceSubmitted` - `trace` was already submitted
    pub fn submit_trace(&self, trace: &Trace) -> BridgeResult<Status> {
        let cell = trace.cell();
        let raw = cell.take()?;

        let code = unsafe {
            (self.cell.api().instrumenter_submit_trace)(self.cell.as_ptr(), raw.as_ptr())
        };

        if code == 0 {
            tracing::debug!(trace = ?raw, "trace submitted");
            Ok(Status::Ok)
        } else {
            cell.restore(raw);
            Ok(Status::Error)
        }
    }

    /// Whether `description` is being tracked for `endpoint`.
    ///
    /// A native failure is an error, never `false`.
    pub fn track_description(&self, endpoint: &[u8], description: &[u8]) -> BridgeResult<bool> {
        let endpoint = BufRef::new(endpoint);
        let description = BufRef::new(description);
        let mut tracked: c_int = 0;

        let code = unsafe {
            (self.cell.api().instrumenter_track_desc)(
                self.cell.as_ptr(),
                endpoint.raw(),
                description.raw(),
                &mut tracked,
            )
        };
        check("sky_instrumenter_track_desc", code)?;

        Ok(tracked != 0)
    }

    /// Whether two handles refer to the same native instrumenter
    pub fn ptr_eq(&self, other: &Instrumenter) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    #[cfg(any(test, feature = "test-support"))]
    pub(crate) fn as_raw(&self) -> *mut crate::sys::SkyInstrumenter {
        self.cell.as_ptr()
    }
}

impl PartialEq for Instrumenter {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl std::fmt::Debug for Instrumenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#Reference<instrumenter {:p}>", self.cell.as_ptr())
    }
}
