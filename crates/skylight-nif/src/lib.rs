//! Skylight NIF - bridge between a garbage-collected host and libskylight
//!
//! libskylight is the closed-source Skylight profiling agent. It is not
//! linked at build time: the host calls `load_libskylight` with a path and
//! every entry point is resolved from that library at runtime. Until then
//! each operation fails with [`BridgeError::NotLoaded`].
//!
//! Native instrumenters and traces are handed to the host as
//! reference-counted handles. The host's collector decides when a handle
//! dies; the bridge decides whether that frees native memory, which matters
//! for traces because submitting one moves it into libskylight.
//!
//! # Example
//!
//! ```ignore
//! use skylight_nif::{Gate, Instrumenter, Trace};
//!
//! let gate = Gate::global();
//! gate.load("/opt/skylight/libskylight.so")?;
//!
//! let inst = Instrumenter::new(gate, &["SKYLIGHT_VERSION", "5.0.0"])?;
//! inst.start();
//!
//! let trace = Trace::new(gate, gate.hrtime()?, b"uuid", b"UsersController#show")?;
//! let span = trace.instrument(gate.hrtime()?, b"db.sql.query")?;
//! trace.span_done(span, gate.hrtime()?)?;
//! inst.submit_trace(&trace)?;
//! ```
//!
//! Host runtimes drive the same API through [`NifModule`], which speaks
//! [`Term`]s.

#![warn(missing_docs)]

pub mod buf;
pub mod config;
pub mod error;
pub mod gate;
pub mod instrumenter;
pub mod loader;
pub mod nif;
pub mod resource;
pub mod sql;
pub mod sys;
pub mod term;
pub mod trace;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{ConfigError, SkylightConfig};
pub use error::{BridgeError, BridgeResult, Status};
pub use gate::{Gate, Libskylight, LoadStatus};
pub use instrumenter::{Instrumenter, MAX_ENV_ENTRIES};
pub use loader::LoadError;
pub use nif::{NifFunction, NifModule, MODULE_NAME};
pub use resource::TraceState;
pub use sql::LexedSql;
pub use term::{Args, Atom, FromTerm, Term, ToTerm, TypeMismatch};
pub use trace::{SpanHandle, Trace};
