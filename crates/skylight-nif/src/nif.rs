//! Host-facing function table
//!
//! Every entry decodes its [`Term`] arguments, calls into the typed bridge
//! API and encodes the result the way the host expects:
//!
//! | result               | term                                   |
//! |----------------------|----------------------------------------|
//! | load                 | `{ok, loaded}`, `{ok, already_loaded}`, `error` |
//! | soft success/failure | `ok` / `error`                         |
//! | `track_desc`         | `true` / `false`                       |
//! | getters              | binary                                 |
//! | clock, span handles  | integer                                |
//! | constructors         | handle term                            |
//!
//! Hard failures come back as `Err(BridgeError)`, which the host raises.
//! Every entry except `load_libskylight` checks the gate before it looks
//! at its arguments.

use crate::error::{BridgeError, BridgeResult};
use crate::gate::Gate;
use crate::instrumenter::Instrumenter;
use crate::sql;
use crate::term::{Args, Term, ToTerm};
use crate::trace::{SpanHandle, Trace};

/// Host module the functions are registered under
pub const MODULE_NAME: &str = "Elixir.Skylight.NIF";

type NifFn = for<'a> fn(&'a Gate, Args<'a>) -> BridgeResult<Term>;

/// One entry of the function table
#[derive(Clone, Copy)]
pub struct NifFunction {
    /// Host-visible name
    pub name: &'static str,
    /// Number of arguments
    pub arity: usize,
    fun: NifFn,
}

impl std::fmt::Debug for NifFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

macro_rules! nif {
    ($name:ident / $arity:literal) => {
        NifFunction {
            name: stringify!($name),
            arity: $arity,
            fun: $name,
        }
    };
}

static FUNCTIONS: [NifFunction; 18] = [
    nif!(load_libskylight / 1),
    nif!(hrtime / 0),
    nif!(instrumenter_new / 1),
    nif!(instrumenter_start / 1),
    nif!(instrumenter_stop / 1),
    nif!(instrumenter_submit_trace / 2),
    nif!(instrumenter_track_desc / 3),
    nif!(trace_new / 3),
    nif!(trace_start / 1),
    nif!(trace_endpoint / 1),
    nif!(trace_set_endpoint / 2),
    nif!(trace_uuid / 1),
    nif!(trace_set_uuid / 2),
    nif!(trace_instrument / 3),
    nif!(trace_span_set_title / 3),
    nif!(trace_span_set_desc / 3),
    nif!(trace_span_done / 3),
    nif!(lex_sql / 1),
];

/// The function table bound to a gate
#[derive(Debug, Clone, Copy)]
pub struct NifModule<'g> {
    gate: &'g Gate,
}

impl NifModule<'static> {
    /// The table bound to the process-wide gate
    pub fn global() -> Self {
        NifModule::new(Gate::global())
    }
}

impl<'g> NifModule<'g> {
    /// Bind the table to `gate`
    pub fn new(gate: &'g Gate) -> Self {
        NifModule { gate }
    }

    /// The gate calls go through
    pub fn gate(&self) -> &'g Gate {
        self.gate
    }

    /// Every registered function, in registration order
    pub fn functions() -> &'static [NifFunction] {
        &FUNCTIONS
    }

    /// Call `name` with `args`.
    ///
    /// An unknown name, or a known name with the wrong number of
    /// arguments, is `InvalidArgument`.
    pub fn call(&self, name: &str, args: &[Term]) -> BridgeResult<Term> {
        let function = FUNCTIONS
            .iter()
            .find(|f| f.name == name && f.arity == args.len())
            .ok_or_else(|| {
                BridgeError::InvalidArgument(format!(
                    "undefined function {}/{}",
                    name,
                    args.len()
                ))
            })?;
        (function.fun)(self.gate, Args::new(args))
    }
}

// ============================================================================
// Loader
// ============================================================================

fn load_libskylight<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    // Decided before the path is looked at.
    if gate.is_loaded() {
        return Ok(crate::gate::LoadStatus::AlreadyLoaded.to_term());
    }
    let path: &[u8] = args.get(0)?;
    Ok(match gate.load_bytes(path) {
        Ok(status) => status.to_term(),
        Err(_) => Term::ERROR,
    })
}

fn hrtime<'a>(gate: &'a Gate, _args: Args<'a>) -> BridgeResult<Term> {
    Ok(gate.hrtime()?.to_term())
}

// ============================================================================
// Instrumenter
// ============================================================================

fn instrumenter_new<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let env: Vec<&[u8]> = args.get(0)?;
    Ok(Instrumenter::new(gate, &env)?.to_term())
}

fn instrumenter_start<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let inst: &Instrumenter = args.get(0)?;
    Ok(inst.start().to_term())
}

fn instrumenter_stop<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let inst: &Instrumenter = args.get(0)?;
    Ok(inst.stop().to_term())
}

fn instrumenter_submit_trace<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let inst: &Instrumenter = args.get(0)?;
    let trace: &Trace = args.get(1)?;
    Ok(inst.submit_trace(trace)?.to_term())
}

fn instrumenter_track_desc<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let inst: &Instrumenter = args.get(0)?;
    let endpoint: &[u8] = args.get(1)?;
    let description: &[u8] = args.get(2)?;
    Ok(inst.track_description(endpoint, description)?.to_term())
}

// ============================================================================
// Trace
// ============================================================================

fn trace_new<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let start: u64 = args.get(0)?;
    let uuid: &[u8] = args.get(1)?;
    let endpoint: &[u8] = args.get(2)?;
    Ok(Trace::new(gate, start, uuid, endpoint)?.to_term())
}

fn trace_start<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let trace: &Trace = args.get(0)?;
    Ok(trace.start()?.to_term())
}

fn trace_endpoint<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let trace: &Trace = args.get(0)?;
    Ok(trace.endpoint()?.to_term())
}

fn trace_set_endpoint<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let trace: &Trace = args.get(0)?;
    let endpoint: &[u8] = args.get(1)?;
    Ok(trace.set_endpoint(endpoint)?.to_term())
}

fn trace_uuid<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let trace: &Trace = args.get(0)?;
    Ok(trace.uuid()?.to_term())
}

fn trace_set_uuid<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let trace: &Trace = args.get(0)?;
    let uuid: &[u8] = args.get(1)?;
    Ok(trace.set_uuid(uuid)?.to_term())
}

fn trace_instrument<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let trace: &Trace = args.get(0)?;
    let time: u64 = args.get(1)?;
    let category: &[u8] = args.get(2)?;
    Ok(trace.instrument(time, category)?.to_term())
}

fn trace_span_set_title<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let trace: &Trace = args.get(0)?;
    let span: SpanHandle = args.get(1)?;
    let title: &[u8] = args.get(2)?;
    Ok(trace.span_set_title(span, title)?.to_term())
}

fn trace_span_set_desc<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let trace: &Trace = args.get(0)?;
    let span: SpanHandle = args.get(1)?;
    let desc: &[u8] = args.get(2)?;
    Ok(trace.span_set_description(span, desc)?.to_term())
}

fn trace_span_done<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let trace: &Trace = args.get(0)?;
    let span: SpanHandle = args.get(1)?;
    // The host passes a 32-bit time here.
    let time: u32 = args.get(2)?;
    Ok(trace.span_done(span, u64::from(time))?.to_term())
}

// ============================================================================
// SQL
// ============================================================================

fn lex_sql<'a>(gate: &'a Gate, args: Args<'a>) -> BridgeResult<Term> {
    gate.libskylight()?;
    let sql: &[u8] = args.get(0)?;
    Ok(sql::lex_sql(gate, sql)?.to_term())
}
