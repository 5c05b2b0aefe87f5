//! In-memory stand-in for libskylight
//!
//! [`fake_api`] returns a [`SkylightApi`] whose entry points are plain Rust
//! `extern "C"` functions over boxed fake instrumenters and traces. It
//! follows the native contract closely enough to exercise the bridge: it
//! hands out and frees pointers, consumes traces on submission, refuses
//! unknown or closed spans, and writes into caller buffers for the lexer.
//!
//! Any input buffer equal to [`REJECT`] makes the receiving call return a
//! failure status, which is how tests reach native error paths.
//!
//! Allocation and free counts are kept per thread (see [`counters`]), so
//! tests running in parallel do not see each other's handles.

use std::cell::Cell;
use std::collections::HashMap;
use std::os::raw::c_int;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::gate::Gate;
use crate::instrumenter::Instrumenter;
use crate::sys::{SkyBuf, SkyInstrumenter, SkyTrace, SkylightApi};
use crate::trace::Trace;

/// Input that every fake entry point refuses
pub const REJECT: &[u8] = b"__skylight_reject__";

/// Distinct descriptions tracked per endpoint before `track_desc` says no
pub const DESCRIPTIONS_PER_ENDPOINT: usize = 2;

const OK: c_int = 0;
const FAIL: c_int = -1;

// ============================================================================
// Counters
// ============================================================================

/// Per-thread tallies of fake native allocations and frees
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    /// Successful `sky_instrumenter_new` calls
    pub instrumenters_created: usize,
    /// `sky_instrumenter_free` calls
    pub instrumenters_freed: usize,
    /// Successful `sky_trace_new` calls
    pub traces_created: usize,
    /// `sky_trace_free` calls
    pub traces_freed: usize,
    /// Traces consumed (and freed) by `sky_instrumenter_submit_trace`
    pub traces_submitted: usize,
}

impl Counters {
    /// Difference between now and an earlier snapshot
    pub fn since(&self, before: &Counters) -> Counters {
        Counters {
            instrumenters_created: self.instrumenters_created - before.instrumenters_created,
            instrumenters_freed: self.instrumenters_freed - before.instrumenters_freed,
            traces_created: self.traces_created - before.traces_created,
            traces_freed: self.traces_freed - before.traces_freed,
            traces_submitted: self.traces_submitted - before.traces_submitted,
        }
    }
}

thread_local! {
    static COUNTERS: Cell<Counters> = Cell::new(Counters::default());
}

fn bump(f: impl FnOnce(&mut Counters)) {
    COUNTERS.with(|cell| {
        let mut counters = cell.get();
        f(&mut counters);
        cell.set(counters);
    });
}

/// Snapshot of this thread's counters
pub fn counters() -> Counters {
    COUNTERS.with(Cell::get)
}

// ============================================================================
// Fake native objects
// ============================================================================

static CLOCK: AtomicU64 = AtomicU64::new(1_000_000_000);

struct FakeInstrumenter {
    env: Vec<Vec<u8>>,
    state: Mutex<InstrumenterState>,
}

#[derive(Default)]
struct InstrumenterState {
    running: bool,
    tracked: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    submitted: Vec<SubmittedTrace>,
}

/// What the fake instrumenter kept from a submitted trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTrace {
    /// Request identifier at submission time
    pub uuid: Vec<u8>,
    /// Endpoint at submission time
    pub endpoint: Vec<u8>,
    /// Time reported by `sky_trace_start`, if the trace was started
    pub started_at: Option<u64>,
    /// Spans recorded on the trace
    pub spans: Vec<SpanRecord>,
}

/// One span as the fake trace recorded it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanRecord {
    /// Category given to `sky_trace_instrument`
    pub category: Vec<u8>,
    /// Open time
    pub opened_at: u64,
    /// Title, if set
    pub title: Option<Vec<u8>>,
    /// Description, if set
    pub description: Option<Vec<u8>>,
    /// Close time, if closed
    pub closed_at: Option<u64>,
}

struct FakeTrace {
    start: u64,
    started_at: Cell<Option<u64>>,
    uuid: Vec<u8>,
    endpoint: Vec<u8>,
    spans: Vec<SpanRecord>,
}

unsafe fn bytes<'a>(buf: SkyBuf) -> &'a [u8] {
    if buf.len == 0 || buf.data.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(buf.data, buf.len)
    }
}

unsafe fn instrumenter<'a>(ptr: *const SkyInstrumenter) -> &'a FakeInstrumenter {
    &*(ptr as *const FakeInstrumenter)
}

unsafe fn trace<'a>(ptr: *const SkyTrace) -> &'a FakeTrace {
    &*(ptr as *const FakeTrace)
}

unsafe fn trace_mut<'a>(ptr: *mut SkyTrace) -> &'a mut FakeTrace {
    &mut *(ptr as *mut FakeTrace)
}

// ============================================================================
// Entry points
// ============================================================================

unsafe extern "C" fn fake_hrtime() -> u64 {
    CLOCK.fetch_add(1_000, Ordering::Relaxed) + 1_000
}

unsafe extern "C" fn fake_instrumenter_new(
    env: *const SkyBuf,
    envc: c_int,
    out: *mut *mut SkyInstrumenter,
) -> c_int {
    let entries: Vec<Vec<u8>> = if env.is_null() || envc <= 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(env, envc as usize)
            .iter()
            .map(|buf| bytes(*buf).to_vec())
            .collect()
    };
    if entries.iter().any(|entry| entry.as_slice() == REJECT) {
        return FAIL;
    }

    let inst = Box::new(FakeInstrumenter {
        env: entries,
        state: Mutex::new(InstrumenterState::default()),
    });
    *out = Box::into_raw(inst) as *mut SkyInstrumenter;
    bump(|c| c.instrumenters_created += 1);
    OK
}

unsafe extern "C" fn fake_instrumenter_free(inst: *mut SkyInstrumenter) {
    drop(Box::from_raw(inst as *mut FakeInstrumenter));
    bump(|c| c.instrumenters_freed += 1);
}

unsafe extern "C" fn fake_instrumenter_start(inst: *const SkyInstrumenter) -> c_int {
    instrumenter(inst).state.lock().running = true;
    OK
}

unsafe extern "C" fn fake_instrumenter_stop(inst: *mut SkyInstrumenter) -> c_int {
    let mut state = instrumenter(inst).state.lock();
    if !state.running {
        return FAIL;
    }
    state.running = false;
    OK
}

unsafe extern "C" fn fake_instrumenter_submit_trace(
    inst: *const SkyInstrumenter,
    trace: *mut SkyTrace,
) -> c_int {
    let mut state = instrumenter(inst).state.lock();
    if !state.running || trace.is_null() {
        return FAIL;
    }

    // Ownership moves in here: the trace is consumed.
    let trace = Box::from_raw(trace as *mut FakeTrace);
    state.submitted.push(SubmittedTrace {
        uuid: trace.uuid,
        endpoint: trace.endpoint,
        started_at: trace.started_at.get(),
        spans: trace.spans,
    });
    bump(|c| c.traces_submitted += 1);
    OK
}

unsafe extern "C" fn fake_instrumenter_track_desc(
    inst: *mut SkyInstrumenter,
    endpoint: SkyBuf,
    desc: SkyBuf,
    out: *mut c_int,
) -> c_int {
    let endpoint = bytes(endpoint);
    let desc = bytes(desc);
    if endpoint == REJECT || desc == REJECT {
        return FAIL;
    }

    let mut state = instrumenter(inst).state.lock();
    let tracked = state.tracked.entry(endpoint.to_vec()).or_default();
    let is_tracked = if tracked.iter().any(|d| d.as_slice() == desc) {
        true
    } else if tracked.len() < DESCRIPTIONS_PER_ENDPOINT {
        tracked.push(desc.to_vec());
        true
    } else {
        false
    };
    *out = is_tracked as c_int;
    OK
}

unsafe extern "C" fn fake_trace_new(
    start: u64,
    uuid: SkyBuf,
    endpoint: SkyBuf,
    out: *mut *mut SkyTrace,
) -> c_int {
    let uuid = bytes(uuid);
    let endpoint = bytes(endpoint);
    if uuid == REJECT || endpoint == REJECT {
        return FAIL;
    }

    let trace = Box::new(FakeTrace {
        start,
        started_at: Cell::new(None),
        uuid: uuid.to_vec(),
        endpoint: endpoint.to_vec(),
        spans: Vec::new(),
    });
    *out = Box::into_raw(trace) as *mut SkyTrace;
    bump(|c| c.traces_created += 1);
    OK
}

unsafe extern "C" fn fake_trace_free(trace: *mut SkyTrace) {
    drop(Box::from_raw(trace as *mut FakeTrace));
    bump(|c| c.traces_freed += 1);
}

unsafe extern "C" fn fake_trace_start(ptr: *const SkyTrace, out: *mut u64) -> c_int {
    let trace = trace(ptr);
    let now = fake_hrtime().max(trace.start);
    trace.started_at.set(Some(now));
    *out = now;
    OK
}

unsafe extern "C" fn fake_trace_endpoint(ptr: *const SkyTrace, out: *mut SkyBuf) -> c_int {
    let trace = trace(ptr);
    *out = SkyBuf {
        data: trace.endpoint.as_ptr(),
        len: trace.endpoint.len(),
    };
    OK
}

unsafe extern "C" fn fake_trace_set_endpoint(ptr: *mut SkyTrace, endpoint: SkyBuf) -> c_int {
    let endpoint = bytes(endpoint);
    if endpoint == REJECT || endpoint.is_empty() {
        return FAIL;
    }
    trace_mut(ptr).endpoint = endpoint.to_vec();
    OK
}

unsafe extern "C" fn fake_trace_uuid(ptr: *const SkyTrace, out: *mut SkyBuf) -> c_int {
    let trace = trace(ptr);
    *out = SkyBuf {
        data: trace.uuid.as_ptr(),
        len: trace.uuid.len(),
    };
    OK
}

unsafe extern "C" fn fake_trace_set_uuid(ptr: *mut SkyTrace, uuid: SkyBuf) -> c_int {
    let uuid = bytes(uuid);
    if uuid == REJECT {
        return FAIL;
    }
    trace_mut(ptr).uuid = uuid.to_vec();
    OK
}

unsafe extern "C" fn fake_trace_instrument(
    ptr: *mut SkyTrace,
    time: u64,
    category: SkyBuf,
    out: *mut u32,
) -> c_int {
    let category = bytes(category);
    if category == REJECT {
        return FAIL;
    }
    let trace = trace_mut(ptr);
    trace.spans.push(SpanRecord {
        category: category.to_vec(),
        opened_at: time,
        title: None,
        description: None,
        closed_at: None,
    });
    *out = (trace.spans.len() - 1) as u32;
    OK
}

unsafe fn span<'a>(ptr: *mut SkyTrace, handle: u32) -> Option<&'a mut SpanRecord> {
    trace_mut(ptr).spans.get_mut(handle as usize)
}

unsafe extern "C" fn fake_trace_span_set_title(
    ptr: *mut SkyTrace,
    handle: u32,
    title: SkyBuf,
) -> c_int {
    let title = bytes(title);
    match span(ptr, handle) {
        Some(span) if title != REJECT => {
            span.title = Some(title.to_vec());
            OK
        }
        _ => FAIL,
    }
}

unsafe extern "C" fn fake_trace_span_set_desc(
    ptr: *mut SkyTrace,
    handle: u32,
    desc: SkyBuf,
) -> c_int {
    let desc = bytes(desc);
    match span(ptr, handle) {
        Some(span) if desc != REJECT => {
            span.description = Some(desc.to_vec());
            OK
        }
        _ => FAIL,
    }
}

unsafe extern "C" fn fake_trace_span_done(ptr: *mut SkyTrace, handle: u32, time: u64) -> c_int {
    match span(ptr, handle) {
        Some(span) if span.closed_at.is_none() => {
            span.closed_at = Some(time);
            OK
        }
        _ => FAIL,
    }
}

unsafe extern "C" fn fake_lex_sql(
    sql: SkyBuf,
    title: *mut SkyBuf,
    statement: *mut SkyBuf,
) -> c_int {
    let sql = bytes(sql);
    if sql == REJECT {
        return FAIL;
    }

    let (normalized, heading) = normalize_sql(sql);
    write_out(&mut *statement, &normalized);
    write_out(&mut *title, &heading);
    OK
}

unsafe fn write_out(out: &mut SkyBuf, value: &[u8]) {
    let n = value.len().min(out.len);
    if n > 0 {
        std::ptr::copy_nonoverlapping(value.as_ptr(), out.data as *mut u8, n);
    }
    out.len = n;
}

// ============================================================================
// Toy SQL normalizer
// ============================================================================

/// Collapse whitespace, replace string and number literals with `?`, and
/// build a title from the leading keyword and table. The result is never
/// longer than the input.
fn normalize_sql(sql: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut out = Vec::with_capacity(sql.len());
    let mut i = 0;

    while i < sql.len() {
        let b = sql[i];
        if b.is_ascii_whitespace() {
            while i < sql.len() && sql[i].is_ascii_whitespace() {
                i += 1;
            }
            if !out.is_empty() && i < sql.len() {
                out.push(b' ');
            }
        } else if b == b'\'' {
            i += 1;
            while i < sql.len() && sql[i] != b'\'' {
                i += 1;
            }
            i += 1;
            out.push(b'?');
        } else if b.is_ascii_digit() && !out.last().is_some_and(|p| is_ident(*p)) {
            while i < sql.len() && (sql[i].is_ascii_digit() || sql[i] == b'.') {
                i += 1;
            }
            out.push(b'?');
        } else {
            out.push(b);
            i += 1;
        }
    }

    let title = sql_title(&out);
    (out, title)
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn sql_title(statement: &[u8]) -> Vec<u8> {
    let words: Vec<&[u8]> = statement
        .split(|b| *b == b' ')
        .filter(|w| !w.is_empty())
        .collect();
    let Some(first) = words.first() else {
        return Vec::new();
    };
    let keyword = first.to_ascii_uppercase();

    let after = |marker: &[u8]| {
        words
            .iter()
            .position(|w| w.eq_ignore_ascii_case(marker))
            .and_then(|idx| words.get(idx + 1))
            .copied()
    };
    let (joiner, table): (&[u8], Option<&[u8]>) = match keyword.as_slice() {
        b"SELECT" | b"DELETE" => (b" FROM ", after(b"FROM")),
        b"INSERT" => (b" INTO ", after(b"INTO")),
        b"UPDATE" => (b" ", words.get(1).copied()),
        _ => (b"", None),
    };

    let mut title = keyword;
    if let Some(table) = table {
        title.extend_from_slice(joiner);
        title.extend_from_slice(table);
    }
    title
}

// ============================================================================
// Public helpers
// ============================================================================

/// Function table backed by the fake
pub fn fake_api() -> SkylightApi {
    SkylightApi {
        hrtime: fake_hrtime,
        instrumenter_new: fake_instrumenter_new,
        instrumenter_free: fake_instrumenter_free,
        instrumenter_start: fake_instrumenter_start,
        instrumenter_stop: fake_instrumenter_stop,
        instrumenter_submit_trace: fake_instrumenter_submit_trace,
        instrumenter_track_desc: fake_instrumenter_track_desc,
        trace_new: fake_trace_new,
        trace_free: fake_trace_free,
        trace_start: fake_trace_start,
        trace_endpoint: fake_trace_endpoint,
        trace_set_endpoint: fake_trace_set_endpoint,
        trace_uuid: fake_trace_uuid,
        trace_set_uuid: fake_trace_set_uuid,
        trace_instrument: fake_trace_instrument,
        trace_span_set_title: fake_trace_span_set_title,
        trace_span_set_desc: fake_trace_span_set_desc,
        trace_span_done: fake_trace_span_done,
        lex_sql: fake_lex_sql,
    }
}

/// A fresh gate already loaded with [`fake_api`]
pub fn loaded_gate() -> Gate {
    let gate = Gate::new();
    let _ = gate.load_table(fake_api());
    gate
}

/// Env entries the fake instrumenter was constructed with.
///
/// Only valid for instrumenters created through [`fake_api`].
pub fn instrumenter_env(inst: &Instrumenter) -> Vec<Vec<u8>> {
    unsafe { instrumenter(inst.as_raw()).env.clone() }
}

/// Traces the fake instrumenter has taken ownership of, oldest first.
///
/// Only valid for instrumenters created through [`fake_api`].
pub fn submitted_traces(inst: &Instrumenter) -> Vec<SubmittedTrace> {
    unsafe { instrumenter(inst.as_raw()).state.lock().submitted.clone() }
}

/// Spans recorded on a live fake trace; empty once it has been submitted.
///
/// Only valid for traces created through [`fake_api`].
pub fn trace_spans(trace: &Trace) -> Vec<SpanRecord> {
    match trace.as_raw() {
        Ok(ptr) => unsafe { self::trace(ptr.as_ptr()).spans.clone() },
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sql() {
        let (statement, title) = normalize_sql(b"  SELECT *  FROM users\n WHERE id = 42 AND name = 'bob' ");
        assert_eq!(statement, b"SELECT * FROM users WHERE id = ? AND name = ?");
        assert_eq!(title, b"SELECT FROM users");
    }

    #[test]
    fn test_normalize_keeps_identifiers_with_digits() {
        let (statement, _) = normalize_sql(b"SELECT col1 FROM t2 WHERE x = 3.5");
        assert_eq!(statement, b"SELECT col1 FROM t2 WHERE x = ?");
    }

    #[test]
    fn test_titles() {
        assert_eq!(normalize_sql(b"insert into posts values (1)").1, b"INSERT INTO posts");
        assert_eq!(normalize_sql(b"UPDATE users SET a = 1").1, b"UPDATE users");
        assert_eq!(normalize_sql(b"BEGIN").1, b"BEGIN");
        assert!(normalize_sql(b"   ").1.is_empty());
    }

    #[test]
    fn test_counters_since() {
        let before = counters();
        bump(|c| c.traces_freed += 2);
        let delta = counters().since(&before);
        assert_eq!(delta.traces_freed, 2);
        assert_eq!(delta.instrumenters_freed, 0);
    }

    #[test]
    fn test_started_trace_stays_readable_and_reports_start() {
        let gate = loaded_gate();
        let inst = Instrumenter::new(&gate, &["SKYLIGHT_VERSION", "5.0.0"]).unwrap();
        assert!(inst.start().is_ok());

        let trace = Trace::new(&gate, 100, b"uuid-1", b"Users#show").unwrap();
        let started = trace.start().unwrap();
        // Reads through the const entry points after the start
        assert_eq!(trace.endpoint().unwrap(), b"Users#show");
        assert_eq!(trace.uuid().unwrap(), b"uuid-1");
        assert!(trace.set_endpoint(b"Users#index").unwrap().is_ok());
        assert_eq!(trace.endpoint().unwrap(), b"Users#index");

        assert!(inst.submit_trace(&trace).unwrap().is_ok());
        let submitted = submitted_traces(&inst);
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].started_at, Some(started));
        assert_eq!(submitted[0].endpoint, b"Users#index");
    }

    #[test]
    fn test_unstarted_trace_has_no_start_time() {
        let gate = loaded_gate();
        let inst = Instrumenter::new(&gate, &["SKYLIGHT_VERSION", "5.0.0"]).unwrap();
        assert!(inst.start().is_ok());

        let trace = Trace::new(&gate, 100, b"uuid-2", b"Users#show").unwrap();
        assert!(inst.submit_trace(&trace).unwrap().is_ok());
        assert_eq!(submitted_traces(&inst)[0].started_at, None);
    }
}
