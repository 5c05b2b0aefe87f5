//! `skylight smoke` - Record and submit one request.
//!
//! Creates an instrumenter from the configured env, starts it, records a
//! trace with `spans` closed spans, submits it and stops the agent again.

use anyhow::{bail, Context};
use skylight_nif::{Gate, Instrumenter, SkylightConfig, Status, Trace};
use uuid::Uuid;

const CATEGORY: &[u8] = b"app.block";
const DESCRIPTION: &[u8] = b"skylight smoke test";

/// What one smoke run did
#[derive(Debug)]
pub struct SmokeReport {
    pub uuid: String,
    pub spans: u32,
    pub submitted: bool,
    pub tracked: bool,
    pub stopped: bool,
}

pub fn execute(config: &SkylightConfig, endpoint: &str, spans: u32) -> anyhow::Result<()> {
    let (gate, _) = super::load_gate(config)?;

    let inst = Instrumenter::new(gate, &config.env_pairs())
        .context("Could not create instrumenter")?;
    let report = run(gate, &inst, endpoint, spans)?;

    println!("Trace:        {}", report.uuid);
    println!("Endpoint:     {}", endpoint);
    println!("Spans:        {}", report.spans);
    println!("Submitted:    {}", report.submitted);
    println!("Tracked desc: {}", report.tracked);
    println!("Stopped:      {}", report.stopped);

    if !report.submitted {
        bail!("libskylight refused the trace");
    }
    Ok(())
}

/// Start `inst`, push one recorded trace through it and stop it again.
pub fn run(
    gate: &Gate,
    inst: &Instrumenter,
    endpoint: &str,
    spans: u32,
) -> anyhow::Result<SmokeReport> {
    if inst.start() != Status::Ok {
        bail!("Instrumenter refused to start (check SKYLIGHT_* settings)");
    }

    let uuid = Uuid::new_v4().to_string();
    let trace = record(gate, &uuid, endpoint, spans)?;

    let submitted = inst.submit_trace(&trace)?;
    let tracked = inst
        .track_description(endpoint.as_bytes(), &span_title(0))
        .context("track_desc failed")?;
    let stopped = inst.stop();

    Ok(SmokeReport {
        uuid,
        spans,
        submitted: submitted.is_ok(),
        tracked,
        stopped: stopped.is_ok(),
    })
}

fn record(gate: &Gate, uuid: &str, endpoint: &str, spans: u32) -> anyhow::Result<Trace> {
    let trace = Trace::new(gate, gate.hrtime()?, uuid.as_bytes(), endpoint.as_bytes())
        .context("Could not create trace")?;
    trace.start()?;

    for i in 0..spans {
        let span = trace.instrument(gate.hrtime()?, CATEGORY)?;
        let title = span_title(i);
        if trace.span_set_title(span, &title)? != Status::Ok {
            bail!("span {}: set_title refused", i);
        }
        if trace.span_set_description(span, DESCRIPTION)? != Status::Ok {
            bail!("span {}: set_desc refused", i);
        }
        if trace.span_done(span, gate.hrtime()?)? != Status::Ok {
            bail!("span {}: done refused", i);
        }
    }
    tracing::debug!(spans, "trace recorded");
    Ok(trace)
}

fn span_title(i: u32) -> Vec<u8> {
    format!("smoke span {}", i).into_bytes()
}
