//! JSONL trace of probe decisions, written only when `ARKPROBE_TRACE_LOG` is set.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::raw::c_int;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use lazy_static::lazy_static;
use serde::Serialize;

lazy_static! {
    static ref TRACE_FILE: Mutex<Option<File>> = Mutex::new(None);
}

/// Descriptor of the open sink, readable without the lock (which `record` holds while writing).
static TRACE_FD: AtomicI32 = AtomicI32::new(-1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProbeEvent {
    Loaded {
        trigger_suffix: String,
        banner_prefix: String,
        min_write_len: usize,
        max_write_len: usize,
        write_budget: u32,
        flush_signal: String,
    },
    Armed {
        path: String,
        flush_signal: String,
    },
    Banner {
        text: String,
    },
    BudgetExhausted {
        writes: u32,
    },
    ResolveFailed {
        symbol: String,
    },
    ConfigRejected {
        reason: String,
    },
}

#[derive(Serialize)]
struct TraceRecord<'a> {
    ts: String,
    pid: u32,
    component: &'static str,
    #[serde(flatten)]
    event: &'a ProbeEvent,
}

/// Open (append) the trace sink. Without a path tracing stays disabled.
pub fn init(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open trace log {}", path.display()))?;
    if let Ok(mut sink) = TRACE_FILE.lock() {
        TRACE_FD.store(file.as_raw_fd(), Ordering::Release);
        *sink = Some(file);
    }
    Ok(())
}

/// Whether `fd` is the trace sink.
pub fn owns_fd(fd: c_int) -> bool {
    fd >= 0 && TRACE_FD.load(Ordering::Acquire) == fd
}

#[cfg(test)]
pub(crate) fn sink_fd() -> c_int {
    TRACE_FD.load(Ordering::Acquire)
}

#[cfg(test)]
pub(crate) fn is_enabled() -> bool {
    TRACE_FILE
        .lock()
        .map(|sink| sink.is_some())
        .unwrap_or(false)
}

/// Append one event. Failures are swallowed: tracing must never disturb the host.
pub fn record(event: &ProbeEvent) {
    let line = TraceRecord {
        ts: Utc::now().to_rfc3339(),
        pid: std::process::id(),
        component: "arkprobe",
        event,
    };
    let Ok(json) = serde_json::to_string(&line) else {
        return;
    };

    #[cfg(feature = "debug")]
    eprintln!("[arkprobe] {}", json);

    if let Ok(mut sink) = TRACE_FILE.lock() {
        if let Some(ref mut file) = *sink {
            let _ = writeln!(file, "{}", json);
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
pub(crate) fn reset() {
    TRACE_FILE.clear_poison();
    if let Ok(mut sink) = TRACE_FILE.lock() {
        *sink = None;
    }
    TRACE_FD.store(-1, Ordering::Release);
}
