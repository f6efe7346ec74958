//! Process-wide probe context, built once when the library is loaded.

use lazy_static::lazy_static;

use arkprobe_common::ProbeSettings;

use crate::monitor::Monitor;
use crate::trace::{self, ProbeEvent};

lazy_static! {
    static ref CONTEXT: ProbeContext = ProbeContext::from_env();
}

#[derive(Debug)]
pub struct ProbeContext {
    monitor: Monitor,
}

impl ProbeContext {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            monitor: Monitor::new(settings),
        }
    }

    /// Read settings, open the trace sink and report anything that was rejected.
    ///
    /// Must run with the re-entry guard held: it writes to stderr and opens files.
    fn from_env() -> Self {
        let (settings, errors) = ProbeSettings::from_env();

        if let Err(err) = trace::init(settings.trace_log.as_deref()) {
            eprintln!("[arkprobe] {:#}", err);
        }
        for err in errors {
            eprintln!("[arkprobe] ignoring invalid setting: {}", err);
            trace::record(&ProbeEvent::ConfigRejected {
                reason: err.to_string(),
            });
        }
        trace::record(&ProbeEvent::Loaded {
            trigger_suffix: settings.trigger_suffix.clone(),
            banner_prefix: settings.banner_prefix.clone(),
            min_write_len: settings.min_write_len,
            max_write_len: settings.max_write_len,
            write_budget: settings.write_budget,
            flush_signal: settings.flush_signal.to_string(),
        });

        Self::new(settings)
    }

    pub fn global() -> &'static Self {
        &CONTEXT
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn bypass(&self) -> bool {
        self.monitor.settings().bypass
    }
}
