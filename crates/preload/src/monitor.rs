//! Detection state machine: UNARMED until the trigger path is opened, then ARMED until a
//! banner is found or the write budget runs out.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use arkprobe_common::ProbeSettings;

use crate::search::find_bounded;

/// Result of inspecting an `open` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenEffect {
    /// Not the trigger, or monitoring was already armed
    Ignored,
    /// This call armed monitoring
    Armed,
}

/// Result of inspecting a `write` buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteVerdict {
    /// Report success to the caller and drop the data
    Suppress,
    /// Banner located at this byte range (prefix through newline)
    Banner(Range<usize>),
    /// Budget exceeded; `writes` is the monitored-write count that crossed it
    Exhausted { writes: u32 },
}

#[derive(Debug)]
pub struct Monitor {
    settings: ProbeSettings,
    armed: AtomicBool,
    monitored_writes: AtomicU32,
}

impl Monitor {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            settings,
            armed: AtomicBool::new(false),
            monitored_writes: AtomicU32::new(0),
        }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn monitored_writes(&self) -> u32 {
        self.monitored_writes.load(Ordering::Acquire)
    }

    /// Inspect a path handed to `open`. Only the first trigger match reports `Armed`.
    pub fn observe_open(&self, path: &[u8]) -> OpenEffect {
        let trigger = self.settings.trigger_suffix.as_bytes();
        if find_bounded(path, trigger, self.settings.path_scan_window).is_none() {
            return OpenEffect::Ignored;
        }
        match self
            .armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => OpenEffect::Armed,
            Err(_) => OpenEffect::Ignored,
        }
    }

    /// Inspect a buffer handed to `write`.
    pub fn observe_write(&self, buf: &[u8]) -> WriteVerdict {
        if !self.is_armed() {
            return WriteVerdict::Suppress;
        }
        if let Some(range) = self.locate_banner(buf) {
            return WriteVerdict::Banner(range);
        }

        // saturating: the counter never wraps back to zero
        let previous = self
            .monitored_writes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(1))
            })
            .unwrap_or(u32::MAX);
        let writes = previous.saturating_add(1);
        if writes > self.settings.write_budget {
            WriteVerdict::Exhausted { writes }
        } else {
            WriteVerdict::Suppress
        }
    }

    fn locate_banner(&self, buf: &[u8]) -> Option<Range<usize>> {
        if !self.settings.qualifies(buf.len()) {
            return None;
        }
        let prefix = self.settings.banner_prefix.as_bytes();
        let start = find_bounded(buf, prefix, self.settings.max_write_len)?;
        let after = start + prefix.len();
        let newline = find_bounded(&buf[after..], b"\n", self.settings.newline_window)?;
        Some(start..after + newline + 1)
    }
}
