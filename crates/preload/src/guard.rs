use std::cell::Cell;

thread_local! {
    static IN_PROBE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running probe code.
///
/// While held, intercepted calls on this thread go straight to libc, so the probe's own
/// diagnostics and trace writes are never inspected or suppressed.
#[derive(Debug)]
pub struct ReentryGuard {
    _private: (),
}

impl ReentryGuard {
    /// Returns `None` when the thread is already inside the probe, or its thread-locals are
    /// gone (thread teardown).
    pub fn enter() -> Option<Self> {
        IN_PROBE
            .try_with(|flag| {
                if flag.replace(true) {
                    None
                } else {
                    Some(Self { _private: () })
                }
            })
            .ok()
            .flatten()
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        let _ = IN_PROBE.try_with(|flag| flag.set(false));
    }
}

/// Run `f` with interception re-enabled on this thread.
///
/// Signal handlers run synchronously on the raising thread, and the host's handler must
/// reach the write hook as ordinary host code.
pub fn released<R>(f: impl FnOnce() -> R) -> R {
    let was_inside = IN_PROBE
        .try_with(|flag| flag.replace(false))
        .unwrap_or(false);
    let result = f();
    let _ = IN_PROBE.try_with(|flag| flag.set(was_inside));
    result
}
