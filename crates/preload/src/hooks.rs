//! `open`/`open64`/`write` interposition.
//!
//! The exported symbols are thin: they take the re-entry guard, fetch the process context
//! and hand off to [`handle_open`] / [`handle_write`], which hold the actual behaviour.

use std::os::raw::{c_char, c_int};

use arkprobe_common::exit_codes;

use crate::host::Host;
use crate::monitor::{Monitor, OpenEffect, WriteVerdict};
use crate::real::OpenSymbol;
use crate::search::c_bytes_bounded;
use crate::trace::{self, ProbeEvent};

/// Inspect an `open` path, arm on the trigger, then return whatever the original returns.
///
/// Arming and the flush signal happen before the original call so the host observes the
/// errno of its own open.
///
/// # Safety
/// `path` must be null or a valid C string; the call inherits libc `open`'s contract.
pub unsafe fn handle_open<H: Host>(
    monitor: &Monitor,
    host: &H,
    symbol: OpenSymbol,
    path: *const c_char,
    flags: c_int,
    mode: libc::mode_t,
) -> c_int {
    let scanned = c_bytes_bounded(path, monitor.settings().path_scan_window);
    if monitor.observe_open(scanned) == OpenEffect::Armed {
        let flush_signal = monitor.settings().flush_signal;
        host.record(ProbeEvent::Armed {
            path: String::from_utf8_lossy(scanned).into_owned(),
            flush_signal: flush_signal.to_string(),
        });
        if let Some(signal) = flush_signal.as_signal() {
            host.raise(signal);
        }
    }

    host.open(symbol, path, flags, mode)
}

fn reported(count: usize) -> libc::ssize_t {
    libc::ssize_t::try_from(count).unwrap_or(libc::ssize_t::MAX)
}

/// Whether a `write` issued while the shim already runs on this thread may reach the original.
///
/// Only the shim's own sinks (stderr diagnostics and the trace file) pass. Anything else is
/// host code, typically a signal handler interrupting the shim, and stays suppressed. Such a
/// write is not counted against the budget.
pub fn passes_reentrant_write(fd: c_int) -> bool {
    fd == libc::STDERR_FILENO || trace::owns_fd(fd)
}

/// Inspect a `write` buffer. Returns the byte count the host asked for unless the process
/// is terminated first.
pub fn handle_write<H: Host>(
    monitor: &Monitor,
    host: &H,
    buf: &[u8],
    count: usize,
) -> libc::ssize_t {
    match monitor.observe_write(buf) {
        WriteVerdict::Suppress => reported(count),
        WriteVerdict::Banner(range) => {
            let banner = &buf[range];
            host.record(ProbeEvent::Banner {
                text: String::from_utf8_lossy(banner).into_owned(),
            });
            host.write_stdout(banner);
            host.terminate(exit_codes::BANNER_FOUND)
        }
        WriteVerdict::Exhausted { writes } => {
            host.record(ProbeEvent::BudgetExhausted { writes });
            host.terminate(exit_codes::BUDGET_EXHAUSTED)
        }
    }
}

#[cfg(all(target_os = "linux", not(test)))]
mod exports {
    use std::ffi::c_void;
    use std::os::raw::{c_char, c_int};
    use std::slice;

    use super::{handle_open, handle_write, passes_reentrant_write, reported};
    use crate::context::ProbeContext;
    use crate::guard::ReentryGuard;
    use crate::host::{Host, LibcHost};
    use crate::real::{self, OpenSymbol};

    unsafe fn forward_write(fd: c_int, buf: *const c_void, count: libc::size_t) -> libc::ssize_t {
        match real::write_fn() {
            Ok(original) => original(fd, buf, count),
            // no resolve_failed event here: the trace sink itself writes through write()
            Err(err) => real::die_unresolved(&err),
        }
    }

    unsafe fn intercept_open(
        symbol: OpenSymbol,
        path: *const c_char,
        flags: c_int,
        mode: libc::mode_t,
    ) -> c_int {
        let Some(_guard) = ReentryGuard::enter() else {
            return LibcHost.open(symbol, path, flags, mode);
        };
        let ctx = ProbeContext::global();
        if ctx.bypass() {
            return LibcHost.open(symbol, path, flags, mode);
        }
        handle_open(ctx.monitor(), &LibcHost, symbol, path, flags, mode)
    }

    /// Intercept libc `write`: suppress host output and watch for the version banner.
    ///
    /// # Safety
    /// - `buf` must be valid for reads of `count` bytes (or null with any `count`).
    /// - Forwarded calls inherit the safety requirements of libc `write`.
    #[no_mangle]
    pub unsafe extern "C" fn write(
        fd: c_int,
        buf: *const c_void,
        count: libc::size_t,
    ) -> libc::ssize_t {
        let Some(_guard) = ReentryGuard::enter() else {
            if passes_reentrant_write(fd) {
                return forward_write(fd, buf, count);
            }
            return reported(count);
        };
        let ctx = ProbeContext::global();
        if ctx.bypass() {
            return forward_write(fd, buf, count);
        }

        let bytes: &[u8] = if buf.is_null() {
            &[]
        } else {
            slice::from_raw_parts(buf.cast::<u8>(), count)
        };
        handle_write(ctx.monitor(), &LibcHost, bytes, count)
    }

    /// Intercept libc `open` to detect the trigger asset.
    ///
    /// # Safety
    /// - `path` must be a valid, non-null C string pointer.
    /// - This function forwards to the original libc implementation and thus inherits its
    ///   safety requirements.
    #[no_mangle]
    pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
        intercept_open(OpenSymbol::Open, path, flags, mode)
    }

    /// Intercept libc `open64`; same behaviour as [`open`].
    ///
    /// # Safety
    /// Same requirements as [`open`].
    #[no_mangle]
    pub unsafe extern "C" fn open64(
        path: *const c_char,
        flags: c_int,
        mode: libc::mode_t,
    ) -> c_int {
        intercept_open(OpenSymbol::Open64, path, flags, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arkprobe_common::{FlushSignal, ProbeSettings};
    use nix::sys::signal::Signal;
    use serial_test::serial;
    use std::cell::RefCell;
    use std::ffi::{CStr, CString};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Once;

    const TRIGGER: &str =
        "/data/game/ShooterGame/Content/PrimalEarth/CoreBlueprints/PrimalGlobalsBlueprint.uasset";

    #[derive(Debug, PartialEq, Eq)]
    struct Terminated(i32);

    #[derive(Default)]
    struct StubHost {
        open_result: c_int,
        opened: RefCell<Vec<(OpenSymbol, Vec<u8>)>>,
        stdout: RefCell<Vec<u8>>,
        raised: RefCell<Vec<Signal>>,
        events: RefCell<Vec<ProbeEvent>>,
    }

    impl Host for StubHost {
        unsafe fn open(
            &self,
            symbol: OpenSymbol,
            path: *const c_char,
            _flags: c_int,
            _mode: libc::mode_t,
        ) -> c_int {
            let path = CStr::from_ptr(path).to_bytes().to_vec();
            self.opened.borrow_mut().push((symbol, path));
            self.open_result
        }

        fn write_stdout(&self, bytes: &[u8]) {
            self.stdout.borrow_mut().extend_from_slice(bytes);
        }

        fn raise(&self, signal: Signal) {
            self.raised.borrow_mut().push(signal);
        }

        fn record(&self, event: ProbeEvent) {
            self.events.borrow_mut().push(event);
        }

        fn terminate(&self, code: i32) -> ! {
            std::panic::panic_any(Terminated(code))
        }
    }

    fn silence_panic_output() {
        static ONCE: Once = Once::new();
        ONCE.call_once(|| {
            let _ = std::panic::take_hook();
            std::panic::set_hook(Box::new(|_| {}));
        });
    }

    fn expect_termination(f: impl FnOnce()) -> i32 {
        silence_panic_output();
        let payload = catch_unwind(AssertUnwindSafe(f)).expect_err("expected process exit");
        payload
            .downcast::<Terminated>()
            .expect("unexpected panic payload")
            .0
    }

    fn open_path(monitor: &Monitor, host: &StubHost, path: &str) -> c_int {
        let c_path = CString::new(path).unwrap();
        unsafe {
            handle_open(
                monitor,
                host,
                OpenSymbol::Open,
                c_path.as_ptr(),
                libc::O_RDONLY,
                0,
            )
        }
    }

    fn banner_block() -> &'static [u8] {
        concat!(
            "[2020.03.25-12.28.34:781][  0]Log file open, 03/25/20 13:28:34\n",
            "[2020.03.25-12.28.34:781][  0]ARK Version: 307.6\n",
            "[2020.03.25-12.28.34:781][  0]PID: 179890\n",
        )
        .as_bytes()
    }

    #[test]
    fn unarmed_write_reports_success_and_forwards_nothing() {
        let monitor = Monitor::new(ProbeSettings::default());
        let host = StubHost::default();

        assert_eq!(handle_write(&monitor, &host, b"hello", 5), 5);
        assert!(host.stdout.borrow().is_empty());
        assert!(host.events.borrow().is_empty());
        assert!(!monitor.is_armed());
        assert_eq!(monitor.monitored_writes(), 0);
    }

    #[test]
    fn non_trigger_open_is_transparent() {
        let monitor = Monitor::new(ProbeSettings::default());
        let host = StubHost {
            open_result: -1,
            ..StubHost::default()
        };

        assert_eq!(open_path(&monitor, &host, "/etc/hosts"), -1);
        assert!(!monitor.is_armed());
        assert!(host.raised.borrow().is_empty());
        assert_eq!(
            host.opened.borrow().as_slice(),
            &[(OpenSymbol::Open, b"/etc/hosts".to_vec())]
        );
    }

    #[test]
    fn trigger_open_arms_and_interrupts_once() {
        let monitor = Monitor::new(ProbeSettings::default());
        let host = StubHost {
            open_result: 7,
            ..StubHost::default()
        };

        assert_eq!(open_path(&monitor, &host, TRIGGER), 7);
        assert_eq!(open_path(&monitor, &host, TRIGGER), 7);
        assert_eq!(open_path(&monitor, &host, "/tmp/x"), 7);

        assert!(monitor.is_armed());
        assert_eq!(host.raised.borrow().as_slice(), &[Signal::SIGINT]);
        assert_eq!(host.opened.borrow().len(), 3);
        assert_eq!(
            host.events.borrow().as_slice(),
            &[ProbeEvent::Armed {
                path: TRIGGER.to_string(),
                flush_signal: "SIGINT".to_string(),
            }]
        );
    }

    #[test]
    fn disabled_flush_signal_still_arms() {
        let monitor = Monitor::new(ProbeSettings {
            flush_signal: FlushSignal::Disabled,
            ..ProbeSettings::default()
        });
        let host = StubHost::default();

        open_path(&monitor, &host, TRIGGER);
        assert!(monitor.is_armed());
        assert!(host.raised.borrow().is_empty());
    }

    #[test]
    fn banner_is_printed_and_process_exits_with_p() {
        let monitor = Monitor::new(ProbeSettings::default());
        let host = StubHost::default();
        open_path(&monitor, &host, TRIGGER);

        let block = banner_block();
        let code = expect_termination(|| {
            handle_write(&monitor, &host, block, block.len());
        });

        assert_eq!(code, 0x50);
        assert_eq!(host.stdout.borrow().as_slice(), b"ARK Version: 307.6\n");
        assert_eq!(
            host.events.borrow().last(),
            Some(&ProbeEvent::Banner {
                text: "ARK Version: 307.6\n".to_string(),
            })
        );
    }

    #[test]
    fn armed_noise_is_suppressed_until_budget_runs_out() {
        let monitor = Monitor::new(ProbeSettings::default());
        let host = StubHost::default();
        open_path(&monitor, &host, TRIGGER);

        let noise = [b'-'; 150];
        for _ in 0..30 {
            assert_eq!(handle_write(&monitor, &host, &noise, noise.len()), 150);
        }
        let code = expect_termination(|| {
            handle_write(&monitor, &host, &noise, noise.len());
        });

        assert_eq!(code, 0xFF);
        assert!(host.stdout.borrow().is_empty());
        assert_eq!(
            host.events.borrow().last(),
            Some(&ProbeEvent::BudgetExhausted { writes: 31 })
        );
    }

    #[test]
    fn oversized_banner_write_counts_against_budget() {
        let monitor = Monitor::new(ProbeSettings::default());
        let host = StubHost::default();
        open_path(&monitor, &host, TRIGGER);

        let mut buf = vec![b' '; 200];
        buf[..19].copy_from_slice(b"ARK Version: 307.6\n");
        assert_eq!(handle_write(&monitor, &host, &buf, buf.len()), 200);
        assert_eq!(monitor.monitored_writes(), 1);
        assert!(host.stdout.borrow().is_empty());
    }

    #[test]
    fn null_buffer_write_is_counted_not_read() {
        let monitor = Monitor::new(ProbeSettings::default());
        let host = StubHost::default();
        open_path(&monitor, &host, TRIGGER);

        assert_eq!(handle_write(&monitor, &host, &[], 140), 140);
        assert_eq!(monitor.monitored_writes(), 1);
    }

    #[test]
    #[serial]
    fn reentrant_writes_pass_only_to_shim_sinks() {
        trace::reset();
        assert!(passes_reentrant_write(libc::STDERR_FILENO));
        assert!(!passes_reentrant_write(libc::STDOUT_FILENO));
        assert!(!passes_reentrant_write(42));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        trace::init(Some(&path)).unwrap();
        assert!(passes_reentrant_write(trace::sink_fd()));
        let sink = std::fs::File::open(&path).unwrap();
        // a different descriptor on the same file is still host-owned
        assert!(!passes_reentrant_write(std::os::fd::AsRawFd::as_raw_fd(&sink)));
        trace::reset();
    }
}
