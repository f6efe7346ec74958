use std::os::raw::{c_char, c_int, c_uint};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::guard;
use crate::real::{self, OpenSymbol};
use crate::trace::{self, ProbeEvent};

/// Side effects the hooks perform on the host process.
///
/// The hook logic is written against this trait so it can run in tests without opening
/// files, signalling or exiting the test runner.
pub trait Host {
    /// Forward to the original `open`/`open64`.
    ///
    /// # Safety
    /// `path` must satisfy the contract of libc `open`.
    unsafe fn open(
        &self,
        symbol: OpenSymbol,
        path: *const c_char,
        flags: c_int,
        mode: libc::mode_t,
    ) -> c_int;

    /// Write all of `bytes` to the real standard output.
    fn write_stdout(&self, bytes: &[u8]);

    /// Deliver `signal` to the host's own process id.
    fn raise(&self, signal: Signal);

    fn record(&self, event: ProbeEvent);

    /// End the process immediately with `code`; no host code runs afterwards.
    fn terminate(&self, code: i32) -> !;
}

/// The live process: libc behind our exports.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcHost;

impl Host for LibcHost {
    unsafe fn open(
        &self,
        symbol: OpenSymbol,
        path: *const c_char,
        flags: c_int,
        mode: libc::mode_t,
    ) -> c_int {
        match real::open_fn(symbol) {
            // mode is only read by libc when O_CREAT or O_TMPFILE is set
            Ok(original) => original(path, flags, mode as c_uint),
            Err(err) => {
                trace::record(&ProbeEvent::ResolveFailed {
                    symbol: symbol.real().name().to_string(),
                });
                real::die_unresolved(&err)
            }
        }
    }

    fn write_stdout(&self, bytes: &[u8]) {
        let original = match real::write_fn() {
            Ok(original) => original,
            Err(err) => real::die_unresolved(&err),
        };

        let mut remaining = bytes;
        while !remaining.is_empty() {
            let written = unsafe {
                original(
                    libc::STDOUT_FILENO,
                    remaining.as_ptr().cast(),
                    remaining.len(),
                )
            };
            if written < 0 {
                if Errno::last() == Errno::EINTR {
                    continue;
                }
                return;
            }
            remaining = &remaining[written as usize..];
        }
    }

    fn raise(&self, signal: Signal) {
        // The host handler flushes through write(); it must hit the hook as host code.
        let _ = guard::released(|| kill(Pid::this(), signal));
    }

    fn record(&self, event: ProbeEvent) {
        trace::record(&event);
    }

    fn terminate(&self, code: i32) -> ! {
        unsafe { libc::_exit(code) }
    }
}
