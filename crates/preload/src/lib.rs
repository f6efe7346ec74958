//! LD_PRELOAD shim that waits for the dedicated server to print its version banner.
//!
//! Until the server opens its globals blueprint asset, every `write` is swallowed. Opening
//! that asset arms the probe and sends the server SIGINT so its logger flushes. The next
//! qualifying write that carries the `ARK Version: ` line is echoed to the real stdout and
//! the process exits with 0x50; too many writes without it end the process with 0xFF.

pub mod context;
pub mod guard;
#[cfg(target_os = "linux")]
pub mod hooks;
#[cfg(target_os = "linux")]
pub mod host;
pub mod monitor;
#[cfg(target_os = "linux")]
pub mod real;
pub mod search;
pub mod trace;

pub use context::ProbeContext;
pub use monitor::{Monitor, OpenEffect, WriteVerdict};
pub use search::find_bounded;

#[cfg(all(target_os = "linux", not(test)))]
#[used]
#[link_section = ".init_array"]
static INIT_ARRAY: extern "C" fn() = {
    extern "C" fn init_constructor() {
        if let Some(_guard) = guard::ReentryGuard::enter() {
            let _ = ProbeContext::global();
        }
    }
    init_constructor
};
