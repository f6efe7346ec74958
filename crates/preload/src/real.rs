//! Lazily resolved libc entry points that sit behind our own exports.

use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use anyhow::{bail, Result};

pub type WriteFn = unsafe extern "C" fn(c_int, *const c_void, libc::size_t) -> libc::ssize_t;
pub type OpenFn = unsafe extern "C" fn(*const c_char, c_int, ...) -> c_int;

/// A libc symbol resolved once via `dlsym(RTLD_NEXT, ..)` and cached for the process lifetime.
pub struct RealSymbol {
    name: &'static CStr,
    slot: AtomicPtr<c_void>,
}

impl RealSymbol {
    pub const fn new(name: &'static CStr) -> Self {
        Self {
            name,
            slot: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name.to_str().unwrap_or("?")
    }

    /// Address of the next definition in load order. Racing resolvers store the same value.
    pub fn resolve(&self) -> Result<*mut c_void> {
        let cached = self.slot.load(Ordering::Acquire);
        if !cached.is_null() {
            return Ok(cached);
        }

        let found = unsafe { libc::dlsym(libc::RTLD_NEXT, self.name.as_ptr()) };
        if found.is_null() {
            bail!("failed to resolve original symbol '{}'", self.name());
        }
        self.slot.store(found, Ordering::Release);
        Ok(found)
    }
}

pub static REAL_WRITE: RealSymbol = RealSymbol::new(c"write");
pub static REAL_OPEN: RealSymbol = RealSymbol::new(c"open");
pub static REAL_OPEN64: RealSymbol = RealSymbol::new(c"open64");

/// Which `open` export the host called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenSymbol {
    Open,
    Open64,
}

impl OpenSymbol {
    pub fn real(&self) -> &'static RealSymbol {
        match self {
            Self::Open => &REAL_OPEN,
            Self::Open64 => &REAL_OPEN64,
        }
    }
}

pub fn write_fn() -> Result<WriteFn> {
    let found = REAL_WRITE.resolve()?;
    Ok(unsafe { std::mem::transmute::<*mut c_void, WriteFn>(found) })
}

pub fn open_fn(symbol: OpenSymbol) -> Result<OpenFn> {
    let found = symbol.real().resolve()?;
    Ok(unsafe { std::mem::transmute::<*mut c_void, OpenFn>(found) })
}

/// Report an unresolvable symbol and end the process with the failure sentinel.
///
/// Uses the raw syscall because the libc `write` may be the very symbol that is missing.
pub fn die_unresolved(err: &anyhow::Error) -> ! {
    let message = format!("[arkprobe] {}\n", err);
    unsafe {
        libc::syscall(
            libc::SYS_write,
            libc::STDERR_FILENO,
            message.as_ptr(),
            message.len(),
        );
        libc::_exit(arkprobe_common::exit_codes::BUDGET_EXHAUSTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_and_caches_libc_write() {
        let first = REAL_WRITE.resolve().expect("write is always present");
        let second = REAL_WRITE.resolve().expect("cached");
        assert_eq!(first, second);
        assert!(!first.is_null());
    }

    static BOGUS: RealSymbol = RealSymbol::new(c"arkprobe_no_such_symbol");

    #[test]
    fn missing_symbol_is_an_error() {
        let err = BOGUS.resolve().unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to resolve original symbol 'arkprobe_no_such_symbol'"
        );
    }

    #[test]
    fn open_symbols_map_to_their_slots() {
        assert_eq!(OpenSymbol::Open.real().name(), "open");
        assert_eq!(OpenSymbol::Open64.real().name(), "open64");
    }

    /// Re-runs this test in a child process, which takes the unresolved-symbol exit path.
    #[test]
    fn unresolved_symbol_is_reported_and_exits_with_failure_sentinel() {
        const CHILD: &str = "ARKPROBE_TEST_DIE_UNRESOLVED";
        if std::env::var_os(CHILD).is_some() {
            let err = BOGUS.resolve().unwrap_err();
            die_unresolved(&err);
        }

        let output = assert_cmd::Command::new(std::env::current_exe().unwrap())
            .args([
                "--exact",
                "real::tests::unresolved_symbol_is_reported_and_exits_with_failure_sentinel",
                "--nocapture",
            ])
            .env(CHILD, "1")
            .output()
            .unwrap();

        assert_eq!(
            output.status.code(),
            Some(arkprobe_common::exit_codes::BUDGET_EXHAUSTED)
        );
        let expected = "[arkprobe] failed to resolve original symbol 'arkprobe_no_such_symbol'\n";
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains(expected), "stderr: {stderr}");
    }
}
