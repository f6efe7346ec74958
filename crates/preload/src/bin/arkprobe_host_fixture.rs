//! Stand-in for the dedicated server, used by the preload integration tests.
//!
//! Usage: `arkprobe_host_fixture <mode> <asset-path>`
//!
//! Logs a few startup lines, opens the asset, and once SIGINT has been delivered "flushes"
//! its log the way the server does. Modes:
//! - `banner`: open via libc `open`, flush a 154-byte block containing the version line
//! - `banner-std`: same, but open through `std::fs` (binds to `open64`)
//! - `single`: flush only the 49-byte version line
//! - `noise`: flush 40 qualifying lines without a version line
//! - `quiet`: never open the asset
//!
//! Exits 0 when it runs to completion, 3 when no SIGINT arrived after the open, and 4 when
//! it survives writing the banner.

use std::ffi::CString;
use std::os::raw::c_int;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use nix::sys::signal::{signal, SigHandler, Signal};

static FLUSH_REQUESTED: AtomicBool = AtomicBool::new(false);

const STARTUP: &[&str] = &[
    "[2020.03.25-12.28.34:770][  0]Using libcurl 7.47.0\n",
    "[2020.03.25-12.28.34:771][  0] - built for x86_64-pc-linux-gnu\n",
];
const LOG_OPEN: &str = "[2020.03.25-12.28.34:781][  0]Log file open, 03/25/20 13:28:34\n";
const VERSION: &str = "[2020.03.25-12.28.34:781][  0]ARK Version: 307.6\n";
const PID: &str = "[2020.03.25-12.28.34:781][  0]PID: 179890\n";

extern "C" fn on_interrupt(_: c_int) {
    FLUSH_REQUESTED.store(true, Ordering::SeqCst);
}

fn emit(line: &str) -> Result<()> {
    nix::unistd::write(std::io::stdout(), line.as_bytes()).context("write to stdout")?;
    Ok(())
}

fn open_with_libc(path: &str) -> Result<()> {
    let c_path = CString::new(path)?;
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY) };
    if fd >= 0 {
        unsafe { libc::close(fd) };
    }
    Ok(())
}

fn run(mode: &str, asset: &str) -> Result<u8> {
    unsafe { signal(Signal::SIGINT, SigHandler::Handler(on_interrupt)) }
        .context("install SIGINT handler")?;

    for line in STARTUP {
        emit(line)?;
    }

    match mode {
        "quiet" => return Ok(0),
        "banner" | "single" | "noise" => open_with_libc(asset)?,
        "banner-std" => {
            let _ = std::fs::File::open(asset);
        }
        other => bail!("unknown mode: {other}"),
    }

    if !FLUSH_REQUESTED.load(Ordering::SeqCst) {
        emit("[2020.03.25-12.28.35:000][  0]no interrupt received\n")?;
        return Ok(3);
    }

    match mode {
        "noise" => {
            let line = format!("{}\n", "#".repeat(149));
            for _ in 0..40 {
                emit(&line)?;
            }
            Ok(0)
        }
        "single" => {
            emit(VERSION)?;
            Ok(4)
        }
        _ => {
            emit(&format!("{LOG_OPEN}{VERSION}{PID}"))?;
            Ok(4)
        }
    }
}

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let mode = args.next().unwrap_or_else(|| "banner".to_string());
    let asset = args.next().unwrap_or_default();

    match run(&mode, &asset) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("fixture error: {err:#}");
            ExitCode::from(2)
        }
    }
}
