//! Shared contract between the arkprobe preload library and whatever launches it

pub mod outcome;
pub mod settings;

pub use outcome::ProbeOutcome;
pub use settings::{FlushSignal, ProbeSettings, SettingsError};

/// Environment variables read by the preload library when it is loaded
pub mod env_vars {
    pub const TRIGGER_SUFFIX: &str = "ARKPROBE_TRIGGER_SUFFIX";
    pub const BANNER_PREFIX: &str = "ARKPROBE_BANNER_PREFIX";
    pub const MIN_WRITE_LEN: &str = "ARKPROBE_MIN_WRITE_LEN";
    pub const MAX_WRITE_LEN: &str = "ARKPROBE_MAX_WRITE_LEN";
    pub const WRITE_BUDGET: &str = "ARKPROBE_WRITE_BUDGET";
    pub const FLUSH_SIGNAL: &str = "ARKPROBE_FLUSH_SIGNAL";
    pub const TRACE_LOG: &str = "ARKPROBE_TRACE_LOG";
    pub const BYPASS: &str = "ARKPROBE_BYPASS";
}

/// Process exit statuses the shim terminates the host with
pub mod exit_codes {
    /// Banner captured and printed to stdout (ASCII 'P')
    pub const BANNER_FOUND: i32 = 0x50;
    /// Monitored writes exhausted without a banner, or the shim could not resolve libc
    pub const BUDGET_EXHAUSTED: i32 = 0xFF;
}

/// Default values mirroring the dedicated server log format the shim was built against
pub mod defaults {
    pub const TRIGGER_SUFFIX: &str =
        "game/ShooterGame/Content/PrimalEarth/CoreBlueprints/PrimalGlobalsBlueprint.uasset";
    pub const BANNER_PREFIX: &str = "ARK Version: ";
    pub const MIN_WRITE_LEN: usize = 135;
    pub const MAX_WRITE_LEN: usize = 166;
    pub const WRITE_BUDGET: u32 = 30;
    pub const PATH_SCAN_WINDOW: usize = 162;
    pub const NEWLINE_WINDOW: usize = 32;
}
