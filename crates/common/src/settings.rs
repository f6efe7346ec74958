use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use nix::sys::signal::Signal;

use crate::{defaults, env_vars};

/// Errors produced while reading probe settings from the environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{var}: expected an unsigned integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var}: unknown signal {value:?}")]
    UnknownSignal { var: &'static str, value: String },
    #[error("{var}: must not be empty")]
    EmptyPattern { var: &'static str },
    #[error("write length bounds {min}..{max} leave no qualifying size")]
    InvalidBounds { min: usize, max: usize },
    #[error("banner prefix ({len} bytes) does not fit below the max write length {max}")]
    PrefixTooLong { len: usize, max: usize },
    #[error("trigger suffix ({len} bytes) exceeds the {window}-byte path scan window")]
    TriggerTooLong { len: usize, window: usize },
}

/// Signal raised on the host once the trigger path is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushSignal {
    Disabled,
    Raise(Signal),
}

impl FlushSignal {
    pub fn as_signal(&self) -> Option<Signal> {
        match self {
            Self::Disabled => None,
            Self::Raise(signal) => Some(*signal),
        }
    }
}

impl Default for FlushSignal {
    fn default() -> Self {
        Self::Raise(Signal::SIGINT)
    }
}

impl FromStr for FlushSignal {
    type Err = String;

    /// Accepts `none`/`off`, a signal name with or without the `SIG` prefix, or a number.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "none" | "off" | "0" => return Ok(Self::Disabled),
            _ => {}
        }

        if let Ok(number) = trimmed.parse::<i32>() {
            return Signal::try_from(number)
                .map(Self::Raise)
                .map_err(|_| format!("invalid signal number: {}", number));
        }

        let upper = trimmed.to_ascii_uppercase();
        let name = if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{}", upper)
        };
        Signal::from_str(&name)
            .map(Self::Raise)
            .map_err(|_| format!("invalid signal name: {}", trimmed))
    }
}

impl fmt::Display for FlushSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("none"),
            Self::Raise(signal) => f.write_str(signal.as_str()),
        }
    }
}

/// Detection parameters for one probe run.
///
/// The length bounds and patterns match one particular server log format; any change in
/// that format needs new values here, which is why they are read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Path fragment whose opening arms monitoring
    pub trigger_suffix: String,
    /// Text the banner line starts with
    pub banner_prefix: String,
    /// Writes must be strictly longer than this to be searched
    pub min_write_len: usize,
    /// Writes must be strictly shorter than this to be searched; also bounds the prefix scan
    pub max_write_len: usize,
    /// Non-matching monitored writes tolerated before giving up
    pub write_budget: u32,
    pub flush_signal: FlushSignal,
    /// Bytes of an open() path inspected for the trigger
    pub path_scan_window: usize,
    /// Bytes after the prefix searched for the terminating newline
    pub newline_window: usize,
    pub trace_log: Option<PathBuf>,
    /// Pass every call straight through without inspection
    pub bypass: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            trigger_suffix: defaults::TRIGGER_SUFFIX.to_string(),
            banner_prefix: defaults::BANNER_PREFIX.to_string(),
            min_write_len: defaults::MIN_WRITE_LEN,
            max_write_len: defaults::MAX_WRITE_LEN,
            write_budget: defaults::WRITE_BUDGET,
            flush_signal: FlushSignal::default(),
            path_scan_window: defaults::PATH_SCAN_WINDOW,
            newline_window: defaults::NEWLINE_WINDOW,
            trace_log: None,
            bypass: false,
        }
    }
}

impl ProbeSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> (Self, Vec<SettingsError>) {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// A malformed variable keeps that field's default and is reported. If the resulting
    /// combination fails [`ProbeSettings::validate`], the full defaults are returned instead.
    pub fn from_vars<F>(lookup: F) -> (Self, Vec<SettingsError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let mut errors = Vec::new();

        if let Some(value) = lookup(env_vars::TRIGGER_SUFFIX) {
            settings.trigger_suffix = value;
        }
        if let Some(value) = lookup(env_vars::BANNER_PREFIX) {
            settings.banner_prefix = value;
        }
        if let Some(value) = parse_number(&lookup, env_vars::MIN_WRITE_LEN, &mut errors) {
            settings.min_write_len = value;
        }
        if let Some(value) = parse_number(&lookup, env_vars::MAX_WRITE_LEN, &mut errors) {
            settings.max_write_len = value;
        }
        if let Some(value) = parse_number(&lookup, env_vars::WRITE_BUDGET, &mut errors) {
            match u32::try_from(value) {
                Ok(budget) => settings.write_budget = budget,
                Err(_) => errors.push(SettingsError::InvalidNumber {
                    var: env_vars::WRITE_BUDGET,
                    value: value.to_string(),
                }),
            }
        }
        if let Some(value) = lookup(env_vars::FLUSH_SIGNAL) {
            match value.parse::<FlushSignal>() {
                Ok(signal) => settings.flush_signal = signal,
                Err(_) => errors.push(SettingsError::UnknownSignal {
                    var: env_vars::FLUSH_SIGNAL,
                    value,
                }),
            }
        }
        settings.trace_log = lookup(env_vars::TRACE_LOG)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        settings.bypass = lookup(env_vars::BYPASS).as_deref() == Some("1");

        if let Err(err) = settings.validate() {
            errors.push(err);
            settings = Self {
                trace_log: settings.trace_log,
                bypass: settings.bypass,
                ..Self::default()
            };
        }

        (settings, errors)
    }

    /// Check that the patterns and bounds can ever produce a match.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.trigger_suffix.is_empty() {
            return Err(SettingsError::EmptyPattern {
                var: env_vars::TRIGGER_SUFFIX,
            });
        }
        if self.banner_prefix.is_empty() {
            return Err(SettingsError::EmptyPattern {
                var: env_vars::BANNER_PREFIX,
            });
        }
        if self.min_write_len.saturating_add(1) >= self.max_write_len {
            return Err(SettingsError::InvalidBounds {
                min: self.min_write_len,
                max: self.max_write_len,
            });
        }
        if self.banner_prefix.len() >= self.max_write_len {
            return Err(SettingsError::PrefixTooLong {
                len: self.banner_prefix.len(),
                max: self.max_write_len,
            });
        }
        if self.trigger_suffix.len() > self.path_scan_window {
            return Err(SettingsError::TriggerTooLong {
                len: self.trigger_suffix.len(),
                window: self.path_scan_window,
            });
        }
        Ok(())
    }

    /// Whether a write of `count` bytes is eligible for a banner search (exclusive bounds).
    pub fn qualifies(&self, count: usize) -> bool {
        count > self.min_write_len && count < self.max_write_len
    }
}

fn parse_number<F>(lookup: &F, var: &'static str, errors: &mut Vec<SettingsError>) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(var)?;
    match raw.trim().parse::<usize>() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(SettingsError::InvalidNumber { var, value: raw });
            None
        }
    }
}
