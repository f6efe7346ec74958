use std::fmt;
use std::process::ExitStatus;

use crate::exit_codes;

/// How a probed host process ended, as seen by the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The banner was printed to stdout and the host exited with [`exit_codes::BANNER_FOUND`].
    BannerFound,
    /// The shim gave up with [`exit_codes::BUDGET_EXHAUSTED`].
    BudgetExhausted,
    /// The host ended on its own (or by signal) before the shim reached a verdict.
    Inconclusive(Option<i32>),
}

impl ProbeOutcome {
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(exit_codes::BANNER_FOUND) => Self::BannerFound,
            Some(exit_codes::BUDGET_EXHAUSTED) => Self::BudgetExhausted,
            other => Self::Inconclusive(other),
        }
    }

    pub fn from_status(status: &ExitStatus) -> Self {
        Self::from_exit_code(status.code())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::BannerFound)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BannerFound => "banner-found",
            Self::BudgetExhausted => "budget-exhausted",
            Self::Inconclusive(_) => "inconclusive",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inconclusive(Some(code)) => write!(f, "{} (exit {})", self.as_str(), code),
            Self::Inconclusive(None) => write!(f, "{} (killed by signal)", self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}
