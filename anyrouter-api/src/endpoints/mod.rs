pub mod checkin;

use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigninOutcome {
    Success,
    Failure,
}

impl SigninOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl Display for SigninOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
        }
    }
}

/// Classified result of one sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigninResult {
    pub outcome: SigninOutcome,
    pub detail: String,
}

impl SigninResult {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            outcome: SigninOutcome::Success,
            detail: detail.into(),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            outcome: SigninOutcome::Failure,
            detail: detail.into(),
        }
    }
}
