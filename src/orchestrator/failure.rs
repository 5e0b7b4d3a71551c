use crate::extract::ExtractError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Why a single attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The page could not be retrieved
    Fetch,
    /// The page was retrieved but yielded no usable content
    Extraction,
    /// The attempt exceeded the per-job time bound
    Timeout,
    /// The strategy panicked
    Panicked,
    /// The job was left in PROCESSING by a worker that went away
    Interrupted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Extraction => "extraction",
            Self::Timeout => "timeout",
            Self::Panicked => "panic",
            Self::Interrupted => "interrupted",
        };
        write!(f, "{}", s)
    }
}

/// A failed attempt, as reported to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("extraction did not finish within {:?}", limit),
        )
    }

    pub fn interrupted() -> Self {
        Self::new(
            FailureKind::Interrupted,
            "worker stopped before reporting an outcome",
        )
    }

    /// The message stored on a job that has run out of attempts
    pub fn final_message(&self, attempts: u32) -> String {
        format!(
            "{} error after {} attempt{}: {}",
            self.kind,
            attempts,
            if attempts == 1 { "" } else { "s" },
            self.message
        )
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl From<ExtractError> for JobFailure {
    fn from(e: ExtractError) -> Self {
        let kind = match e {
            ExtractError::Fetch(_) => FailureKind::Fetch,
            _ => FailureKind::Extraction,
        };
        Self::new(kind, e.to_string())
    }
}
