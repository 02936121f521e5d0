//! Provider failure and health types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a provider could not serve a request.
///
/// Every kind is recoverable by the router: it moves on to the next
/// candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Backend unreachable, overloaded, or cold-starting.
    Unavailable,
    /// No complete answer within the deadline.
    Timeout,
    /// Backend-specific validation rejected the request.
    RejectedInput,
    /// Response hit `max_tokens` before completing.
    Truncated,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unavailable => "unavailable",
            FailureKind::Timeout => "timeout",
            FailureKind::RejectedInput => "rejected_input",
            FailureKind::Truncated => "truncated",
        }
    }

    /// Whether retrying the same provider may help.
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::Unavailable | FailureKind::Timeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed provider call, with a human-readable detail for logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl ProviderFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Unavailable, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::RejectedInput, detail)
    }

    pub fn truncated(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Truncated, detail)
    }
}

/// Adapter self-reported health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    /// Reachable but slow or partially available; still tried.
    Degraded,
    /// Known unreachable; the router skips it without invoking.
    Down,
}
