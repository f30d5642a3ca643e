// Match Result Domain Model

use crate::domain::request::RequestId;
use serde::{Deserialize, Serialize};

/// Driver ID (opaque, owned by the driver directory)
pub type DriverId = String;

/// Why a request produced no match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnmatchedReason {
    NoDriverAvailable,
}

impl UnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedReason::NoDriverAvailable => "NO_DRIVER_AVAILABLE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NO_DRIVER_AVAILABLE" => Some(UnmatchedReason::NoDriverAvailable),
            _ => None,
        }
    }
}

impl std::fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one matching pass, emitted to the result queue and persisted
/// by the DB worker exactly once per request_id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub request_id: RequestId,
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<DriverId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnmatchedReason>,
    /// Which worker produced this result. Observability only.
    pub consumer_id: String,
    pub matched_at: i64,
}

impl MatchResult {
    pub fn matched(
        request_id: impl Into<String>,
        driver_id: impl Into<String>,
        consumer_id: impl Into<String>,
        matched_at: i64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            matched: true,
            driver_id: Some(driver_id.into()),
            reason: None,
            consumer_id: consumer_id.into(),
            matched_at,
        }
    }

    pub fn unmatched(
        request_id: impl Into<String>,
        reason: UnmatchedReason,
        consumer_id: impl Into<String>,
        matched_at: i64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            matched: false,
            driver_id: None,
            reason: Some(reason),
            consumer_id: consumer_id.into(),
            matched_at,
        }
    }
}
