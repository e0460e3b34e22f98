//! Types for the task submission gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::task::{TaskId, TaskKind};

/// Backoff severity signaled by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitTier {
    /// Too many requests in a short window (`MAX_USER_TURN`).
    Brief,
    /// Numbered limit 1003.
    Short,
    /// Numbered limits 1002 and 1005.
    Medium,
    /// Numbered limits 1001 and 1004.
    Long,
}

impl RateLimitTier {
    pub fn duration(&self) -> Duration {
        match self {
            RateLimitTier::Brief => Duration::from_secs(10),
            RateLimitTier::Short => Duration::from_secs(30),
            RateLimitTier::Medium => Duration::from_secs(5 * 60),
            RateLimitTier::Long => Duration::from_secs(10 * 60),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitTier::Brief => "brief",
            RateLimitTier::Short => "short",
            RateLimitTier::Medium => "medium",
            RateLimitTier::Long => "long",
        }
    }
}

/// Unrecoverable, task-ending conditions reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    AuthInvalid,
    BadParameters,
    InvalidSiteKey,
    Unsolvable,
    MalformedId,
    UnknownId,
    InsufficientMatches,
    EmptyAction,
    ZeroBalance,
    IpBanned,
}

impl FatalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FatalKind::AuthInvalid => "auth_invalid",
            FatalKind::BadParameters => "bad_parameters",
            FatalKind::InvalidSiteKey => "invalid_site_key",
            FatalKind::Unsolvable => "unsolvable",
            FatalKind::MalformedId => "malformed_id",
            FatalKind::UnknownId => "unknown_id",
            FatalKind::InsufficientMatches => "insufficient_matches",
            FatalKind::EmptyAction => "empty_action",
            FatalKind::ZeroBalance => "zero_balance",
            FatalKind::IpBanned => "ip_banned",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            FatalKind::AuthInvalid => "invalid or unknown API key",
            FatalKind::BadParameters => "bad task parameters",
            FatalKind::InvalidSiteKey => "invalid site key",
            FatalKind::Unsolvable => "captcha unsolvable",
            FatalKind::MalformedId => "malformed task id",
            FatalKind::UnknownId => "unknown task id",
            FatalKind::InsufficientMatches => "not enough matching answers",
            FatalKind::EmptyAction => "action not found",
            FatalKind::ZeroBalance => "empty account balance",
            FatalKind::IpBanned => "IP address banned or not allowed",
        }
    }
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Result of submitting a new task.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Accepted(TaskId),
    NoSlot,
    RateLimited(RateLimitTier),
    Fatal(FatalKind),
    /// A response the classification table cannot interpret at this stage.
    Unclassified(String),
}

/// Result of polling an accepted task.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ready(String),
    NotReady,
    RateLimited(RateLimitTier),
    Fatal(FatalKind),
    /// A response the classification table cannot interpret at this stage.
    Unclassified(String),
}

/// Transport-level failures talking to the service.
///
/// None of these say anything about the task itself.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Gateway request timeout")]
    Timeout,

    #[error("Gateway HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The account probe was answered with a fatal code.
    #[error("Gateway rejected account: {0}")]
    Rejected(FatalKind),

    #[error("Gateway returned an unexpected response: {0}")]
    InvalidResponse(String),
}

/// The remote submit/poll service.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Submit a new task.
    async fn submit(&self, task: &TaskKind) -> Result<SubmitOutcome, GatewayError>;

    /// Check on a previously accepted task.
    async fn poll(&self, id: &TaskId) -> Result<PollOutcome, GatewayError>;

    /// Current account balance. Used to validate the key before solving.
    async fn balance(&self) -> Result<f64, GatewayError>;
}
