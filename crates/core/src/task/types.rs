//! Task kinds and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier assigned by the remote service to an accepted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimum score accepted for a reCAPTCHA v3 solution.
///
/// The service only supports these three thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum V3Score {
    Low,
    Medium,
    High,
}

impl V3Score {
    /// Wire representation sent as `min_score`.
    pub fn as_param(&self) -> &'static str {
        match self {
            V3Score::Low => "0.1",
            V3Score::Medium => "0.3",
            V3Score::High => "0.9",
        }
    }
}

impl TryFrom<f64> for V3Score {
    type Error = InvalidTask;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if (value - 0.1).abs() < 1e-9 {
            Ok(V3Score::Low)
        } else if (value - 0.3).abs() < 1e-9 {
            Ok(V3Score::Medium)
        } else if (value - 0.9).abs() < 1e-9 {
            Ok(V3Score::High)
        } else {
            Err(InvalidTask::UnsupportedScore(value))
        }
    }
}

impl From<V3Score> for f64 {
    fn from(score: V3Score) -> Self {
        match score {
            V3Score::Low => 0.1,
            V3Score::Medium => 0.3,
            V3Score::High => 0.9,
        }
    }
}

/// Errors raised while building or validating a task kind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidTask {
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("field `{field}` must be an http(s) URL, got {value:?}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("unsupported reCAPTCHA v3 min score {0} (expected 0.1, 0.3 or 0.9)")]
    UnsupportedScore(f64),
}

/// The kinds of captcha the pool can solve, each with its required fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    RecaptchaV2 {
        site_key: String,
        page_url: String,
    },
    RecaptchaV3 {
        site_key: String,
        page_url: String,
        action: String,
        min_score: V3Score,
    },
    #[serde(rename = "funcaptcha")]
    FunCaptcha {
        public_key: String,
        service_url: String,
        page_url: String,
    },
    #[serde(rename = "hcaptcha")]
    HCaptcha {
        site_key: String,
        page_url: String,
    },
}

impl TaskKind {
    pub fn recaptcha_v2(
        site_key: impl Into<String>,
        page_url: impl Into<String>,
    ) -> Result<Self, InvalidTask> {
        let kind = TaskKind::RecaptchaV2 {
            site_key: site_key.into(),
            page_url: page_url.into(),
        };
        kind.validate()?;
        Ok(kind)
    }

    pub fn recaptcha_v3(
        site_key: impl Into<String>,
        page_url: impl Into<String>,
        action: impl Into<String>,
        min_score: V3Score,
    ) -> Result<Self, InvalidTask> {
        let kind = TaskKind::RecaptchaV3 {
            site_key: site_key.into(),
            page_url: page_url.into(),
            action: action.into(),
            min_score,
        };
        kind.validate()?;
        Ok(kind)
    }

    pub fn funcaptcha(
        public_key: impl Into<String>,
        service_url: impl Into<String>,
        page_url: impl Into<String>,
    ) -> Result<Self, InvalidTask> {
        let kind = TaskKind::FunCaptcha {
            public_key: public_key.into(),
            service_url: service_url.into(),
            page_url: page_url.into(),
        };
        kind.validate()?;
        Ok(kind)
    }

    pub fn hcaptcha(
        site_key: impl Into<String>,
        page_url: impl Into<String>,
    ) -> Result<Self, InvalidTask> {
        let kind = TaskKind::HCaptcha {
            site_key: site_key.into(),
            page_url: page_url.into(),
        };
        kind.validate()?;
        Ok(kind)
    }

    /// Short name for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::RecaptchaV2 { .. } => "recaptcha_v2",
            TaskKind::RecaptchaV3 { .. } => "recaptcha_v3",
            TaskKind::FunCaptcha { .. } => "funcaptcha",
            TaskKind::HCaptcha { .. } => "hcaptcha",
        }
    }

    /// Check that every required field is present and well formed.
    ///
    /// Kinds deserialized from configuration bypass the constructors, so
    /// config validation calls this as well.
    pub fn validate(&self) -> Result<(), InvalidTask> {
        match self {
            TaskKind::RecaptchaV2 { site_key, page_url }
            | TaskKind::HCaptcha { site_key, page_url } => {
                require("site_key", site_key)?;
                require_url("page_url", page_url)
            }
            TaskKind::RecaptchaV3 {
                site_key,
                page_url,
                action,
                ..
            } => {
                require("site_key", site_key)?;
                require_url("page_url", page_url)?;
                require("action", action)
            }
            TaskKind::FunCaptcha {
                public_key,
                service_url,
                page_url,
            } => {
                require("public_key", public_key)?;
                require_url("service_url", service_url)?;
                require_url("page_url", page_url)
            }
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), InvalidTask> {
    if value.trim().is_empty() {
        return Err(InvalidTask::EmptyField(field));
    }
    Ok(())
}

fn require_url(field: &'static str, value: &str) -> Result<(), InvalidTask> {
    require(field, value)?;
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(InvalidTask::InvalidUrl {
            field,
            value: value.to_string(),
        })
    }
}
