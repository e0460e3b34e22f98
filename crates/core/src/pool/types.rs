//! Types for the solving pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::gateway::{FatalKind, GatewayError};
use crate::task::{InvalidTask, TaskId};

/// How long a session keeps producing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SolveMode {
    /// Deliver exactly `total` solutions, then stop.
    ///
    /// At most `floor(total * multiplier)` tasks are live at once, so a
    /// multiplier above 1.0 races extra tasks against slow ones.
    Fixed {
        total: u64,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
    /// Keep solving until cancelled.
    Persistent,
}

fn default_multiplier() -> f64 {
    1.0
}

impl SolveMode {
    pub fn name(&self) -> &'static str {
        match self {
            SolveMode::Fixed { .. } => "fixed",
            SolveMode::Persistent => "persistent",
        }
    }

    /// Number of solutions to deliver (fixed mode only).
    pub fn target(&self) -> Option<u64> {
        match self {
            SolveMode::Fixed { total, .. } => Some(*total),
            SolveMode::Persistent => None,
        }
    }

    /// Maximum number of live tasks (fixed mode only).
    pub fn quota(&self) -> Option<u64> {
        match self {
            SolveMode::Fixed { total, multiplier } => {
                let scaled = (*total as f64 * multiplier).floor() as u64;
                Some(scaled.max(*total))
            }
            SolveMode::Persistent => None,
        }
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if let SolveMode::Fixed { total, multiplier } = self {
            if *total == 0 {
                return Err(PoolError::InvalidConfig(
                    "total must be at least 1".to_string(),
                ));
            }
            if !multiplier.is_finite() || *multiplier < 1.0 {
                return Err(PoolError::InvalidConfig(format!(
                    "multiplier must be a finite number >= 1.0, got {}",
                    multiplier
                )));
            }
        }
        Ok(())
    }
}

/// Which request a task error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Submit,
    Poll,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Submit => f.write_str("submit"),
            Stage::Poll => f.write_str("poll"),
        }
    }
}

fn task_suffix(task_id: &Option<TaskId>) -> String {
    match task_id {
        Some(id) => format!(" (task {})", id),
        None => String::new(),
    }
}

/// A task that ended without a solution. Published on the error channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    /// The service reported an unrecoverable condition.
    #[error("{stage} failed: {kind}{}", task_suffix(.task_id))]
    Fatal {
        kind: FatalKind,
        stage: Stage,
        task_id: Option<TaskId>,
    },

    /// The service answered with something the classification table does
    /// not know how to handle.
    #[error("{stage} returned unrecognized response {code:?}{}", task_suffix(.task_id))]
    ContractViolation {
        code: String,
        stage: Stage,
        task_id: Option<TaskId>,
    },
}

impl TaskError {
    pub fn stage(&self) -> Stage {
        match self {
            TaskError::Fatal { stage, .. } | TaskError::ContractViolation { stage, .. } => *stage,
        }
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            TaskError::Fatal { task_id, .. } | TaskError::ContractViolation { task_id, .. } => {
                task_id.as_ref()
            }
        }
    }

    /// Label used for metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            TaskError::Fatal { kind, .. } => kind.as_str(),
            TaskError::ContractViolation { .. } => "contract_violation",
        }
    }
}

/// Errors that prevent a session from starting.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid task: {0}")]
    InvalidTask(#[from] InvalidTask),

    #[error("account check failed: {0}")]
    AccountCheck(#[from] GatewayError),

    #[error("solver already started")]
    AlreadyStarted,
}

/// Snapshot of a session's counters.
#[derive(Debug, Clone, Serialize)]
pub struct SolverStats {
    pub session_id: Uuid,
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<u64>,
    /// Tasks accepted by the service.
    pub tasks_created: u64,
    /// Tasks that ended in an error.
    pub tasks_failed: u64,
    /// Solutions delivered to the consumer.
    pub tasks_solved: u64,
    pub started_at: DateTime<Utc>,
    pub cancelled: bool,
    pub finished: bool,
}

impl SolverStats {
    /// Accepted tasks that have not failed (pending or solved).
    pub fn live_tasks(&self) -> u64 {
        self.tasks_created.saturating_sub(self.tasks_failed)
    }
}

/// Consumer side of a session's result channels.
#[derive(Debug)]
pub struct SolverOutput {
    pub solutions: mpsc::Receiver<String>,
    pub errors: mpsc::Receiver<TaskError>,
}

impl SolverOutput {
    /// Drain both channels until they close.
    ///
    /// In persistent mode this only returns after the solver is closed.
    pub async fn collect(self) -> (Vec<String>, Vec<TaskError>) {
        let SolverOutput {
            mut solutions,
            mut errors,
        } = self;

        let drain_solutions = async {
            let mut out = Vec::new();
            while let Some(solution) = solutions.recv().await {
                out.push(solution);
            }
            out
        };
        let drain_errors = async {
            let mut out = Vec::new();
            while let Some(error) = errors.recv().await {
                out.push(error);
            }
            out
        };

        tokio::join!(drain_solutions, drain_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_floors_product() {
        let mode = SolveMode::Fixed {
            total: 10,
            multiplier: 1.25,
        };
        assert_eq!(mode.target(), Some(10));
        assert_eq!(mode.quota(), Some(12));

        let mode = SolveMode::Fixed {
            total: 3,
            multiplier: 1.0,
        };
        assert_eq!(mode.quota(), Some(3));

        assert_eq!(SolveMode::Persistent.quota(), None);
        assert_eq!(SolveMode::Persistent.target(), None);
    }

    #[test]
    fn test_validate_mode() {
        assert!(SolveMode::Persistent.validate().is_ok());
        assert!(SolveMode::Fixed {
            total: 1,
            multiplier: 1.0
        }
        .validate()
        .is_ok());
        assert!(SolveMode::Fixed {
            total: 0,
            multiplier: 1.0
        }
        .validate()
        .is_err());
        assert!(SolveMode::Fixed {
            total: 5,
            multiplier: 0.99
        }
        .validate()
        .is_err());
        assert!(SolveMode::Fixed {
            total: 5,
            multiplier: f64::NAN
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_task_error_display() {
        let err = TaskError::Fatal {
            kind: FatalKind::Unsolvable,
            stage: Stage::Poll,
            task_id: Some(TaskId::new("123")),
        };
        assert_eq!(err.to_string(), "poll failed: captcha unsolvable (task 123)");
        assert_eq!(err.kind_label(), "unsolvable");

        let err = TaskError::ContractViolation {
            code: "ERROR_NEW".to_string(),
            stage: Stage::Submit,
            task_id: None,
        };
        assert_eq!(
            err.to_string(),
            "submit returned unrecognized response \"ERROR_NEW\""
        );
        assert_eq!(err.kind_label(), "contract_violation");
        assert!(err.task_id().is_none());
    }

    #[test]
    fn test_stats_serialization() {
        let stats = SolverStats {
            session_id: Uuid::new_v4(),
            mode: "fixed",
            target: Some(10),
            quota: Some(10),
            tasks_created: 12,
            tasks_failed: 2,
            tasks_solved: 10,
            started_at: Utc::now(),
            cancelled: true,
            finished: true,
        };
        assert_eq!(stats.live_tasks(), 10);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["mode"], "fixed");
        assert_eq!(json["tasks_solved"], 10);
    }

    #[tokio::test]
    async fn test_collect_drains_until_closed() {
        let (solution_tx, solutions) = mpsc::channel(4);
        let (error_tx, errors) = mpsc::channel(4);

        solution_tx.send("a".to_string()).await.unwrap();
        solution_tx.send("b".to_string()).await.unwrap();
        drop(solution_tx);
        drop(error_tx);

        let (solutions, errors) = SolverOutput { solutions, errors }.collect().await;
        assert_eq!(solutions, vec!["a", "b"]);
        assert!(errors.is_empty());
    }
}
