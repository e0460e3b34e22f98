//! A single worker: admit, submit, resolve, publish, repeat.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::lifecycle::{Lifecycle, Resolution, Submitted};
use super::session::{QuotaSlot, Session};
use super::types::TaskError;
use crate::metrics::{SOLUTIONS_DELIVERED, SOLUTIONS_SURPLUS, TASK_DURATION, TASK_FAILURES};
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Worker {
    session: Arc<Session>,
    solutions: mpsc::Sender<String>,
    /// `None` when error reporting is disabled.
    errors: Option<mpsc::Sender<TaskError>>,
}

impl Worker {
    pub fn new(
        session: Arc<Session>,
        solutions: mpsc::Sender<String>,
        errors: Option<mpsc::Sender<TaskError>>,
    ) -> Self {
        Self {
            session,
            solutions,
            errors,
        }
    }

    /// Run tasks back to back until the session is cancelled or, in fixed
    /// mode, no quota is left. Dropping `self` releases the channel senders.
    pub async fn run(self) {
        info!("Worker started");
        while self.step().await == Flow::Continue {}
        info!("Worker stopped");
    }

    async fn step(&self) -> Flow {
        if self.session.is_cancelled() {
            return Flow::Stop;
        }
        let Some(slot) = self.session.admit() else {
            debug!("No quota left");
            return Flow::Stop;
        };

        let lifecycle = Lifecycle::new(&self.session);
        let mut task = Task::new();

        let id = match lifecycle.submit(&mut task).await {
            Submitted::Accepted(id) => id,
            Submitted::Retry => return Flow::Continue,
            Submitted::Failed(error) => return self.report_failure(slot, &task, error).await,
            Submitted::Cancelled => return Flow::Stop,
        };
        self.session.record_created();

        match lifecycle.resolve(&mut task, &id).await {
            Resolution::Solved(token) => self.deliver(slot, &task, token).await,
            Resolution::Failed(error) => self.report_failure(slot, &task, error).await,
            Resolution::Cancelled => {
                debug!(task_id = %id, "Abandoning pending task");
                Flow::Stop
            }
        }
    }

    async fn deliver(&self, slot: QuotaSlot<'_>, task: &Task, token: String) -> Flow {
        let task_id = task.id().map(|id| id.to_string()).unwrap_or_default();

        if !self.session.claim_solution() {
            SOLUTIONS_SURPLUS.inc();
            debug!(task_id = %task_id, "Target already met, discarding solution");
            return Flow::Stop;
        }
        slot.keep();

        tokio::select! {
            biased;
            sent = self.solutions.send(token) => {
                if sent.is_err() {
                    if self.session.cancel() {
                        warn!("Solution receiver dropped, cancelling session");
                    }
                    return Flow::Stop;
                }
            }
            _ = self.session.cancelled() => {
                debug!(task_id = %task_id, "Cancelled while publishing solution");
                return Flow::Stop;
            }
        }

        SOLUTIONS_DELIVERED.inc();
        TASK_DURATION
            .with_label_values(&["solved"])
            .observe(task.age().as_secs_f64());
        let solved = self.session.record_solved();
        info!(task_id = %task_id, polls = task.polls(), solved, "Task solved");
        Flow::Continue
    }

    async fn report_failure(&self, slot: QuotaSlot<'_>, task: &Task, error: TaskError) -> Flow {
        TASK_FAILURES.with_label_values(&[error.kind_label()]).inc();
        TASK_DURATION
            .with_label_values(&["failed"])
            .observe(task.age().as_secs_f64());
        let failed = self.session.record_failed();
        // Counted as failed before the slot frees up for a replacement.
        drop(slot);
        warn!(error = %error, failed, "Task failed");

        let Some(errors) = &self.errors else {
            return Flow::Continue;
        };

        tokio::select! {
            biased;
            sent = errors.send(error) => {
                if sent.is_err() {
                    if self.session.cancel() {
                        warn!("Error receiver dropped, cancelling session");
                    }
                    return Flow::Stop;
                }
            }
            _ = self.session.cancelled() => return Flow::Stop,
        }
        Flow::Continue
    }
}
