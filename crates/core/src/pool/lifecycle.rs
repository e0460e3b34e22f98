//! Drives a single task from submission to a terminal state.
//!
//! Every request waits on the session's rate gate first. Throttle signals
//! extend the gate for all workers and the request is retried. Transport
//! errors are retried in place. Fatal and unrecognized responses end the task.

use std::time::Duration;
use tracing::{debug, warn};

use super::session::Session;
use super::types::{Stage, TaskError};
use crate::gateway::{PollOutcome, SubmitOutcome};
use crate::metrics::{SUBMISSIONS, THROTTLE_EVENTS};
use crate::task::{Task, TaskId};

/// Result of one submission attempt.
#[derive(Debug)]
pub(crate) enum Submitted {
    Accepted(TaskId),
    /// Throttled or transport failure. Try again with a fresh attempt.
    Retry,
    Failed(TaskError),
    Cancelled,
}

/// How an accepted task ended.
#[derive(Debug)]
pub(crate) enum Resolution {
    Solved(String),
    Failed(TaskError),
    Cancelled,
}

pub(crate) struct Lifecycle<'a> {
    session: &'a Session,
}

impl<'a> Lifecycle<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.session.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Wait for the rate gate unless cancelled first.
    async fn open_gate(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.session.cancelled() => false,
            _ = self.session.gate.wait() => true,
        }
    }

    fn throttle(&self, backoff: Duration, reason: &'static str) {
        THROTTLE_EVENTS.with_label_values(&[reason]).inc();
        if self.session.gate.extend(backoff) {
            warn!(
                reason,
                backoff_secs = backoff.as_secs_f64(),
                "Service throttled, pausing all workers"
            );
        } else {
            debug!(reason, "Throttle already covered by existing backoff");
        }
    }

    /// Make one attempt at creating the task on the service.
    pub async fn submit(&self, task: &mut Task) -> Submitted {
        if !self.open_gate().await {
            return Submitted::Cancelled;
        }

        let outcome = self.session.gateway.submit(&self.session.task).await;
        match outcome {
            Ok(SubmitOutcome::Accepted(id)) => {
                SUBMISSIONS.with_label_values(&["accepted"]).inc();
                debug!(task_id = %id, "Task accepted");
                let accepted = task.accept(id.clone());
                debug_assert!(accepted, "submit on a task that already has an id");
                Submitted::Accepted(id)
            }
            Ok(SubmitOutcome::NoSlot) => {
                SUBMISSIONS.with_label_values(&["no_slot"]).inc();
                self.throttle(self.session.config.no_slot_backoff(), "no_slot");
                Submitted::Retry
            }
            Ok(SubmitOutcome::RateLimited(tier)) => {
                SUBMISSIONS.with_label_values(&["rate_limited"]).inc();
                self.throttle(tier.duration(), tier.as_str());
                Submitted::Retry
            }
            Ok(SubmitOutcome::Fatal(kind)) => {
                SUBMISSIONS.with_label_values(&["fatal"]).inc();
                let failed = task.fail();
                debug_assert!(failed, "task already terminal");
                Submitted::Failed(TaskError::Fatal {
                    kind,
                    stage: Stage::Submit,
                    task_id: None,
                })
            }
            Ok(SubmitOutcome::Unclassified(code)) => {
                SUBMISSIONS.with_label_values(&["unclassified"]).inc();
                let failed = task.fail();
                debug_assert!(failed, "task already terminal");
                Submitted::Failed(TaskError::ContractViolation {
                    code,
                    stage: Stage::Submit,
                    task_id: None,
                })
            }
            Err(e) => {
                SUBMISSIONS.with_label_values(&["transport"]).inc();
                warn!(error = %e, "Submit failed, retrying");
                if self.pause(self.session.config.transport_retry()).await {
                    Submitted::Retry
                } else {
                    Submitted::Cancelled
                }
            }
        }
    }

    /// Poll an accepted task until it is solved, fails, or the session is cancelled.
    pub async fn resolve(&self, task: &mut Task, id: &TaskId) -> Resolution {
        let poll_interval = self.session.config.poll_interval();
        let mut delay = poll_interval;

        loop {
            if !self.pause(delay).await || !self.open_gate().await {
                return Resolution::Cancelled;
            }
            delay = poll_interval;

            task.record_poll();
            let outcome = self.session.gateway.poll(id).await;
            match outcome {
                Ok(PollOutcome::Ready(token)) => {
                    let resolved = task.resolve();
                    debug_assert!(resolved, "polled a task that was never accepted");
                    return Resolution::Solved(token);
                }
                Ok(PollOutcome::NotReady) => {
                    debug!(task_id = %id, polls = task.polls(), "Not ready");
                }
                Ok(PollOutcome::RateLimited(tier)) => {
                    self.throttle(tier.duration(), tier.as_str());
                }
                Ok(PollOutcome::Fatal(kind)) => {
                    let failed = task.fail();
                    debug_assert!(failed, "task already terminal");
                    return Resolution::Failed(TaskError::Fatal {
                        kind,
                        stage: Stage::Poll,
                        task_id: Some(id.clone()),
                    });
                }
                Ok(PollOutcome::Unclassified(code)) => {
                    let failed = task.fail();
                    debug_assert!(failed, "task already terminal");
                    return Resolution::Failed(TaskError::ContractViolation {
                        code,
                        stage: Stage::Poll,
                        task_id: Some(id.clone()),
                    });
                }
                Err(e) => {
                    warn!(task_id = %id, error = %e, "Poll failed, retrying");
                    delay = self.session.config.transport_retry();
                }
            }
        }
    }
}
