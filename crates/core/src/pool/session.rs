//! State shared by every worker of one solving session.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use super::config::PoolConfig;
use super::types::{SolveMode, SolverStats};
use crate::gateway::Gateway;
use crate::rate_gate::RateGate;
use crate::task::TaskKind;

/// One-shot, idempotent cancellation flag that tasks can await.
#[derive(Debug)]
pub(crate) struct CancelSignal {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Raise the flag. Returns `true` only for the call that raised it.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is raised (immediately if it already is).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// A reservation against the fixed-mode live task quota.
///
/// Dropping the slot releases it. A solved task keeps its slot for the rest
/// of the session via [`QuotaSlot::keep`].
#[must_use]
pub(crate) struct QuotaSlot<'a> {
    reserved: Option<&'a AtomicU64>,
}

impl QuotaSlot<'_> {
    fn unbounded() -> Self {
        Self { reserved: None }
    }

    pub fn keep(mut self) {
        self.reserved = None;
    }
}

impl Drop for QuotaSlot<'_> {
    fn drop(&mut self) {
        if let Some(reserved) = self.reserved {
            reserved.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    failed: AtomicU64,
    solved: AtomicU64,
    /// Quota slots currently held (fixed mode).
    reserved: AtomicU64,
    /// Solutions allowed through to the channel (fixed mode).
    claimed: AtomicU64,
}

pub(crate) struct Session {
    pub id: Uuid,
    pub mode: SolveMode,
    pub config: PoolConfig,
    pub task: TaskKind,
    pub gateway: Arc<dyn Gateway>,
    pub gate: RateGate,
    cancel: CancelSignal,
    counters: Counters,
    started_at: DateTime<Utc>,
    finished: AtomicBool,
}

impl Session {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        task: TaskKind,
        mode: SolveMode,
        config: PoolConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            config,
            task,
            gateway,
            gate: RateGate::new(),
            cancel: CancelSignal::new(),
            counters: Counters::default(),
            started_at: Utc::now(),
            finished: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Reserve room for one more live task.
    ///
    /// Returns `None` in fixed mode when the quota is full or every solution
    /// the session needs has already been claimed.
    pub fn admit(&self) -> Option<QuotaSlot<'_>> {
        let (Some(target), Some(quota)) = (self.mode.target(), self.mode.quota()) else {
            return Some(QuotaSlot::unbounded());
        };

        if self.counters.claimed.load(Ordering::Acquire) >= target {
            return None;
        }

        self.counters
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |reserved| {
                (reserved < quota).then_some(reserved + 1)
            })
            .ok()
            .map(|_| QuotaSlot {
                reserved: Some(&self.counters.reserved),
            })
    }

    /// Take the right to publish a solution.
    ///
    /// In fixed mode at most `total` claims succeed; later solutions are
    /// surplus and must be discarded.
    pub fn claim_solution(&self) -> bool {
        let Some(target) = self.mode.target() else {
            return true;
        };
        self.counters
            .claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |claimed| {
                (claimed < target).then_some(claimed + 1)
            })
            .is_ok()
    }

    pub fn record_created(&self) -> u64 {
        self.counters.created.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count a delivered solution. Cancels the session once a fixed target is met.
    pub fn record_solved(&self) -> u64 {
        let solved = self.counters.solved.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(target) = self.mode.target() {
            if solved >= target && self.cancel() {
                info!(solved, target, "Target reached, cancelling session");
            }
        }
        solved
    }

    /// Count a failed task. Cancels the session once the failure budget is spent.
    pub fn record_failed(&self) -> u64 {
        let failed = self.counters.failed.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(limit) = self.config.max_task_failures {
            if failed >= limit && self.cancel() {
                warn!(failed, limit, "Failure budget exhausted, cancelling session");
            }
        }
        failed
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn stats(&self) -> SolverStats {
        SolverStats {
            session_id: self.id,
            mode: self.mode.name(),
            target: self.mode.target(),
            quota: self.mode.quota(),
            tasks_created: self.counters.created.load(Ordering::Acquire),
            tasks_failed: self.counters.failed.load(Ordering::Acquire),
            tasks_solved: self.counters.solved.load(Ordering::Acquire),
            started_at: self.started_at,
            cancelled: self.is_cancelled(),
            finished: self.finished.load(Ordering::Acquire),
        }
    }
}
