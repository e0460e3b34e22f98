//! Public entry point: configure a session, start its workers, collect results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::config::PoolConfig;
use super::session::Session;
use super::types::{PoolError, SolveMode, SolverOutput, SolverStats, TaskError};
use super::worker::Worker;
use crate::gateway::Gateway;
use crate::task::TaskKind;

type RetainedSenders = (mpsc::Sender<String>, Option<mpsc::Sender<TaskError>>);

/// A pool of workers solving one kind of captcha.
///
/// Created in an idle state; [`Solver::start`] spawns the workers and hands
/// back the result channels. Must be started from within a Tokio runtime.
/// Dropping the solver cancels the session.
pub struct Solver {
    session: Arc<Session>,
    started: AtomicBool,
    close_tx: watch::Sender<bool>,
    done_tx: watch::Sender<bool>,
}

impl Solver {
    /// Build a solver for any mode.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        task: TaskKind,
        mode: SolveMode,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        task.validate()?;
        mode.validate()?;
        config.validate()?;

        let (close_tx, _) = watch::channel(false);
        let (done_tx, _) = watch::channel(false);
        Ok(Self {
            session: Arc::new(Session::new(gateway, task, mode, config)),
            started: AtomicBool::new(false),
            close_tx,
            done_tx,
        })
    }

    /// Deliver exactly `total` solutions using `threads` workers.
    /// `threads` overrides `config.threads`.
    pub fn fixed(
        gateway: Arc<dyn Gateway>,
        task: TaskKind,
        threads: usize,
        total: u64,
        multiplier: f64,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        let config = PoolConfig { threads, ..config };
        Self::new(gateway, task, SolveMode::Fixed { total, multiplier }, config)
    }

    /// Solve until cancelled using `threads` workers.
    /// `threads` overrides `config.threads`.
    pub fn persistent(
        gateway: Arc<dyn Gateway>,
        task: TaskKind,
        threads: usize,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        let config = PoolConfig { threads, ..config };
        Self::new(gateway, task, SolveMode::Persistent, config)
    }

    pub fn builder(gateway: Arc<dyn Gateway>, task: TaskKind) -> SolverBuilder {
        SolverBuilder::new(gateway, task)
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn mode(&self) -> SolveMode {
        self.session.mode
    }

    /// Spawn the workers and return the consumer ends of the result channels.
    ///
    /// In fixed mode both channels close on their own once every worker has
    /// exited. In persistent mode they stay open until [`Solver::close`].
    pub fn start(&self) -> Result<SolverOutput, PoolError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(PoolError::AlreadyStarted);
        }

        let session = &self.session;
        let capacity = session.config.channel_capacity;
        let (solution_tx, solutions) = mpsc::channel(capacity);
        let (error_tx, errors) = mpsc::channel(capacity);
        // Dropping the only sender leaves the error channel closed.
        let error_tx = session.config.report_errors.then_some(error_tx);

        info!(
            session = %session.id,
            mode = session.mode.name(),
            task = session.task.name(),
            gateway = session.gateway.name(),
            threads = session.config.threads,
            target = ?session.mode.target(),
            quota = ?session.mode.quota(),
            "Starting solver"
        );

        let handles: Vec<JoinHandle<()>> = (0..session.config.threads)
            .map(|index| {
                let worker = Worker::new(
                    Arc::clone(session),
                    solution_tx.clone(),
                    error_tx.clone(),
                );
                let span = info_span!("worker", session = %session.id, worker = index);
                tokio::spawn(worker.run().instrument(span))
            })
            .collect();

        let retained = match session.mode {
            SolveMode::Persistent => Some((solution_tx, error_tx)),
            SolveMode::Fixed { .. } => None,
        };

        tokio::spawn(supervise(
            Arc::clone(session),
            handles,
            retained,
            self.close_tx.subscribe(),
            self.done_tx.clone(),
        ));

        Ok(SolverOutput { solutions, errors })
    }

    /// Stop the session. Idempotent.
    ///
    /// Workers finish the request they are in and exit; pending tasks are
    /// abandoned. Returns `true` for the call that actually cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self.session.cancel();
        if cancelled {
            info!(session = %self.session.id, "Solver cancelled");
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.session.is_cancelled()
    }

    /// Cancel and release the channel handles held for persistent mode, so
    /// the result channels close once the workers have exited.
    pub fn close(&self) {
        self.cancel();
        self.close_tx.send_replace(true);
    }

    /// Wait until every worker has exited. Returns immediately if never started.
    pub async fn wait(&self) {
        if !self.started.load(Ordering::Acquire) {
            return;
        }
        let mut done = self.done_tx.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }

    pub fn stats(&self) -> SolverStats {
        self.session.stats()
    }
}

impl Drop for Solver {
    fn drop(&mut self) {
        // Workers must not outlive the handle that could stop them.
        self.session.cancel();
    }
}

/// Join the workers, then hold persistent-mode senders until closed.
async fn supervise(
    session: Arc<Session>,
    handles: Vec<JoinHandle<()>>,
    retained: Option<RetainedSenders>,
    mut close_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
) {
    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!(session = %session.id, error = %e, "Worker task failed");
        }
    }

    session.mark_finished();
    done_tx.send_replace(true);

    let stats = session.stats();
    info!(
        session = %session.id,
        created = stats.tasks_created,
        failed = stats.tasks_failed,
        solved = stats.tasks_solved,
        "All workers stopped"
    );

    if let Some(senders) = retained {
        // A dropped Solver also closes the watch channel.
        let _ = close_rx.wait_for(|closed| *closed).await;
        drop(senders);
        info!(session = %session.id, "Result channels closed");
    }
}

/// Step-by-step construction with an optional account check.
pub struct SolverBuilder {
    gateway: Arc<dyn Gateway>,
    task: TaskKind,
    mode: SolveMode,
    config: PoolConfig,
    verify_account: bool,
}

impl SolverBuilder {
    pub fn new(gateway: Arc<dyn Gateway>, task: TaskKind) -> Self {
        Self {
            gateway,
            task,
            mode: SolveMode::Persistent,
            config: PoolConfig::default(),
            verify_account: true,
        }
    }

    pub fn mode(mut self, mode: SolveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn fixed(self, total: u64, multiplier: f64) -> Self {
        self.mode(SolveMode::Fixed { total, multiplier })
    }

    pub fn persistent(self) -> Self {
        self.mode(SolveMode::Persistent)
    }

    /// Replace the whole pool configuration.
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn report_errors(mut self, enabled: bool) -> Self {
        self.config.report_errors = enabled;
        self
    }

    pub fn max_task_failures(mut self, limit: Option<u64>) -> Self {
        self.config.max_task_failures = limit;
        self
    }

    /// Query the account balance before returning the solver (default on).
    pub fn verify_account(mut self, enabled: bool) -> Self {
        self.verify_account = enabled;
        self
    }

    pub async fn build(self) -> Result<Solver, PoolError> {
        let solver = Solver::new(self.gateway, self.task, self.mode, self.config)?;

        if self.verify_account {
            let gateway = &solver.session.gateway;
            let balance = gateway.balance().await?;
            if balance <= 0.0 {
                warn!(gateway = gateway.name(), balance, "Account balance is empty");
            } else {
                info!(gateway = gateway.name(), balance, "Account verified");
            }
        }

        Ok(solver)
    }
}
