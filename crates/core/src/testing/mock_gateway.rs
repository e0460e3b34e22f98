//! Mock gateway for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::gateway::{Gateway, GatewayError, PollOutcome, SubmitOutcome};
use crate::task::{TaskId, TaskKind};

/// A recorded request for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// `None` for submissions.
    pub task_id: Option<TaskId>,
    /// When the request reached the gateway.
    pub at: Instant,
}

type Scripted<T> = VecDeque<Result<T, GatewayError>>;

/// Mock implementation of the Gateway trait.
///
/// Unscripted behavior:
/// - every submit is accepted with sequential ids "1", "2", ...
/// - every task answers `NotReady` for the configured number of polls, then
///   `Ready("token-<id>")`
///
/// Scripted responses are consumed first, in order.
///
/// # Example
///
/// ```rust,ignore
/// use captchapool_core::testing::MockGateway;
///
/// let gateway = MockGateway::new();
/// gateway.push_submit(Ok(SubmitOutcome::NoSlot)).await;
/// gateway.script_polls(&TaskId::new("1"), vec![Ok(PollOutcome::Fatal(FatalKind::Unsolvable))]).await;
///
/// // Run a solver against it, then
/// assert_eq!(gateway.submit_count().await, 2);
/// ```
pub struct MockGateway {
    /// Scripted submit responses.
    submits: Arc<RwLock<Scripted<SubmitOutcome>>>,
    /// Scripted poll responses per task.
    polls: Arc<RwLock<HashMap<TaskId, Scripted<PollOutcome>>>>,
    /// Polls answered so far per task, for the unscripted plan.
    poll_counts: Arc<RwLock<HashMap<TaskId, u32>>>,
    /// `NotReady` answers before an unscripted task is ready.
    not_ready_polls: Arc<RwLock<u32>>,
    /// Simulated latency of every request.
    latency: Arc<RwLock<Duration>>,
    balance: Arc<RwLock<f64>>,
    /// If set, the next balance call fails with this error.
    balance_error: Arc<RwLock<Option<GatewayError>>>,
    recorded_submits: Arc<RwLock<Vec<RecordedRequest>>>,
    recorded_polls: Arc<RwLock<Vec<RecordedRequest>>>,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl std::fmt::Debug for MockGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGateway")
            .field("submits", &"<scripted>")
            .field("polls", &"<scripted>")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks one request in flight.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockGateway {
    /// Create a mock that accepts everything and solves after one `NotReady`.
    pub fn new() -> Self {
        Self {
            submits: Arc::new(RwLock::new(VecDeque::new())),
            polls: Arc::new(RwLock::new(HashMap::new())),
            poll_counts: Arc::new(RwLock::new(HashMap::new())),
            not_ready_polls: Arc::new(RwLock::new(1)),
            latency: Arc::new(RwLock::new(Duration::ZERO)),
            balance: Arc::new(RwLock::new(10.0)),
            balance_error: Arc::new(RwLock::new(None)),
            recorded_submits: Arc::new(RwLock::new(Vec::new())),
            recorded_polls: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Queue a response for the next unanswered submit.
    pub async fn push_submit(&self, outcome: Result<SubmitOutcome, GatewayError>) {
        self.submits.write().await.push_back(outcome);
    }

    /// Queue the same submit response `count` times.
    pub async fn push_submits(&self, outcome: SubmitOutcome, count: usize) {
        let mut submits = self.submits.write().await;
        for _ in 0..count {
            submits.push_back(Ok(outcome.clone()));
        }
    }

    /// Script the poll responses for one task id.
    pub async fn script_polls(&self, id: &TaskId, outcomes: Vec<Result<PollOutcome, GatewayError>>) {
        self.polls
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .extend(outcomes);
    }

    /// Number of `NotReady` answers before an unscripted task is ready.
    pub async fn set_not_ready_polls(&self, polls: u32) {
        *self.not_ready_polls.write().await = polls;
    }

    /// Make every request take this long.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = latency;
    }

    pub async fn set_balance(&self, balance: f64) {
        *self.balance.write().await = balance;
    }

    /// Configure the next balance call to fail with the given error.
    pub async fn set_balance_error(&self, error: GatewayError) {
        *self.balance_error.write().await = Some(error);
    }

    pub async fn submit_count(&self) -> usize {
        self.recorded_submits.read().await.len()
    }

    pub async fn poll_count(&self) -> usize {
        self.recorded_polls.read().await.len()
    }

    pub async fn recorded_submits(&self) -> Vec<RecordedRequest> {
        self.recorded_submits.read().await.clone()
    }

    pub async fn recorded_polls(&self) -> Vec<RecordedRequest> {
        self.recorded_polls.read().await.clone()
    }

    /// Highest number of requests that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    async fn unscripted_poll(&self, id: &TaskId) -> PollOutcome {
        let not_ready = *self.not_ready_polls.read().await;
        let mut counts = self.poll_counts.write().await;
        let answered = counts.entry(id.clone()).or_insert(0);
        *answered += 1;
        if *answered > not_ready {
            PollOutcome::Ready(format!("token-{}", id))
        } else {
            PollOutcome::NotReady
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, _task: &TaskKind) -> Result<SubmitOutcome, GatewayError> {
        let _guard = self.enter();
        self.recorded_submits.write().await.push(RecordedRequest {
            task_id: None,
            at: Instant::now(),
        });
        self.simulate_latency().await;

        if let Some(scripted) = self.submits.write().await.pop_front() {
            return scripted;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitOutcome::Accepted(TaskId::new(id.to_string())))
    }

    async fn poll(&self, id: &TaskId) -> Result<PollOutcome, GatewayError> {
        let _guard = self.enter();
        self.recorded_polls.write().await.push(RecordedRequest {
            task_id: Some(id.clone()),
            at: Instant::now(),
        });
        self.simulate_latency().await;

        let scripted = self
            .polls
            .write()
            .await
            .get_mut(id)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(outcome) => outcome,
            None => Ok(self.unscripted_poll(id).await),
        }
    }

    async fn balance(&self) -> Result<f64, GatewayError> {
        if let Some(err) = self.balance_error.write().await.take() {
            return Err(err);
        }
        Ok(*self.balance.read().await)
    }
}
