//! Solver lifecycle integration tests.
//!
//! These tests run full sessions against the mock gateway on a paused clock:
//! submit -> poll -> solved | failed -> published

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;

use captchapool_core::{
    gateway::{FatalKind, Gateway, GatewayError, PollOutcome, RateLimitTier, SubmitOutcome},
    testing::{fixtures, MockGateway},
    PoolConfig, PoolError, Solver, Stage, TaskError, TaskId,
};

/// Test helper holding the mock gateway shared by a session.
struct TestHarness {
    gateway: Arc<MockGateway>,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            gateway: Arc::new(MockGateway::new()),
        }
    }

    fn gateway(&self) -> Arc<dyn Gateway> {
        Arc::clone(&self.gateway) as Arc<dyn Gateway>
    }

    fn fixed(&self, threads: usize, total: u64, multiplier: f64) -> Solver {
        Solver::fixed(
            self.gateway(),
            fixtures::recaptcha_v2(),
            threads,
            total,
            multiplier,
            PoolConfig::default(),
        )
        .expect("Failed to create fixed solver")
    }

    fn persistent(&self, config: PoolConfig) -> Solver {
        let threads = config.threads;
        Solver::persistent(self.gateway(), fixtures::recaptcha_v2(), threads, config)
            .expect("Failed to create persistent solver")
    }

    /// Script a poll failure for the task the gateway will number `id`.
    async fn fail_task(&self, id: u64, outcome: PollOutcome) {
        self.gateway
            .script_polls(&TaskId::new(id.to_string()), vec![Ok(outcome)])
            .await;
    }
}

// =============================================================================
// Fixed mode
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_fixed_mode_delivers_exact_total() {
    let harness = TestHarness::new();
    let solver = harness.fixed(3, 10, 1.0);

    let output = solver.start().unwrap();
    let (solutions, errors) = output.collect().await;
    solver.wait().await;

    assert_eq!(solutions.len(), 10);
    let unique: HashSet<_> = solutions.iter().collect();
    assert_eq!(unique.len(), 10, "every solution comes from a distinct task");
    assert!(errors.is_empty());

    let stats = solver.stats();
    assert_eq!(stats.tasks_solved, 10);
    assert_eq!(stats.tasks_created, 10);
    assert_eq!(stats.tasks_failed, 0);
    assert!(stats.cancelled);
    assert!(stats.finished);
    assert_eq!(harness.gateway.submit_count().await, 10);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_mode_replaces_failed_tasks() {
    let harness = TestHarness::new();
    harness
        .fail_task(1, PollOutcome::Fatal(FatalKind::Unsolvable))
        .await;
    harness
        .fail_task(2, PollOutcome::Fatal(FatalKind::Unsolvable))
        .await;
    let solver = harness.fixed(3, 10, 1.0);

    let (solutions, errors) = solver.start().unwrap().collect().await;
    solver.wait().await;

    assert_eq!(solutions.len(), 10);
    assert_eq!(errors.len(), 2);
    for error in &errors {
        assert!(matches!(
            error,
            TaskError::Fatal {
                kind: FatalKind::Unsolvable,
                stage: Stage::Poll,
                task_id: Some(_),
            }
        ));
    }

    // Replacements push the running total past the quota; live tasks do not.
    let stats = solver.stats();
    assert_eq!(stats.tasks_created, 12);
    assert_eq!(stats.tasks_failed, 2);
    assert_eq!(stats.tasks_solved, 10);
    assert_eq!(Some(stats.live_tasks()), stats.quota);
    assert_eq!(harness.gateway.submit_count().await, 12);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_mode_submit_failures_are_reported() {
    let harness = TestHarness::new();
    harness
        .gateway
        .push_submits(SubmitOutcome::Fatal(FatalKind::ZeroBalance), 2)
        .await;
    let solver = harness.fixed(1, 2, 1.0);

    let (solutions, errors) = solver.start().unwrap().collect().await;

    assert_eq!(solutions.len(), 2);
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.stage() == Stage::Submit));
    assert!(errors.iter().all(|e| e.task_id().is_none()));

    let stats = solver.stats();
    assert_eq!(stats.tasks_created, 2);
    assert_eq!(stats.tasks_failed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_unclassified_poll_is_contract_violation() {
    let harness = TestHarness::new();
    harness
        .fail_task(1, PollOutcome::Unclassified("ERROR_SOMETHING_NEW".to_string()))
        .await;
    let solver = harness.fixed(1, 3, 1.0);

    let (solutions, errors) = solver.start().unwrap().collect().await;

    // The worker keeps going after the violation.
    assert_eq!(solutions.len(), 3);
    assert_eq!(
        errors,
        vec![TaskError::ContractViolation {
            code: "ERROR_SOMETHING_NEW".to_string(),
            stage: Stage::Poll,
            task_id: Some(TaskId::new("1")),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_multiplier_races_extra_tasks_and_discards_surplus() {
    let harness = TestHarness::new();
    let solver = harness.fixed(4, 2, 2.0);

    let (solutions, errors) = solver.start().unwrap().collect().await;
    solver.wait().await;

    assert_eq!(solutions.len(), 2);
    assert!(errors.is_empty());

    let stats = solver.stats();
    assert_eq!(stats.quota, Some(4));
    assert_eq!(stats.tasks_solved, 2);
    assert!(stats.tasks_created <= 4);
    assert!(harness.gateway.submit_count().await <= 4);
}

#[tokio::test(start_paused = true)]
async fn test_live_tasks_never_exceed_quota() {
    let harness = TestHarness::new();
    harness.gateway.set_not_ready_polls(3).await;
    for id in 1..=6 {
        harness
            .fail_task(id, PollOutcome::Fatal(FatalKind::Unsolvable))
            .await;
    }
    let solver = Arc::new(harness.fixed(8, 4, 1.5));
    let output = solver.start().unwrap();

    let sampler = {
        let solver = Arc::clone(&solver);
        tokio::spawn(async move {
            let mut samples = 0;
            while !solver.stats().finished {
                assert!(solver.stats().live_tasks() <= 6);
                samples += 1;
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            samples
        })
    };

    let (solutions, errors) = output.collect().await;
    solver.wait().await;

    assert!(sampler.await.unwrap() > 0);
    assert_eq!(solutions.len(), 4);
    assert_eq!(errors.len(), 6);
    assert_eq!(solver.stats().tasks_solved, 4);
}

#[tokio::test(start_paused = true)]
async fn test_no_submissions_after_target() {
    let harness = TestHarness::new();
    let solver = harness.fixed(2, 3, 1.0);

    let (solutions, _) = solver.start().unwrap().collect().await;
    assert_eq!(solutions.len(), 3);

    let submits = harness.gateway.submit_count().await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(harness.gateway.submit_count().await, submits);
}

// =============================================================================
// Throttling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_rate_limit_delays_next_submit() {
    let harness = TestHarness::new();
    harness
        .gateway
        .push_submit(Ok(SubmitOutcome::RateLimited(RateLimitTier::Short)))
        .await;
    let solver = harness.fixed(1, 1, 1.0);

    let (solutions, _) = solver.start().unwrap().collect().await;
    assert_eq!(solutions.len(), 1);

    let submits = harness.gateway.recorded_submits().await;
    assert_eq!(submits.len(), 2);
    assert!(submits[1].at - submits[0].at >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_holds_back_every_worker() {
    let harness = TestHarness::new();
    harness
        .gateway
        .push_submit(Ok(SubmitOutcome::RateLimited(RateLimitTier::Medium)))
        .await;
    let solver = harness.fixed(3, 3, 1.0);
    let start = tokio::time::Instant::now();

    let (solutions, errors) = solver.start().unwrap().collect().await;
    assert_eq!(solutions.len(), 3);
    assert!(errors.is_empty());

    // The first round of submits goes out together. Everything after it,
    // including polls for tasks other workers got accepted, waits for the gate.
    let backoff = RateLimitTier::Medium.duration();
    let submits = harness.gateway.recorded_submits().await;
    assert_eq!(submits.len(), 4);
    assert_eq!(submits.iter().filter(|s| s.at == start).count(), 3);
    assert!(submits[3].at - start >= backoff);

    let polls = harness.gateway.recorded_polls().await;
    assert!(!polls.is_empty());
    assert!(polls.iter().all(|p| p.at - start >= backoff));
}

#[tokio::test(start_paused = true)]
async fn test_no_slot_is_not_a_failure() {
    let harness = TestHarness::new();
    harness
        .gateway
        .push_submits(SubmitOutcome::NoSlot, 3)
        .await;
    let solver = harness.fixed(1, 1, 1.0);

    let (solutions, errors) = solver.start().unwrap().collect().await;

    assert_eq!(solutions.len(), 1);
    assert!(errors.is_empty());
    assert_eq!(solver.stats().tasks_failed, 0);
    assert_eq!(harness.gateway.submit_count().await, 4);
}

#[tokio::test(start_paused = true)]
async fn test_transport_errors_are_retried_silently() {
    let harness = TestHarness::new();
    harness
        .gateway
        .push_submit(Err(GatewayError::Timeout))
        .await;
    harness
        .gateway
        .script_polls(
            &TaskId::new("1"),
            vec![Err(GatewayError::ConnectionFailed("reset".to_string()))],
        )
        .await;
    let solver = harness.fixed(1, 1, 1.0);

    let (solutions, errors) = solver.start().unwrap().collect().await;

    assert_eq!(solutions, vec!["token-1"]);
    assert!(errors.is_empty());
    assert_eq!(solver.stats().tasks_failed, 0);
}

// =============================================================================
// Persistent mode and cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_persistent_cancel_mid_poll() {
    let harness = TestHarness::new();
    harness.gateway.set_not_ready_polls(u32::MAX).await;
    let solver = harness.persistent(fixtures::pool_config(3));

    let mut output = solver.start().unwrap();
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(harness.gateway.submit_count().await, 3);
    assert!(harness.gateway.poll_count().await > 0);

    assert!(solver.cancel());
    solver.wait().await;

    let stats = solver.stats();
    assert!(stats.finished);
    assert_eq!(stats.tasks_created, 3);
    assert_eq!(stats.tasks_failed, 0, "abandoned tasks are not failures");

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.gateway.submit_count().await, 3);

    // Channels stay open until the solver is closed.
    assert_eq!(output.solutions.try_recv(), Err(TryRecvError::Empty));
    solver.close();
    let (solutions, errors) = output.collect().await;
    assert!(solutions.is_empty());
    assert!(errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_persistent_streams_until_cancelled() {
    let harness = TestHarness::new();
    let solver = harness.persistent(fixtures::pool_config(2));

    let mut output = solver.start().unwrap();
    let mut received = Vec::new();
    while received.len() < 5 {
        received.push(output.solutions.recv().await.unwrap());
    }

    solver.close();
    let (rest, errors) = output.collect().await;
    solver.wait().await;

    assert!(errors.is_empty());
    assert_eq!(solver.stats().tasks_solved as usize, received.len() + rest.len());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent() {
    let harness = TestHarness::new();
    let solver = harness.persistent(fixtures::pool_config(2));
    let _output = solver.start().unwrap();

    assert!(solver.cancel());
    assert!(!solver.cancel());
    assert!(solver.is_cancelled());

    solver.wait().await;
    assert!(solver.stats().finished);
}

#[tokio::test(start_paused = true)]
async fn test_backpressure_loses_no_solutions() {
    let harness = TestHarness::new();
    harness.gateway.set_not_ready_polls(0).await;
    let config = PoolConfig {
        threads: 4,
        channel_capacity: 2,
        ..Default::default()
    };
    let solver = harness.persistent(config);
    let mut output = solver.start().unwrap();

    // Nobody reads: producers stall once the buffer is full.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let stalled = solver.stats();
    assert_eq!(stalled.tasks_solved, 2);
    assert!(stalled.tasks_created <= 2 + 4);

    let mut received = Vec::new();
    for _ in 0..6 {
        received.push(output.solutions.recv().await.unwrap());
    }

    solver.close();
    let (rest, _) = output.collect().await;
    solver.wait().await;

    assert_eq!(
        solver.stats().tasks_solved as usize,
        received.len() + rest.len()
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_releases_workers_blocked_on_full_channel() {
    let harness = TestHarness::new();
    let config = PoolConfig {
        threads: 3,
        channel_capacity: 1,
        ..Default::default()
    };
    let solver = harness.persistent(config);
    let _output = solver.start().unwrap();

    // Nobody reads: one solution fills the buffer and the other workers
    // stall while publishing.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(solver.stats().tasks_solved, 1);
    let submits = harness.gateway.submit_count().await;

    assert!(solver.cancel());
    tokio::time::timeout(Duration::from_secs(1), solver.wait())
        .await
        .expect("workers stayed blocked on the full channel");

    let stats = solver.stats();
    assert!(stats.finished);
    assert_eq!(stats.tasks_solved, 1);
    assert_eq!(harness.gateway.submit_count().await, submits);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_receiver_cancels_session() {
    let harness = TestHarness::new();
    let solver = harness.persistent(fixtures::pool_config(2));

    let output = solver.start().unwrap();
    drop(output.solutions);

    solver.wait().await;
    assert!(solver.is_cancelled());
    assert_eq!(solver.stats().tasks_solved, 0);
}

// =============================================================================
// Error reporting and failure budget
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_error_reporting_disabled() {
    let harness = TestHarness::new();
    harness
        .fail_task(1, PollOutcome::Fatal(FatalKind::Unsolvable))
        .await;
    let solver = Solver::builder(harness.gateway(), fixtures::recaptcha_v2())
        .fixed(2, 1.0)
        .report_errors(false)
        .verify_account(false)
        .build()
        .await
        .unwrap();

    let mut output = solver.start().unwrap();
    assert!(output.errors.recv().await.is_none());

    let (solutions, errors) = output.collect().await;
    assert_eq!(solutions.len(), 2);
    assert!(errors.is_empty());
    assert_eq!(solver.stats().tasks_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failure_budget_cancels_session() {
    let harness = TestHarness::new();
    harness
        .gateway
        .push_submits(SubmitOutcome::Fatal(FatalKind::ZeroBalance), 10)
        .await;
    let config = PoolConfig {
        threads: 1,
        max_task_failures: Some(3),
        ..Default::default()
    };
    let solver = harness.persistent(config);

    let output = solver.start().unwrap();
    solver.wait().await;
    assert!(solver.is_cancelled());

    solver.close();
    let (solutions, errors) = output.collect().await;
    assert!(solutions.is_empty());
    assert_eq!(errors.len(), 3);
    assert_eq!(solver.stats().tasks_failed, 3);
    assert_eq!(harness.gateway.submit_count().await, 3);
}

// =============================================================================
// Construction
// =============================================================================

#[tokio::test]
async fn test_builder_rejects_bad_account() {
    let harness = TestHarness::new();
    harness
        .gateway
        .set_balance_error(GatewayError::Rejected(FatalKind::AuthInvalid))
        .await;

    let result = Solver::builder(harness.gateway(), fixtures::hcaptcha())
        .fixed(5, 1.0)
        .build()
        .await;

    assert!(matches!(result, Err(PoolError::AccountCheck(_))));
    assert_eq!(harness.gateway.submit_count().await, 0);
}

#[tokio::test]
async fn test_builder_verifies_account_without_submitting() {
    let harness = TestHarness::new();
    harness.gateway.set_balance(2.5).await;

    let solver = Solver::builder(harness.gateway(), fixtures::recaptcha_v3())
        .fixed(5, 1.2)
        .threads(2)
        .build()
        .await
        .unwrap();

    let stats = solver.stats();
    assert_eq!(stats.mode, "fixed");
    assert_eq!(stats.quota, Some(6));
    assert_eq!(stats.tasks_created, 0);
    assert_eq!(harness.gateway.submit_count().await, 0);
}

#[tokio::test]
async fn test_start_twice_fails() {
    let harness = TestHarness::new();
    let solver = harness.fixed(1, 1, 1.0);

    let _output = solver.start().unwrap();
    assert!(matches!(solver.start(), Err(PoolError::AlreadyStarted)));
    solver.cancel();
}
