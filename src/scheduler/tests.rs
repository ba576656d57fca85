//! Tests for the rotation scheduler
//!
//! Covers the cycle formula, target resolution, retry behavior and the
//! cancellable tick loop.

#[cfg(test)]
mod tests {
    use crate::{
        TokenRecord,
        config::RotationConfig,
        error::RotationStep,
        rotation::RotationEngine,
        scheduler::{RetryPolicy, RotationScheduler, SkipReason, TickOutcome, next_batch},
        scheduler::trigger::resolve_target,
        store::{Fault, FaultPoint, InMemoryTokenStore, TokenStore},
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Helper building a scheduler over a seeded in-memory store
    fn scheduler_with(
        records: Vec<TokenRecord>,
        fallback_batch: Option<i64>,
        retry: RetryPolicy,
    ) -> (RotationScheduler, InMemoryTokenStore) {
        let store = InMemoryTokenStore::with_records(records);
        let engine = Arc::new(RotationEngine::new(Arc::new(store.clone())));
        let config = RotationConfig {
            interval_secs: 1,
            fallback_batch,
        };
        (RotationScheduler::new(engine, &config, retry), store)
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    fn tokens_active_in(batch: i64) -> Vec<TokenRecord> {
        (1..=3)
            .map(|b| {
                TokenRecord::new(b.to_string(), format!("user{}", b))
                    .with_batch(b)
                    .with_active(b == batch)
            })
            .collect()
    }

    #[test]
    fn test_next_batch_cycles() {
        assert_eq!(next_batch(1), Some(2));
        assert_eq!(next_batch(2), Some(3));
        assert_eq!(next_batch(3), Some(1));
    }

    #[test]
    fn test_unassigned_batch_is_not_rotated() {
        assert_eq!(next_batch(0), None);
        assert_eq!(next_batch(-2), None);
    }

    #[test]
    fn test_resolve_target_falls_back_only_without_current_batch() {
        assert_eq!(resolve_target(Some(3), Some(2)), Ok(1));
        assert_eq!(resolve_target(None, Some(2)), Ok(2));
        assert_eq!(resolve_target(Some(0), Some(1)), Ok(1));
        assert_eq!(resolve_target(None, None), Err(SkipReason::NoActiveBatch));
        assert_eq!(resolve_target(Some(0), None), Err(SkipReason::UnassignedBatch(0)));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(300));
        assert_eq!(policy.backoff(10), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_tick_advances_stored_batch() {
        let (scheduler, store) = scheduler_with(tokens_active_in(3), None, RetryPolicy::none());
        let shutdown = CancellationToken::new();

        match scheduler.tick(&shutdown).await {
            TickOutcome::Rotated(report) => {
                assert_eq!(report.batch, 1);
                assert_eq!(report.active_holders, vec!["user1".to_string()]);
            }
            other => panic!("Expected rotation, got {:?}", other),
        }

        let active: Vec<_> = store
            .snapshot()
            .await
            .into_iter()
            .filter(|r| r.is_active())
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].batch, Some(1));
    }

    #[tokio::test]
    async fn test_tick_follows_out_of_band_change() {
        let (scheduler, store) = scheduler_with(tokens_active_in(1), None, RetryPolicy::none());
        let shutdown = CancellationToken::new();

        assert!(matches!(scheduler.tick(&shutdown).await, TickOutcome::Rotated(r) if r.batch == 2));

        // Someone else moves the active batch to 3 between ticks.
        store.replace(tokens_active_in(3)).await;
        assert!(matches!(scheduler.tick(&shutdown).await, TickOutcome::Rotated(r) if r.batch == 1));
    }

    #[tokio::test]
    async fn test_tick_skips_when_nothing_active() {
        let (scheduler, store) = scheduler_with(tokens_active_in(0), None, RetryPolicy::none());
        let before = store.snapshot().await;

        let outcome = scheduler.tick(&CancellationToken::new()).await;
        assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::NoActiveBatch)));
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_tick_skips_active_record_without_batch() {
        let records = vec![TokenRecord::new("1", "legacy").with_active(true)];
        let (scheduler, _store) = scheduler_with(records, None, RetryPolicy::none());

        let outcome = scheduler.tick(&CancellationToken::new()).await;
        assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::UnassignedBatch(0))));
    }

    #[tokio::test]
    async fn test_tick_uses_fallback_batch() {
        let (scheduler, store) = scheduler_with(tokens_active_in(0), Some(1), RetryPolicy::none());

        let outcome = scheduler.tick(&CancellationToken::new()).await;
        assert!(matches!(outcome, TickOutcome::Rotated(r) if r.batch == 1));
        assert_eq!(store.find_active_batch().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_transient_lookup_failure_is_retried() {
        let (scheduler, store) = scheduler_with(tokens_active_in(2), None, fast_retry(3));
        store.inject(Fault {
            point: FaultPoint::Lookup,
            transient: true,
            times: 1,
        });

        let outcome = scheduler.tick(&CancellationToken::new()).await;
        assert!(matches!(outcome, TickOutcome::Rotated(r) if r.batch == 3));
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_tick_once_retries_run_out() {
        let (scheduler, store) = scheduler_with(tokens_active_in(2), None, fast_retry(2));
        let before = store.snapshot().await;
        store.inject(Fault {
            point: FaultPoint::Lookup,
            transient: true,
            times: 2,
        });

        let outcome = scheduler.tick(&CancellationToken::new()).await;
        assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::LookupFailed(_))));
        assert_eq!(store.snapshot().await, before);

        // Next tick recovers.
        assert!(matches!(
            scheduler.tick(&CancellationToken::new()).await,
            TickOutcome::Rotated(r) if r.batch == 3
        ));
    }

    #[tokio::test]
    async fn test_permanent_lookup_failure_is_not_retried() {
        let (scheduler, store) = scheduler_with(tokens_active_in(2), None, fast_retry(3));
        store.inject(Fault {
            point: FaultPoint::Lookup,
            transient: false,
            times: 2,
        });
        let shutdown = CancellationToken::new();

        assert!(matches!(
            scheduler.tick(&shutdown).await,
            TickOutcome::Skipped(SkipReason::LookupFailed(_))
        ));
        // One firing left means the first tick looked up only once.
        assert!(matches!(
            scheduler.tick(&shutdown).await,
            TickOutcome::Skipped(SkipReason::LookupFailed(_))
        ));
        assert!(matches!(scheduler.tick(&shutdown).await, TickOutcome::Rotated(r) if r.batch == 3));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (scheduler, store) = scheduler_with(tokens_active_in(1), None, fast_retry(3));
        store.inject(Fault::unavailable(RotationStep::Activate, 2));

        let outcome = scheduler.tick(&CancellationToken::new()).await;
        assert!(matches!(outcome, TickOutcome::Rotated(r) if r.batch == 2));
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails_tick_without_partial_state() {
        let (scheduler, store) = scheduler_with(tokens_active_in(1), None, fast_retry(2));
        let before = store.snapshot().await;
        store.inject(Fault::unavailable(RotationStep::Deactivate, 5));

        match scheduler.tick(&CancellationToken::new()).await {
            TickOutcome::Failed(e) => assert_eq!(e.step(), Some(RotationStep::Deactivate)),
            other => panic!("Expected failure, got {:?}", other),
        }
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let (scheduler, store) = scheduler_with(tokens_active_in(1), None, fast_retry(3));
        store.inject(Fault {
            point: FaultPoint::Step(RotationStep::Activate),
            transient: false,
            times: 2,
        });
        let shutdown = CancellationToken::new();

        match scheduler.tick(&shutdown).await {
            TickOutcome::Failed(e) => assert_eq!(e.step(), Some(RotationStep::Activate)),
            other => panic!("Expected failure, got {:?}", other),
        }
        // One firing left means the first tick made a single attempt.
        assert!(matches!(scheduler.tick(&shutdown).await, TickOutcome::Failed(_)));
        assert!(matches!(scheduler.tick(&shutdown).await, TickOutcome::Rotated(r) if r.batch == 2));
    }

    #[tokio::test]
    async fn test_run_returns_promptly_when_cancelled_while_idle() {
        let (scheduler, store) = scheduler_with(tokens_active_in(1), None, RetryPolicy::none());
        let before = store.snapshot().await;
        let shutdown = CancellationToken::new();

        let handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        // Interval is one second, so no tick ran before cancellation.
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_run_rotates_on_each_tick() {
        let store = InMemoryTokenStore::with_records(tokens_active_in(1));
        let engine = Arc::new(RotationEngine::new(Arc::new(store.clone())));
        let config = RotationConfig {
            interval_secs: 1,
            fallback_batch: None,
        };
        let scheduler = RotationScheduler::new(engine, &config, RetryPolicy::none());
        let shutdown = CancellationToken::new();

        let handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        // First tick lands one period after start.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let active: Vec<_> = store
            .snapshot()
            .await
            .into_iter()
            .filter(|r| r.is_active())
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].batch, Some(2));
    }
}
