//! Live step tracking for active sessions.
//!
//! Each tracked session gets one task that owns its `MetricsAccumulator` and the step
//! subscription. The task is the accumulator's only writer; `stop` joins it, so no update
//! can land after the final snapshot is returned.

use crate::domain::{DomainError, MetricsAccumulator, MetricsSnapshot, SessionId};
use crate::ports::StepSource;
use std::collections::HashMap;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct TrackingHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<MetricsAccumulator>,
    live: watch::Receiver<MetricsSnapshot>,
}

#[derive(Default)]
pub struct MetricsAggregator {
    tracking: Mutex<HashMap<SessionId, TrackingHandle>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to `source` and starts accumulating steps for `session_id`.
    ///
    /// The counter value at subscription time becomes the step baseline. Returns a
    /// receiver of live totals. Starting an already tracked session returns its
    /// existing receiver.
    ///
    /// # Errors
    /// `DomainError::TrackingUnavailable` if the source has no usable counter.
    pub async fn start(
        &self,
        session_id: SessionId,
        source: &dyn StepSource,
    ) -> Result<watch::Receiver<MetricsSnapshot>, DomainError> {
        let mut tracking = self.tracking.lock().await;
        if let Some(handle) = tracking.get(&session_id) {
            debug!(%session_id, "session already tracked");
            return Ok(handle.live.clone());
        }

        if !source.is_available().await {
            return Err(DomainError::TrackingUnavailable(
                "step counter reports unavailable".into(),
            ));
        }
        let subscription = source.subscribe().await?;
        let accumulator = MetricsAccumulator::new(session_id, subscription.current);
        let (live_tx, live_rx) = watch::channel(MetricsSnapshot::default());
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(track(accumulator, subscription.readings, stop_rx, live_tx));
        tracking.insert(
            session_id,
            TrackingHandle {
                stop_tx,
                task,
                live: live_rx.clone(),
            },
        );
        info!(%session_id, baseline = subscription.current, "step tracking started");
        Ok(live_rx)
    }

    /// Unsubscribes and returns the final totals. Zeros if the session was not tracked.
    pub async fn stop(&self, session_id: SessionId) -> MetricsSnapshot {
        let Some(handle) = self.tracking.lock().await.remove(&session_id) else {
            return MetricsSnapshot::default();
        };
        let last_seen = *handle.live.borrow();
        // Err means the task already ended (source closed); join still yields the totals.
        let _ = handle.stop_tx.send(());
        match handle.task.await {
            Ok(accumulator) => {
                let totals = accumulator.snapshot();
                info!(
                    %session_id,
                    steps = totals.steps,
                    distance_km = totals.distance_km,
                    calories = totals.calories_burned,
                    "step tracking stopped"
                );
                totals
            }
            Err(e) => {
                warn!(%session_id, error = %e, "tracking task failed; using last live totals");
                last_seen
            }
        }
    }

    /// Latest totals of a tracked session.
    pub async fn live(&self, session_id: SessionId) -> Option<MetricsSnapshot> {
        self.tracking
            .lock()
            .await
            .get(&session_id)
            .map(|h| *h.live.borrow())
    }

    pub async fn is_tracking(&self, session_id: SessionId) -> bool {
        self.tracking.lock().await.contains_key(&session_id)
    }
}

/// Single writer of one session's accumulator. A stop request wins over new readings;
/// readings already queued when it arrives are applied before the task ends.
async fn track(
    mut accumulator: MetricsAccumulator,
    mut readings: mpsc::UnboundedReceiver<u64>,
    mut stop_rx: oneshot::Receiver<()>,
    live_tx: watch::Sender<MetricsSnapshot>,
) -> MetricsAccumulator {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => {
                // Bounded by the backlog at stop time, so a busy source cannot hold the task open.
                for _ in 0..readings.len() {
                    match readings.try_recv() {
                        Ok(cumulative) => {
                            accumulator.observe(cumulative);
                        }
                        Err(_) => break,
                    }
                }
                live_tx.send_replace(accumulator.snapshot());
                break;
            }
            reading = readings.recv() => match reading {
                Some(cumulative) => {
                    if accumulator.observe(cumulative) > 0 {
                        live_tx.send_replace(accumulator.snapshot());
                    }
                }
                None => {
                    debug!(session_id = %accumulator.session_id(), "step source closed");
                    break;
                }
            },
        }
    }
    accumulator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::pedometer::ChannelStepSource;
    use crate::domain::{KCAL_PER_STEP, KM_PER_STEP};

    #[tokio::test]
    async fn test_counts_steps_since_baseline() {
        let source = ChannelStepSource::new(8_000);
        let aggregator = MetricsAggregator::new();
        let id = SessionId::new();
        aggregator.start(id, &source).await.unwrap();

        source.record(8_400).await;
        source.record(9_000).await;
        let totals = aggregator.stop(id).await;

        assert_eq!(totals.steps, 1_000);
        assert!((totals.distance_km - 0.8).abs() < 1e-9);
        assert!((totals.calories_burned - 40.0).abs() < 1e-9);
        assert!(!aggregator.is_tracking(id).await);
        assert_eq!(source.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_reset_is_new_baseline() {
        let source = ChannelStepSource::new(500);
        let aggregator = MetricsAggregator::new();
        let id = SessionId::new();
        aggregator.start(id, &source).await.unwrap();

        source.record(700).await;
        source.record(0).await;
        source.record(50).await;
        let totals = aggregator.stop(id).await;
        assert_eq!(totals.steps, 250);
        assert_eq!(totals.distance_km, 250.0 * KM_PER_STEP);
        assert_eq!(totals.calories_burned, 250.0 * KCAL_PER_STEP);
    }

    #[tokio::test]
    async fn test_stop_without_tracking_is_zero_and_idempotent() {
        let aggregator = MetricsAggregator::new();
        let id = SessionId::new();
        assert_eq!(aggregator.stop(id).await, MetricsSnapshot::default());

        let source = ChannelStepSource::new(0);
        aggregator.start(id, &source).await.unwrap();
        source.record(10).await;
        assert_eq!(aggregator.stop(id).await.steps, 10);
        assert_eq!(aggregator.stop(id).await, MetricsSnapshot::default());
    }

    #[tokio::test]
    async fn test_no_updates_after_stop() {
        let source = ChannelStepSource::new(0);
        let aggregator = MetricsAggregator::new();
        let id = SessionId::new();
        let live = aggregator.start(id, &source).await.unwrap();
        source.record(100).await;
        let totals = aggregator.stop(id).await;
        source.record(5_000).await;
        tokio::task::yield_now().await;
        assert_eq!(totals.steps, 100);
        assert_eq!(live.borrow().steps, 100);
    }

    #[tokio::test]
    async fn test_unavailable_source() {
        let aggregator = MetricsAggregator::new();
        let err = aggregator
            .start(SessionId::new(), &ChannelStepSource::unavailable())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TrackingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_live_totals_follow_readings() {
        let source = ChannelStepSource::new(0);
        let aggregator = MetricsAggregator::new();
        let id = SessionId::new();
        let mut live = aggregator.start(id, &source).await.unwrap();
        source.record(42).await;
        live.changed().await.unwrap();
        assert_eq!(live.borrow().steps, 42);
        assert_eq!(aggregator.live(id).await.map(|s| s.steps), Some(42));
        aggregator.stop(id).await;
    }
    #[tokio::test]
    async fn test_stop_returns_while_source_keeps_streaming() {
        let source = std::sync::Arc::new(ChannelStepSource::new(0));
        let aggregator = MetricsAggregator::new();
        let id = SessionId::new();
        aggregator.start(id, &*source).await.unwrap();

        let feeder = {
            let source = std::sync::Arc::clone(&source);
            tokio::spawn(async move {
                loop {
                    source.add_steps(1).await;
                    tokio::task::yield_now().await;
                }
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let totals = tokio::time::timeout(std::time::Duration::from_secs(5), aggregator.stop(id))
            .await
            .expect("stop must not wait for the source to go quiet");
        feeder.abort();
        assert!(totals.steps > 0);
        assert!(!aggregator.is_tracking(id).await);
    }
}
