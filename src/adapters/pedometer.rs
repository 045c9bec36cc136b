//! Step source adapters. Implement StepSource.
//!
//! `ChannelStepSource` is fed cumulative counts by whoever owns the sensor (a device bridge,
//! a test, or `SimulatedPedometer` in the demo binary) and fans them out to subscribers.

use crate::domain::DomainError;
use crate::ports::{StepSource, StepSubscription};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

struct SourceState {
    available: bool,
    current: u64,
    subscribers: Vec<mpsc::UnboundedSender<u64>>,
}

pub struct ChannelStepSource {
    state: Mutex<SourceState>,
}

impl ChannelStepSource {
    /// Available source whose counter currently reads `current`.
    pub fn new(current: u64) -> Self {
        Self::with_availability(current, true)
    }

    /// Source on a device without a step counter.
    pub fn unavailable() -> Self {
        Self::with_availability(0, false)
    }

    fn with_availability(current: u64, available: bool) -> Self {
        Self {
            state: Mutex::new(SourceState {
                available,
                current,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Turns the counter off or back on. Existing subscriptions keep streaming.
    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.available = available;
    }

    /// Publishes a new cumulative reading to every live subscriber.
    pub async fn record(&self, cumulative: u64) {
        let mut state = self.state.lock().await;
        state.current = cumulative;
        state.subscribers.retain(|tx| tx.send(cumulative).is_ok());
    }

    /// Advances the counter by `steps` and publishes it. Returns the new reading.
    pub async fn add_steps(&self, steps: u64) -> u64 {
        let next = self.state.lock().await.current.saturating_add(steps);
        self.record(next).await;
        next
    }

    pub async fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock().await;
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

#[async_trait::async_trait]
impl StepSource for ChannelStepSource {
    async fn is_available(&self) -> bool {
        self.state.lock().await.available
    }

    async fn subscribe(&self) -> Result<StepSubscription, DomainError> {
        let mut state = self.state.lock().await;
        if !state.available {
            return Err(DomainError::TrackingUnavailable(
                "no step counter on this device".into(),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(tx);
        Ok(StepSubscription {
            current: state.current,
            readings: rx,
        })
    }
}

/// Walks at a fixed cadence, feeding a `ChannelStepSource`. Demo stand-in for a device sensor.
pub struct SimulatedPedometer {
    source: Arc<ChannelStepSource>,
    steps_per_minute: u32,
    tick: Duration,
}

impl SimulatedPedometer {
    pub fn new(source: Arc<ChannelStepSource>, steps_per_minute: u32, tick: Duration) -> Self {
        Self {
            source,
            steps_per_minute,
            tick,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let per_tick = self.steps_per_minute as f64 * self.tick.as_secs_f64() / 60.0;
            let mut carry = 0.0f64;
            let mut interval = tokio::time::interval(self.tick);
            loop {
                interval.tick().await;
                carry += per_tick;
                let whole = carry.floor();
                carry -= whole;
                if whole >= 1.0 {
                    let total = self.source.add_steps(whole as u64).await;
                    debug!(total, "simulated pedometer reading");
                }
            }
        })
    }
}
