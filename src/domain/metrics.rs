//! Step-to-distance/calorie conversion and the per-session accumulator.

use crate::domain::entities::SessionId;
use serde::{Deserialize, Serialize};

/// Average stride length, in kilometres per step.
pub const KM_PER_STEP: f64 = 0.0008;
/// Energy estimate, in kilocalories per step.
pub const KCAL_PER_STEP: f64 = 0.04;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub steps: u64,
    pub distance_km: f64,
    pub calories_burned: f64,
}

impl MetricsSnapshot {
    pub fn from_steps(steps: u64) -> Self {
        Self {
            steps,
            distance_km: steps as f64 * KM_PER_STEP,
            calories_burned: steps as f64 * KCAL_PER_STEP,
        }
    }
}

/// Running totals for one tracked session.
///
/// Only mutated through [`MetricsAccumulator::observe`]. Derived values are recomputed
/// from the step total on every update so they never drift from it.
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    session_id: SessionId,
    step_baseline: u64,
    last_observed: u64,
    totals: MetricsSnapshot,
}

impl MetricsAccumulator {
    pub fn new(session_id: SessionId, step_baseline: u64) -> Self {
        Self {
            session_id,
            step_baseline,
            last_observed: step_baseline,
            totals: MetricsSnapshot::default(),
        }
    }

    /// Applies a new cumulative reading and returns the step delta that was counted.
    ///
    /// A reading below the last one means the source was reset: it becomes the new
    /// baseline and contributes nothing.
    pub fn observe(&mut self, cumulative: u64) -> u64 {
        if cumulative < self.last_observed {
            self.step_baseline = cumulative;
            self.last_observed = cumulative;
            return 0;
        }
        let delta = cumulative - self.last_observed;
        self.last_observed = cumulative;
        if delta > 0 {
            self.totals = MetricsSnapshot::from_steps(self.totals.steps + delta);
        }
        delta
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.totals
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn step_baseline(&self) -> u64 {
        self.step_baseline
    }
}
