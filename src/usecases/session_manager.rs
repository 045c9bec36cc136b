//! Workout session lifecycle: create -> (deferred) start -> stop.
//!
//! - `create` validates the plan, writes the owner's record, arms reminders and fans out
//!   to participants; the last three run concurrently and fail independently
//! - `start` before the planned time arms a deferred-start timer instead of activating
//! - `stop` cancels pending reminders, joins the step tracker and persists the summary
//! - Every mutation of a session happens under that session's lock

use crate::domain::{
    DomainError, MetricsSnapshot, ParticipantId, RecentIds, SessionId, SessionState,
    SessionSummary, TimerId, TimerQueue, WorkoutPlan, WorkoutRecord, WorkoutSession,
};
use crate::ports::{
    Clock, FriendDirectory, HISTORY_COLLECTION, NotificationDispatcher, NotificationPermission,
    RecordStore, StepSource, WORKOUTS_COLLECTION,
};
use crate::usecases::fanout_coordinator::{FanoutCoordinator, FanoutReport};
use crate::usecases::metrics_aggregator::MetricsAggregator;
use crate::usecases::reminder_scheduler::{ArmReport, ReminderScheduler};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Infrastructure the engine is wired to.
#[derive(Clone)]
pub struct SessionPorts {
    pub store: Arc<dyn RecordStore>,
    pub friends: Arc<dyn FriendDirectory>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub permission: Arc<dyn NotificationPermission>,
    pub steps: Arc<dyn StepSource>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    /// The plan has tracking switched off.
    Disabled,
    /// Tracking enabled but the session is not active yet.
    NotStarted,
    Live,
    /// Tracking enabled but the step source was unavailable at activation.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Called before the planned start; the session activates at `at`.
    Scheduled { at: DateTime<Utc> },
    Active { tracking: TrackingStatus },
}

/// Result of `create`. Only plan validation can fail creation; everything here is informational.
#[derive(Debug)]
pub struct CreateOutcome {
    pub session: WorkoutSession,
    /// Id of the owner's own workout record.
    pub owner_record: Result<String, DomainError>,
    pub reminders: Result<ArmReport, DomainError>,
    pub fanout: FanoutReport,
}

/// Current state of a retained session.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session: WorkoutSession,
    pub tracking: TrackingStatus,
    pub metrics: MetricsSnapshot,
    pub deferred_start: bool,
}

/// What one `tick` did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub reminders_fired: usize,
    pub sessions_started: usize,
    pub sessions_completed: usize,
}

#[derive(Debug, Clone, Copy)]
enum LifecycleTimer {
    DeferredStart(SessionId),
    /// Fires at planned end; completes the session unless steps are being tracked.
    AutoComplete(SessionId),
}

struct SessionSlot {
    session: WorkoutSession,
    tracking: TrackingStatus,
    deferred_start: Option<TimerId>,
    auto_complete: Option<TimerId>,
}

pub struct SessionManager {
    owner_id: ParticipantId,
    store: Arc<dyn RecordStore>,
    steps: Arc<dyn StepSource>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<ReminderScheduler>,
    fanout: Arc<FanoutCoordinator>,
    metrics: Arc<MetricsAggregator>,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<SessionSlot>>>>,
    /// Recently completed ids, so a late `stop` reports `InvalidState`.
    completed: RwLock<RecentIds<SessionId>>,
    timers: Mutex<TimerQueue<LifecycleTimer>>,
}

impl SessionManager {
    pub fn new(owner_id: ParticipantId, ports: SessionPorts, fanout_concurrency: usize) -> Self {
        let scheduler = ReminderScheduler::new(
            Arc::clone(&ports.dispatcher),
            Arc::clone(&ports.permission),
            Arc::clone(&ports.friends),
            Arc::clone(&ports.clock),
        );
        let fanout = FanoutCoordinator::new(
            Arc::clone(&ports.friends),
            Arc::clone(&ports.store),
            fanout_concurrency,
        );
        Self {
            owner_id,
            store: ports.store,
            steps: ports.steps,
            clock: ports.clock,
            scheduler: Arc::new(scheduler),
            fanout: Arc::new(fanout),
            metrics: Arc::new(MetricsAggregator::new()),
            sessions: RwLock::new(HashMap::new()),
            completed: RwLock::new(RecentIds::default()),
            timers: Mutex::new(TimerQueue::new()),
        }
    }

    pub fn owner_id(&self) -> &ParticipantId {
        &self.owner_id
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn fanout(&self) -> &FanoutCoordinator {
        &self.fanout
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    /// Creates a `Ready` session from `plan`.
    ///
    /// # Errors
    /// `DomainError::Validation` if the plan is incomplete; nothing is written or scheduled.
    pub async fn create(&self, plan: WorkoutPlan) -> Result<CreateOutcome, DomainError> {
        plan.validate()?;
        let end_time = plan.end_time()?;
        let now = self.clock.now();
        let session = WorkoutSession::new(plan, self.owner_id.clone(), now);
        let participants = session.plan.participant_ids.clone();
        info!(
            session_id = %session.id,
            name = %session.plan.name,
            start = %session.plan.start_time,
            participants = participants.len(),
            tracking = session.plan.tracking_enabled,
            "creating workout session"
        );

        let own_copy = async {
            let record = serde_json::to_value(WorkoutRecord::from(&session))
                .map_err(|e| DomainError::Write(e.to_string()))?;
            self.store
                .write(&session.owner_id, WORKOUTS_COLLECTION, record)
                .await
        };
        let (owner_record, reminders, fanout) = tokio::join!(
            own_copy,
            self.scheduler.arm(&session, &participants),
            self.fanout.propagate(&session, &participants),
        );

        if let Err(e) = &owner_record {
            warn!(session_id = %session.id, error = %e, "owner workout record not saved");
        }
        if let Err(e) = &reminders {
            warn!(session_id = %session.id, error = %e, "reminders not armed");
        }

        let tracking = if session.plan.tracking_enabled {
            TrackingStatus::NotStarted
        } else {
            TrackingStatus::Disabled
        };
        let slot = Arc::new(Mutex::new(SessionSlot {
            session: session.clone(),
            tracking,
            deferred_start: None,
            auto_complete: None,
        }));
        // The slot is registered and locked before its timer exists, so a tick that
        // pops the timer always finds the slot and waits for the id to be stored.
        let mut guard = slot.lock().await;
        self.sessions
            .write()
            .await
            .insert(session.id, Arc::clone(&slot));
        let timer = self
            .timers
            .lock()
            .await
            .schedule(end_time, LifecycleTimer::AutoComplete(session.id));
        guard.auto_complete = Some(timer);
        drop(guard);

        Ok(CreateOutcome {
            session,
            owner_record,
            reminders,
            fanout,
        })
    }

    /// Starts a `Ready` session, or defers the start until the planned time.
    ///
    /// # Errors
    /// `InvalidState` unless the session is `Ready`; `SessionNotFound` for unknown ids.
    pub async fn start(&self, session_id: SessionId) -> Result<StartOutcome, DomainError> {
        let slot = self.slot(session_id, "start").await?;
        let mut slot = slot.lock().await;
        if slot.session.state != SessionState::Ready {
            return Err(DomainError::InvalidState {
                session_id,
                state: slot.session.state,
                action: "start",
            });
        }

        let now = self.clock.now();
        let at = slot.session.plan.start_time;
        if now < at {
            if slot.deferred_start.is_none() {
                let timer = self
                    .timers
                    .lock()
                    .await
                    .schedule(at, LifecycleTimer::DeferredStart(session_id));
                slot.deferred_start = Some(timer);
                info!(%session_id, %at, "start deferred until planned time");
            }
            return Ok(StartOutcome::Scheduled { at });
        }

        Ok(self.activate(&mut slot, now).await)
    }

    /// Completes a `Ready` or `Active` session and returns its summary.
    ///
    /// When this returns, no pending reminder of the session can fire and the step
    /// tracker has been joined.
    ///
    /// # Errors
    /// `InvalidState` if already completed; `SessionNotFound` for unknown ids.
    pub async fn stop(&self, session_id: SessionId) -> Result<SessionSummary, DomainError> {
        let slot = self.slot(session_id, "stop").await?;
        let mut slot = slot.lock().await;
        if slot.session.state == SessionState::Completed {
            return Err(DomainError::InvalidState {
                session_id,
                state: SessionState::Completed,
                action: "stop",
            });
        }
        Ok(self.complete(&mut slot).await)
    }

    /// Writes a summary to the owner's history. Used by `stop`; callers retry with it.
    pub async fn persist_summary(&self, summary: &SessionSummary) -> Result<String, DomainError> {
        let record = serde_json::to_value(summary).map_err(|e| DomainError::Write(e.to_string()))?;
        self.store
            .write(&self.owner_id, HISTORY_COLLECTION, record)
            .await
    }

    /// Fires every reminder and lifecycle timer due at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport {
            reminders_fired: self.scheduler.fire_due(now).await,
            ..TickReport::default()
        };

        let due = self.timers.lock().await.pop_due(now);
        for (_, timer) in due {
            match timer {
                LifecycleTimer::DeferredStart(session_id) => {
                    let Some(slot) = self.live_slot(session_id).await else {
                        continue;
                    };
                    let mut slot = slot.lock().await;
                    slot.deferred_start = None;
                    if slot.session.state == SessionState::Ready {
                        self.activate(&mut slot, now).await;
                        report.sessions_started += 1;
                    }
                }
                LifecycleTimer::AutoComplete(session_id) => {
                    let Some(slot) = self.live_slot(session_id).await else {
                        continue;
                    };
                    let mut slot = slot.lock().await;
                    slot.auto_complete = None;
                    if slot.session.state != SessionState::Completed
                        && slot.tracking != TrackingStatus::Live
                    {
                        info!(%session_id, "planned duration elapsed; completing session");
                        self.complete(&mut slot).await;
                        report.sessions_completed += 1;
                    }
                }
            }
        }
        report
    }

    /// Earliest pending reminder or lifecycle timer.
    pub async fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let reminders = self.scheduler.next_deadline().await;
        let lifecycle = self.timers.lock().await.next_deadline();
        match (reminders, lifecycle) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drives timers from the clock every `poll`. Runs until the task is dropped.
    pub async fn run(&self, poll: Duration) {
        info!(poll_ms = poll.as_millis() as u64, "session timer loop started");
        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let report = self.tick(self.clock.now()).await;
            if report != TickReport::default() {
                debug!(
                    reminders = report.reminders_fired,
                    started = report.sessions_started,
                    completed = report.sessions_completed,
                    "timers fired"
                );
            }
        }
    }

    pub async fn snapshot(&self, session_id: SessionId) -> Result<SessionView, DomainError> {
        let slot = self.slot(session_id, "inspect").await?;
        let slot = slot.lock().await;
        let metrics = self.metrics.live(session_id).await.unwrap_or_default();
        Ok(SessionView {
            session: slot.session.clone(),
            tracking: slot.tracking,
            metrics,
            deferred_start: slot.deferred_start.is_some(),
        })
    }

    /// Sessions not yet completed, by planned start.
    pub async fn sessions(&self) -> Vec<WorkoutSession> {
        let slots: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut sessions = Vec::with_capacity(slots.len());
        for slot in slots {
            sessions.push(slot.lock().await.session.clone());
        }
        sessions.sort_by_key(|s| s.plan.start_time);
        sessions
    }

    async fn activate(&self, slot: &mut SessionSlot, now: DateTime<Utc>) -> StartOutcome {
        let session_id = slot.session.id;
        slot.session.state = SessionState::Active;
        slot.session.started_at = Some(now);
        if let Some(timer) = slot.deferred_start.take() {
            self.timers.lock().await.cancel(timer);
        }

        if slot.session.plan.tracking_enabled {
            slot.tracking = match self.metrics.start(session_id, self.steps.as_ref()).await {
                Ok(_) => TrackingStatus::Live,
                Err(e) => {
                    warn!(%session_id, error = %e, "continuing without step tracking");
                    TrackingStatus::Unavailable
                }
            };
        }
        info!(%session_id, tracking = ?slot.tracking, "session active");
        StartOutcome::Active {
            tracking: slot.tracking,
        }
    }

    async fn complete(&self, slot: &mut SessionSlot) -> SessionSummary {
        let session_id = slot.session.id;
        let now = self.clock.now();
        {
            let mut timers = self.timers.lock().await;
            for timer in [slot.deferred_start.take(), slot.auto_complete.take()]
                .into_iter()
                .flatten()
            {
                timers.cancel(timer);
            }
        }
        let cancelled = self.scheduler.cancel(session_id).await;
        let totals = self.metrics.stop(session_id).await;

        slot.session.state = SessionState::Completed;
        slot.session.ended_at = Some(now);
        let elapsed_minutes = slot
            .session
            .started_at
            .map(|started| (now - started).num_minutes().max(0))
            .unwrap_or(0);
        let plan = &slot.session.plan;
        let mut summary = SessionSummary {
            session_id,
            name: plan.name.clone(),
            description: plan.description.clone(),
            steps: totals.steps,
            distance_km: totals.distance_km,
            calories_burned: totals.calories_burned,
            duration_minutes: plan.duration_minutes,
            elapsed_minutes,
            start_time: plan.start_time,
            end_time: now,
            reminders: Vec::new(),
        };

        self.sessions.write().await.remove(&session_id);
        self.completed.write().await.insert(session_id);
        info!(
            %session_id,
            steps = summary.steps,
            distance_km = summary.distance_km,
            calories = summary.calories_burned,
            elapsed_minutes,
            reminders_cancelled = cancelled,
            "session completed"
        );

        match self.persist_summary(&summary).await {
            Ok(record_id) => debug!(%session_id, %record_id, "summary persisted"),
            Err(e) => warn!(%session_id, error = %e, "summary not persisted; retry with persist_summary"),
        }
        summary.reminders = self.scheduler.forget(session_id).await;
        summary
    }

    async fn live_slot(&self, session_id: SessionId) -> Option<Arc<Mutex<SessionSlot>>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    async fn slot(
        &self,
        session_id: SessionId,
        action: &'static str,
    ) -> Result<Arc<Mutex<SessionSlot>>, DomainError> {
        if let Some(slot) = self.live_slot(session_id).await {
            return Ok(slot);
        }
        if self.completed.read().await.contains(&session_id) {
            return Err(DomainError::InvalidState {
                session_id,
                state: SessionState::Completed,
                action,
            });
        }
        Err(DomainError::SessionNotFound(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::friends::StoreFriendDirectory;
    use crate::adapters::notifications::{LogDispatcher, StaticPermission};
    use crate::adapters::pedometer::ChannelStepSource;
    use crate::adapters::persistence::MemoryRecordStore;
    use crate::domain::{FanoutStatus, Friend, JobStatus};
    use chrono::{Duration as Minutes, TimeZone};

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryRecordStore>,
        dispatcher: Arc<LogDispatcher>,
        permission: Arc<StaticPermission>,
        steps: Arc<ChannelStepSource>,
        manager: SessionManager,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 21, 9, 0, 0).unwrap()
    }

    async fn fixture_with(steps: ChannelStepSource) -> Fixture {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryRecordStore::new());
        let friends = Arc::new(StoreFriendDirectory::new(store.clone()));
        for (id, name) in [("f1", "Jane"), ("f2", "Sam")] {
            friends
                .add_friend(&"me".into(), &Friend { id: id.into(), name: name.into() })
                .await
                .unwrap();
        }
        let dispatcher = Arc::new(LogDispatcher::recording());
        let permission = Arc::new(StaticPermission::new(true));
        let steps = Arc::new(steps);
        let ports = SessionPorts {
            store: store.clone(),
            friends,
            dispatcher: dispatcher.clone(),
            permission: permission.clone(),
            steps: steps.clone(),
            clock: clock.clone(),
        };
        let manager = SessionManager::new("me".into(), ports, 4);
        Fixture {
            clock,
            store,
            dispatcher,
            permission,
            steps,
            manager,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(ChannelStepSource::new(3_000)).await
    }

    fn plan(start_in: Minutes, participants: &[&str], tracking: bool) -> WorkoutPlan {
        WorkoutPlan {
            name: "Run".into(),
            description: "Park loop".into(),
            duration_minutes: 30,
            start_time: t0() + start_in,
            participant_ids: participants.iter().map(|p| ParticipantId::from(*p)).collect(),
            tracking_enabled: tracking,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_deferred_tracked_session() {
        let f = fixture().await;
        let created = f
            .manager
            .create(plan(Minutes::minutes(45), &["f1", "f2"], true))
            .await
            .unwrap();
        let id = created.session.id;
        assert_eq!(created.session.state, SessionState::Ready);
        assert!(created.owner_record.is_ok());
        let arm = created.reminders.as_ref().unwrap();
        assert_eq!(arm.count(JobStatus::Pending), 9);
        assert_eq!(arm.immediate_sent, 3);
        assert_eq!(created.fanout.delivered(), 2);

        let outcome = f.manager.start(id).await.unwrap();
        assert_eq!(
            outcome,
            StartOutcome::Scheduled {
                at: t0() + Minutes::minutes(45)
            }
        );
        assert!(f.manager.snapshot(id).await.unwrap().deferred_start);

        let r = f.manager.tick(f.clock.advance(Minutes::minutes(15))).await;
        assert_eq!(r.reminders_fired, 3);
        let r = f.manager.tick(f.clock.advance(Minutes::minutes(10))).await;
        assert_eq!(r.reminders_fired, 3);
        let r = f.manager.tick(f.clock.advance(Minutes::minutes(20))).await;
        assert_eq!(r.reminders_fired, 3);
        assert_eq!(r.sessions_started, 1);

        let view = f.manager.snapshot(id).await.unwrap();
        assert_eq!(view.session.state, SessionState::Active);
        assert_eq!(view.tracking, TrackingStatus::Live);

        f.steps.add_steps(400).await;
        f.steps.add_steps(600).await;
        f.clock.advance(Minutes::minutes(30));
        let summary = f.manager.stop(id).await.unwrap();

        assert_eq!(summary.steps, 1_000);
        assert!((summary.distance_km - 0.8).abs() < 1e-9);
        assert!((summary.calories_burned - 40.0).abs() < 1e-9);
        assert_eq!(summary.elapsed_minutes, 30);
        assert_eq!(summary.reminders.len(), 9);
        assert!(summary.reminders.iter().all(|j| j.status == JobStatus::Fired));
        assert_eq!(f.manager.scheduler().retained_jobs().await, 0);
        assert_eq!(f.dispatcher.sent().await.len(), 12);

        let history = f.store.list(&"me".into(), HISTORY_COLLECTION).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["steps"], 1_000);
        assert_eq!(f.store.count(&"me".into(), WORKOUTS_COLLECTION).await, 1);
    }

    #[tokio::test]
    async fn test_start_at_or_after_planned_time_activates_immediately() {
        let f = fixture().await;
        let created = f.manager.create(plan(Minutes::zero(), &[], true)).await.unwrap();
        let outcome = f.manager.start(created.session.id).await.unwrap();
        assert_eq!(
            outcome,
            StartOutcome::Active {
                tracking: TrackingStatus::Live
            }
        );
        assert!(f.manager.metrics().is_tracking(created.session.id).await);
    }

    #[tokio::test]
    async fn test_stop_with_tracking_disabled_returns_zeros() {
        let f = fixture().await;
        let created = f
            .manager
            .create(plan(-Minutes::minutes(1), &["f1"], false))
            .await
            .unwrap();
        let id = created.session.id;
        assert_eq!(
            f.manager.start(id).await.unwrap(),
            StartOutcome::Active {
                tracking: TrackingStatus::Disabled
            }
        );
        f.steps.add_steps(500).await;
        let summary = f.manager.stop(id).await.unwrap();
        assert_eq!(summary.steps, 0);
        assert_eq!(summary.distance_km, 0.0);
        assert_eq!(summary.calories_burned, 0.0);
    }

    #[tokio::test]
    async fn test_stop_twice_is_invalid_state() {
        let f = fixture().await;
        let id = f
            .manager
            .create(plan(Minutes::minutes(5), &[], false))
            .await
            .unwrap()
            .session
            .id;
        f.manager.stop(id).await.unwrap();
        let err = f.manager.stop(id).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidState {
                state: SessionState::Completed,
                action: "stop",
                ..
            }
        ));
        assert!(matches!(
            f.manager.start(id).await,
            Err(DomainError::InvalidState { .. })
        ));
        assert!(matches!(
            f.manager.stop(SessionId::new()).await,
            Err(DomainError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_early_stop_cancels_reminders_and_deferred_start() {
        let f = fixture().await;
        let id = f
            .manager
            .create(plan(Minutes::minutes(45), &["f1"], true))
            .await
            .unwrap()
            .session
            .id;
        f.manager.start(id).await.unwrap();
        f.manager.tick(f.clock.advance(Minutes::minutes(15))).await;

        let summary = f.manager.stop(id).await.unwrap();
        assert_eq!(summary.steps, 0);
        assert_eq!(summary.elapsed_minutes, 0);

        let jobs = &summary.reminders;
        assert_eq!(jobs.iter().filter(|j| j.status == JobStatus::Fired).count(), 2);
        assert_eq!(jobs.iter().filter(|j| j.status == JobStatus::Cancelled).count(), 4);

        let sent_before = f.dispatcher.sent().await.len();
        let r = f.manager.tick(f.clock.advance(Minutes::hours(2))).await;
        assert_eq!(r, TickReport::default());
        assert_eq!(f.dispatcher.sent().await.len(), sent_before);
        assert_eq!(f.manager.next_deadline().await, None);
        assert!(f.manager.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_deferred_start_arms_one_timer() {
        let f = fixture().await;
        let id = f
            .manager
            .create(plan(Minutes::minutes(10), &[], false))
            .await
            .unwrap()
            .session
            .id;
        f.manager.start(id).await.unwrap();
        f.manager.start(id).await.unwrap();
        let r = f.manager.tick(f.clock.advance(Minutes::minutes(10))).await;
        assert_eq!(r.sessions_started, 1);
        assert!(matches!(
            f.manager.start(id).await,
            Err(DomainError::InvalidState {
                state: SessionState::Active,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_untracked_session_completes_at_planned_end() {
        let f = fixture().await;
        let id = f
            .manager
            .create(plan(Minutes::minutes(5), &[], false))
            .await
            .unwrap()
            .session
            .id;
        let r = f.manager.tick(f.clock.advance(Minutes::minutes(35))).await;
        assert_eq!(r.sessions_completed, 1);
        assert_eq!(f.store.count(&"me".into(), HISTORY_COLLECTION).await, 1);
        assert!(matches!(
            f.manager.stop(id).await,
            Err(DomainError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_tracked_session_is_not_auto_completed() {
        let f = fixture().await;
        let id = f
            .manager
            .create(plan(Minutes::zero(), &[], true))
            .await
            .unwrap()
            .session
            .id;
        f.manager.start(id).await.unwrap();
        let r = f.manager.tick(f.clock.advance(Minutes::minutes(45))).await;
        assert_eq!(r.sessions_completed, 0);
        assert_eq!(
            f.manager.snapshot(id).await.unwrap().session.state,
            SessionState::Active
        );
    }

    #[tokio::test]
    async fn test_unavailable_step_source_is_non_fatal() {
        let f = fixture_with(ChannelStepSource::unavailable()).await;
        let id = f
            .manager
            .create(plan(Minutes::zero(), &[], true))
            .await
            .unwrap()
            .session
            .id;
        assert_eq!(
            f.manager.start(id).await.unwrap(),
            StartOutcome::Active {
                tracking: TrackingStatus::Unavailable
            }
        );
        let summary = f.manager.stop(id).await.unwrap();
        assert_eq!(summary.steps, 0);
    }

    #[tokio::test]
    async fn test_invalid_plan_writes_nothing() {
        let f = fixture().await;
        let mut bad = plan(Minutes::minutes(45), &["f1"], false);
        bad.duration_minutes = -5;
        assert!(matches!(
            f.manager.create(bad).await,
            Err(DomainError::Validation(_))
        ));
        assert!(f.dispatcher.sent().await.is_empty());
        assert_eq!(f.store.count(&"me".into(), WORKOUTS_COLLECTION).await, 0);
        assert_eq!(f.store.count(&"f1".into(), WORKOUTS_COLLECTION).await, 0);
        assert!(f.manager.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_fanout_failure_still_creates() {
        let f = fixture().await;
        f.store.fail_writes_for("f2").await;
        let created = f
            .manager
            .create(plan(Minutes::minutes(45), &["f1", "f2"], false))
            .await
            .unwrap();
        assert_eq!(
            created.fanout.record(&"f1".into()).unwrap().status,
            FanoutStatus::Delivered
        );
        assert_eq!(
            created.fanout.record(&"f2".into()).unwrap().status,
            FanoutStatus::Failed
        );
        assert_eq!(f.manager.sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_does_not_block_creation() {
        let f = fixture().await;
        f.permission.set(false);
        let created = f
            .manager
            .create(plan(Minutes::minutes(45), &["f1"], false))
            .await
            .unwrap();
        assert!(matches!(
            created.reminders,
            Err(DomainError::PermissionDenied(_))
        ));
        assert_eq!(created.fanout.delivered(), 1);
        assert!(f.manager.scheduler().jobs(created.session.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_summary_write_can_be_retried() {
        let f = fixture().await;
        let id = f
            .manager
            .create(plan(Minutes::zero(), &[], false))
            .await
            .unwrap()
            .session
            .id;
        f.store.fail_writes_for("me").await;
        let summary = f.manager.stop(id).await.unwrap();
        assert_eq!(f.store.count(&"me".into(), HISTORY_COLLECTION).await, 0);
        assert!(matches!(
            f.manager.persist_summary(&summary).await,
            Err(DomainError::Write(_))
        ));
    }

    #[tokio::test]
    async fn test_next_deadline_spans_reminders_and_lifecycle() {
        let f = fixture().await;
        f.manager
            .create(plan(Minutes::minutes(45), &[], false))
            .await
            .unwrap();
        assert_eq!(
            f.manager.next_deadline().await,
            Some(t0() + Minutes::minutes(15))
        );
        f.manager.tick(t0() + Minutes::minutes(45)).await;
        assert_eq!(
            f.manager.next_deadline().await,
            Some(t0() + Minutes::minutes(75))
        );
    }
    #[tokio::test]
    async fn test_completed_sessions_release_reminder_state() {
        let f = fixture().await;
        for _ in 0..100 {
            let id = f
                .manager
                .create(plan(Minutes::minutes(45), &["f1", "f2"], false))
                .await
                .unwrap()
                .session
                .id;
            let summary = f.manager.stop(id).await.unwrap();
            assert_eq!(summary.reminders.len(), 9);
        }
        assert_eq!(f.manager.scheduler().retained_jobs().await, 0);
        assert!(f.manager.sessions().await.is_empty());
        assert_eq!(f.manager.next_deadline().await, None);
        assert_eq!(f.store.count(&"me".into(), HISTORY_COLLECTION).await, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_already_ended_sessions_complete_under_concurrent_ticks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let f = fixture().await;
        let manager = Arc::new(f.manager);
        let done = Arc::new(AtomicBool::new(false));
        let ticker = {
            let manager = Arc::clone(&manager);
            let clock = f.clock.clone();
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                while !done.load(Ordering::Relaxed) {
                    manager.tick(clock.now()).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..50 {
            manager
                .create(plan(Minutes::hours(-2), &[], false))
                .await
                .unwrap();
        }
        done.store(true, Ordering::Relaxed);
        ticker.await.unwrap();
        manager.tick(f.clock.now()).await;

        assert!(manager.sessions().await.is_empty());
        assert_eq!(f.store.count(&"me".into(), HISTORY_COLLECTION).await, 50);
        assert_eq!(manager.next_deadline().await, None);
    }

    #[tokio::test]
    async fn test_failed_fanout_can_be_retried_once_friend_is_added() {
        let f = fixture().await;
        let created = f
            .manager
            .create(plan(Minutes::minutes(45), &["f1", "f3"], false))
            .await
            .unwrap();
        let failed = created.fanout.failed_ids();
        assert_eq!(failed.len(), 1);
        assert!(failed.contains(&ParticipantId::from("f3")));

        StoreFriendDirectory::new(f.store.clone())
            .add_friend(&"me".into(), &Friend { id: "f3".into(), name: "Ola".into() })
            .await
            .unwrap();
        let retry = f.manager.fanout().propagate(&created.session, &failed).await;
        assert_eq!(retry.delivered(), 1);
        assert!(retry.failed_ids().is_empty());
        assert_eq!(f.store.count(&"f3".into(), WORKOUTS_COLLECTION).await, 1);
    }
}
