//! Reminder scheduling: 30/20/0-minute reminders per recipient, plus one immediate
//! "Scheduled" notice.
//!
//! - Requires notification permission before anything is armed
//! - Offsets already in the past are marked `Skipped` at arm time and never dispatched
//! - Timers live in a `TimerQueue`; `fire_due` is driven by the session manager's tick
//! - Dispatch errors are recorded on the job and never abort sibling reminders

use crate::domain::{
    DomainError, JobId, JobStatus, NotificationRequest, ParticipantId, RecentIds, ReminderJob,
    ReminderLabel, SessionId, TimerId, TimerQueue, WorkoutSession,
};
use crate::ports::{Clock, FriendDirectory, NotificationDispatcher, NotificationPermission};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Default)]
struct SchedulerState {
    jobs: HashMap<JobId, ReminderJob>,
    batches: HashMap<SessionId, Vec<JobId>>,
    timers: TimerQueue<JobId>,
    job_timers: HashMap<JobId, TimerId>,
    /// Notification prepared at arm time for each pending job.
    outbox: HashMap<JobId, NotificationRequest>,
    /// Recently cancelled sessions; they cannot be re-armed.
    closed: RecentIds<SessionId>,
    next_job: u64,
}

/// What `arm` did for one session.
#[derive(Debug, Clone)]
pub struct ArmReport {
    pub session_id: SessionId,
    /// The whole batch: three jobs per recipient, `Pending` or `Skipped`.
    pub jobs: Vec<ReminderJob>,
    pub immediate_sent: usize,
    pub immediate_failed: usize,
}

impl ArmReport {
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }
}

pub struct ReminderScheduler {
    dispatcher: Arc<dyn NotificationDispatcher>,
    permission: Arc<dyn NotificationPermission>,
    friends: Arc<dyn FriendDirectory>,
    clock: Arc<dyn Clock>,
    state: Mutex<SchedulerState>,
}

impl ReminderScheduler {
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        permission: Arc<dyn NotificationPermission>,
        friends: Arc<dyn FriendDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher,
            permission,
            friends,
            clock,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// Arms the reminder batch for `recipient_ids` plus the session owner.
    ///
    /// # Errors
    /// - `PermissionDenied` if notifications are not authorized; nothing is armed.
    /// - `InvalidState` if the session already has a batch or was cancelled.
    pub async fn arm(
        &self,
        session: &WorkoutSession,
        recipient_ids: &BTreeSet<ParticipantId>,
    ) -> Result<ArmReport, DomainError> {
        match self.permission.is_authorized().await {
            Ok(true) => {}
            Ok(false) => {
                warn!(session_id = %session.id, "notifications not authorized; reminders not armed");
                return Err(DomainError::PermissionDenied(
                    "notifications are not authorized".into(),
                ));
            }
            Err(e) => return Err(DomainError::PermissionDenied(e.to_string())),
        }

        let mut recipients = recipient_ids.clone();
        recipients.insert(session.owner_id.clone());
        let companions = self.companion_names(session, &recipients).await;
        let now = self.clock.now();
        let start = session.plan.start_time;
        let name = session.plan.name.as_str();

        let jobs = {
            let mut state = self.state.lock().await;
            if state.batches.contains_key(&session.id) || state.closed.contains(&session.id) {
                return Err(DomainError::InvalidState {
                    session_id: session.id,
                    state: session.state,
                    action: "arm reminders for",
                });
            }

            let mut jobs = Vec::with_capacity(recipients.len() * ReminderLabel::ALL.len());
            for recipient in &recipients {
                let with = companions.get(recipient).map(String::as_str).unwrap_or("");
                for label in ReminderLabel::ALL {
                    // Unrepresentable instants are long past: recorded as skipped.
                    let fire_at = label.fire_at(start).unwrap_or(DateTime::<Utc>::MIN_UTC);
                    let id = JobId(state.next_job);
                    state.next_job += 1;
                    let status = if fire_at > now {
                        let timer = state.timers.schedule(fire_at, id);
                        state.job_timers.insert(id, timer);
                        state.outbox.insert(
                            id,
                            NotificationRequest::reminder(recipient.clone(), name, with, label, fire_at),
                        );
                        debug!(session_id = %session.id, %recipient, %label, %fire_at, "reminder armed");
                        JobStatus::Pending
                    } else {
                        debug!(session_id = %session.id, %recipient, %label, "reminder skipped: time already passed");
                        JobStatus::Skipped
                    };
                    jobs.push(ReminderJob {
                        id,
                        session_id: session.id,
                        recipient_id: recipient.clone(),
                        label,
                        fire_at,
                        status,
                        last_error: None,
                    });
                }
            }
            state.batches.insert(session.id, jobs.iter().map(|j| j.id).collect());
            for job in &jobs {
                state.jobs.insert(job.id, job.clone());
            }
            jobs
        };

        // Sent even when the workout has already started.
        let mut immediate_sent = 0;
        let mut immediate_failed = 0;
        for recipient in &recipients {
            let with = companions.get(recipient).map(String::as_str).unwrap_or("");
            let notice = NotificationRequest::scheduled(recipient.clone(), name, with, start);
            match self.dispatcher.dispatch(&notice).await {
                Ok(()) => immediate_sent += 1,
                Err(e) => {
                    immediate_failed += 1;
                    warn!(session_id = %session.id, %recipient, error = %e, "scheduled notice not delivered");
                }
            }
        }

        let report = ArmReport {
            session_id: session.id,
            jobs,
            immediate_sent,
            immediate_failed,
        };
        info!(
            session_id = %session.id,
            recipients = recipients.len(),
            pending = report.count(JobStatus::Pending),
            skipped = report.count(JobStatus::Skipped),
            immediate_sent,
            "reminders armed"
        );
        Ok(report)
    }

    /// Cancels every `Pending` job of the session. Fired and skipped jobs are untouched.
    /// Returns how many jobs were cancelled by this call.
    pub async fn cancel(&self, session_id: SessionId) -> usize {
        let mut state = self.state.lock().await;
        state.closed.insert(session_id);
        let ids = state.batches.get(&session_id).cloned().unwrap_or_default();
        let mut cancelled = 0;
        for id in ids {
            let pending = state
                .jobs
                .get(&id)
                .is_some_and(|j| j.status == JobStatus::Pending);
            if !pending {
                continue;
            }
            if let Some(timer) = state.job_timers.remove(&id) {
                state.timers.cancel(timer);
            }
            state.outbox.remove(&id);
            if let Some(job) = state.jobs.get_mut(&id) {
                job.status = JobStatus::Cancelled;
            }
            cancelled += 1;
        }
        if cancelled > 0 {
            info!(%session_id, cancelled, "pending reminders cancelled");
        }
        cancelled
    }

    /// Fires every reminder due at `now`. Returns how many jobs fired.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<(JobId, NotificationRequest)> = {
            let mut state = self.state.lock().await;
            let popped = state.timers.pop_due(now);
            let mut due = Vec::with_capacity(popped.len());
            for (_, id) in popped {
                state.job_timers.remove(&id);
                let Some(request) = state.outbox.remove(&id) else {
                    continue;
                };
                if let Some(job) = state.jobs.get_mut(&id) {
                    if job.status != JobStatus::Pending {
                        continue;
                    }
                    job.status = JobStatus::Fired;
                    due.push((id, request));
                }
            }
            due
        };

        let fired = due.len();
        for (id, request) in due {
            match self.dispatcher.dispatch(&request).await {
                Ok(()) => debug!(job = id.0, recipient = %request.recipient_id, title = %request.title, "reminder dispatched"),
                Err(e) => {
                    warn!(job = id.0, recipient = %request.recipient_id, error = %e, "reminder dispatch failed");
                    if let Some(job) = self.state.lock().await.jobs.get_mut(&id) {
                        job.last_error = Some(e.to_string());
                    }
                }
            }
        }
        fired
    }

    /// The session's reminder batch, ordered by recipient then fire time.
    pub async fn jobs(&self, session_id: SessionId) -> Vec<ReminderJob> {
        let state = self.state.lock().await;
        let mut jobs: Vec<ReminderJob> = state
            .batches
            .get(&session_id)
            .map(|ids| ids.iter().filter_map(|id| state.jobs.get(id).cloned()).collect())
            .unwrap_or_default();
        jobs.sort_by(|a, b| {
            a.recipient_id
                .cmp(&b.recipient_id)
                .then(a.fire_at.cmp(&b.fire_at))
        });
        jobs
    }

    /// Drops the session's batch and returns its final job states. Pending jobs are
    /// cancelled first; the session stays closed to `arm`.
    pub async fn forget(&self, session_id: SessionId) -> Vec<ReminderJob> {
        self.cancel(session_id).await;
        let mut state = self.state.lock().await;
        let ids = state.batches.remove(&session_id).unwrap_or_default();
        let mut jobs: Vec<ReminderJob> = ids
            .iter()
            .filter_map(|id| {
                state.job_timers.remove(id);
                state.outbox.remove(id);
                state.jobs.remove(id)
            })
            .collect();
        jobs.sort_by(|a, b| {
            a.recipient_id
                .cmp(&b.recipient_id)
                .then(a.fire_at.cmp(&b.fire_at))
        });
        debug!(%session_id, jobs = jobs.len(), "reminder batch released");
        jobs
    }

    /// Jobs currently held across all sessions.
    pub async fn retained_jobs(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    pub async fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.timers.next_deadline()
    }

    /// Name each recipient's notices mention: the owner sees the invited friends,
    /// each friend sees the name the owner knows them by.
    async fn companion_names(
        &self,
        session: &WorkoutSession,
        recipients: &BTreeSet<ParticipantId>,
    ) -> HashMap<ParticipantId, String> {
        let mut names = HashMap::with_capacity(recipients.len());
        for recipient in recipients.iter().filter(|r| **r != session.owner_id) {
            let name = match self.friends.resolve_name(&session.owner_id, recipient).await {
                Ok(name) => name,
                Err(e) => {
                    debug!(%recipient, error = %e, "friend name unresolved; using id");
                    recipient.to_string()
                }
            };
            names.insert(recipient.clone(), name);
        }
        let invited: Vec<&str> = recipients
            .iter()
            .filter_map(|r| names.get(r).map(String::as_str))
            .collect();
        let owner_line = invited.join(", ");
        names.insert(session.owner_id.clone(), owner_line);
        names
    }
}
