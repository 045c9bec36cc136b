//! Core domain layer. No external I/O dependencies.
//!
//! Entities and business rules live here. Dependencies flow inward.

pub mod entities;
pub mod errors;
pub mod metrics;
pub mod recent_ids;
pub mod reminders;
pub mod timer_queue;

pub use entities::{
    FanoutRecord, FanoutStatus, Friend, ParticipantId, SessionId, SessionState, SessionSummary,
    WorkoutPlan, WorkoutRecord, WorkoutSession, parse_start_time,
};
pub use errors::DomainError;
pub use metrics::{KCAL_PER_STEP, KM_PER_STEP, MetricsAccumulator, MetricsSnapshot};
pub use recent_ids::{DEFAULT_RECENT_IDS, RecentIds};
pub use reminders::{JobId, JobStatus, NotificationRequest, ReminderJob, ReminderLabel};
pub use timer_queue::{TimerId, TimerQueue};
