//! Domain entities. Pure data structures for the core business.
//!
//! No store/push/pedometer types here; adapters map to and from these.

use crate::domain::errors::DomainError;
use crate::domain::reminders::ReminderJob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Intensity written on every workout record. The app has no intensity picker yet.
pub const DEFAULT_INTENSITY: &str = "medium";

/// Opaque identifier of a user (creator or invited friend).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Session identifier, assigned on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A planned workout as entered by the creator. Immutable once handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutPlan {
    pub name: String,
    pub description: String,
    pub duration_minutes: i64,
    pub start_time: DateTime<Utc>,
    pub participant_ids: BTreeSet<ParticipantId>,
    pub tracking_enabled: bool,
}

impl WorkoutPlan {
    /// Checks the fields the creation form requires.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("workout name is required".into()));
        }
        if self.description.trim().is_empty() {
            return Err(DomainError::Validation(
                "workout description is required".into(),
            ));
        }
        if self.duration_minutes <= 0 {
            return Err(DomainError::Validation(format!(
                "duration must be positive, got {} minutes",
                self.duration_minutes
            )));
        }
        self.end_time()?;
        Ok(())
    }

    /// Planned end. `Validation` if `start_time + duration` is not representable.
    pub fn end_time(&self) -> Result<DateTime<Utc>, DomainError> {
        chrono::Duration::try_minutes(self.duration_minutes)
            .and_then(|d| self.start_time.checked_add_signed(d))
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "duration of {} minutes is out of range",
                    self.duration_minutes
                ))
            })
    }
}

/// Parses a user-supplied start time (RFC 3339). Malformed input is a validation error.
pub fn parse_start_time(raw: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Validation(format!("malformed start time '{}': {}", raw, e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Ready,
    Active,
    Completed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Ready => "ready",
            SessionState::Active => "active",
            SessionState::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// One planned-and-possibly-tracked workout instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSession {
    pub id: SessionId,
    pub plan: WorkoutPlan,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub owner_id: ParticipantId,
    /// Set when the session becomes `Active`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the session becomes `Completed`.
    pub ended_at: Option<DateTime<Utc>>,
}

impl WorkoutSession {
    pub fn new(plan: WorkoutPlan, owner_id: ParticipantId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            plan,
            state: SessionState::Ready,
            created_at,
            owner_id,
            started_at: None,
            ended_at: None,
        }
    }

    /// Creator plus every invited participant, deduplicated and ordered.
    pub fn recipients(&self) -> BTreeSet<ParticipantId> {
        let mut all = self.plan.participant_ids.clone();
        all.insert(self.owner_id.clone());
        all
    }
}

/// Document written to the creator's and each participant's `workouts` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutRecord {
    pub session_id: SessionId,
    pub name: String,
    pub description: String,
    pub duration: i64,
    pub intensity: String,
    pub created_by: ParticipantId,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
}

impl From<&WorkoutSession> for WorkoutRecord {
    fn from(session: &WorkoutSession) -> Self {
        Self {
            session_id: session.id,
            name: session.plan.name.clone(),
            description: session.plan.description.clone(),
            duration: session.plan.duration_minutes,
            intensity: DEFAULT_INTENSITY.to_string(),
            created_by: session.owner_id.clone(),
            created_at: session.created_at,
            start_time: session.plan.start_time,
        }
    }
}

/// Entry of an owner's friend list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub id: ParticipantId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutStatus {
    Pending,
    Delivered,
    Failed,
}

/// Outcome of propagating one session to one invited participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutRecord {
    pub session_id: SessionId,
    pub recipient_id: ParticipantId,
    pub status: FanoutStatus,
    pub last_error: Option<String>,
}

impl FanoutRecord {
    pub fn pending(session_id: SessionId, recipient_id: ParticipantId) -> Self {
        Self {
            session_id,
            recipient_id,
            status: FanoutStatus::Pending,
            last_error: None,
        }
    }

    pub fn delivered(mut self) -> Self {
        self.status = FanoutStatus::Delivered;
        self.last_error = None;
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = FanoutStatus::Failed;
        self.last_error = Some(error.into());
        self
    }
}

/// Persisted on `Stop`. Field names match the history documents the app reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub name: String,
    pub description: String,
    pub steps: u64,
    pub distance_km: f64,
    pub calories_burned: f64,
    pub duration_minutes: i64,
    /// Minutes between activation and completion; 0 if never activated.
    pub elapsed_minutes: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Final state of the session's reminders. Returned to the caller, not persisted.
    #[serde(skip)]
    pub reminders: Vec<ReminderJob>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan() -> WorkoutPlan {
        WorkoutPlan {
            name: "Run".into(),
            description: "Park loop".into(),
            duration_minutes: 30,
            start_time: Utc.with_ymd_and_hms(2025, 3, 21, 10, 0, 0).unwrap(),
            participant_ids: ["f1", "f2"].into_iter().map(ParticipantId::from).collect(),
            tracking_enabled: true,
        }
    }

    #[test]
    fn test_validate_accepts_complete_plan() {
        assert!(plan().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let mut p = plan();
        p.name = "  ".into();
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));

        let mut p = plan();
        p.description = String::new();
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));

        let mut p = plan();
        p.duration_minutes = 0;
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_huge_duration_is_rejected() {
        let mut p = plan();
        p.duration_minutes = 1_000_000_000_000;
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));
        p.duration_minutes = i64::MAX;
        assert!(matches!(p.end_time(), Err(DomainError::Validation(_))));

        let p = plan();
        assert_eq!(
            p.end_time().unwrap(),
            p.start_time + chrono::Duration::minutes(30)
        );
    }

    #[test]
    fn test_parse_start_time() {
        let t = parse_start_time("2025-03-21T10:00:00Z").unwrap();
        assert_eq!(t, plan().start_time);
        assert!(matches!(
            parse_start_time("tomorrow-ish"),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_recipients_include_owner_once() {
        let session = WorkoutSession::new(plan(), "f1".into(), Utc::now());
        let recipients: Vec<_> = session.recipients().into_iter().collect();
        assert_eq!(recipients, vec![ParticipantId::from("f1"), "f2".into()]);
    }

    #[test]
    fn test_workout_record_uses_document_field_names() {
        let session = WorkoutSession::new(plan(), "me".into(), Utc::now());
        let json = serde_json::to_value(WorkoutRecord::from(&session)).unwrap();
        assert_eq!(json["createdBy"], "me");
        assert_eq!(json["intensity"], "medium");
        assert_eq!(json["duration"], 30);
        assert!(json.get("startTime").is_some());
    }
}
