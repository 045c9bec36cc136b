//! Reminder jobs and the notification requests they produce.

use crate::domain::entities::{ParticipantId, SessionId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format used for times shown inside notification bodies.
const NOTIFICATION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// One of the three fixed lead times before a workout's start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReminderLabel {
    #[serde(rename = "30 Minutes")]
    ThirtyMinutes,
    #[serde(rename = "20 Minutes")]
    TwentyMinutes,
    #[serde(rename = "Starting Now")]
    StartingNow,
}

impl ReminderLabel {
    /// Every label in firing order.
    pub const ALL: [ReminderLabel; 3] = [
        ReminderLabel::ThirtyMinutes,
        ReminderLabel::TwentyMinutes,
        ReminderLabel::StartingNow,
    ];

    pub fn lead_time(self) -> Duration {
        match self {
            ReminderLabel::ThirtyMinutes => Duration::minutes(30),
            ReminderLabel::TwentyMinutes => Duration::minutes(20),
            ReminderLabel::StartingNow => Duration::zero(),
        }
    }

    /// `None` when the instant falls before the earliest representable time.
    pub fn fire_at(self, start_time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        start_time.checked_sub_signed(self.lead_time())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReminderLabel::ThirtyMinutes => "30 Minutes",
            ReminderLabel::TwentyMinutes => "20 Minutes",
            ReminderLabel::StartingNow => "Starting Now",
        }
    }
}

impl fmt::Display for ReminderLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Fired,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderJob {
    pub id: JobId,
    pub session_id: SessionId,
    pub recipient_id: ParticipantId,
    pub label: ReminderLabel,
    pub fire_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Dispatch error from the last firing, if the push collaborator rejected it.
    pub last_error: Option<String>,
}

/// Request handed to the push-notification collaborator.
/// `fire_at: None` means "deliver immediately".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub recipient_id: ParticipantId,
    pub title: String,
    pub body: String,
    pub fire_at: Option<DateTime<Utc>>,
}

impl NotificationRequest {
    /// The immediate acknowledgement sent to every recipient when reminders are armed.
    pub fn scheduled(
        recipient_id: ParticipantId,
        workout_name: &str,
        companions: &str,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            recipient_id,
            title: format!("{} Scheduled!", workout_name),
            body: format!(
                "Your workout \"{}\"{} is scheduled for {}",
                workout_name,
                with_clause(companions),
                start_time.format(NOTIFICATION_TIME_FORMAT)
            ),
            fire_at: None,
        }
    }

    pub fn reminder(
        recipient_id: ParticipantId,
        workout_name: &str,
        companions: &str,
        label: ReminderLabel,
        fire_at: DateTime<Utc>,
    ) -> Self {
        let when = match label {
            ReminderLabel::StartingNow => "is starting now".to_string(),
            other => format!("starts in {}", other.as_str().to_lowercase()),
        };
        Self {
            recipient_id,
            title: format!("{} {}!", workout_name, label),
            body: format!(
                "Your workout \"{}\"{} {} ({}).",
                workout_name,
                with_clause(companions),
                when,
                fire_at.format(NOTIFICATION_TIME_FORMAT)
            ),
            fire_at: Some(fire_at),
        }
    }
}

fn with_clause(companions: &str) -> String {
    if companions.is_empty() {
        String::new()
    } else {
        format!(" with {}", companions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fire_times_are_fixed_offsets() {
        let start = Utc.with_ymd_and_hms(2025, 3, 21, 10, 0, 0).unwrap();
        let times: Vec<_> = ReminderLabel::ALL.iter().map(|l| l.fire_at(start)).collect();
        assert_eq!(
            times,
            vec![
                Some(Utc.with_ymd_and_hms(2025, 3, 21, 9, 30, 0).unwrap()),
                Some(Utc.with_ymd_and_hms(2025, 3, 21, 9, 40, 0).unwrap()),
                Some(start),
            ]
        );
    }

    #[test]
    fn test_fire_time_before_min_date_is_none() {
        let start = DateTime::<Utc>::MIN_UTC;
        assert_eq!(ReminderLabel::ThirtyMinutes.fire_at(start), None);
        assert_eq!(ReminderLabel::StartingNow.fire_at(start), Some(start));
    }

    #[test]
    fn test_notification_text() {
        let start = Utc.with_ymd_and_hms(2025, 3, 21, 10, 0, 0).unwrap();
        let n = NotificationRequest::scheduled("me".into(), "Run", "Jane", start);
        assert_eq!(n.title, "Run Scheduled!");
        assert_eq!(
            n.body,
            "Your workout \"Run\" with Jane is scheduled for 2025-03-21 10:00 UTC"
        );
        assert!(n.fire_at.is_none());

        let r = NotificationRequest::reminder(
            "me".into(),
            "Run",
            "",
            ReminderLabel::TwentyMinutes,
            start,
        );
        assert_eq!(r.title, "Run 20 Minutes!");
        assert!(r.body.contains("starts in 20 minutes"));
        assert!(!r.body.contains(" with "));
    }
}
