//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use crate::domain::entities::{ParticipantId, SessionId, SessionState};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Malformed plan. Fatal to `create`; nothing is scheduled.
    #[error("Invalid workout plan: {0}")]
    Validation(String),

    /// Notification channel not authorized. Fatal to `arm` only.
    #[error("Notification permission denied: {0}")]
    PermissionDenied(String),

    #[error("Cannot {action} session {session_id} in state {state}")]
    InvalidState {
        session_id: SessionId,
        state: SessionState,
        action: &'static str,
    },

    /// Step source missing. Non-fatal: the session proceeds with zeroed metrics.
    #[error("Step tracking unavailable: {0}")]
    TrackingUnavailable(String),

    #[error("Fan-out to {participant} failed: {reason}")]
    Fanout {
        participant: ParticipantId,
        reason: String,
    },

    #[error("Record write failed: {0}")]
    Write(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown session {0}")]
    SessionNotFound(SessionId),

    #[error("Notification dispatch failed: {0}")]
    Dispatch(String),

    #[error("Terminal UI error: {0}")]
    Ui(String),
}
