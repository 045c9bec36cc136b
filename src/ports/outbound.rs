//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{DomainError, Friend, NotificationRequest, ParticipantId};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Collection holding each user's workout records (own and invited).
pub const WORKOUTS_COLLECTION: &str = "workouts";
/// Collection holding each user's completed session summaries.
pub const HISTORY_COLLECTION: &str = "history";
/// Collection holding each user's friend list (`{ id, name }` documents).
pub const FRIENDS_COLLECTION: &str = "friends";

/// Document store with per-owner collections. Records are opaque JSON documents.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Append a record to `owner_id`'s collection. Returns the assigned record id.
    ///
    /// # Errors
    /// `DomainError::Write` if the store rejects the write.
    async fn write(
        &self,
        owner_id: &ParticipantId,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<String, DomainError>;

    /// All records of `owner_id`'s collection, oldest first. Empty if the collection does not exist.
    async fn list(
        &self,
        owner_id: &ParticipantId,
        collection: &str,
    ) -> Result<Vec<serde_json::Value>, DomainError>;
}

/// Friend records of a user.
#[async_trait::async_trait]
pub trait FriendDirectory: Send + Sync {
    /// Display name of `participant_id` in `owner_id`'s friend list.
    ///
    /// # Errors
    /// `DomainError::NotFound` if the owner has no such friend.
    async fn resolve_name(
        &self,
        owner_id: &ParticipantId,
        participant_id: &ParticipantId,
    ) -> Result<String, DomainError>;

    /// Everyone the owner can invite.
    async fn list_participants(&self, owner_id: &ParticipantId) -> Result<Vec<Friend>, DomainError>;
}

/// Push-notification collaborator. Delivery is best-effort.
#[async_trait::async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), DomainError>;
}

/// "Notifications authorized" capability, queried before any reminders are armed.
#[async_trait::async_trait]
pub trait NotificationPermission: Send + Sync {
    async fn is_authorized(&self) -> Result<bool, DomainError>;
}

/// Live subscription to a cumulative step counter. Dropping `readings` unsubscribes.
#[derive(Debug)]
pub struct StepSubscription {
    /// Counter value at subscription time (the session's baseline).
    pub current: u64,
    pub readings: mpsc::UnboundedReceiver<u64>,
}

/// Pedometer. Yields monotonically increasing cumulative counts (resets are possible).
#[async_trait::async_trait]
pub trait StepSource: Send + Sync {
    async fn is_available(&self) -> bool;

    /// # Errors
    /// `DomainError::TrackingUnavailable` if the device has no usable step counter.
    async fn subscribe(&self) -> Result<StepSubscription, DomainError>;
}

/// Time source. Swapped for a manual clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
