//! Logging dispatcher. Implements NotificationDispatcher without a push service.
//!
//! Used when Expo is not configured. Tests build it with `recording()` to inspect what was sent.

use crate::domain::{DomainError, NotificationRequest, ParticipantId};
use crate::ports::NotificationDispatcher;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Default)]
pub struct LogDispatcher {
    /// `None` unless built with `recording()`.
    sent: Option<Mutex<Vec<NotificationRequest>>>,
    unreachable: Mutex<HashSet<ParticipantId>>,
}

impl LogDispatcher {
    /// Logs each request and keeps nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs each request and keeps a copy, readable through `sent`.
    pub fn recording() -> Self {
        Self {
            sent: Some(Mutex::new(Vec::new())),
            ..Self::default()
        }
    }

    /// Dispatches to `recipient` fail from now on.
    pub async fn make_unreachable(&self, recipient: impl Into<ParticipantId>) {
        self.unreachable.lock().await.insert(recipient.into());
    }

    /// Requests dispatched so far, in dispatch order. Always empty unless recording.
    pub async fn sent(&self) -> Vec<NotificationRequest> {
        match &self.sent {
            Some(sent) => sent.lock().await.clone(),
            None => Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), DomainError> {
        if self.unreachable.lock().await.contains(&request.recipient_id) {
            return Err(DomainError::Dispatch(format!(
                "{} is unreachable",
                request.recipient_id
            )));
        }
        info!(
            recipient = %request.recipient_id,
            title = %request.title,
            "[LOG] notification: {}",
            request.body
        );
        if let Some(sent) = &self.sent {
            sent.lock().await.push(request.clone());
        }
        Ok(())
    }
}
