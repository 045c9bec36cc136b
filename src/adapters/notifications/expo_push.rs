//! Expo push adapter. Implements NotificationDispatcher via the Expo push HTTP API.

use crate::domain::{DomainError, NotificationRequest, ParticipantId};
use crate::ports::NotificationDispatcher;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

pub const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    sound: &'static str,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    data: PushTicket,
}

#[derive(Debug, Deserialize)]
struct PushTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Sends each request to the recipient's registered Expo device token.
///
/// Requests are delivered when received; timing is owned by the engine's timers.
pub struct ExpoPushDispatcher {
    client: Client,
    push_url: String,
    access_token: Option<String>,
    tokens: HashMap<ParticipantId, String>,
}

impl ExpoPushDispatcher {
    /// # Arguments
    /// * `push_url` - Expo push endpoint (see [`EXPO_PUSH_URL`])
    /// * `access_token` - Optional Expo access token for projects with enhanced push security
    /// * `tokens` - Device push token per participant
    pub fn new(
        push_url: String,
        access_token: Option<String>,
        tokens: HashMap<ParticipantId, String>,
    ) -> Self {
        Self {
            client: Client::new(),
            push_url,
            access_token,
            tokens,
        }
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for ExpoPushDispatcher {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), DomainError> {
        let token = self.tokens.get(&request.recipient_id).ok_or_else(|| {
            DomainError::Dispatch(format!("no push token for {}", request.recipient_id))
        })?;

        let message = PushMessage {
            to: token,
            title: &request.title,
            body: &request.body,
            sound: "default",
        };

        let mut req = self.client.post(&self.push_url).json(&message);
        if let Some(access_token) = &self.access_token {
            req = req.bearer_auth(access_token);
        }

        let res = req
            .send()
            .await
            .map_err(|e| DomainError::Dispatch(format!("Request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(DomainError::Dispatch(format!(
                "Expo API error {}: {}",
                status, text
            )));
        }

        let ticket: PushResponse = res
            .json()
            .await
            .map_err(|e| DomainError::Dispatch(format!("Malformed Expo response: {}", e)))?;
        if ticket.data.status != "ok" {
            let reason = ticket.data.message.unwrap_or_else(|| "unknown".to_string());
            warn!(recipient = %request.recipient_id, reason = %reason, "Expo rejected push");
            return Err(DomainError::Dispatch(reason));
        }

        debug!(recipient = %request.recipient_id, title = %request.title, "push sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_fails_without_network() {
        let dispatcher = ExpoPushDispatcher::new(EXPO_PUSH_URL.to_string(), None, HashMap::new());
        let request = NotificationRequest {
            recipient_id: "f1".into(),
            title: "Run Scheduled!".into(),
            body: "body".into(),
            fire_at: None,
        };
        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert!(matches!(err, DomainError::Dispatch(msg) if msg.contains("f1")));
    }

    #[test]
    fn test_ticket_parsing() {
        let ok: PushResponse =
            serde_json::from_str(r#"{"data":{"status":"ok","id":"abc"}}"#).unwrap();
        assert_eq!(ok.data.status, "ok");
        let err: PushResponse = serde_json::from_str(
            r#"{"data":{"status":"error","message":"DeviceNotRegistered"}}"#,
        )
        .unwrap();
        assert_eq!(err.data.message.as_deref(), Some("DeviceNotRegistered"));
    }
}
