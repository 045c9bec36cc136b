//! Implements FriendDirectory on top of the record store: each user's `friends`
//! collection holds `{ id, name }` documents.

use crate::domain::{DomainError, Friend, ParticipantId};
use crate::ports::{FRIENDS_COLLECTION, FriendDirectory, RecordStore};
use std::sync::Arc;
use tracing::warn;

pub struct StoreFriendDirectory {
    store: Arc<dyn RecordStore>,
}

impl StoreFriendDirectory {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Adds `friend` to `owner_id`'s friend list.
    pub async fn add_friend(&self, owner_id: &ParticipantId, friend: &Friend) -> Result<(), DomainError> {
        let record = serde_json::to_value(friend).map_err(|e| DomainError::Write(e.to_string()))?;
        self.store.write(owner_id, FRIENDS_COLLECTION, record).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl FriendDirectory for StoreFriendDirectory {
    async fn resolve_name(
        &self,
        owner_id: &ParticipantId,
        participant_id: &ParticipantId,
    ) -> Result<String, DomainError> {
        self.list_participants(owner_id)
            .await?
            .into_iter()
            .find(|f| &f.id == participant_id)
            .map(|f| f.name)
            .ok_or_else(|| {
                DomainError::NotFound(format!("friend {} of {}", participant_id, owner_id))
            })
    }

    async fn list_participants(&self, owner_id: &ParticipantId) -> Result<Vec<Friend>, DomainError> {
        let records = self.store.list(owner_id, FRIENDS_COLLECTION).await?;
        let mut friends: Vec<Friend> = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<Friend>(record) {
                // Later entries win, so re-adding a friend renames them.
                Ok(friend) => match friends.iter_mut().find(|f| f.id == friend.id) {
                    Some(existing) => *existing = friend,
                    None => friends.push(friend),
                },
                Err(e) => warn!(owner = %owner_id, error = %e, "skipping malformed friend record"),
            }
        }
        Ok(friends)
    }
}
