//! Fan-out: copies a created workout into every invited participant's `workouts` collection.
//!
//! One task per participant, bounded by a semaphore. Every task is joined and its outcome
//! kept in a `FanoutRecord`; a failing participant never stops the others.

use crate::domain::{
    DomainError, FanoutRecord, FanoutStatus, ParticipantId, SessionId, WorkoutRecord,
    WorkoutSession,
};
use crate::ports::{FriendDirectory, RecordStore, WORKOUTS_COLLECTION};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Default number of participants written concurrently.
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 8;

/// Per-participant outcome of one `propagate` call.
#[derive(Debug, Clone)]
pub struct FanoutReport {
    pub session_id: SessionId,
    pub records: Vec<FanoutRecord>,
}

impl FanoutReport {
    pub fn delivered(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == FanoutStatus::Delivered)
            .count()
    }

    /// Participants to hand back to `propagate` for a retry.
    pub fn failed_ids(&self) -> BTreeSet<ParticipantId> {
        self.records
            .iter()
            .filter(|r| r.status == FanoutStatus::Failed)
            .map(|r| r.recipient_id.clone())
            .collect()
    }

    pub fn record(&self, participant: &ParticipantId) -> Option<&FanoutRecord> {
        self.records.iter().find(|r| &r.recipient_id == participant)
    }
}

pub struct FanoutCoordinator {
    friends: Arc<dyn FriendDirectory>,
    store: Arc<dyn RecordStore>,
    max_concurrent: usize,
}

impl FanoutCoordinator {
    pub fn new(
        friends: Arc<dyn FriendDirectory>,
        store: Arc<dyn RecordStore>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            friends,
            store,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Propagates `session` to each participant. Never fails as a whole.
    /// The owner is skipped: their copy is written when the session is created.
    pub async fn propagate(
        &self,
        session: &WorkoutSession,
        participant_ids: &BTreeSet<ParticipantId>,
    ) -> FanoutReport {
        let record = match serde_json::to_value(WorkoutRecord::from(session)) {
            Ok(v) => Arc::new(v),
            Err(e) => {
                // Nothing can be written; report every participant as failed.
                let reason = DomainError::Write(e.to_string()).to_string();
                return FanoutReport {
                    session_id: session.id,
                    records: participant_ids
                        .iter()
                        .filter(|p| **p != session.owner_id)
                        .map(|p| FanoutRecord::pending(session.id, p.clone()).failed(reason.clone()))
                        .collect(),
                };
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(participant_ids.len());
        for participant in participant_ids {
            if *participant == session.owner_id {
                debug!(session_id = %session.id, "owner listed as participant; skipping fan-out");
                continue;
            }
            let sem = Arc::clone(&semaphore);
            let friends = Arc::clone(&self.friends);
            let store = Arc::clone(&self.store);
            let record = Arc::clone(&record);
            let owner = session.owner_id.clone();
            let who = participant.clone();
            let session_id = session.id;

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await;
                let pending = FanoutRecord::pending(session_id, who.clone());
                match Self::deliver_one(&*friends, &*store, &owner, &who, &record).await {
                    Ok(name) => {
                        debug!(%session_id, participant = %who, friend = %name, "workout shared");
                        pending.delivered()
                    }
                    Err(e) => {
                        warn!(%session_id, participant = %who, error = %e, "fan-out failed");
                        pending.failed(e.to_string())
                    }
                }
            });
            handles.push((participant.clone(), handle));
        }

        let mut records = Vec::with_capacity(handles.len());
        for (participant, handle) in handles {
            let record = match handle.await {
                Ok(record) => record,
                Err(e) => FanoutRecord::pending(session.id, participant.clone()).failed(
                    DomainError::Fanout {
                        participant,
                        reason: format!("task aborted: {}", e),
                    }
                    .to_string(),
                ),
            };
            records.push(record);
        }

        let report = FanoutReport {
            session_id: session.id,
            records,
        };
        info!(
            session_id = %session.id,
            participants = report.records.len(),
            delivered = report.delivered(),
            failed = report.records.len() - report.delivered(),
            "fan-out complete"
        );
        report
    }

    /// Resolves the participant in the owner's friend list, then writes their copy.
    async fn deliver_one(
        friends: &dyn FriendDirectory,
        store: &dyn RecordStore,
        owner: &ParticipantId,
        participant: &ParticipantId,
        record: &serde_json::Value,
    ) -> Result<String, DomainError> {
        let name = friends
            .resolve_name(owner, participant)
            .await
            .map_err(|e| DomainError::Fanout {
                participant: participant.clone(),
                reason: e.to_string(),
            })?;
        store
            .write(participant, WORKOUTS_COLLECTION, record.clone())
            .await
            .map_err(|e| DomainError::Fanout {
                participant: participant.clone(),
                reason: e.to_string(),
            })?;
        Ok(name)
    }
}
