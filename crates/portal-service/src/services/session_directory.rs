//! Participant → (room, controller) directory.
//!
//! The directory is the portal's admission state: a participant is joined iff
//! it has an entry here. All mutations go through one `RwLock`, so insert and
//! remove for a participant are linearizable. The lock is never held across
//! an RPC; readers take a clone and release it.

use crate::errors::PortalError;
use common::types::{OwnerKind, ParticipantSession};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct SessionDirectory {
    sessions: RwLock<HashMap<String, ParticipantSession>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::AlreadyJoined` if the participant already has
    /// one; the existing entry is left untouched.
    pub async fn insert(&self, session: ParticipantSession) -> Result<(), PortalError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.participant_id) {
            return Err(PortalError::AlreadyJoined(session.participant_id));
        }
        sessions.insert(session.participant_id.clone(), session);
        Ok(())
    }

    pub async fn lookup(&self, participant_id: &str) -> Option<ParticipantSession> {
        self.sessions.read().await.get(participant_id).cloned()
    }

    pub async fn contains(&self, participant_id: &str) -> bool {
        self.sessions.read().await.contains_key(participant_id)
    }

    /// Remove a session, returning it if it was present. Idempotent.
    pub async fn remove(&self, participant_id: &str) -> Option<ParticipantSession> {
        self.sessions.write().await.remove(participant_id)
    }

    /// Participants whose controller matches `id` under `kind`.
    pub async fn participants_by_owner(&self, kind: OwnerKind, id: &str) -> Vec<String> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| kind.matches(&s.controller, id))
            .map(|s| s.participant_id.clone())
            .collect()
    }

    /// Point-in-time copy of every session.
    pub async fn snapshot(&self) -> Vec<ParticipantSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_then_lookup() {
        let directory = SessionDirectory::new();
        directory
            .insert(ParticipantSession::new("alice", "r1", "conference-a"))
            .await
            .unwrap();

        let session = directory.lookup("alice").await.unwrap();
        assert_eq!(session.room_id, "r1");
        assert_eq!(session.controller, "conference-a");
        assert!(directory.lookup("bob").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_original() {
        let directory = SessionDirectory::new();
        directory
            .insert(ParticipantSession::new("alice", "r1", "conference-a"))
            .await
            .unwrap();

        let result = directory
            .insert(ParticipantSession::new("alice", "r2", "conference-b"))
            .await;
        assert!(matches!(result, Err(PortalError::AlreadyJoined(id)) if id == "alice"));

        let session = directory.lookup("alice").await.unwrap();
        assert_eq!(session.room_id, "r1");
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let directory = SessionDirectory::new();
        directory
            .insert(ParticipantSession::new("alice", "r1", "conference-a"))
            .await
            .unwrap();

        assert!(directory.remove("alice").await.is_some());
        assert!(directory.remove("alice").await.is_none());
        assert!(directory.is_empty().await);
    }

    #[tokio::test]
    async fn test_participants_by_owner() {
        let directory = SessionDirectory::new();
        for (participant, controller) in [
            ("alice", "conference-1@10.0.0.1_0"),
            ("bob", "conference-1@10.0.0.1_1"),
            ("carol", "conference-2@10.0.0.2_0"),
        ] {
            directory
                .insert(ParticipantSession::new(participant, "r1", controller))
                .await
                .unwrap();
        }

        let node = directory
            .participants_by_owner(OwnerKind::Node, "conference-1@10.0.0.1_0")
            .await;
        assert_eq!(node, vec!["alice".to_string()]);

        let mut worker = directory
            .participants_by_owner(OwnerKind::Worker, "conference-1@10.0.0.1")
            .await;
        worker.sort();
        assert_eq!(worker, vec!["alice".to_string(), "bob".to_string()]);

        assert!(directory
            .participants_by_owner(OwnerKind::Node, "conference-9")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_single_winner() {
        let directory = Arc::new(SessionDirectory::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let directory = Arc::clone(&directory);
            handles.push(tokio::spawn(async move {
                directory
                    .insert(ParticipantSession::new(
                        "alice",
                        "r1",
                        format!("conference-{i}"),
                    ))
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(directory.len().await, 1);
    }
}
