//! Mock cluster coordinator.
//!
//! Answers `get_controller` from a room table that tests can change at any
//! time, to simulate a room moving to another controller.

use portal_service::services::{ClusterRpc, RpcError};
use std::collections::HashMap;
use std::sync::Mutex;

/// Mock cluster coordinator.
#[derive(Debug, Default)]
pub struct MockCluster {
    rooms: Mutex<HashMap<String, String>>,
    failure: Mutex<Option<RpcError>>,
    lookups: Mutex<Vec<(String, String)>>,
}

impl MockCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `room_id` on `controller`.
    #[must_use]
    pub fn with_room(self, room_id: &str, controller: &str) -> Self {
        self.set_room(room_id, controller);
        self
    }

    /// Move (or place) a room.
    pub fn set_room(&self, room_id: &str, controller: &str) {
        self.rooms
            .lock()
            .unwrap()
            .insert(room_id.to_string(), controller.to_string());
    }

    /// Make every lookup fail with `error`.
    pub fn fail_with(&self, error: RpcError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// (cluster, room) pairs asked so far.
    pub fn lookups(&self) -> Vec<(String, String)> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ClusterRpc for MockCluster {
    async fn get_controller(&self, cluster: &str, room_id: &str) -> Result<String, RpcError> {
        self.lookups
            .lock()
            .unwrap()
            .push((cluster.to_string(), room_id.to_string()));

        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }

        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .cloned()
            .ok_or_else(|| RpcError::Remote(format!("No controller for room {room_id}")))
    }
}
