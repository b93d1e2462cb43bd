//! Room → controller resolution.
//!
//! Asks the cluster coordinator which controller owns a room. Consulted only
//! on join; later operations of the session reuse the address captured then.
//! No retries here: a failed lookup fails the join and the caller decides.

use crate::errors::PortalError;
use crate::services::rpc_client::ClusterRpc;
use common::types::ControllerAddress;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct ControllerLocator {
    cluster: Arc<dyn ClusterRpc>,
    cluster_name: String,
}

impl ControllerLocator {
    pub fn new(cluster: Arc<dyn ClusterRpc>, cluster_name: impl Into<String>) -> Self {
        Self {
            cluster,
            cluster_name: cluster_name.into(),
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Resolve the controller currently owning `room_id`.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::NoControllerAvailable` for any cluster failure.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn locate(&self, room_id: &str) -> Result<ControllerAddress, PortalError> {
        match self.cluster.get_controller(&self.cluster_name, room_id).await {
            Ok(controller) => {
                debug!(
                    target: "portal.services.controller_locator",
                    room_id = %room_id,
                    controller = %controller,
                    "Got controller"
                );
                Ok(controller)
            }
            Err(e) => {
                warn!(
                    target: "portal.services.controller_locator",
                    room_id = %room_id,
                    cluster = %self.cluster_name,
                    error = %e,
                    "Failed to get controller"
                );
                Err(PortalError::NoControllerAvailable(e.to_string()))
            }
        }
    }
}
