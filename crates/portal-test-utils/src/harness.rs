//! A `SessionRouter` wired to in-memory collaborators.
//!
//! Every collaborator is kept as an `Arc` on [`TestPortal`] so tests can drive
//! and inspect it while the router runs.

use crate::fixtures::{TestToken, TEST_TOKEN_KEY};
use crate::mock_cluster::MockCluster;
use crate::mock_controller::MockControllerRpc;
use crate::mock_token_store::MockTokenStore;
use crate::recording_sink::RecordingSink;
use common::secret::SecretString;
use portal_service::auth::{AdmissionToken, TokenValidator};
use portal_service::observability::MetricsAggregator;
use portal_service::services::{ControllerLocator, SessionDirectory, SessionRouter};
use std::sync::Arc;

/// Cluster name the harness router asks for.
pub const TEST_CLUSTER: &str = "rtc-cluster";

/// RPC identity of the harness router.
pub const TEST_PORTAL_ID: &str = "portal-test-1";

pub struct TestPortal {
    pub router: SessionRouter,
    pub directory: Arc<SessionDirectory>,
    pub aggregator: Arc<MetricsAggregator>,
    pub cluster: Arc<MockCluster>,
    pub controllers: Arc<MockControllerRpc>,
    pub tokens: Arc<MockTokenStore>,
    pub sink: Arc<RecordingSink>,
}

impl Default for TestPortal {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPortal {
    /// Router signing with [`TEST_TOKEN_KEY`], no rooms placed.
    #[must_use]
    pub fn new() -> Self {
        let directory = Arc::new(SessionDirectory::new());
        let sink = Arc::new(RecordingSink::new());
        let aggregator = Arc::new(MetricsAggregator::new(sink.clone()));
        let cluster = Arc::new(MockCluster::new());
        let controllers = Arc::new(MockControllerRpc::new());
        let tokens = Arc::new(MockTokenStore::new());

        let router = SessionRouter::new(
            Arc::clone(&directory),
            TokenValidator::new(SecretString::from(TEST_TOKEN_KEY.to_string()), tokens.clone()),
            ControllerLocator::new(cluster.clone(), TEST_CLUSTER),
            controllers.clone(),
            Arc::clone(&aggregator),
            TEST_PORTAL_ID,
        );

        Self {
            router,
            directory,
            aggregator,
            cluster,
            controllers,
            tokens,
            sink,
        }
    }

    /// Place `room_id` on `controller`.
    #[must_use]
    pub fn with_room(self, room_id: &str, controller: &str) -> Self {
        self.cluster.set_room(room_id, controller);
        self
    }

    /// Store the token's grant and return it signed with the test key.
    pub fn issue(&self, token: &TestToken) -> AdmissionToken {
        self.tokens.insert(&token.token_id, token.grant());
        token.signed_with(TEST_TOKEN_KEY)
    }

    /// Issue a token for `room_id` and join `participant_id` with it.
    pub async fn join(&self, participant_id: &str, room_id: &str) {
        let token = self.issue(&TestToken::random().room(room_id));
        self.router
            .join(participant_id, &token)
            .await
            .unwrap_or_else(|e| panic!("join of {participant_id} failed: {e}"));
    }
}
