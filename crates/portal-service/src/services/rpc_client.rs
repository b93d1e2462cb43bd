//! RPC collaborator interfaces and the HTTP RPC client.
//!
//! The portal reaches two kinds of remote parties:
//!
//! - the cluster coordinator, asked which controller owns a room
//!   ([`ClusterRpc`])
//! - room controllers, which receive every participant action
//!   ([`ControllerRpc`])
//!
//! Both are traits so the router can be driven by mocks in tests. The
//! production implementation, [`HttpRpcClient`], speaks to an RPC gateway:
//!
//! ```text
//! POST {rpc_url}/rpc/{target}/{method}
//! {"args": [ ... ]}
//! ```
//!
//! A 2xx response carries the JSON result; any other status carries the
//! remote party's reason as the response body.

use crate::errors::PortalError;
use crate::observability::metrics;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// RPC failure as seen by the portal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    /// The remote party handled the call and rejected it. Reason is verbatim.
    #[error("{0}")]
    Remote(String),

    /// The call could not be delivered or the reply could not be read.
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// No reply within the configured timeout.
    #[error("RPC timed out")]
    Timeout,

    /// The reply did not have the expected shape.
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// Short label for metrics.
    pub fn status_label(&self) -> &'static str {
        match self {
            RpcError::Remote(_) => "remote_error",
            RpcError::Transport(_) => "transport_error",
            RpcError::Timeout => "timeout",
            RpcError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Participant description sent to a controller on join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerJoinRequest {
    /// Participant identifier.
    pub id: String,
    /// User identity from the admission token.
    pub user: Value,
    /// Role from the admission token.
    pub role: String,
    /// RPC identity of the admitting portal.
    pub portal: String,
    /// Client origin from the admission token.
    pub origin: Value,
}

/// Controller's answer to a successful join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerJoinResult {
    /// Permission set assigned to the participant.
    #[serde(default)]
    pub permission: Value,
    /// Snapshot of the room at join time.
    #[serde(default)]
    pub room: Value,
}

/// Cluster coordinator operations.
#[async_trait::async_trait]
pub trait ClusterRpc: Send + Sync {
    /// Ask `cluster` which controller currently owns `room_id`.
    async fn get_controller(&self, cluster: &str, room_id: &str) -> Result<String, RpcError>;
}

/// Room controller operations. Every call is addressed to `controller`.
#[async_trait::async_trait]
pub trait ControllerRpc: Send + Sync {
    async fn join(
        &self,
        controller: &str,
        room_id: &str,
        participant: &ControllerJoinRequest,
    ) -> Result<ControllerJoinResult, RpcError>;

    async fn leave(&self, controller: &str, participant_id: &str) -> Result<Value, RpcError>;

    async fn publish(
        &self,
        controller: &str,
        participant_id: &str,
        stream_id: &str,
        pub_info: &Value,
    ) -> Result<Value, RpcError>;

    async fn unpublish(
        &self,
        controller: &str,
        participant_id: &str,
        stream_id: &str,
    ) -> Result<Value, RpcError>;

    async fn stream_control(
        &self,
        controller: &str,
        participant_id: &str,
        stream_id: &str,
        command: &Value,
    ) -> Result<Value, RpcError>;

    async fn subscribe(
        &self,
        controller: &str,
        participant_id: &str,
        subscription_id: &str,
        sub_desc: &Value,
    ) -> Result<Value, RpcError>;

    async fn unsubscribe(
        &self,
        controller: &str,
        participant_id: &str,
        subscription_id: &str,
    ) -> Result<Value, RpcError>;

    async fn subscription_control(
        &self,
        controller: &str,
        participant_id: &str,
        subscription_id: &str,
        command: &Value,
    ) -> Result<Value, RpcError>;

    async fn on_session_signaling(
        &self,
        controller: &str,
        session_id: &str,
        signaling: &Value,
    ) -> Result<Value, RpcError>;

    async fn text(
        &self,
        controller: &str,
        participant_id: &str,
        to: &str,
        message: &Value,
    ) -> Result<Value, RpcError>;
}

/// HTTP client for the RPC gateway.
///
/// `reqwest::Client` pools connections internally and is cheap to clone.
#[derive(Clone)]
pub struct HttpRpcClient {
    client: Client,
    base_url: Url,
}

impl HttpRpcClient {
    /// Create a client for the gateway at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Config` if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PortalError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            error!(target: "portal.services.rpc_client", error = %e, "Invalid RPC gateway URL");
            PortalError::Config(format!("Invalid RPC gateway URL: {e}"))
        })?;

        if base_url.cannot_be_a_base() {
            return Err(PortalError::Config(
                "RPC gateway URL cannot be used as a base".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            error!(target: "portal.services.rpc_client", error = %e, "Failed to build HTTP client");
            PortalError::Config(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self { client, base_url })
    }

    fn method_url(&self, target: &str, method: &str) -> Result<Url, RpcError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RpcError::Transport("RPC gateway URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["rpc", target, method]);
        Ok(url)
    }

    /// Invoke `method` on `target` with positional JSON arguments.
    #[instrument(skip(self, args), fields(target = %target, method = %method))]
    async fn call(&self, target: &str, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        let url = self.method_url(target, method)?;
        let start = Instant::now();

        let result = self.send(url, &json!({ "args": args })).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.status_label(),
        };
        metrics::record_rpc_call(method, status, start.elapsed());

        result
    }

    async fn send(&self, url: Url, body: &Value) -> Result<Value, RpcError> {
        let response = self.client.post(url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                warn!(target: "portal.services.rpc_client", "RPC call timed out");
                RpcError::Timeout
            } else {
                warn!(target: "portal.services.rpc_client", error = %e, "RPC call failed");
                RpcError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout
            } else {
                RpcError::Transport(format!("Failed to read RPC response: {e}"))
            }
        })?;

        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes).trim().to_string();
            debug!(
                target: "portal.services.rpc_client",
                status = %status,
                "Remote party rejected call"
            );
            return Err(RpcError::Remote(if reason.is_empty() {
                status.to_string()
            } else {
                reason
            }));
        }

        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| RpcError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl ClusterRpc for HttpRpcClient {
    async fn get_controller(&self, cluster: &str, room_id: &str) -> Result<String, RpcError> {
        match self.call(cluster, "get_controller", vec![json!(room_id)]).await? {
            Value::String(controller) if !controller.is_empty() => Ok(controller),
            other => Err(RpcError::InvalidResponse(format!(
                "expected controller address, got {other}"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl ControllerRpc for HttpRpcClient {
    async fn join(
        &self,
        controller: &str,
        room_id: &str,
        participant: &ControllerJoinRequest,
    ) -> Result<ControllerJoinResult, RpcError> {
        let participant = serde_json::to_value(participant)
            .map_err(|e| RpcError::InvalidResponse(format!("unserializable join request: {e}")))?;
        let reply = self
            .call(controller, "join", vec![json!(room_id), participant])
            .await?;
        serde_json::from_value(reply).map_err(|e| RpcError::InvalidResponse(e.to_string()))
    }

    async fn leave(&self, controller: &str, participant_id: &str) -> Result<Value, RpcError> {
        self.call(controller, "leave", vec![json!(participant_id)])
            .await
    }

    async fn publish(
        &self,
        controller: &str,
        participant_id: &str,
        stream_id: &str,
        pub_info: &Value,
    ) -> Result<Value, RpcError> {
        self.call(
            controller,
            "publish",
            vec![json!(participant_id), json!(stream_id), pub_info.clone()],
        )
        .await
    }

    async fn unpublish(
        &self,
        controller: &str,
        participant_id: &str,
        stream_id: &str,
    ) -> Result<Value, RpcError> {
        self.call(
            controller,
            "unpublish",
            vec![json!(participant_id), json!(stream_id)],
        )
        .await
    }

    async fn stream_control(
        &self,
        controller: &str,
        participant_id: &str,
        stream_id: &str,
        command: &Value,
    ) -> Result<Value, RpcError> {
        self.call(
            controller,
            "stream_control",
            vec![json!(participant_id), json!(stream_id), command.clone()],
        )
        .await
    }

    async fn subscribe(
        &self,
        controller: &str,
        participant_id: &str,
        subscription_id: &str,
        sub_desc: &Value,
    ) -> Result<Value, RpcError> {
        self.call(
            controller,
            "subscribe",
            vec![json!(participant_id), json!(subscription_id), sub_desc.clone()],
        )
        .await
    }

    async fn unsubscribe(
        &self,
        controller: &str,
        participant_id: &str,
        subscription_id: &str,
    ) -> Result<Value, RpcError> {
        self.call(
            controller,
            "unsubscribe",
            vec![json!(participant_id), json!(subscription_id)],
        )
        .await
    }

    async fn subscription_control(
        &self,
        controller: &str,
        participant_id: &str,
        subscription_id: &str,
        command: &Value,
    ) -> Result<Value, RpcError> {
        self.call(
            controller,
            "subscription_control",
            vec![json!(participant_id), json!(subscription_id), command.clone()],
        )
        .await
    }

    async fn on_session_signaling(
        &self,
        controller: &str,
        session_id: &str,
        signaling: &Value,
    ) -> Result<Value, RpcError> {
        self.call(
            controller,
            "on_session_signaling",
            vec![json!(session_id), signaling.clone()],
        )
        .await
    }

    async fn text(
        &self,
        controller: &str,
        participant_id: &str,
        to: &str,
        message: &Value,
    ) -> Result<Value, RpcError> {
        self.call(
            controller,
            "text",
            vec![json!(participant_id), json!(to), message.clone()],
        )
        .await
    }
}
