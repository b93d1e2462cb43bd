//! Mock room controller.
//!
//! Records every call with the controller address it was sent to, so tests
//! can assert routing. Any method can be made to fail; `join` can be delayed
//! to interleave concurrent joins.

use portal_service::services::{
    ControllerJoinRequest, ControllerJoinResult, ControllerRpc, RpcError,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// One forwarded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Address the call was sent to.
    pub controller: String,
    pub method: &'static str,
    /// Positional arguments after the controller address.
    pub args: Vec<Value>,
}

/// Mock room controller.
#[derive(Debug)]
pub struct MockControllerRpc {
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<HashMap<&'static str, RpcError>>,
    join_result: Mutex<ControllerJoinResult>,
    join_delay: Mutex<Option<Duration>>,
}

impl Default for MockControllerRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControllerRpc {
    /// Controller accepting every call. Joins grant
    /// `{"publish": true, "subscribe": true}` and an empty room snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            join_result: Mutex::new(ControllerJoinResult {
                permission: json!({ "publish": true, "subscribe": true }),
                room: json!({ "participants": [], "streams": [] }),
            }),
            join_delay: Mutex::new(None),
        }
    }

    /// Make `method` fail with `error` from now on.
    pub fn fail(&self, method: &'static str, error: RpcError) {
        self.failures.lock().unwrap().insert(method, error);
    }

    /// Answer joins with `result`.
    pub fn set_join_result(&self, result: ControllerJoinResult) {
        *self.join_result.lock().unwrap() = result;
    }

    /// Hold every join for `delay` before answering.
    pub fn set_join_delay(&self, delay: Duration) {
        *self.join_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(
        &self,
        controller: &str,
        method: &'static str,
        args: Vec<Value>,
    ) -> Result<Value, RpcError> {
        self.calls.lock().unwrap().push(RecordedCall {
            controller: controller.to_string(),
            method,
            args,
        });

        match self.failures.lock().unwrap().get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(json!({ "method": method, "controller": controller })),
        }
    }
}

#[async_trait::async_trait]
impl ControllerRpc for MockControllerRpc {
    async fn join(
        &self,
        controller: &str,
        room_id: &str,
        participant: &ControllerJoinRequest,
    ) -> Result<ControllerJoinResult, RpcError> {
        let delay = *self.join_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.record(
            controller,
            "join",
            vec![json!(room_id), serde_json::to_value(participant).unwrap()],
        )?;
        Ok(self.join_result.lock().unwrap().clone())
    }

    async fn leave(&self, controller: &str, participant_id: &str) -> Result<Value, RpcError> {
        self.record(controller, "leave", vec![json!(participant_id)])
    }

    async fn publish(
        &self,
        controller: &str,
        participant_id: &str,
        stream_id: &str,
        pub_info: &Value,
    ) -> Result<Value, RpcError> {
        self.record(
            controller,
            "publish",
            vec![json!(participant_id), json!(stream_id), pub_info.clone()],
        )
    }

    async fn unpublish(
        &self,
        controller: &str,
        participant_id: &str,
        stream_id: &str,
    ) -> Result<Value, RpcError> {
        self.record(
            controller,
            "unpublish",
            vec![json!(participant_id), json!(stream_id)],
        )
    }

    async fn stream_control(
        &self,
        controller: &str,
        participant_id: &str,
        stream_id: &str,
        command: &Value,
    ) -> Result<Value, RpcError> {
        self.record(
            controller,
            "stream_control",
            vec![json!(participant_id), json!(stream_id), command.clone()],
        )
    }

    async fn subscribe(
        &self,
        controller: &str,
        participant_id: &str,
        subscription_id: &str,
        sub_desc: &Value,
    ) -> Result<Value, RpcError> {
        self.record(
            controller,
            "subscribe",
            vec![json!(participant_id), json!(subscription_id), sub_desc.clone()],
        )
    }

    async fn unsubscribe(
        &self,
        controller: &str,
        participant_id: &str,
        subscription_id: &str,
    ) -> Result<Value, RpcError> {
        self.record(
            controller,
            "unsubscribe",
            vec![json!(participant_id), json!(subscription_id)],
        )
    }

    async fn subscription_control(
        &self,
        controller: &str,
        participant_id: &str,
        subscription_id: &str,
        command: &Value,
    ) -> Result<Value, RpcError> {
        self.record(
            controller,
            "subscription_control",
            vec![json!(participant_id), json!(subscription_id), command.clone()],
        )
    }

    async fn on_session_signaling(
        &self,
        controller: &str,
        session_id: &str,
        signaling: &Value,
    ) -> Result<Value, RpcError> {
        self.record(
            controller,
            "on_session_signaling",
            vec![json!(session_id), signaling.clone()],
        )
    }

    async fn text(
        &self,
        controller: &str,
        participant_id: &str,
        to: &str,
        message: &Value,
    ) -> Result<Value, RpcError> {
        self.record(
            controller,
            "text",
            vec![json!(participant_id), json!(to), message.clone()],
        )
    }
}
