//! Participant lifecycle and operation routing.
//!
//! `SessionRouter` is the portal's operation surface. Every call names a
//! participant; every call except `join` is routed to the controller recorded
//! for that participant when it joined.
//!
//! # Join
//!
//! 1. Reject if the participant already has a session
//! 2. Verify the token signature and consume the token
//! 3. Ask the cluster which controller owns the room
//! 4. Remote join on that controller
//! 5. Record the session, start `conference_duration`
//!
//! The directory entry is written only after step 4 succeeds, so a failed or
//! timed-out remote join leaves no session. A failure after step 2 still burns
//! the token.
//!
//! # Leave
//!
//! Local state is cleaned first: the entry is removed, then the participant's
//! metrics are flushed. The remote leave is best-effort and its failure never
//! reaches the caller.
//!
//! An operation that opens a metric looks the session up afterwards, and join
//! re-checks the directory after opening `conference_duration`. Together with
//! the leave order this keeps every open metric tied to a live session.

use crate::auth::{AdmissionToken, TokenValidator};
use crate::errors::PortalError;
use crate::observability::metrics;
use crate::observability::timing::{details, MetricsAggregator, TimingMetricName};
use crate::services::controller_locator::ControllerLocator;
use crate::services::rpc_client::{ControllerJoinRequest, ControllerRpc, RpcError};
use crate::services::session_directory::SessionDirectory;
use common::secret::SecretString;
use common::types::{OwnerKind, ParticipantSession};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

const NOT_JOINED_METRIC_MSG: &str = "participant has not joined";

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    /// Opaque code carried by the consumed token.
    pub token_code: String,
    pub data: JoinData,
}

/// What the participant learns about itself and the room on join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinData {
    pub user: Value,
    pub role: String,
    /// Assigned by the controller.
    pub permission: Value,
    /// Room snapshot from the controller.
    pub room: Value,
}

pub struct SessionRouter {
    directory: Arc<SessionDirectory>,
    validator: TokenValidator,
    locator: ControllerLocator,
    controllers: Arc<dyn ControllerRpc>,
    aggregator: Arc<MetricsAggregator>,
    /// This portal's RPC identity, sent to controllers on join.
    rpc_id: String,
}

impl SessionRouter {
    pub fn new(
        directory: Arc<SessionDirectory>,
        validator: TokenValidator,
        locator: ControllerLocator,
        controllers: Arc<dyn ControllerRpc>,
        aggregator: Arc<MetricsAggregator>,
        rpc_id: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            validator,
            locator,
            controllers,
            aggregator,
            rpc_id: rpc_id.into(),
        }
    }

    pub fn rpc_id(&self) -> &str {
        &self.rpc_id
    }

    /// Admit a participant with a single-use token.
    ///
    /// # Errors
    ///
    /// - `AlreadyJoined` - the participant has a session (checked before the
    ///   token is touched, and again when the session is recorded)
    /// - `InvalidSignature`, `InvalidOrUsedToken` - token rejected
    /// - `NoControllerAvailable` - the cluster could not place the room
    /// - `RemoteOperationFailed` - the controller refused the join
    #[instrument(skip_all, fields(participant_id = %participant_id))]
    pub async fn join(
        &self,
        participant_id: &str,
        token: &AdmissionToken,
    ) -> Result<JoinResponse, PortalError> {
        let start = Instant::now();
        let result = self.try_join(participant_id, token).await;
        observe("join", start, &result);
        result
    }

    async fn try_join(
        &self,
        participant_id: &str,
        token: &AdmissionToken,
    ) -> Result<JoinResponse, PortalError> {
        debug!(
            target: "portal.services.session_router",
            participant_id = %participant_id,
            token_id = %token.token_id,
            "Participant join"
        );

        if self.directory.contains(participant_id).await {
            return Err(PortalError::AlreadyJoined(participant_id.to_string()));
        }

        let grant = self.validator.validate_and_consume(token).await?;
        let room_id = grant.room.clone();

        let controller = self.locator.locate(&room_id).await?;

        let request = ControllerJoinRequest {
            id: participant_id.to_string(),
            user: grant.user.clone(),
            role: grant.role.clone(),
            portal: self.rpc_id.clone(),
            origin: grant.origin.clone(),
        };
        let joined = self
            .controllers
            .join(&controller, &room_id, &request)
            .await
            .map_err(|e| {
                warn!(
                    target: "portal.services.session_router",
                    participant_id = %participant_id,
                    room_id = %room_id,
                    controller = %controller,
                    error = %e,
                    "Controller rejected join, token already consumed"
                );
                remote_failure(e)
            })?;

        let session = ParticipantSession::new(participant_id, room_id.as_str(), controller.as_str());
        if let Err(e) = self.directory.insert(session).await {
            // A concurrent join for the same participant won. Its session shares
            // this participant id on the controller, so no remote leave here.
            warn!(
                target: "portal.services.session_router",
                participant_id = %participant_id,
                controller = %controller,
                "Concurrent join lost after remote join succeeded"
            );
            return Err(e);
        }

        self.aggregator.emit_counter(
            "join",
            json!({ "room_id": room_id, "participant_id": participant_id }),
        );
        self.aggregator
            .start(
                participant_id,
                TimingMetricName::ConferenceDuration,
                participant_id,
                details([
                    ("participant_id", participant_id),
                    ("err_msg", ""),
                    ("room_id", room_id.as_str()),
                ]),
            )
            .await;
        if !self.directory.contains(participant_id).await {
            // A leave between insert and start flushed nothing; close it here.
            self.aggregator
                .finish(
                    participant_id,
                    TimingMetricName::ConferenceDuration,
                    participant_id,
                )
                .await;
            debug!(
                target: "portal.services.session_router",
                participant_id = %participant_id,
                "Participant left while joining"
            );
        }
        metrics::set_participants_active(self.directory.len().await);

        info!(
            target: "portal.services.session_router",
            participant_id = %participant_id,
            room_id = %room_id,
            controller = %controller,
            "Participant joined"
        );

        Ok(JoinResponse {
            token_code: grant.code,
            data: JoinData {
                user: grant.user,
                role: grant.role,
                permission: joined.permission,
                room: joined.room,
            },
        })
    }

    /// Remove a participant.
    ///
    /// Open metrics of the participant are flushed whether or not it is joined.
    ///
    /// # Errors
    ///
    /// Returns `NotJoined` if there is no session. Controller failures are
    /// logged and counted only.
    #[instrument(skip_all, fields(participant_id = %participant_id))]
    pub async fn leave(&self, participant_id: &str) -> Result<(), PortalError> {
        let start = Instant::now();
        let result = self.try_leave(participant_id).await;
        observe("leave", start, &result);
        result
    }

    async fn try_leave(&self, participant_id: &str) -> Result<(), PortalError> {
        // Remove before flushing: an operation whose lookup still saw the
        // session has already opened its metric, later ones close their own.
        let removed = self.directory.remove(participant_id).await;
        let flushed = self.aggregator.finish_all(participant_id).await;
        debug!(
            target: "portal.services.session_router",
            participant_id = %participant_id,
            flushed,
            "Participant leave"
        );

        let Some(session) = removed else {
            return Err(PortalError::NotJoined(participant_id.to_string()));
        };
        metrics::set_participants_active(self.directory.len().await);

        if let Err(e) = self
            .controllers
            .leave(&session.controller, participant_id)
            .await
        {
            info!(
                target: "portal.services.session_router",
                participant_id = %participant_id,
                controller = %session.controller,
                error = %e,
                "Failed in leaving"
            );
            metrics::record_controller_notify_failure();
        }

        info!(
            target: "portal.services.session_router",
            participant_id = %participant_id,
            room_id = %session.room_id,
            "Participant left"
        );
        Ok(())
    }

    /// Publish a stream and start its `publish_duration` metric.
    ///
    /// # Errors
    ///
    /// `NotJoined` (the metric is opened and closed with an error note), or
    /// `RemoteOperationFailed`.
    #[instrument(skip_all, fields(participant_id = %participant_id, stream_id = %stream_id))]
    pub async fn publish(
        &self,
        participant_id: &str,
        stream_id: &str,
        pub_info: &Value,
    ) -> Result<Value, PortalError> {
        let start = Instant::now();
        let result = self.try_publish(participant_id, stream_id, pub_info).await;
        observe("publish", start, &result);
        result
    }

    async fn try_publish(
        &self,
        participant_id: &str,
        stream_id: &str,
        pub_info: &Value,
    ) -> Result<Value, PortalError> {
        let name = TimingMetricName::PublishDuration;
        self.aggregator
            .start(
                participant_id,
                name,
                stream_id,
                details([("participant_id", participant_id), ("stream_id", stream_id)]),
            )
            .await;

        let session = self.session_or_abort(participant_id, name, stream_id).await?;

        self.annotate_joined(participant_id, name, stream_id, &session.room_id)
            .await;
        self.aggregator.emit_counter(
            "publish",
            json!({
                "room_id": session.room_id,
                "participant_id": participant_id,
                "stream_id": stream_id,
            }),
        );

        self.controllers
            .publish(&session.controller, participant_id, stream_id, pub_info)
            .await
            .map_err(remote_failure)
    }

    /// Unpublish a stream. The stream's metric is finished first, joined or not.
    ///
    /// # Errors
    ///
    /// `NotJoined` or `RemoteOperationFailed`.
    #[instrument(skip_all, fields(participant_id = %participant_id, stream_id = %stream_id))]
    pub async fn unpublish(
        &self,
        participant_id: &str,
        stream_id: &str,
    ) -> Result<Value, PortalError> {
        let start = Instant::now();
        let result = async {
            self.aggregator
                .finish(participant_id, TimingMetricName::PublishDuration, stream_id)
                .await;
            let session = self.session(participant_id).await?;
            self.controllers
                .unpublish(&session.controller, participant_id, stream_id)
                .await
                .map_err(remote_failure)
        }
        .await;
        observe("unpublish", start, &result);
        result
    }

    /// # Errors
    ///
    /// `NotJoined` or `RemoteOperationFailed`.
    #[instrument(skip_all, fields(participant_id = %participant_id, stream_id = %stream_id))]
    pub async fn stream_control(
        &self,
        participant_id: &str,
        stream_id: &str,
        command: &Value,
    ) -> Result<Value, PortalError> {
        let start = Instant::now();
        let result = async {
            let session = self.session(participant_id).await?;
            self.controllers
                .stream_control(&session.controller, participant_id, stream_id, command)
                .await
                .map_err(remote_failure)
        }
        .await;
        observe("stream_control", start, &result);
        result
    }

    /// Subscribe to upstream media and start its `subscribe_duration` metric.
    ///
    /// The metric records the audio/video source stream ids of the
    /// descriptor (`media.audio.from`, `media.video.from`), empty when absent.
    ///
    /// # Errors
    ///
    /// `NotJoined` or `RemoteOperationFailed`.
    #[instrument(skip_all, fields(participant_id = %participant_id, subscription_id = %subscription_id))]
    pub async fn subscribe(
        &self,
        participant_id: &str,
        subscription_id: &str,
        sub_desc: &Value,
    ) -> Result<Value, PortalError> {
        let start = Instant::now();
        let result = self
            .try_subscribe(participant_id, subscription_id, sub_desc)
            .await;
        observe("subscribe", start, &result);
        result
    }

    async fn try_subscribe(
        &self,
        participant_id: &str,
        subscription_id: &str,
        sub_desc: &Value,
    ) -> Result<Value, PortalError> {
        let name = TimingMetricName::SubscribeDuration;
        self.aggregator
            .start(
                participant_id,
                name,
                subscription_id,
                details([
                    ("participant_id", participant_id),
                    ("subscription_id", subscription_id),
                    ("audio_stream_id", source_stream_id(sub_desc, "audio")),
                    ("video_stream_id", source_stream_id(sub_desc, "video")),
                ]),
            )
            .await;

        let session = self
            .session_or_abort(participant_id, name, subscription_id)
            .await?;

        self.annotate_joined(participant_id, name, subscription_id, &session.room_id)
            .await;
        self.aggregator.emit_counter(
            "subscribe",
            json!({
                "room_id": session.room_id,
                "participant_id": participant_id,
                "subscription_id": subscription_id,
            }),
        );

        self.controllers
            .subscribe(&session.controller, participant_id, subscription_id, sub_desc)
            .await
            .map_err(remote_failure)
    }

    /// Unsubscribe. The subscription's metric is finished first, joined or not.
    ///
    /// # Errors
    ///
    /// `NotJoined` or `RemoteOperationFailed`.
    #[instrument(skip_all, fields(participant_id = %participant_id, subscription_id = %subscription_id))]
    pub async fn unsubscribe(
        &self,
        participant_id: &str,
        subscription_id: &str,
    ) -> Result<Value, PortalError> {
        let start = Instant::now();
        let result = async {
            self.aggregator
                .finish(
                    participant_id,
                    TimingMetricName::SubscribeDuration,
                    subscription_id,
                )
                .await;
            let session = self.session(participant_id).await?;
            self.controllers
                .unsubscribe(&session.controller, participant_id, subscription_id)
                .await
                .map_err(remote_failure)
        }
        .await;
        observe("unsubscribe", start, &result);
        result
    }

    /// # Errors
    ///
    /// `NotJoined` or `RemoteOperationFailed`.
    #[instrument(skip_all, fields(participant_id = %participant_id, subscription_id = %subscription_id))]
    pub async fn subscription_control(
        &self,
        participant_id: &str,
        subscription_id: &str,
        command: &Value,
    ) -> Result<Value, PortalError> {
        let start = Instant::now();
        let result = async {
            let session = self.session(participant_id).await?;
            self.controllers
                .subscription_control(&session.controller, participant_id, subscription_id, command)
                .await
                .map_err(remote_failure)
        }
        .await;
        observe("subscription_control", start, &result);
        result
    }

    /// Relay opaque session signaling to the participant's controller.
    ///
    /// # Errors
    ///
    /// `NotJoined` or `RemoteOperationFailed`.
    #[instrument(skip_all, fields(participant_id = %participant_id, session_id = %session_id))]
    pub async fn on_session_signaling(
        &self,
        participant_id: &str,
        session_id: &str,
        signaling: &Value,
    ) -> Result<Value, PortalError> {
        let start = Instant::now();
        let result = async {
            let session = self.session(participant_id).await?;
            self.controllers
                .on_session_signaling(&session.controller, session_id, signaling)
                .await
                .map_err(remote_failure)
        }
        .await;
        observe("on_session_signaling", start, &result);
        result
    }

    /// # Errors
    ///
    /// `NotJoined` or `RemoteOperationFailed`.
    #[instrument(skip_all, fields(participant_id = %participant_id, to = %to))]
    pub async fn text(
        &self,
        participant_id: &str,
        to: &str,
        message: &Value,
    ) -> Result<Value, PortalError> {
        let start = Instant::now();
        let result = async {
            let session = self.session(participant_id).await?;
            self.controllers
                .text(&session.controller, participant_id, to, message)
                .await
                .map_err(remote_failure)
        }
        .await;
        observe("text", start, &result);
        result
    }

    /// Participants admitted here whose controller matches `id`.
    pub async fn participants_by_owner(&self, kind: OwnerKind, id: &str) -> Vec<String> {
        self.directory.participants_by_owner(kind, id).await
    }

    /// Rotate the token signing key.
    pub async fn update_token_key(&self, key: SecretString) {
        self.validator.update_key(key).await;
    }

    async fn session(&self, participant_id: &str) -> Result<ParticipantSession, PortalError> {
        self.directory
            .lookup(participant_id)
            .await
            .ok_or_else(|| PortalError::NotJoined(participant_id.to_string()))
    }

    /// Look up the session; when missing, close the just-opened metric with an
    /// error note.
    async fn session_or_abort(
        &self,
        participant_id: &str,
        name: TimingMetricName,
        key: &str,
    ) -> Result<ParticipantSession, PortalError> {
        match self.directory.lookup(participant_id).await {
            Some(session) => Ok(session),
            None => {
                self.aggregator
                    .annotate(participant_id, name, key, "err_msg", NOT_JOINED_METRIC_MSG)
                    .await;
                self.aggregator.finish(participant_id, name, key).await;
                Err(PortalError::NotJoined(participant_id.to_string()))
            }
        }
    }

    async fn annotate_joined(
        &self,
        participant_id: &str,
        name: TimingMetricName,
        key: &str,
        room_id: &str,
    ) {
        self.aggregator
            .annotate(participant_id, name, key, "err_msg", "")
            .await;
        self.aggregator
            .annotate(participant_id, name, key, "room_id", room_id)
            .await;
    }
}

fn remote_failure(e: RpcError) -> PortalError {
    PortalError::RemoteOperationFailed(e.to_string())
}

fn observe<T>(operation: &'static str, start: Instant, result: &Result<T, PortalError>) {
    let status = match result {
        Ok(_) => "success",
        Err(e) => e.status_label(),
    };
    metrics::record_operation(operation, status, start.elapsed());
}

/// `media.<kind>.from` of a subscription descriptor, or `""`.
fn source_stream_id<'a>(sub_desc: &'a Value, kind: &str) -> &'a str {
    sub_desc
        .get("media")
        .and_then(|media| media.get(kind))
        .and_then(|track| track.get("from"))
        .and_then(Value::as_str)
        .unwrap_or("")
}
