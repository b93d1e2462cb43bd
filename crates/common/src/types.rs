//! Session and routing data types.
//!
//! Participant, room and controller identifiers are opaque strings handed to
//! the portal by clients and the cluster; they are never parsed here.

use serde::{Deserialize, Serialize};

/// Participant identifier (unique key of the session directory).
pub type ParticipantId = String;

/// Conference room identifier.
pub type RoomId = String;

/// Cluster-relative address of a room controller (an RPC identity).
pub type ControllerAddress = String;

/// A participant admitted by this portal instance.
///
/// Created when a join completes and removed on leave. The controller address
/// is captured once at join time and used for every later RPC of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSession {
    /// Participant identifier.
    pub participant_id: ParticipantId,
    /// Room the participant joined.
    pub room_id: RoomId,
    /// Controller that owned the room at join time.
    pub controller: ControllerAddress,
}

impl ParticipantSession {
    #[must_use]
    pub fn new(
        participant_id: impl Into<ParticipantId>,
        room_id: impl Into<RoomId>,
        controller: impl Into<ControllerAddress>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            room_id: room_id.into(),
            controller: controller.into(),
        }
    }
}

/// Scope of an administrative "who is on this controller" query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    /// Exact controller address.
    Node,
    /// Address prefix (every node hosted by one worker process).
    Worker,
}

impl OwnerKind {
    /// Returns true if `controller` belongs to the owner identified by `id`.
    #[must_use]
    pub fn matches(self, controller: &str, id: &str) -> bool {
        match self {
            OwnerKind::Node => controller == id,
            OwnerKind::Worker => controller.starts_with(id),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OwnerKind::Node => "node",
            OwnerKind::Worker => "worker",
        }
    }
}

impl std::str::FromStr for OwnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(OwnerKind::Node),
            "worker" => Ok(OwnerKind::Worker),
            other => Err(format!("unknown owner kind: {other}")),
        }
    }
}
