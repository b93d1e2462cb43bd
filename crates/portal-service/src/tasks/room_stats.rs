//! Room statistics background task.
//!
//! Every [`ROOM_STATS_INTERVAL`] the task groups the admitted participants by
//! room and counts their open timing metrics by name, then emits:
//!
//! - one `rooms_stat` event per room: `{"room": "r1", "count": {"publish_duration": 3}}`
//! - one `total_rooms_stat` event: `{"rooms_count": 2, "publish_count": 3, "subscribe_count": 0}`
//!
//! The scan works on snapshots of the directory and the aggregator. It never
//! mutates either and holds each lock only long enough to copy.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is triggered.

use crate::observability::metrics;
use crate::observability::timing::{MetricsAggregator, TimingMetricName};
use crate::services::session_directory::SessionDirectory;
use common::types::ParticipantSession;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Period between two rollups.
pub const ROOM_STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Global part of a rollup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TotalRoomStats {
    pub rooms_count: usize,
    pub publish_count: usize,
    pub subscribe_count: usize,
}

/// One rollup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomStats {
    /// Open metric counts by name, per room. Rooms whose participants have no
    /// open metric are present with an empty map.
    pub rooms: BTreeMap<String, BTreeMap<String, usize>>,
    pub totals: TotalRoomStats,
}

/// Compute a rollup from a directory snapshot and the open metrics per scope.
pub fn compute_room_stats(
    sessions: &[ParticipantSession],
    in_flight: &HashMap<String, Vec<TimingMetricName>>,
) -> RoomStats {
    let mut stats = RoomStats::default();

    for session in sessions {
        let room = stats.rooms.entry(session.room_id.clone()).or_default();

        let Some(names) = in_flight.get(&session.participant_id) else {
            continue;
        };
        for name in names {
            *room.entry(name.as_str().to_string()).or_default() += 1;
            match name {
                TimingMetricName::PublishDuration => stats.totals.publish_count += 1,
                TimingMetricName::SubscribeDuration => stats.totals.subscribe_count += 1,
                TimingMetricName::ConferenceDuration => {}
            }
        }
    }

    stats.totals.rooms_count = stats.rooms.len();
    stats
}

/// Take one rollup and write it to the aggregator's sink.
pub async fn emit_room_stats(
    directory: &SessionDirectory,
    aggregator: &MetricsAggregator,
) -> RoomStats {
    let sessions = directory.snapshot().await;
    let in_flight = aggregator.in_flight().await;
    let stats = compute_room_stats(&sessions, &in_flight);

    for (room, count) in &stats.rooms {
        aggregator.emit_counter("rooms_stat", json!({ "room": room, "count": count }));
    }
    aggregator.emit_counter(
        "total_rooms_stat",
        json!({
            "rooms_count": stats.totals.rooms_count,
            "publish_count": stats.totals.publish_count,
            "subscribe_count": stats.totals.subscribe_count,
        }),
    );

    metrics::set_participants_active(sessions.len());
    metrics::set_rooms_active(stats.totals.rooms_count);

    stats
}

/// Start the room statistics task.
///
/// The first rollup is emitted one `period` after start. Returns when the
/// cancellation token is triggered.
#[instrument(skip_all, name = "portal.task.room_stats")]
pub async fn start_room_stats_task(
    directory: Arc<SessionDirectory>,
    aggregator: Arc<MetricsAggregator>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "portal.task.room_stats",
        interval_seconds = period.as_secs(),
        "Starting room stats task"
    );

    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let stats = emit_room_stats(&directory, &aggregator).await;
                debug!(
                    target: "portal.task.room_stats",
                    rooms = stats.totals.rooms_count,
                    publish = stats.totals.publish_count,
                    subscribe = stats.totals.subscribe_count,
                    "Room stats emitted"
                );
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "portal.task.room_stats",
                    "Room stats task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "portal.task.room_stats", "Room stats task stopped");
}
