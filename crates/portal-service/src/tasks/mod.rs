//! Background tasks for the portal.
//!
//! - `room_stats` - Periodic per-room and global rollup of open timing metrics

pub mod room_stats;

pub use room_stats::{start_room_stats_task, ROOM_STATS_INTERVAL};
