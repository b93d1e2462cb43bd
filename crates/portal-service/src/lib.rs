//! Portal Service Library
//!
//! Signaling gateway in front of the room controllers of an RTC cluster. The
//! portal is responsible for:
//!
//! - Validating and consuming single-use admission tokens
//! - Resolving which controller owns a room (at join time only)
//! - Keeping the participant → (room, controller) directory
//! - Forwarding each participant action to the owning controller
//! - Timing participant activity and emitting periodic room rollups
//!
//! # Architecture
//!
//! ```text
//! caller ──► SessionRouter ──► SessionDirectory
//!               │   join only: TokenValidator ──► TokenStore (Redis)
//!               │              ControllerLocator ──► ClusterRpc
//!               ├──► ControllerRpc (HTTP RPC gateway)
//!               └──► MetricsAggregator ──► MetricSink
//!
//! room_stats task ──reads──► SessionDirectory + MetricsAggregator
//! ```
//!
//! Each portal instance only knows the participants it admitted itself;
//! there is no cross-instance state.
//!
//! # Modules
//!
//! - [`auth`] - Admission token signature check and consumption
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with façade error codes
//! - [`observability`] - Prometheus metrics, timing events, health endpoints
//! - [`services`] - Router, directory, locator and collaborator adapters
//! - [`tasks`] - Background tasks

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod observability;
pub mod services;
pub mod tasks;
