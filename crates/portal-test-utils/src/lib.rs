//! # Portal Test Utilities
//!
//! Mock collaborators and fixtures for testing the portal without Redis or an
//! RPC gateway.
//!
//! ## Modules
//!
//! - `mock_cluster` - Cluster coordinator answering room → controller lookups
//! - `mock_controller` - Room controller recording every forwarded call
//! - `mock_token_store` - In-memory single-use token store
//! - `recording_sink` - Metric sink keeping every emitted event
//! - `fixtures` - Signed admission tokens
//! - `harness` - A `SessionRouter` wired to all of the above
//!
//! ## Usage
//!
//! ```rust,ignore
//! use portal_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let portal = TestPortal::new().with_room("r1", "conference-a");
//!     let token = portal.issue(&TestToken::new("tok1").room("r1"));
//!
//!     portal.router.join("alice", &token).await.unwrap();
//!     assert_eq!(portal.controllers.calls_to("join").len(), 1);
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod mock_cluster;
pub mod mock_controller;
pub mod mock_token_store;
pub mod recording_sink;

// Re-export commonly used items
pub use fixtures::*;
pub use harness::*;
pub use mock_cluster::*;
pub use mock_controller::*;
pub use mock_token_store::*;
pub use recording_sink::*;
