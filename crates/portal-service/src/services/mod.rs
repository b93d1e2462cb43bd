//! Service layer for the portal.
//!
//! # Components
//!
//! - `session_router` - Participant lifecycle and operation routing
//! - `session_directory` - Participant → (room, controller) table
//! - `controller_locator` - Room → controller resolution
//! - `rpc_client` - Cluster/controller RPC traits and HTTP client
//! - `token_store` - Single-use admission token storage (Redis)

pub mod controller_locator;
pub mod rpc_client;
pub mod session_directory;
pub mod session_router;
pub mod token_store;

pub use controller_locator::ControllerLocator;
pub use rpc_client::{
    ClusterRpc, ControllerJoinRequest, ControllerJoinResult, ControllerRpc, HttpRpcClient,
    RpcError,
};
pub use session_directory::SessionDirectory;
pub use session_router::{JoinData, JoinResponse, SessionRouter};
pub use token_store::{RedisTokenStore, TokenGrant, TokenStore};
