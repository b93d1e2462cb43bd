//! Admission token store.
//!
//! Tokens are issued elsewhere and stored under `token:{id}` as JSON. The
//! portal only ever consumes them: the read and the delete happen in a single
//! Lua script so two portals presented with the same token cannot both
//! obtain its grant.
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently; each call clones it.

use crate::errors::PortalError;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

/// Lua script for atomic consume.
///
/// Arguments:
/// - KEYS[1]: Token key (`token:{id}`)
///
/// Returns:
/// - The stored payload, after deleting it
/// - nil if the key does not exist
pub const CONSUME_TOKEN: &str = r#"
local payload = redis.call('GET', KEYS[1])
if payload then
    redis.call('DEL', KEYS[1])
end
return payload
"#;

/// What a consumed token grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Opaque code handed back to the client on join.
    pub code: String,
    /// User identity.
    pub user: Value,
    /// Role within the room.
    pub role: String,
    /// Client origin (region/ISP hints), passed to the controller as-is.
    #[serde(default)]
    pub origin: Value,
    /// Room the token admits to.
    pub room: String,
}

/// Single-use token storage.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Atomically fetch and delete the token.
    ///
    /// Returns `Ok(None)` if the token does not exist or was already consumed.
    async fn consume(&self, token_id: &str) -> Result<Option<TokenGrant>, PortalError>;
}

/// Redis-backed token store.
#[derive(Clone)]
pub struct RedisTokenStore {
    connection: MultiplexedConnection,
    consume_script: Script,
}

impl RedisTokenStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::TokenStore` if the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, PortalError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Note: Do NOT log redis_url as it may contain credentials
            error!(target: "portal.services.token_store", error = %e, "Failed to open Redis client");
            PortalError::TokenStore(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "portal.services.token_store", error = %e, "Failed to connect to Redis");
                PortalError::TokenStore(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            consume_script: Script::new(CONSUME_TOKEN),
        })
    }
}

/// Redis key for a token id.
pub fn token_key(token_id: &str) -> String {
    format!("token:{token_id}")
}

/// Parse a stored payload.
pub fn parse_grant(payload: &str) -> Result<TokenGrant, PortalError> {
    serde_json::from_str(payload).map_err(|e| {
        warn!(target: "portal.services.token_store", error = %e, "Malformed token payload");
        PortalError::TokenStore(format!("Malformed token payload: {e}"))
    })
}

#[async_trait::async_trait]
impl TokenStore for RedisTokenStore {
    #[instrument(skip_all)]
    async fn consume(&self, token_id: &str) -> Result<Option<TokenGrant>, PortalError> {
        let mut conn = self.connection.clone();

        let payload: Option<String> = self
            .consume_script
            .key(token_key(token_id))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "portal.services.token_store", error = %e, "Failed to consume token");
                PortalError::TokenStore(format!("Failed to consume token: {e}"))
            })?;

        match payload {
            Some(payload) => {
                debug!(target: "portal.services.token_store", "Token consumed");
                parse_grant(&payload).map(Some)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_key_format() {
        assert_eq!(token_key("abc123"), "token:abc123");
    }

    #[test]
    fn test_parse_grant() {
        let payload = json!({
            "code": "42",
            "user": "alice-user",
            "role": "presenter",
            "origin": {"isp": "isp", "region": "region"},
            "room": "r1"
        })
        .to_string();

        let grant = parse_grant(&payload).unwrap();
        assert_eq!(grant.code, "42");
        assert_eq!(grant.role, "presenter");
        assert_eq!(grant.room, "r1");
        assert_eq!(grant.origin["region"], "region");
    }

    #[test]
    fn test_parse_grant_origin_optional() {
        let payload = r#"{"code":"1","user":"u","role":"viewer","room":"r2"}"#;
        let grant = parse_grant(payload).unwrap();
        assert_eq!(grant.origin, Value::Null);
    }

    #[test]
    fn test_parse_grant_rejects_garbage() {
        assert!(matches!(
            parse_grant("not json"),
            Err(PortalError::TokenStore(_))
        ));
    }

    #[test]
    fn test_consume_script_deletes_only_when_present() {
        assert!(CONSUME_TOKEN.contains("redis.call('GET', KEYS[1])"));
        assert!(CONSUME_TOKEN.contains("redis.call('DEL', KEYS[1])"));
    }
}
