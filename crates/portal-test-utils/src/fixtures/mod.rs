//! Admission token fixtures.
//!
//! A [`TestToken`] describes both halves of a token: the grant stored in the
//! token store and the signed part a client presents on join.

use portal_service::auth::{compute_signature, AdmissionToken};
use portal_service::services::TokenGrant;
use serde_json::{json, Value};
use uuid::Uuid;

/// Signing key used by [`crate::TestPortal`].
pub const TEST_TOKEN_KEY: &str = "portal-test-signing-key";

/// Host tokens are issued for unless overridden.
pub const TEST_HOST: &str = "portal.test.local:8080";

#[derive(Debug, Clone)]
pub struct TestToken {
    pub token_id: String,
    pub host: String,
    pub code: String,
    pub user: Value,
    pub role: String,
    pub origin: Value,
    pub room: String,
}

impl TestToken {
    /// Presenter token for room `r1`.
    #[must_use]
    pub fn new(token_id: impl Into<String>) -> Self {
        let token_id = token_id.into();
        Self {
            code: format!("code-{token_id}"),
            token_id,
            host: TEST_HOST.to_string(),
            user: json!({ "id": "user-1", "name": "Test User" }),
            role: "presenter".to_string(),
            origin: json!({ "isp": "isp", "region": "region" }),
            room: "r1".to_string(),
        }
    }

    /// Token with a random id.
    #[must_use]
    pub fn random() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    #[must_use]
    pub fn user(mut self, user: Value) -> Self {
        self.user = user;
        self
    }

    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// What the token store hands out for this token.
    #[must_use]
    pub fn grant(&self) -> TokenGrant {
        TokenGrant {
            code: self.code.clone(),
            user: self.user.clone(),
            role: self.role.clone(),
            origin: self.origin.clone(),
            room: self.room.clone(),
        }
    }

    /// The token as presented by a client, signed with `key`.
    #[must_use]
    pub fn signed_with(&self, key: &str) -> AdmissionToken {
        AdmissionToken {
            token_id: self.token_id.clone(),
            host: self.host.clone(),
            signature: compute_signature(key, &self.token_id, &self.host),
        }
    }
}
