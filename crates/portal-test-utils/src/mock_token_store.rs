//! In-memory token store.
//!
//! Same contract as the Redis store: `consume` returns the grant once and
//! removes it.

use portal_service::errors::PortalError;
use portal_service::services::{TokenGrant, TokenStore};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MockTokenStore {
    tokens: Mutex<HashMap<String, TokenGrant>>,
    consumed: Mutex<Vec<String>>,
    attempts: Mutex<usize>,
    failure: Mutex<Option<String>>,
}

impl MockTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token_id: &str, grant: TokenGrant) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token_id.to_string(), grant);
    }

    /// Make every consume fail as a backend error.
    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn contains(&self, token_id: &str) -> bool {
        self.tokens.lock().unwrap().contains_key(token_id)
    }

    /// Ids successfully consumed so far, in order.
    pub fn consumed(&self) -> Vec<String> {
        self.consumed.lock().unwrap().clone()
    }

    /// Number of `consume` calls that reached the store, hits or misses.
    pub fn consume_attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl TokenStore for MockTokenStore {
    async fn consume(&self, token_id: &str) -> Result<Option<TokenGrant>, PortalError> {
        *self.attempts.lock().unwrap() += 1;

        if let Some(reason) = self.failure.lock().unwrap().clone() {
            return Err(PortalError::TokenStore(reason));
        }

        let grant = self.tokens.lock().unwrap().remove(token_id);
        if grant.is_some() {
            self.consumed.lock().unwrap().push(token_id.to_string());
        }
        Ok(grant)
    }
}
