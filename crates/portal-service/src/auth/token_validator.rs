//! Admission token validation.
//!
//! A presented token is accepted in two steps:
//!
//! 1. **Signature**: `base64(hex(HMAC-SHA256(key, "<tokenId>,<host>")))` must
//!    match the presented signature. The key is read at validation time so a
//!    rotated key takes effect on the next join.
//! 2. **Consumption**: the token id is exchanged with the token store, which
//!    deletes it in the same step. A token therefore admits at most once.
//!
//! A bad signature never reaches the store.

use crate::errors::PortalError;
use crate::observability::metrics;
use crate::services::token_store::{TokenGrant, TokenStore};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::secret::{ExposeSecret, SecretString};
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// The part of an admission token a client presents on join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionToken {
    /// Token identifier (key in the token store).
    pub token_id: String,
    /// Host the token was issued for.
    pub host: String,
    /// `base64(hex(hmac))` over `"<tokenId>,<host>"`.
    pub signature: String,
}

/// Compute the signature for a token id and host under `key`.
pub fn compute_signature(key: &str, token_id: &str, host: &str) -> String {
    let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
    let tag = hmac::sign(&hmac_key, signing_input(token_id, host).as_bytes());
    STANDARD.encode(hex::encode(tag.as_ref()))
}

fn signing_input(token_id: &str, host: &str) -> String {
    format!("{token_id},{host}")
}

/// Decode a presented signature back to raw HMAC bytes.
///
/// Returns `None` unless it is base64 of a lowercase hex string.
fn decode_signature(signature: &str) -> Option<Vec<u8>> {
    let hex_bytes = STANDARD.decode(signature).ok()?;
    if !hex_bytes
        .iter()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        return None;
    }
    hex::decode(hex_bytes).ok()
}

/// Validates and consumes admission tokens.
pub struct TokenValidator {
    /// Current signing key. Read on every validation.
    key: RwLock<SecretString>,
    store: Arc<dyn TokenStore>,
}

impl TokenValidator {
    pub fn new(key: SecretString, store: Arc<dyn TokenStore>) -> Self {
        Self {
            key: RwLock::new(key),
            store,
        }
    }

    /// Replace the signing key. Tokens signed with the old key fail from now on.
    pub async fn update_key(&self, key: SecretString) {
        *self.key.write().await = key;
        info!(target: "portal.auth.token_validator", "Token signing key rotated");
    }

    /// Check the token's signature against the current key.
    ///
    /// Uses `ring::hmac::verify`, which compares in constant time.
    pub async fn verify_signature(&self, token: &AdmissionToken) -> Result<(), PortalError> {
        let provided = decode_signature(&token.signature).ok_or(PortalError::InvalidSignature)?;

        let key = self.key.read().await;
        let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, key.expose_secret().as_bytes());
        hmac::verify(
            &hmac_key,
            signing_input(&token.token_id, &token.host).as_bytes(),
            &provided,
        )
        .map_err(|_| PortalError::InvalidSignature)
    }

    /// Verify the token and exchange it for its grant.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` - signature mismatch; the store is not touched
    /// - `InvalidOrUsedToken` - unknown or already consumed token
    /// - `TokenStore` - the store could not be reached
    #[instrument(skip_all)]
    pub async fn validate_and_consume(
        &self,
        token: &AdmissionToken,
    ) -> Result<TokenGrant, PortalError> {
        if let Err(e) = self.verify_signature(token).await {
            warn!(target: "portal.auth.token_validator", "Token signature mismatch");
            metrics::record_token_validation("invalid_signature");
            return Err(e);
        }
        debug!(target: "portal.auth.token_validator", "Token signature ok");

        match self.store.consume(&token.token_id).await {
            Ok(Some(grant)) => {
                metrics::record_token_validation("success");
                Ok(grant)
            }
            Ok(None) => {
                warn!(target: "portal.auth.token_validator", "Token unknown or already used");
                metrics::record_token_validation("invalid_token");
                Err(PortalError::InvalidOrUsedToken)
            }
            Err(e) => {
                metrics::record_token_validation("store_error");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory store counting consume calls.
    #[derive(Default)]
    struct MemoryStore {
        tokens: Mutex<HashMap<String, TokenGrant>>,
        consume_calls: AtomicUsize,
    }

    impl MemoryStore {
        fn with_token(token_id: &str, room: &str) -> Self {
            let store = Self::default();
            store.tokens.lock().unwrap().insert(
                token_id.to_string(),
                TokenGrant {
                    code: "code-1".to_string(),
                    user: json!("alice-user"),
                    role: "presenter".to_string(),
                    origin: json!({"region": "eu"}),
                    room: room.to_string(),
                },
            );
            store
        }
    }

    #[async_trait::async_trait]
    impl TokenStore for MemoryStore {
        async fn consume(&self, token_id: &str) -> Result<Option<TokenGrant>, PortalError> {
            self.consume_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tokens.lock().unwrap().remove(token_id))
        }
    }

    fn signed(key: &str, token_id: &str, host: &str) -> AdmissionToken {
        AdmissionToken {
            token_id: token_id.to_string(),
            host: host.to_string(),
            signature: compute_signature(key, token_id, host),
        }
    }

    #[test]
    fn test_signature_is_base64_of_lowercase_hex() {
        let signature = compute_signature("key", "tok-1", "portal.example.com:8080");
        let decoded = STANDARD.decode(&signature).unwrap();
        // HMAC-SHA256 = 32 bytes = 64 hex chars
        assert_eq!(decoded.len(), 64);
        assert!(decoded
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b)));
    }

    #[test]
    fn test_decode_signature_rejects_uppercase_hex() {
        let signature = compute_signature("key", "tok-1", "host");
        let upper = STANDARD.encode(
            String::from_utf8(STANDARD.decode(&signature).unwrap())
                .unwrap()
                .to_uppercase(),
        );
        assert!(decode_signature(&signature).is_some());
        assert!(decode_signature(&upper).is_none());
        assert!(decode_signature("%%%").is_none());
    }

    #[tokio::test]
    async fn test_valid_token_is_consumed_once() {
        let store = Arc::new(MemoryStore::with_token("tok-1", "r1"));
        let validator = TokenValidator::new(SecretString::from("key"), store.clone());
        let token = signed("key", "tok-1", "host");

        let grant = validator.validate_and_consume(&token).await.unwrap();
        assert_eq!(grant.room, "r1");
        assert_eq!(grant.code, "code-1");

        let second = validator.validate_and_consume(&token).await;
        assert!(matches!(second, Err(PortalError::InvalidOrUsedToken)));
        assert_eq!(store.consume_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bad_signature_does_not_touch_store() {
        let store = Arc::new(MemoryStore::with_token("tok-1", "r1"));
        let validator = TokenValidator::new(SecretString::from("key"), store.clone());
        let token = signed("other-key", "tok-1", "host");

        let result = validator.validate_and_consume(&token).await;
        assert!(matches!(result, Err(PortalError::InvalidSignature)));
        assert_eq!(store.consume_calls.load(Ordering::SeqCst), 0);
        assert!(store.tokens.lock().unwrap().contains_key("tok-1"));
    }

    #[tokio::test]
    async fn test_signature_binds_host() {
        let store = Arc::new(MemoryStore::with_token("tok-1", "r1"));
        let validator = TokenValidator::new(SecretString::from("key"), store);
        let mut token = signed("key", "tok-1", "host-a");
        token.host = "host-b".to_string();

        assert!(matches!(
            validator.verify_signature(&token).await,
            Err(PortalError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_key_rotation_applies_to_next_validation() {
        let store = Arc::new(MemoryStore::with_token("tok-1", "r1"));
        let validator = TokenValidator::new(SecretString::from("old-key"), store);

        let old_token = signed("old-key", "tok-1", "host");
        assert!(validator.verify_signature(&old_token).await.is_ok());

        validator.update_key(SecretString::from("new-key")).await;

        assert!(matches!(
            validator.verify_signature(&old_token).await,
            Err(PortalError::InvalidSignature)
        ));
        let new_token = signed("new-key", "tok-1", "host");
        assert!(validator.validate_and_consume(&new_token).await.is_ok());
    }

    #[test]
    fn test_admission_token_wire_names() {
        let token: AdmissionToken = serde_json::from_value(json!({
            "tokenId": "tok-9",
            "host": "h",
            "signature": "sig"
        }))
        .unwrap();
        assert_eq!(token.token_id, "tok-9");
    }
}
