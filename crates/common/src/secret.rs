//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used by the portal for its token signing
//! key and the token-store connection URL. Both can carry credentials, so both
//! are held as `SecretString` and only unwrapped at the point of use.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct SigningConfig {
//!     cluster_name: String,
//!     token_key: SecretString, // Debug shows "[REDACTED]"
//! }
//!
//! let config = SigningConfig {
//!     cluster_name: "rtc-cluster".to_string(),
//!     token_key: SecretString::from("hmac-key"),
//! };
//!
//! let rendered = format!("{config:?}");
//! assert!(!rendered.contains("hmac-key"));
//! assert_eq!(config.token_key.expose_secret(), "hmac-key");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let key = SecretString::from("portal-signing-key");
        let debug_str = format!("{key:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("portal-signing-key"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let key = SecretString::from("rotated-key-2");
        assert_eq!(key.expose_secret(), "rotated-key-2");
    }

    #[test]
    fn test_deserialized_key_stays_redacted() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct KeyFile {
            key_id: String,
            token_key: SecretString,
        }

        let json = r#"{"key_id": "k-7", "token_key": "very-secret"}"#;
        let file: KeyFile = serde_json::from_str(json).expect("deserialize");

        assert_eq!(file.token_key.expose_secret(), "very-secret");

        let debug = format!("{file:?}");
        assert!(debug.contains("k-7"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_clone_keeps_value() {
        let key = SecretString::from("cloneable");
        let cloned = key.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
