//! Common types shared across the portal gateway crates.

#![warn(clippy::pedantic)]

/// Module for session and routing data types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
