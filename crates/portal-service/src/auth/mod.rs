//! Admission token handling.

pub mod token_validator;

pub use token_validator::{compute_signature, AdmissionToken, TokenValidator};
