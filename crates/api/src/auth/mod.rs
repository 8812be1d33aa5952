//! Authentication primitives.
//!
//! - [`password`] -- Argon2id password hashing and verification.
//! - [`jwt`] -- JWT access-token generation and validation.
//! - [`credentials`] -- the single demo login the service accepts.

pub mod credentials;
pub mod jwt;
pub mod password;
