//! The single demo login accepted by the service.

use crate::auth::password::{hash_password, verify_password};

/// A fixed email plus the Argon2id hash of its password.
///
/// The plaintext is hashed once at construction and dropped.
#[derive(Debug, Clone)]
pub struct DemoCredentials {
    email: String,
    password_hash: String,
}

impl DemoCredentials {
    pub fn new(email: &str, password: &str) -> Result<Self, argon2::password_hash::Error> {
        Ok(Self {
            email: email.to_string(),
            password_hash: hash_password(password)?,
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Check a login attempt. The hash is verified whatever the email.
    pub fn verify(&self, email: &str, password: &str) -> Result<bool, argon2::password_hash::Error> {
        let password_ok = verify_password(password, &self.password_hash)?;
        Ok(password_ok && email == self.email)
    }
}
