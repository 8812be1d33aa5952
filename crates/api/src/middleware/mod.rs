//! Request extractors.
//!
//! - [`auth::AuthUser`] -- the authenticated caller, from a Bearer header or
//!   a `token` query parameter.
//! - [`json::JsonBody`] -- a JSON request body with structured rejections.

pub mod auth;
pub mod json;
