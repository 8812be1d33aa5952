//! Replicate prediction API client.
//!
//! Provides the raw HTTP wrapper ([`api`]), the tolerant parsing of
//! prediction output into an image URL ([`output`]), and
//! [`ReplicateGenerator`], the [`GenerationPort`](pixelfan_core::generation::GenerationPort)
//! implementation used by the job engine.

pub mod api;
pub mod generator;
pub mod output;

pub use generator::{ReplicateConfig, ReplicateGenerator};
