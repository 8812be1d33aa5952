//! Domain types and pure logic for the pixelfan image generation service.
//!
//! This crate has no internal dependencies: the job aggregate and its state
//! machine, progress accounting, the generation port abstraction, and the
//! validation rules all live here so the store, the provider clients and the
//! API server can share them.

pub mod error;
pub mod generation;
pub mod job;
pub mod job_events;
pub mod progress;
pub mod simulated;
pub mod types;
