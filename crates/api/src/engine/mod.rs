//! Background job engine.
//!
//! - [`runner`] -- fans each job out into bounded, retried slot tasks.
//! - [`broadcaster`] -- turns store state into per-subscriber progress events.

pub mod broadcaster;
pub mod runner;

use std::sync::Arc;

use pixelfan_core::generation::GenerationPort;
use pixelfan_core::simulated::SimulatedGenerator;
use pixelfan_replicate::api::ReplicateApiError;
use pixelfan_replicate::ReplicateGenerator;

use crate::config::{GenerationBackend, ServerConfig};

pub use broadcaster::ProgressSubscription;
pub use runner::{JobRunner, RunnerConfig};

/// Build the provider selected by `GENERATION_BACKEND`.
pub fn build_generator(
    config: &ServerConfig,
) -> Result<Arc<dyn GenerationPort>, ReplicateApiError> {
    let generator: Arc<dyn GenerationPort> = match config.backend {
        GenerationBackend::Replicate => {
            Arc::new(ReplicateGenerator::new(config.replicate.clone())?)
        }
        GenerationBackend::Simulated => Arc::new(SimulatedGenerator::default()),
    };
    tracing::info!(backend = ?config.backend, "Generation backend selected");
    Ok(generator)
}
