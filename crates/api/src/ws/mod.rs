//! WebSocket infrastructure for live job progress.
//!
//! Provides connection management, heartbeat pings, and the HTTP upgrade
//! handler mounted under each job.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::job_ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
