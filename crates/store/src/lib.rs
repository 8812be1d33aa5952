//! Process-lifetime job storage.
//!
//! [`JobStore`] is the single authoritative map from job id to
//! [`Job`](pixelfan_core::job::Job). Nothing is persisted; jobs are retained
//! until the process exits.

mod job_store;

pub use job_store::JobStore;
