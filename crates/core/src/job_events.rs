//! Wire names for progress stream events and WebSocket close codes.
//!
//! Shared by the SSE and WebSocket transports so both present the same
//! event vocabulary.

/// A slot reached a terminal outcome.
pub const EVENT_PROGRESS: &str = "progress";

/// The job reached a terminal state. Always the last event of a stream.
pub const EVENT_DONE: &str = "done";

/// SSE comment text sent on idle streams.
pub const KEEP_ALIVE_TEXT: &str = "keep-alive";

/// Stream ended after the `done` event.
pub const WS_CLOSE_NORMAL: u16 = 1000;

/// Stream aborted by an unexpected server-side fault.
pub const WS_CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Missing, malformed or expired token.
pub const WS_CLOSE_UNAUTHORIZED: u16 = 4401;

/// Unknown job id, or the job vanished mid-stream.
pub const WS_CLOSE_JOB_NOT_FOUND: u16 = 4404;
