//! Stream message type constants for job progress events.
//!
//! Used by the progress publisher and the SSE endpoint when relaying
//! job lifecycle updates to subscribers, and by client-side trackers
//! when decoding them. Every stream message is a JSON object carrying
//! a `type` field with one of these values.

/// Subscription acknowledged; payload carries the current job snapshot.
pub const MSG_TYPE_CONNECTED: &str = "connected";

/// Full job snapshot after a material change (progress, counters, status).
pub const MSG_TYPE_PROGRESS: &str = "progress";

/// The job reached a terminal state; the subscriber may close.
pub const MSG_TYPE_COMPLETE: &str = "complete";

/// Fatal stream-level error, distinct from a job-level `failed` status.
/// Emitted when the stream cannot continue, e.g. the job row was
/// deleted mid-execution; subscribers should close on it like
/// `complete`. A snapshot that merely fails to serialize is logged and
/// skipped, never surfaced as an `error` message.
pub const MSG_TYPE_ERROR: &str = "error";
