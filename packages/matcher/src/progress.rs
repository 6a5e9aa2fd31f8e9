//! Batch progress reporting.
//!
//! The orchestrator only ever reports absolute positions read from its
//! shared completion counter, so a renderer never has to reconcile deltas
//! arriving out of order from several workers.

use std::sync::Arc;

/// Receives progress updates from a running batch.
///
/// Implementations must be `Send + Sync`; updates arrive from a tokio task.
pub trait ProgressCallback: Send + Sync {
    /// Set the number of rows in the batch.
    fn set_total(&self, total: u64);

    /// Set the number of completed rows.
    fn set_position(&self, pos: u64);

    /// Update the status line (completion percentage and elapsed time).
    fn set_message(&self, msg: String);

    /// Mark the batch complete with a final message.
    fn finish(&self, msg: String);

    /// Mark the batch complete and remove the indicator.
    fn finish_and_clear(&self);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Formats the reporter's status line: `"done/total | pct% | mm:ss"`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn status_line(done: u64, total: u64, elapsed_secs: u64) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    };
    format!(
        "{done}/{total} | {percent:.1}% | {:02}:{:02}",
        elapsed_secs / 60,
        elapsed_secs % 60
    )
}
