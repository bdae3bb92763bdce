//! Batch execution span helpers.

use tracing::Span;

use crate::model::TagStrategy;

/// Start a span wrapping one batch run, claim through commit.
pub fn start_batch_span(strategy: TagStrategy, batch_size: usize) -> Span {
    tracing::info_span!(
        "batch.run",
        "batch.strategy" = %strategy,
        "batch.size" = batch_size,
    )
}
