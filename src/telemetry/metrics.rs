//! Metric instrument factories for bookwork.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"bookwork"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for bookwork instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("bookwork")
}

/// Counter: books enriched and committed.
/// Labels: `strategy` ("inline" | "relation").
pub fn books_processed() -> Counter<u64> {
    meter()
        .u64_counter("bookwork.books.processed")
        .with_description("Number of books processed and committed")
        .build()
}

/// Histogram: wall time of one batch run (claim through commit).
/// Labels: `strategy`.
pub fn batch_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("bookwork.batch.duration_ms")
        .with_description("Batch run duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: batch workers that failed within a scheduler tick.
pub fn tick_failures() -> Counter<u64> {
    meter()
        .u64_counter("bookwork.scheduler.tick_failures")
        .with_description("Batch worker failures observed at the tick barrier")
        .build()
}

/// Counter: books flipped back to pending by the operator reset.
pub fn books_reset() -> Counter<u64> {
    meter()
        .u64_counter("bookwork.books.reset")
        .with_description("Number of processed books reset to pending")
        .build()
}
