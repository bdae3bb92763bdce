//! Batch worker: claim pending books, enrich them, commit atomically.
//!
//! One `run_batch` call is one store transaction. The claim locks its rows
//! for the life of the transaction, so any failure after the claim (resolver
//! error, payload decode error, commit failure) aborts the whole batch and
//! every book stays pending. Reprocessing a returned batch is idempotent:
//! the enrichment is a pure function of store contents.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info};

use crate::db::books::{self, BookUpdate};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{BookContent, TagStrategy};
use crate::telemetry::batch::start_batch_span;
use crate::telemetry::metrics;

/// Runs one batch at a time. Cheap to clone; concurrent workers share only
/// the connection pool.
#[derive(Clone)]
pub struct Processor {
    db: Arc<Db>,
}

impl Processor {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Claim up to `batch_size` pending books, resolve their tag counts under
    /// `strategy`, write the enrichment, and commit. Returns the number of
    /// books processed; an empty claim is a successful no-op returning 0.
    pub async fn run_batch(&self, strategy: TagStrategy, batch_size: usize) -> Result<usize> {
        let span = start_batch_span(strategy, batch_size);

        async {
            let start = Instant::now();
            let mut tx = self.db.begin().await?;

            let batch = books::claim_batch(&mut tx, batch_size as i64).await?;
            if batch.is_empty() {
                debug!("no pending books to claim");
                return Ok(0);
            }

            // The resolver deduplicates nothing itself; hand it distinct tags.
            let tags: Vec<String> = batch
                .iter()
                .map(|book| book.tag.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let counts = self.db.count_blogs_by_tags(strategy, &tags).await?;

            let mut updates = Vec::with_capacity(batch.len());
            for book in &batch {
                let content: BookContent = serde_json::from_str(&book.content)
                    .map_err(|source| Error::PayloadDecode { key: book.key, source })?;
                updates.push(BookUpdate {
                    key: book.key,
                    match_count: saturate_count(counts.get(&book.tag).copied().unwrap_or(0)),
                    author: content.author,
                });
            }

            books::complete_batch(&mut tx, &updates).await?;
            tx.commit().await?;

            let elapsed_ms = start.elapsed().as_millis() as u64;
            let strategy_label = KeyValue::new("strategy", strategy.to_string());
            metrics::books_processed().add(batch.len() as u64, &[strategy_label.clone()]);
            metrics::batch_duration_ms().record(elapsed_ms as f64, &[strategy_label]);
            info!(
                claimed = batch.len(),
                distinct_tags = tags.len(),
                duration_ms = elapsed_ms,
                "batch processed"
            );

            Ok(batch.len())
        }
        .instrument(span)
        .await
    }
}

/// The match_count column is 32-bit; a larger blog count saturates rather
/// than wrapping negative.
fn saturate_count(count: i64) -> i32 {
    count.try_into().unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_counts_saturate_instead_of_wrapping() {
        assert_eq!(saturate_count(0), 0);
        assert_eq!(saturate_count(2), 2);
        assert_eq!(saturate_count(i64::from(i32::MAX)), i32::MAX);
        assert_eq!(saturate_count(i64::from(i32::MAX) + 1), i32::MAX);
    }
}
