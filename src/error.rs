//! Error types for bookwork.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The store is unreachable or a transaction aborted. Transient: claimed
    /// rows revert to pending and are reclaimed on a later tick.
    #[error("store unavailable: {0}")]
    Store(#[from] sqlx::Error),

    /// A claimed book's content could not be decoded. Batch-fatal: the
    /// worker commits nothing and every book in the batch stays pending.
    #[error("book {key}: content payload cannot be decoded: {source}")]
    PayloadDecode {
        key: i64,
        #[source]
        source: serde_json::Error,
    },

    /// The tag-count lookup failed. Batch-fatal, no partial results.
    #[error("tag lookup failed: {0}")]
    Resolver(#[source] sqlx::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
