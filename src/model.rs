//! Core data model.
//!
//! A book is a unit of queued work: it carries a tag, an opaque JSON content
//! payload, and a lifecycle state. A blog is a container that references tags
//! in two logically equivalent representations (an inline array and a set of
//! child link rows); the processing step counts, per book tag, how many blogs
//! reference that tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Book (work item)
// ---------------------------------------------------------------------------

/// A queued book. `key` is the monotonic claim-ordering key; `state` moves
/// pending -> processed exactly once, under an exclusive row claim.
#[derive(Debug, Clone)]
pub struct Book {
    pub key: i64,
    pub title: String,
    /// Written by the worker, extracted from `content`.
    pub author: String,
    /// Join key into the blog tables.
    pub tag: String,
    pub state: ProcessState,
    /// Number of blogs referencing `tag`, written once by the worker.
    pub match_count: i32,
    /// Opaque serialized payload; the worker decodes it as [`BookContent`].
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// The JSON payload stored in `Book::content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookContent {
    pub author: String,
    pub title: String,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Process state
// ---------------------------------------------------------------------------

/// Lifecycle state of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Seeded, waiting for a worker to claim it.
    Pending,
    /// Enriched and committed. Terminal (outside of an operator reset).
    Processed,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Pending => write!(f, "pending"),
            ProcessState::Processed => write!(f, "processed"),
        }
    }
}

impl std::str::FromStr for ProcessState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessState::Pending),
            "processed" => Ok(ProcessState::Processed),
            other => Err(Error::Other(format!("unknown process state: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tag lookup strategy
// ---------------------------------------------------------------------------

/// How the resolver counts blogs per tag. Both strategies answer the same
/// question and must agree on consistent data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStrategy {
    /// Membership test against the inline `tag_names` array (GIN index).
    Inline,
    /// Existence of `blog_tags` link rows, deduplicated per blog.
    Relation,
}

impl std::fmt::Display for TagStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagStrategy::Inline => write!(f, "inline"),
            TagStrategy::Relation => write!(f, "relation"),
        }
    }
}

impl std::str::FromStr for TagStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inline" => Ok(TagStrategy::Inline),
            "relation" => Ok(TagStrategy::Relation),
            other => Err(Error::Other(format!(
                "unknown tag strategy: {other} (expected inline or relation)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_state_round_trips() {
        for state in [ProcessState::Pending, ProcessState::Processed] {
            let parsed: ProcessState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn unknown_process_state_is_rejected() {
        assert!("received".parse::<ProcessState>().is_err());
    }

    #[test]
    fn strategy_round_trips() {
        for strategy in [TagStrategy::Inline, TagStrategy::Relation] {
            let parsed: TagStrategy = strategy.to_string().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
        assert!("subquery".parse::<TagStrategy>().is_err());
    }

    #[test]
    fn book_content_decodes() {
        let json = r#"{"author":"Jane Doe","title":"Book 1","body":"ABC123"}"#;
        let content: BookContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.author, "Jane Doe");
    }

    #[test]
    fn garbage_content_fails_to_decode() {
        assert!(serde_json::from_str::<BookContent>("not json at all").is_err());
    }
}
