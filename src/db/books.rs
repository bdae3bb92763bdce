//! Book queue operations: exclusive-claim dequeue, atomic batch completion,
//! operator reset.
//!
//! The queue contract rests on `FOR UPDATE SKIP LOCKED`: concurrent claims
//! against the same table receive disjoint row sets because each claim locks
//! the rows it selects and skips rows locked by an in-flight claim instead of
//! blocking on them. The locks belong to the caller's transaction, so an
//! abort (crash, decode failure) silently returns the rows to the pool.

use sqlx::{Postgres, Transaction};

use crate::error::Result;
use crate::model::{Book, ProcessState};

/// Enrichment produced by the worker for one claimed book.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    pub key: i64,
    pub match_count: i32,
    pub author: String,
}

/// Claim up to `limit` pending books inside `tx`, oldest keys first.
///
/// Rows already claimed by another transaction are skipped, not waited on.
/// An empty result means the queue is empty or fully contended; it is not an
/// error.
pub async fn claim_batch(
    tx: &mut Transaction<'static, Postgres>,
    limit: i64,
) -> Result<Vec<Book>> {
    let rows: Vec<BookRow> = sqlx::query_as(
        "SELECT key, title, author, tag, state, match_count, content, created_at, processed_at
         FROM books
         WHERE state = 'pending'
         ORDER BY key
         LIMIT $1
         FOR UPDATE SKIP LOCKED",
    )
    .bind(limit)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter().map(BookRow::try_into_book).collect()
}

/// Write the enrichment for a claimed batch and flip every row to processed,
/// all in the claiming transaction. Nothing is visible until the caller
/// commits.
pub async fn complete_batch(
    tx: &mut Transaction<'static, Postgres>,
    updates: &[BookUpdate],
) -> Result<()> {
    if updates.is_empty() {
        return Ok(());
    }

    let keys: Vec<i64> = updates.iter().map(|u| u.key).collect();
    let counts: Vec<i32> = updates.iter().map(|u| u.match_count).collect();
    let authors: Vec<String> = updates.iter().map(|u| u.author.clone()).collect();

    sqlx::query(
        "UPDATE books b
         SET match_count = u.match_count,
             author = u.author,
             state = 'processed',
             processed_at = now()
         FROM UNNEST($1::bigint[], $2::int[], $3::text[]) AS u(key, match_count, author)
         WHERE b.key = u.key",
    )
    .bind(&keys)
    .bind(&counts)
    .bind(&authors)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

impl super::Db {
    /// Flip the first `count` processed books (by key) back to pending,
    /// clearing the enrichment so they can be reprocessed. Operator/demo tool.
    pub async fn reset_books(&self, count: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE books
             SET state = 'pending', match_count = 0, author = '', processed_at = NULL
             WHERE key IN (
                 SELECT key FROM books
                 WHERE state = 'processed'
                 ORDER BY key
                 LIMIT $1
             )",
        )
        .bind(count)
        .execute(self.pool())
        .await?;

        crate::telemetry::metrics::books_reset().add(result.rows_affected(), &[]);
        Ok(result.rows_affected())
    }

    /// Book counts per state, for the status command and tests.
    pub async fn book_state_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM books GROUP BY state ORDER BY state")
                .fetch_all(self.pool())
                .await?;
        Ok(rows)
    }

    /// Number of books still pending.
    pub async fn pending_books(&self) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM books WHERE state = 'pending'")
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    /// Fetch one book by key.
    pub async fn get_book(&self, key: i64) -> Result<Book> {
        let row: Option<BookRow> = sqlx::query_as(
            "SELECT key, title, author, tag, state, match_count, content, created_at, processed_at
             FROM books WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| crate::error::Error::Other(format!("book {key} not found")))?
            .try_into_book()
    }
}

/// Internal row type for sqlx::FromRow. State is stored as text and parsed.
#[derive(sqlx::FromRow)]
struct BookRow {
    key: i64,
    title: String,
    author: String,
    tag: String,
    state: String,
    match_count: i32,
    content: String,
    created_at: chrono::DateTime<chrono::Utc>,
    processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl BookRow {
    fn try_into_book(self) -> Result<Book> {
        Ok(Book {
            key: self.key,
            title: self.title,
            author: self.author,
            tag: self.tag,
            state: self.state.parse::<ProcessState>()?,
            match_count: self.match_count,
            content: self.content,
            created_at: self.created_at,
            processed_at: self.processed_at,
        })
    }
}
