//! Tag resolver: per-tag counts of referencing blogs.
//!
//! Two interchangeable strategies answer "how many blogs reference tag T":
//! an array-membership probe against the inline `tag_names` column, and a
//! normalized lookup against the `blog_tags` link table. Both count a blog at
//! most once per tag (the link table may hold duplicate links) and must agree
//! on consistent data. Each call is one batched query over an UNNEST of the
//! requested tag set, never one query per tag.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::TagStrategy;

impl super::Db {
    /// Count, per requested tag, the distinct blogs referencing it.
    ///
    /// Every requested tag appears in the result, with 0 for tags no blog
    /// references. On a store failure nothing is returned: the call is
    /// all-or-nothing.
    pub async fn count_blogs_by_tags(
        &self,
        strategy: TagStrategy,
        tags: &[String],
    ) -> Result<HashMap<String, i64>> {
        if tags.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, i64)> = match strategy {
            TagStrategy::Inline => {
                // `@>` probes the GIN index on tag_names.
                sqlx::query_as(
                    "SELECT t.tag, COUNT(*)
                     FROM UNNEST($1::text[]) AS t(tag)
                     JOIN blogs b ON b.tag_names @> ARRAY[t.tag]
                     GROUP BY t.tag",
                )
                .bind(tags)
                .fetch_all(self.pool())
                .await
            }
            TagStrategy::Relation => {
                // DISTINCT blog_key deduplicates blogs linked to the same
                // tag more than once.
                sqlx::query_as(
                    "SELECT bt.tag, COUNT(DISTINCT bt.blog_key)
                     FROM blog_tags bt
                     WHERE bt.tag = ANY($1::text[])
                     GROUP BY bt.tag",
                )
                .bind(tags)
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(Error::Resolver)?;

        let mut counts: HashMap<String, i64> =
            tags.iter().map(|tag| (tag.clone(), 0)).collect();
        for (tag, count) in rows {
            counts.insert(tag, count);
        }

        Ok(counts)
    }

    /// Number of seeded blogs, for the status command.
    pub async fn blog_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blogs")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}
