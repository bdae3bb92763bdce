//! Bulk data generation for demos and load testing.
//!
//! Seeds pending books and blogs with both tag representations. The inline
//! `tag_names` arrays are synced from the `blog_tags` link rows at the end,
//! so the two representations agree and either lookup strategy sees the same
//! data. Runs in bounded chunks to keep memory flat.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::db::Db;
use crate::error::Result;
use crate::model::BookContent;

const CONTENT_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const INSERT_CHUNK: usize = 1000;
const LINK_CHUNK: usize = 200;

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub books: usize,
    pub blogs: usize,
    pub tags: usize,
    pub tags_per_blog: usize,
    pub content_len: usize,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            books: 5000,
            blogs: 500,
            tags: 100_000,
            tags_per_blog: 1000,
            content_len: 2000,
        }
    }
}

/// Wipe and repopulate the books, blogs and blog_tags tables.
pub async fn seed(db: &Db, opts: &SeedOptions) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    let tag_pool = random_tag_pool(&mut rng, opts.tags);

    clear_tables(db).await?;
    seed_books(db, opts, &mut rng, &tag_pool).await?;
    seed_blogs(db, opts).await?;
    seed_blog_links(db, opts, &mut rng, &tag_pool).await?;
    sync_inline_tags(db).await?;

    // Keep the planner honest after the bulk load.
    sqlx::query("ANALYZE").execute(db.pool()).await?;

    info!(
        books = opts.books,
        blogs = opts.blogs,
        tags_per_blog = opts.tags_per_blog,
        "seeding finished"
    );
    Ok(())
}

fn random_tag_pool(rng: &mut StdRng, size: usize) -> Vec<String> {
    let size = size.max(1);
    (0..size)
        .map(|_| format!("Tag_{}", rng.gen_range(0..size)))
        .collect()
}

fn random_tag(rng: &mut StdRng, pool: &[String]) -> String {
    pool[rng.gen_range(0..pool.len())].clone()
}

fn random_body(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| CONTENT_CHARS[rng.gen_range(0..CONTENT_CHARS.len())] as char)
        .collect()
}

async fn clear_tables(db: &Db) -> Result<()> {
    sqlx::query("TRUNCATE books, blog_tags, blogs RESTART IDENTITY CASCADE")
        .execute(db.pool())
        .await?;
    debug!("tables cleared");
    Ok(())
}

async fn seed_books(db: &Db, opts: &SeedOptions, rng: &mut StdRng, pool: &[String]) -> Result<()> {
    let mut seeded = 0usize;
    while seeded < opts.books {
        let chunk = INSERT_CHUNK.min(opts.books - seeded);
        let mut titles = Vec::with_capacity(chunk);
        let mut tags = Vec::with_capacity(chunk);
        let mut contents = Vec::with_capacity(chunk);

        for i in seeded..seeded + chunk {
            let title = format!("Book {i}");
            let content = BookContent {
                author: format!("Jane Doe {i}"),
                title: title.clone(),
                body: random_body(rng, opts.content_len),
            };
            contents.push(
                serde_json::to_string(&content)
                    .map_err(|e| crate::error::Error::Other(format!("serialize content: {e}")))?,
            );
            titles.push(title);
            tags.push(random_tag(rng, pool));
        }

        sqlx::query(
            "INSERT INTO books (title, tag, state, content)
             SELECT t.title, t.tag, 'pending', t.content
             FROM UNNEST($1::text[], $2::text[], $3::text[]) AS t(title, tag, content)",
        )
        .bind(&titles)
        .bind(&tags)
        .bind(&contents)
        .execute(db.pool())
        .await?;

        seeded += chunk;
        debug!(seeded, total = opts.books, "books seeded");
    }
    Ok(())
}

async fn seed_blogs(db: &Db, opts: &SeedOptions) -> Result<()> {
    let mut seeded = 0usize;
    while seeded < opts.blogs {
        let chunk = INSERT_CHUNK.min(opts.blogs - seeded);
        let titles: Vec<String> = (seeded..seeded + chunk)
            .map(|i| format!("Blog {i}"))
            .collect();

        // tag_names starts empty and is synced from blog_tags afterwards.
        sqlx::query(
            "INSERT INTO blogs (title)
             SELECT t.title FROM UNNEST($1::text[]) AS t(title)",
        )
        .bind(&titles)
        .execute(db.pool())
        .await?;

        seeded += chunk;
        debug!(seeded, total = opts.blogs, "blogs seeded");
    }
    Ok(())
}

async fn seed_blog_links(
    db: &Db,
    opts: &SeedOptions,
    rng: &mut StdRng,
    pool: &[String],
) -> Result<()> {
    let blog_keys: Vec<(i64,)> = sqlx::query_as("SELECT key FROM blogs ORDER BY key")
        .fetch_all(db.pool())
        .await?;

    for keys in blog_keys.chunks(LINK_CHUNK) {
        let mut link_keys = Vec::with_capacity(keys.len() * opts.tags_per_blog);
        let mut link_tags = Vec::with_capacity(keys.len() * opts.tags_per_blog);
        for (blog_key,) in keys {
            // Duplicate links to the same tag are allowed. The resolver and
            // the inline sync both deduplicate on read.
            for _ in 0..opts.tags_per_blog {
                link_keys.push(*blog_key);
                link_tags.push(random_tag(rng, pool));
            }
        }

        sqlx::query(
            "INSERT INTO blog_tags (blog_key, tag)
             SELECT t.blog_key, t.tag
             FROM UNNEST($1::bigint[], $2::text[]) AS t(blog_key, tag)",
        )
        .bind(&link_keys)
        .bind(&link_tags)
        .execute(db.pool())
        .await?;

        debug!(links = link_keys.len(), "blog tag links seeded");
    }
    Ok(())
}

/// Overwrite every blog's inline array from its link rows so both tag
/// representations agree.
async fn sync_inline_tags(db: &Db) -> Result<()> {
    sqlx::query(
        "UPDATE blogs b
         SET tag_names = q.tags
         FROM (
             SELECT blog_key, array_agg(DISTINCT tag) AS tags
             FROM blog_tags
             GROUP BY blog_key
         ) AS q
         WHERE b.key = q.blog_key",
    )
    .execute(db.pool())
    .await?;
    Ok(())
}
