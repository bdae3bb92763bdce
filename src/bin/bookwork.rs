//! bookwork CLI — operator interface to the batch processing daemon.

use std::sync::Arc;
use std::time::Duration;

use bookwork::config::Config;
use bookwork::db::Db;
use bookwork::engine::scheduler::listen_config;
use bookwork::engine::{ConfigUpdate, Processor, Scheduler, SchedulerHandle};
use bookwork::model::TagStrategy;
use bookwork::seed::{SeedOptions, seed};
use bookwork::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing::error;

#[derive(Parser)]
#[command(name = "bookwork", about = "Batch tag-matching over a Postgres work queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler daemon
    Serve {
        /// Start with background processing enabled
        #[arg(long, default_value_t = false)]
        enabled: bool,
        /// Concurrent batch workers per tick
        #[arg(long, default_value_t = 10)]
        parallelism: usize,
        /// Books claimed per worker
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
        /// Tag lookup strategy (inline | relation)
        #[arg(long, default_value = "relation")]
        strategy: TagStrategy,
        /// Seconds between ticks
        #[arg(long, default_value_t = 5)]
        tick_secs: u64,
    },
    /// Wipe and repopulate books and blogs with random data
    Seed {
        #[arg(long, default_value_t = 5000)]
        books: usize,
        #[arg(long, default_value_t = 500)]
        blogs: usize,
        /// Size of the random tag pool
        #[arg(long, default_value_t = 100_000)]
        tags: usize,
        #[arg(long, default_value_t = 1000)]
        tags_per_blog: usize,
        /// Length of each book's random content body
        #[arg(long, default_value_t = 2000)]
        content_len: usize,
    },
    /// Run one ad-hoc batch outside the scheduler loop
    RunBatch {
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
        #[arg(long, default_value = "relation")]
        strategy: TagStrategy,
    },
    /// Flip the first N processed books back to pending
    Reset {
        #[arg(long, default_value_t = 1)]
        count: i64,
    },
    /// Reconfigure a running daemon via the Postgres NOTIFY channel
    Configure {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        parallelism: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        strategy: Option<TagStrategy>,
    },
    /// Print book state counts and blog count
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            enabled,
            parallelism,
            batch_size,
            strategy,
            tick_secs,
        } => cmd_serve(enabled, parallelism, batch_size, strategy, tick_secs).await,
        command => {
            let config = Config::from_env()?;
            let db = Db::connect(config.database_url.expose_secret()).await?;
            db.migrate().await?;

            match command {
                Command::Seed {
                    books,
                    blogs,
                    tags,
                    tags_per_blog,
                    content_len,
                } => {
                    seed(
                        &db,
                        &SeedOptions {
                            books,
                            blogs,
                            tags,
                            tags_per_blog,
                            content_len,
                        },
                    )
                    .await?;
                    println!("seeded {books} books and {blogs} blogs");
                    Ok(())
                }
                Command::RunBatch {
                    batch_size,
                    strategy,
                } => {
                    let processor = Processor::new(Arc::new(db));
                    let processed = processor.run_batch(strategy, batch_size).await?;
                    println!("processed {processed} books");
                    Ok(())
                }
                Command::Reset { count } => {
                    let reset = db.reset_books(count).await?;
                    println!("reset {reset} books to pending");
                    Ok(())
                }
                Command::Configure {
                    enabled,
                    parallelism,
                    batch_size,
                    strategy,
                } => {
                    let update = ConfigUpdate {
                        enabled,
                        parallelism,
                        batch_size,
                        strategy,
                    };
                    if update.is_empty() {
                        anyhow::bail!("nothing to configure: pass at least one --flag");
                    }
                    let payload = serde_json::to_string(&update)?;
                    db.notify_config(&payload).await?;
                    println!("published config update: {payload}");
                    Ok(())
                }
                Command::Status => {
                    for (state, count) in db.book_state_counts().await? {
                        println!("books {state}: {count}");
                    }
                    println!("blogs: {}", db.blog_count().await?);
                    Ok(())
                }
                Command::Serve { .. } => unreachable!("handled above"),
            }
        }
    }
}

async fn cmd_serve(
    enabled: bool,
    parallelism: usize,
    batch_size: usize,
    strategy: TagStrategy,
    tick_secs: u64,
) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "bookwork".to_string(),
    })?;

    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;
    db.health_check().await?;

    let handle = Arc::new(SchedulerHandle::default());
    handle.set_enabled(enabled);
    handle.set_parallelism(parallelism);
    handle.set_batch_size(batch_size);
    handle.set_strategy(strategy);

    let scheduler = Scheduler::new(
        Arc::clone(&db),
        Arc::clone(&handle),
        Duration::from_secs(tick_secs),
    );

    let listener = {
        let db = Arc::clone(&db);
        let handle = Arc::clone(&handle);
        tokio::spawn(async move {
            if let Err(e) = listen_config(db, handle).await {
                error!("config listener stopped: {e}");
            }
        })
    };

    let ctrl = scheduler.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.shutdown();
    });

    scheduler.run().await?;
    listener.abort();
    Ok(())
}
