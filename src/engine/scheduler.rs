//! Polling scheduler: turns live-mutable configuration into a bounded set of
//! concurrent batch workers per tick.
//!
//! Configuration lives in a [`SchedulerHandle`] of atomics shared with the
//! control surface. Each active tick snapshots the handle once, fans out
//! exactly `parallelism` concurrent `run_batch` calls, and waits for the
//! whole set to finish before sleeping — a barrier, not fire-and-forget, so
//! in-flight work stays bounded and reconfiguration takes effect at tick
//! boundaries. Worker failures are logged and the loop keeps polling; the
//! next tick reclaims whatever stayed pending.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::db::{CONFIG_CHANNEL, Db};
use crate::error::Result;
use crate::model::TagStrategy;
use crate::telemetry::metrics;

use super::processor::Processor;

/// Live-mutable scheduler configuration. Writers (the control surface) and
/// the loop share this through an Arc; each field is independently atomic and
/// each tick snapshots them without requiring cross-field consistency.
#[derive(Debug)]
pub struct SchedulerHandle {
    enabled: AtomicBool,
    parallelism: AtomicUsize,
    batch_size: AtomicUsize,
    /// true = relation strategy, false = inline.
    via_relation: AtomicBool,
}

/// One tick's snapshot of the handle.
#[derive(Debug, Clone, Copy)]
pub struct TickConfig {
    pub parallelism: usize,
    pub batch_size: usize,
    pub strategy: TagStrategy,
}

impl Default for SchedulerHandle {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            parallelism: AtomicUsize::new(10),
            batch_size: AtomicUsize::new(50),
            via_relation: AtomicBool::new(true),
        }
    }
}

impl SchedulerHandle {
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Values below 1 are clamped: a tick always runs at least one worker
    /// claiming at least one book.
    pub fn set_parallelism(&self, parallelism: usize) {
        self.parallelism.store(parallelism.max(1), Ordering::Relaxed);
    }

    pub fn set_batch_size(&self, batch_size: usize) {
        self.batch_size.store(batch_size.max(1), Ordering::Relaxed);
    }

    pub fn set_strategy(&self, strategy: TagStrategy) {
        self.via_relation
            .store(strategy == TagStrategy::Relation, Ordering::Relaxed);
    }

    pub fn strategy(&self) -> TagStrategy {
        if self.via_relation.load(Ordering::Relaxed) {
            TagStrategy::Relation
        } else {
            TagStrategy::Inline
        }
    }

    /// Read all tick-scoped fields once. Fields set concurrently land in a
    /// later snapshot.
    pub fn snapshot(&self) -> TickConfig {
        TickConfig {
            parallelism: self.parallelism.load(Ordering::Relaxed),
            batch_size: self.batch_size.load(Ordering::Relaxed),
            strategy: self.strategy(),
        }
    }

    /// Apply a partial update; absent fields keep their current value.
    pub fn apply(&self, update: &ConfigUpdate) {
        if let Some(enabled) = update.enabled {
            self.set_enabled(enabled);
        }
        if let Some(parallelism) = update.parallelism {
            self.set_parallelism(parallelism);
        }
        if let Some(batch_size) = update.batch_size {
            self.set_batch_size(batch_size);
        }
        if let Some(strategy) = update.strategy {
            self.set_strategy(strategy);
        }
    }
}

/// Partial configuration update, carried as JSON over the Postgres NOTIFY
/// channel between the CLI and a running daemon.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<TagStrategy>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.parallelism.is_none()
            && self.batch_size.is_none()
            && self.strategy.is_none()
    }
}

/// The scheduler loop. Runs until [`Scheduler::shutdown`] is called.
#[derive(Clone)]
pub struct Scheduler {
    db: Arc<Db>,
    handle: Arc<SchedulerHandle>,
    tick: Duration,
    shutdown: Arc<Notify>,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(db: Arc<Db>, handle: Arc<SchedulerHandle>, tick: Duration) -> Self {
        Self {
            db,
            handle,
            tick,
            shutdown: Arc::new(Notify::new()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal the loop to terminate. Observed at the loop head and inside
    /// sleeps; an in-flight tick's workers finish naturally first.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.shutdown.notify_one();
    }

    /// Run the polling loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!(tick_secs = self.tick.as_secs_f64(), "scheduler started");

        loop {
            // A shutdown signaled during the last tick must not start another.
            if self.stop.load(Ordering::Relaxed) {
                info!("scheduler shutting down");
                return Ok(());
            }

            if !self.handle.enabled() {
                debug!("scheduler disabled, sleeping");
                if self.sleep_or_shutdown().await {
                    return Ok(());
                }
                continue;
            }

            let config = self.handle.snapshot();
            info!(
                parallelism = config.parallelism,
                batch_size = config.batch_size,
                strategy = %config.strategy,
                "tick started"
            );

            let processor = Processor::new(Arc::clone(&self.db));
            let mut workers = JoinSet::new();
            for _ in 0..config.parallelism {
                let processor = processor.clone();
                workers.spawn(async move {
                    processor
                        .run_batch(config.strategy, config.batch_size)
                        .await
                });
            }

            // Barrier: every worker finishes, success or failure, before the
            // next sleep and the next configuration snapshot.
            let mut processed = 0usize;
            let mut failures = 0usize;
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok(Ok(count)) => processed += count,
                    Ok(Err(e)) => {
                        failures += 1;
                        error!("batch worker failed: {e}");
                    }
                    Err(e) => {
                        failures += 1;
                        error!("batch worker panicked: {e}");
                    }
                }
            }

            if failures > 0 {
                metrics::tick_failures().add(failures as u64, &[]);
            }
            info!(processed, failures, "tick finished");

            if self.sleep_or_shutdown().await {
                return Ok(());
            }
        }
    }

    /// Sleep one tick interval; returns true if shutdown was requested.
    async fn sleep_or_shutdown(&self) -> bool {
        tokio::select! {
            _ = self.shutdown.notified() => {
                info!("scheduler shutting down");
                true
            }
            _ = tokio::time::sleep(self.tick) => false,
        }
    }
}

/// Listen on the config NOTIFY channel and apply updates to the handle.
///
/// Runs until the surrounding task is aborted; an `Err` return means setup
/// failed. Bad payloads and transient `recv` errors are logged and skipped
/// so one malformed publish or a store blip cannot cost a running daemon its
/// live reconfigurability.
pub async fn listen_config(db: Arc<Db>, handle: Arc<SchedulerHandle>) -> Result<()> {
    let mut listener = PgListener::connect_with(db.pool()).await?;
    listener.listen(CONFIG_CHANNEL).await?;
    info!(channel = CONFIG_CHANNEL, "config listener started");

    loop {
        let notification = match listener.recv().await {
            Ok(n) => n,
            Err(e) => {
                // PgListener re-establishes the connection on the next recv.
                warn!("config listener recv error: {e}, retrying");
                continue;
            }
        };
        match serde_json::from_str::<ConfigUpdate>(notification.payload()) {
            Ok(update) => {
                handle.apply(&update);
                let config = handle.snapshot();
                info!(
                    enabled = handle.enabled(),
                    parallelism = config.parallelism,
                    batch_size = config.batch_size,
                    strategy = %config.strategy,
                    "configuration updated"
                );
            }
            Err(e) => warn!(payload = notification.payload(), "bad config payload: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_defaults_match_daemon_defaults() {
        let handle = SchedulerHandle::default();
        assert!(!handle.enabled());
        let config = handle.snapshot();
        assert_eq!(config.parallelism, 10);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.strategy, TagStrategy::Relation);
    }

    #[test]
    fn zero_values_are_clamped_to_one() {
        let handle = SchedulerHandle::default();
        handle.set_parallelism(0);
        handle.set_batch_size(0);
        let config = handle.snapshot();
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn apply_only_touches_present_fields() {
        let handle = SchedulerHandle::default();
        handle.apply(&ConfigUpdate {
            enabled: Some(true),
            batch_size: Some(5),
            ..Default::default()
        });
        assert!(handle.enabled());
        let config = handle.snapshot();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.parallelism, 10);
        assert_eq!(config.strategy, TagStrategy::Relation);
    }

    #[test]
    fn strategy_flag_round_trips() {
        let handle = SchedulerHandle::default();
        handle.set_strategy(TagStrategy::Inline);
        assert_eq!(handle.strategy(), TagStrategy::Inline);
        handle.set_strategy(TagStrategy::Relation);
        assert_eq!(handle.strategy(), TagStrategy::Relation);
    }

    #[test]
    fn config_update_json_shape() {
        let update = ConfigUpdate {
            enabled: Some(true),
            strategy: Some(TagStrategy::Inline),
            ..Default::default()
        };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"enabled":true,"strategy":"inline"}"#);

        let parsed: ConfigUpdate = serde_json::from_str(r#"{"parallelism":3}"#).unwrap();
        assert_eq!(parsed.parallelism, Some(3));
        assert!(parsed.enabled.is_none());
    }
}
