//! # bookwork
//!
//! Postgres-backed batch processor. Pending books queue up in a shared table
//! and are claimed in disjoint batches via `FOR UPDATE SKIP LOCKED`, enriched
//! with the number of blogs referencing each book's tag (under one of two
//! interchangeable lookup strategies), and committed atomically. A polling
//! scheduler with live-mutable configuration bounds the concurrent workers
//! per tick.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod seed;
pub mod telemetry;
