//! # dispatchq
//!
//! Priority request queue for crawlers and other fetch pipelines.
//!
//! Two interchangeable backends share one contract ([`queue::RequestQueue`]):
//! an in-process heap for single-process runs, and a Postgres-backed queue
//! that many producers and consumers share, with optional fingerprint dedupe
//! and lease-based delivery that survives consumer crashes.

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod model;
pub mod queue;
pub mod telemetry;
