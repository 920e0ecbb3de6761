//! agilesync - JIRA Agile boards, sprints and backlogs as a normalized work model
//!
//! Two paths feed the same output sink:
//!
//! - a **bulk sync** that pages through every board, builds kanban boards and
//!   sprints, and remembers which closed sprints it already emitted
//! - a **webhook processor** that turns single deliveries into minimal patches
//!   against entities emitted earlier
//!
//! # Architecture
//!
//! - **agile**: Agile REST client, paginated fetchers, mapper, aggregator
//! - **webhook**: Payload views, delta processor, axum receiver
//! - **model**: Entities, deterministic ids, dates and patches
//! - **pipe**: Append-only output sink (JSON Lines, in-memory)
//! - **state**: Durable key/value markers (SQLite, in-memory)
//! - **config**: YAML configuration and validation

pub mod agile;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pipe;
pub mod state;
pub mod webhook;

// Re-exports
pub use error::{AgileSyncError, Result};
