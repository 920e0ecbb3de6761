//! Bulk sync of boards, sprints and backlogs from the JIRA Agile API
//!
//! # Overview
//!
//! - [`client`]: the [`AgileApi`] seam and its reqwest implementation
//! - [`fetch`]: paginated walkers, one per endpoint
//! - [`mapper`]: pure assembly of kanban boards and sprints
//! - [`tracker`]: per-run sprint dedup and durable sync markers
//! - [`pool`]: the bounded task pool
//! - [`aggregator`]: the two-phase orchestration
//!
//! # Example
//!
//! ```no_run
//! use agilesync::agile::{sync, SyncOptions};
//! use agilesync::pipe::JsonlPipe;
//! use agilesync::state::SqliteStateStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> agilesync::Result<()> {
//! let options = SyncOptions::new("https://acme.atlassian.net", "customer", "instance");
//! let pipe = Arc::new(JsonlPipe::append("agile.jsonl")?);
//! let store = Arc::new(SqliteStateStore::open_path("state.db")?);
//! let stats = sync(&options, pipe, store).await?;
//! println!("{} sprints", stats.sprints);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod client;
pub mod fetch;
pub mod mapper;
pub mod pool;
pub mod retry;
pub mod tracker;
pub mod types;

pub use aggregator::{sync, AgileAggregator, SyncOptions, SyncStats};
pub use client::{AgileApi, Credentials, JiraAgileClient};
pub use fetch::{BoardColumn, BoardIssue, BoardIssueKind, Fetcher, SprintIssue};
pub use mapper::{MapContext, BACKLOG_COLUMN_INDEX};
pub use retry::RetryConfig;
pub use tracker::SprintTracker;
