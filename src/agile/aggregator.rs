//! Board and sprint aggregation
//!
//! A bulk sync runs in two phases on one bounded pool:
//!
//! 1. Page through every board. Scrum boards contribute their sprint ids to
//!    the tracker's shared set; every other board is built into a kanban
//!    board and written to the pipe by its own task.
//! 2. After phase 1 has fully joined, build and write one sprint per unique
//!    sprint id.
//!
//! The first task error fails the sync. Tasks already submitted run to
//! completion; phase 2 is never started after a phase 1 failure.

use super::client::{AgileApi, Credentials, JiraAgileClient};
use super::fetch::{BoardIssueKind, Fetcher, DEFAULT_PAGE_SIZE};
use super::mapper::{build_kanban_board, build_sprint, MapContext};
use super::pool::{WorkerPool, DEFAULT_CONCURRENCY};
use super::retry::RetryConfig;
use super::tracker::SprintTracker;
use super::types::RawBoard;
use crate::error::ResultExt;
use crate::metrics;
use crate::model::SprintStatus;
use crate::pipe::{Pipe, Record};
use crate::state::StateStore;
use crate::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info};

/// Everything a bulk sync needs besides its sinks
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub api_url: String,
    /// Base for entity URLs; falls back to `api_url` when empty
    pub website_url: String,
    pub credentials: Credentials,
    /// Re-emit closed sprints even when a marker exists
    pub historical: bool,
    pub concurrency: usize,
    pub page_size: u64,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub retry: RetryConfig,
}

impl SyncOptions {
    pub fn new(
        api_url: impl Into<String>,
        customer_id: impl Into<String>,
        integration_instance_id: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            website_url: String::new(),
            credentials: Credentials::None,
            historical: false,
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            customer_id: customer_id.into(),
            integration_instance_id: integration_instance_id.into(),
            retry: RetryConfig::default(),
        }
    }

    fn map_context(&self) -> MapContext {
        let website_url = if self.website_url.is_empty() {
            self.api_url.clone()
        } else {
            self.website_url.clone()
        };
        MapContext {
            customer_id: self.customer_id.clone(),
            integration_instance_id: self.integration_instance_id.clone(),
            website_url,
        }
    }
}

/// Counts from one bulk sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub boards: usize,
    pub kanban_boards: usize,
    pub sprints: usize,
    pub sprints_skipped: usize,
    pub issues_unmapped: usize,
}

#[derive(Default)]
struct Counters {
    boards: AtomicUsize,
    kanban_boards: AtomicUsize,
    sprints: AtomicUsize,
    sprints_skipped: AtomicUsize,
    issues_unmapped: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> SyncStats {
        SyncStats {
            boards: self.boards.load(Ordering::Relaxed),
            kanban_boards: self.kanban_boards.load(Ordering::Relaxed),
            sprints: self.sprints.load(Ordering::Relaxed),
            sprints_skipped: self.sprints_skipped.load(Ordering::Relaxed),
            issues_unmapped: self.issues_unmapped.load(Ordering::Relaxed),
        }
    }
}

/// State shared by every task of one run
struct Run {
    fetcher: Fetcher,
    pipe: Arc<dyn Pipe>,
    tracker: SprintTracker,
    ctx: MapContext,
    /// Board id to project key, for sprint URLs
    board_keys: Mutex<HashMap<i64, String>>,
    counters: Counters,
}

/// Drives a bulk sync against an [`AgileApi`]
pub struct AgileAggregator {
    api: Arc<dyn AgileApi>,
    pipe: Arc<dyn Pipe>,
    store: Arc<dyn StateStore>,
    ctx: MapContext,
    historical: bool,
    concurrency: usize,
    page_size: u64,
}

impl AgileAggregator {
    pub fn new(
        api: Arc<dyn AgileApi>,
        pipe: Arc<dyn Pipe>,
        store: Arc<dyn StateStore>,
        ctx: MapContext,
    ) -> Self {
        Self {
            api,
            pipe,
            store,
            ctx,
            historical: false,
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_historical(mut self, historical: bool) -> Self {
        self.historical = historical;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Run one bulk sync
    pub async fn sync(&self) -> Result<SyncStats> {
        let started = Instant::now();
        info!(
            customer = %self.ctx.customer_id,
            historical = self.historical,
            concurrency = self.concurrency,
            "Starting agile sync"
        );

        let run = Arc::new(Run {
            fetcher: Fetcher::new(Arc::clone(&self.api), self.ctx.customer_id.clone())
                .with_page_size(self.page_size),
            pipe: Arc::clone(&self.pipe),
            tracker: SprintTracker::new(Arc::clone(&self.store), self.historical),
            ctx: self.ctx.clone(),
            board_keys: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        });

        let result = Self::run_phases(&run, self.concurrency).await;
        let flushed = self.pipe.flush();
        let stats = run.counters.snapshot();
        let elapsed = started.elapsed();
        let result = result.and(flushed);
        metrics::record_sync(self.historical, elapsed.as_secs_f64(), result.is_ok());

        match result {
            Ok(()) => {
                info!(
                    boards = stats.boards,
                    kanban_boards = stats.kanban_boards,
                    sprints = stats.sprints,
                    sprints_skipped = stats.sprints_skipped,
                    issues_unmapped = stats.issues_unmapped,
                    duration_ms = elapsed.as_millis() as u64,
                    "Agile sync complete"
                );
                Ok(stats)
            }
            Err(e) => {
                error!(error = %e, duration_ms = elapsed.as_millis() as u64, "Agile sync failed");
                Err(e)
            }
        }
    }

    async fn run_phases(run: &Arc<Run>, concurrency: usize) -> Result<()> {
        let mut pool = WorkerPool::new(concurrency);

        // a listing failure still waits for the boards already submitted
        let listed = Self::submit_boards(run, &mut pool).await;
        let joined = pool.join().await;
        listed?;
        joined?;

        let sprint_ids = run.tracker.claimed();
        info!(count = sprint_ids.len(), "Fetching sprints");
        for sprint_id in sprint_ids {
            let run = Arc::clone(run);
            pool.submit(async move { run.process_sprint(sprint_id).await });
        }
        pool.join().await
    }

    async fn submit_boards(run: &Arc<Run>, pool: &mut WorkerPool) -> Result<()> {
        let mut start_at = 0;
        loop {
            let page = run.fetcher.fetch_boards_page(start_at).await?;
            let fetched = page.values.len() as u64;

            for board in page.values {
                run.board_keys
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(board.id, board.location.project_key.clone());
                run.counters.boards.fetch_add(1, Ordering::Relaxed);

                let run = Arc::clone(run);
                pool.submit(async move { run.process_board(board).await });
            }

            if page.is_last || fetched == 0 {
                break;
            }
            start_at += fetched;
        }
        debug!(boards = run.counters.boards.load(Ordering::Relaxed), "Fetched agile boards");
        Ok(())
    }
}

impl Run {
    async fn process_board(&self, board: RawBoard) -> Result<()> {
        if board.is_scrum() {
            self.discover_sprints(&board).await
        } else {
            self.emit_kanban_board(&board).await
        }
    }

    async fn discover_sprints(&self, board: &RawBoard) -> Result<()> {
        let context = || format!("error fetching sprints for board id {}", board.id);
        let summaries = self
            .fetcher
            .fetch_sprint_summaries(board.id)
            .await
            .with_context(context)?;

        for summary in &summaries {
            if self.tracker.should_skip(summary).with_context(context)? {
                self.counters.sprints_skipped.fetch_add(1, Ordering::Relaxed);
                metrics::record_sprint_skipped();
                continue;
            }
            self.tracker.claim(summary.id);
        }
        Ok(())
    }

    async fn emit_kanban_board(&self, board: &RawBoard) -> Result<()> {
        let columns = self.fetcher.fetch_board_columns(board.id).await?;
        let issues = self
            .fetcher
            .fetch_board_issues(board.id, BoardIssueKind::Issue)
            .await
            .with_context(|| format!("error fetching kanban issues for board id {}", board.id))?;

        let (kanban, unmapped) = build_kanban_board(&self.ctx, board, &columns, &issues);
        self.counters
            .issues_unmapped
            .fetch_add(unmapped, Ordering::Relaxed);
        metrics::record_unmapped_issues(unmapped);

        self.pipe
            .write(Record::KanbanBoard(kanban))
            .with_context(|| format!("error writing kanban board {} to pipe", board.id))?;
        metrics::record_written("kanban_board");
        self.counters.kanban_boards.fetch_add(1, Ordering::Relaxed);
        debug!(board = board.id, issues = issues.len(), "Wrote kanban board");
        Ok(())
    }

    async fn process_sprint(&self, sprint_id: i64) -> Result<()> {
        let started = Instant::now();
        let raw = self.fetcher.fetch_sprint(sprint_id).await?;
        let status = SprintStatus::parse(&raw.state)
            .with_context(|| format!("error mapping sprint {}", sprint_id))?;
        let issues = self.fetcher.fetch_sprint_issues(sprint_id).await?;

        let backlog = if status.is_closed() {
            None
        } else {
            let backlog = self
                .fetcher
                .fetch_board_issues(raw.origin_board_id, BoardIssueKind::Backlog)
                .await
                .with_context(|| format!("error fetching the sprint {} backlog", sprint_id))?;
            Some(backlog)
        };

        let project_key = self
            .board_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&raw.origin_board_id)
            .cloned()
            .unwrap_or_default();

        let sprint = build_sprint(
            &self.ctx,
            sprint_id,
            &raw,
            &issues,
            backlog.as_deref(),
            &project_key,
        )
        .with_context(|| format!("error mapping sprint {}", sprint_id))?;

        // marker first: a crash before the write leaves the sprint unsynced
        self.tracker
            .mark_synced(sprint_id, status)
            .with_context(|| "error writing sprint key to state")?;
        self.pipe
            .write(Record::Sprint(sprint))
            .with_context(|| "error writing sprint to pipe")?;
        metrics::record_written("sprint");
        self.counters.sprints.fetch_add(1, Ordering::Relaxed);

        info!(
            sprint = sprint_id,
            status = %status,
            issues = issues.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Fetched sprint"
        );
        Ok(())
    }
}

/// Bulk sync against a live JIRA site
pub async fn sync(
    options: &SyncOptions,
    pipe: Arc<dyn Pipe>,
    store: Arc<dyn StateStore>,
) -> Result<SyncStats> {
    let client = JiraAgileClient::new(
        &options.api_url,
        options.credentials.clone(),
        options.retry.clone(),
    )?;
    AgileAggregator::new(Arc::new(client), pipe, store, options.map_context())
        .with_historical(options.historical)
        .with_concurrency(options.concurrency)
        .with_page_size(options.page_size)
        .sync()
        .await
}
