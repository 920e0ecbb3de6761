//! Sprint dedup and incremental skip
//!
//! Two layers: a process-local set so each sprint id is scheduled once even
//! when several boards share it, and a durable `sprint_{id}` marker in the
//! state store recording that the sprint has been emitted.

use super::types::RawSprintSummary;
use crate::model::SprintStatus;
use crate::state::StateStore;
use crate::Result;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub struct SprintTracker {
    store: Arc<dyn StateStore>,
    historical: bool,
    claimed: Mutex<BTreeSet<i64>>,
}

impl SprintTracker {
    pub fn new(store: Arc<dyn StateStore>, historical: bool) -> Self {
        Self {
            store,
            historical,
            claimed: Mutex::new(BTreeSet::new()),
        }
    }

    /// State store key of a sprint's marker
    pub fn state_key(sprint_id: i64) -> String {
        format!("sprint_{}", sprint_id)
    }

    /// True for a closed sprint already emitted by an earlier run.
    ///
    /// Historical runs never skip.
    pub fn should_skip(&self, sprint: &RawSprintSummary) -> Result<bool> {
        if self.historical || !is_closed_state(&sprint.state) {
            return Ok(false);
        }
        if self.store.exists(&Self::state_key(sprint.id))? {
            debug!(sprint = sprint.id, "Skipping sprint since we've already processed it");
            return Ok(true);
        }
        Ok(false)
    }

    /// Record `sprint_id` for this run; false if another board already did
    pub fn claim(&self, sprint_id: i64) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sprint_id)
    }

    /// Every claimed id, ascending
    pub fn claimed(&self) -> Vec<i64> {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Write the marker for an emitted sprint.
    ///
    /// The marker of a closed sprint is left as first written.
    pub fn mark_synced(&self, sprint_id: i64, status: SprintStatus) -> Result<()> {
        let key = Self::state_key(sprint_id);
        if status.is_closed() && self.store.exists(&key)? {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp_millis();
        self.store.set(&key, &now.to_string())
    }
}

/// Summary states are lower-case in practice; compare like the sprint mapper does
fn is_closed_state(state: &str) -> bool {
    SprintStatus::parse(state)
        .map(|s| s.is_closed())
        .unwrap_or(false)
}
