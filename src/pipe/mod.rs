//! Output sink for finished entities and patches
//!
//! The pipe is append-only: each call hands over one complete entity or one
//! patch. Implementations serialize writes behind a single lock, so two writes
//! for the same entity land in call order.

mod jsonl;

pub use jsonl::{read_records, JsonlPipe};

use crate::model::{EntityId, KanbanBoard, Patch, Sprint, User};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// One unit written to the pipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Record {
    Sprint(Sprint),
    KanbanBoard(KanbanBoard),
    User(User),
    Update(Patch),
}

impl Record {
    /// Id of the entity this record creates or modifies
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Record::Sprint(s) => &s.id,
            Record::KanbanBoard(b) => &b.id,
            Record::User(u) => &u.id,
            Record::Update(p) => &p.id,
        }
    }
}

/// Append-only sink
pub trait Pipe: Send + Sync {
    /// A record is durable once this returns Ok
    fn write(&self, record: Record) -> Result<()>;

    /// Flush buffered writes; a no-op for unbuffered sinks
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory pipe that keeps every record in write order
#[derive(Debug, Default)]
pub struct MemoryPipe {
    written: Mutex<Vec<Record>>,
}

impl MemoryPipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn records(&self) -> Vec<Record> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sprints(&self) -> Vec<Sprint> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Sprint(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn kanban_boards(&self) -> Vec<KanbanBoard> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::KanbanBoard(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<Patch> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Update(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

impl Pipe for MemoryPipe {
    fn write(&self, record: Record) -> Result<()> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }
}
