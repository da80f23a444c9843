//! Synchronized entry navigation across a source set

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sources::SourceSet;

mod cursor;

pub use cursor::EntryCursor;

/// Errors surfaced by cursor movement
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("entry {entry} out of bounds (0-{})", .count.saturating_sub(1))]
    EntryOutOfRange { entry: i64, count: usize },

    #[error("no files loaded")]
    NotLoaded,
}

/// The backend whose entry count defines the navigable range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntries {
    pub backend_id: String,
    pub count: usize,
}

/// Outcome of a best-effort seek across every backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekReport {
    pub entry: usize,
    /// Ids of backends that failed to follow the seek
    pub failed: BTreeSet<String>,
}

impl SeekReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// First backend, in priority order, reporting a nonzero entry count
pub(crate) fn select_canonical(sources: &SourceSet) -> Option<CanonicalEntries> {
    sources.backends().find_map(|backend| {
        let count = backend.entry_count();
        (count != 0).then(|| CanonicalEntries {
            backend_id: backend.id().to_string(),
            count,
        })
    })
}
