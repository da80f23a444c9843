//! Entry cursor implementation

use std::collections::BTreeSet;

use tracing::{debug, error};

use super::{select_canonical, CanonicalEntries, CursorError, SeekReport};
use crate::sources::{BackendHandles, OpenError, SourceSet};

/// One "current entry" shared by every backend of a load.
///
/// The cursor owns its source set; replacing the cursor on reload releases
/// the previous backends.
pub struct EntryCursor {
    sources: SourceSet,
    canonical: CanonicalEntries,
    current: Option<usize>,
}

impl EntryCursor {
    /// Create an unpositioned cursor over `sources`
    pub fn new(sources: SourceSet) -> Result<Self, OpenError> {
        let canonical = select_canonical(&sources).ok_or(OpenError::NoUsableBackend)?;
        debug!(
            "Canonical entry count {} from backend '{}'",
            canonical.count, canonical.backend_id
        );
        Ok(Self {
            sources,
            canonical,
            current: None,
        })
    }

    pub fn canonical(&self) -> &CanonicalEntries {
        &self.canonical
    }

    pub fn total_entries(&self) -> usize {
        self.canonical.count
    }

    /// Current entry, `None` until the first successful seek
    pub fn current_entry(&self) -> Option<usize> {
        self.current
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// View of the backends positioned on the current entry
    pub fn handles(&self) -> BackendHandles<'_> {
        BackendHandles::new(&self.sources, self.current)
    }

    /// Move every backend to `entry`.
    ///
    /// Out-of-range entries are rejected before any backend is touched.
    /// Otherwise every backend is asked to follow independently, and the
    /// cursor moves even if some of them fail; their ids are reported.
    pub fn seek(&mut self, entry: i64) -> Result<SeekReport, CursorError> {
        let count = self.canonical.count;
        let index = usize::try_from(entry)
            .ok()
            .filter(|idx| *idx < count)
            .ok_or(CursorError::EntryOutOfRange { entry, count })?;

        let mut failed = BTreeSet::new();
        for backend in self.sources.backends_mut() {
            if let Err(e) = backend.seek(index) {
                error!("Error reading {} entry {}: {}", backend.id(), index, e);
                failed.insert(backend.id().to_string());
            }
        }

        self.current = Some(index);
        Ok(SeekReport {
            entry: index,
            failed,
        })
    }

    /// Step forward one entry (entry 0 when unpositioned)
    pub fn next(&mut self) -> Result<SeekReport, CursorError> {
        let target = self.current.map(|idx| idx as i64 + 1).unwrap_or(0);
        self.seek(target)
    }

    /// Step back one entry (entry 0 when unpositioned)
    pub fn previous(&mut self) -> Result<SeekReport, CursorError> {
        let target = self.current.map(|idx| idx as i64 - 1).unwrap_or(0);
        self.seek(target)
    }
}
