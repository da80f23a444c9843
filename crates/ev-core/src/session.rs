//! Load lifecycle: one active source set at a time

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info};

use crate::catalog::StreamCatalog;
use crate::data::BackendOpener;
use crate::navigation::{CursorError, EntryCursor, SeekReport};
use crate::sources::{BackendHandles, OpenError, SourceSet};
use crate::state::StateStore;

struct Loaded {
    cursor: EntryCursor,
    catalog: StreamCatalog,
    paths: Vec<PathBuf>,
}

/// Owns the current load and mirrors its IO state into the state store
/// under `["io", ...]`.
pub struct Session {
    state: Arc<StateStore>,
    openers: Vec<Box<dyn BackendOpener>>,
    loaded: Option<Loaded>,
}

impl Session {
    pub fn new(state: Arc<StateStore>, openers: Vec<Box<dyn BackendOpener>>) -> Self {
        Self {
            state,
            openers,
            loaded: None,
        }
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Replace the current load with `paths`.
    ///
    /// The previous backends are closed before the new files are opened,
    /// and stay closed if the new load fails.
    pub fn load(&mut self, paths: &[PathBuf]) -> Result<&StreamCatalog, OpenError> {
        self.loaded = None;

        let opened = SourceSet::open(paths, &self.openers).and_then(|sources| {
            let catalog = sources.build_catalog();
            let cursor = EntryCursor::new(sources)?;
            Ok((cursor, catalog))
        });
        let (cursor, catalog) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                error!("Error loading files: {}", e);
                self.clear_io();
                return Err(e);
            }
        };

        self.publish(&cursor, &catalog);
        info!(
            "Loaded {} files: {} entries from '{}', {} streams",
            paths.len(),
            cursor.total_entries(),
            cursor.canonical().backend_id,
            catalog.len()
        );

        let loaded = self.loaded.insert(Loaded {
            cursor,
            catalog,
            paths: paths.to_vec(),
        });
        Ok(&loaded.catalog)
    }

    fn publish(&self, cursor: &EntryCursor, catalog: &StreamCatalog) {
        let counts: Map<String, Value> = cursor
            .sources()
            .entry_counts()
            .into_iter()
            .map(|(id, count)| (id, Value::from(count)))
            .collect();
        for (id, count) in &counts {
            info!("{}: {} entries", id, count);
        }

        self.state.set(&["io", "nentries"], Value::Object(counts));
        self.state.set(&["io", "available_streams"], catalog.names());
        self.state
            .set(&["io", "canonical_backend"], cursor.canonical().backend_id.as_str());
        self.state.set(&["io", "total_entries"], cursor.total_entries());
        self.state.set(&["io", "current_entry"], -1);
    }

    /// Release the current load
    pub fn unload(&mut self) {
        if self.loaded.take().is_some() {
            self.clear_io();
        }
    }

    /// Reset every `io` key to its unloaded value
    fn clear_io(&self) {
        self.state.set(&["io", "nentries"], Value::Object(Map::new()));
        self.state.set(&["io", "available_streams"], Value::Array(Vec::new()));
        self.state.set(&["io", "canonical_backend"], Value::Null);
        self.state.set(&["io", "total_entries"], 0);
        self.state.set(&["io", "current_entry"], -1);
    }

    pub fn seek(&mut self, entry: i64) -> Result<SeekReport, CursorError> {
        self.move_cursor(|cursor| cursor.seek(entry))
    }

    pub fn next(&mut self) -> Result<SeekReport, CursorError> {
        self.move_cursor(EntryCursor::next)
    }

    pub fn previous(&mut self) -> Result<SeekReport, CursorError> {
        self.move_cursor(EntryCursor::previous)
    }

    fn move_cursor<F>(&mut self, step: F) -> Result<SeekReport, CursorError>
    where
        F: FnOnce(&mut EntryCursor) -> Result<SeekReport, CursorError>,
    {
        let loaded = self.loaded.as_mut().ok_or(CursorError::NotLoaded)?;
        let report = step(&mut loaded.cursor).map_err(|e| {
            error!("{}", e);
            e
        })?;
        self.state.set(&["io", "current_entry"], report.entry);
        Ok(report)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn catalog(&self) -> Option<&StreamCatalog> {
        self.loaded.as_ref().map(|l| &l.catalog)
    }

    pub fn cursor(&self) -> Option<&EntryCursor> {
        self.loaded.as_ref().map(|l| &l.cursor)
    }

    pub fn handles(&self) -> Option<BackendHandles<'_>> {
        self.cursor().map(EntryCursor::handles)
    }

    pub fn paths(&self) -> &[PathBuf] {
        self.loaded.as_ref().map(|l| l.paths.as_slice()).unwrap_or(&[])
    }

    pub fn current_entry(&self) -> Option<usize> {
        self.cursor().and_then(EntryCursor::current_entry)
    }

    pub fn total_entries(&self) -> usize {
        self.cursor().map(EntryCursor::total_entries).unwrap_or(0)
    }
}
