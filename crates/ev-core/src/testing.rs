//! In-memory backends for tests

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::data::{Backend, BackendError, BackendKind, BackendOpener, StreamData, StreamDescriptor};

/// Scriptable backend that records every seek it receives
#[derive(Clone)]
pub struct MockBackend {
    id: String,
    kind: BackendKind,
    entries: usize,
    streams: IndexMap<StreamDescriptor, Vec<Value>>,
    failing_seeks: BTreeSet<usize>,
    failing_listing: bool,
    seeks: Arc<Mutex<Vec<usize>>>,
    closed: Arc<AtomicBool>,
}

impl MockBackend {
    pub fn new(id: &str, kind: BackendKind, entries: usize) -> Self {
        Self {
            id: id.to_string(),
            kind,
            entries,
            streams: IndexMap::new(),
            failing_seeks: BTreeSet::new(),
            failing_listing: false,
            seeks: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_stream(mut self, category: &str, name: &str, records: Vec<Value>) -> Self {
        self.streams
            .insert(StreamDescriptor::new(category, name), records);
        self
    }

    /// Make `seek(entry)` fail for the given entry
    pub fn failing_seek_at(mut self, entry: usize) -> Self {
        self.failing_seeks.insert(entry);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }

    /// Shared log of every entry passed to `seek`
    pub fn seek_log(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.seeks)
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl Backend for MockBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn entry_count(&self) -> usize {
        self.entries
    }

    fn seek(&mut self, entry: usize) -> Result<(), BackendError> {
        self.seeks.lock().push(entry);
        if self.failing_seeks.contains(&entry) || entry >= self.entries {
            return Err(BackendError::Seek {
                entry,
                reason: format!("mock backend '{}' refused", self.id),
            });
        }
        Ok(())
    }

    fn list_streams(&self) -> Result<Vec<StreamDescriptor>, BackendError> {
        if self.failing_listing {
            return Err(BackendError::Listing("mock listing failure".to_string()));
        }
        Ok(self.streams.keys().cloned().collect())
    }

    fn get_stream(&self, descriptor: &StreamDescriptor) -> Result<StreamData, BackendError> {
        let records = self
            .streams
            .get(descriptor)
            .ok_or_else(|| BackendError::StreamNotFound(descriptor.clone()))?;
        Ok(StreamData {
            descriptor: descriptor.clone(),
            backend_id: self.id.clone(),
            records: records.clone(),
        })
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

enum OpenerMode {
    Attach(MockBackend),
    Nothing,
    Fail,
}

/// Opener that hands out a clone of a prepared backend
pub struct MockOpener {
    kind: BackendKind,
    mode: OpenerMode,
}

impl MockOpener {
    pub fn new(backend: MockBackend) -> Self {
        Self {
            kind: backend.kind,
            mode: OpenerMode::Attach(backend),
        }
    }

    /// Opener that finds no files in its format
    pub fn nothing(kind: BackendKind) -> Self {
        Self {
            kind,
            mode: OpenerMode::Nothing,
        }
    }

    pub fn failing(kind: BackendKind) -> Self {
        Self {
            kind,
            mode: OpenerMode::Fail,
        }
    }
}

impl BackendOpener for MockOpener {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn open(&self, paths: &[PathBuf]) -> Result<Option<Box<dyn Backend>>, BackendError> {
        match &self.mode {
            OpenerMode::Attach(backend) => Ok(Some(Box::new(backend.clone()))),
            OpenerMode::Nothing => Ok(None),
            OpenerMode::Fail => Err(BackendError::format(
                self.kind,
                paths.first().map(PathBuf::as_path).unwrap_or_else(|| Path::new("<none>")),
                "mock opener failure",
            )),
        }
    }
}
