//! The set of backends attached for one load

use std::path::PathBuf;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::catalog::StreamCatalog;
use crate::data::{Backend, BackendError, BackendOpener, StreamData, StreamDescriptor};
use crate::navigation::select_canonical;

/// Errors that abort a load
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("file path does not exist: {0}")]
    MissingPath(PathBuf),

    #[error("no backend reported a nonzero entry count")]
    NoUsableBackend,
}

/// Owns every backend attached for one load.
///
/// Backends are kept in priority order. Dropping the set closes them.
pub struct SourceSet {
    backends: Vec<Box<dyn Backend>>,
}

impl SourceSet {
    /// Attach `paths` with every opener.
    ///
    /// An opener that finds nothing in its format, or fails, leaves its kind
    /// unattached. The load fails only when a path is missing or when no
    /// attached backend has entries.
    pub fn open(paths: &[PathBuf], openers: &[Box<dyn BackendOpener>]) -> Result<Self, OpenError> {
        if let Some(missing) = paths.iter().find(|p| !p.exists()) {
            error!("File path does not exist: {}", missing.display());
            return Err(OpenError::MissingPath(missing.clone()));
        }

        let mut ordered: Vec<&dyn BackendOpener> = openers.iter().map(|o| o.as_ref()).collect();
        ordered.sort_by_key(|o| o.kind().priority());

        let mut backends = Vec::new();
        for opener in ordered {
            match opener.open(paths) {
                Ok(Some(backend)) => {
                    info!(
                        "Attached {} backend '{}' with {} entries",
                        backend.kind(),
                        backend.id(),
                        backend.entry_count()
                    );
                    backends.push(backend);
                }
                Ok(None) => debug!("No {} inputs among {} paths", opener.kind(), paths.len()),
                Err(e) => warn!("Leaving {} backend unattached: {}", opener.kind(), e),
            }
        }

        Self::from_backends(backends)
    }

    /// Wrap already-opened backends
    pub fn from_backends(mut backends: Vec<Box<dyn Backend>>) -> Result<Self, OpenError> {
        backends.sort_by_key(|b| b.kind().priority());
        let set = Self { backends };
        if select_canonical(&set).is_none() {
            return Err(OpenError::NoUsableBackend);
        }
        Ok(set)
    }

    /// Union of every backend's streams.
    ///
    /// A backend that fails to list contributes nothing.
    pub fn build_catalog(&self) -> StreamCatalog {
        let listings = self.backends.iter().map(|backend| {
            let streams = match backend.list_streams() {
                Ok(streams) => streams,
                Err(e) => {
                    error!("Error listing streams of backend '{}': {}", backend.id(), e);
                    Vec::new()
                }
            };
            (backend.id().to_string(), streams)
        });
        StreamCatalog::from_listings(listings)
    }

    pub fn backends(&self) -> impl Iterator<Item = &dyn Backend> {
        self.backends.iter().map(|b| b.as_ref())
    }

    pub(crate) fn backends_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Backend>> {
        self.backends.iter_mut()
    }

    pub fn backend(&self, id: &str) -> Option<&dyn Backend> {
        self.backends().find(|b| b.id() == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.id().to_string()).collect()
    }

    /// Entry count reported by each backend, in priority order
    pub fn entry_counts(&self) -> IndexMap<String, usize> {
        self.backends
            .iter()
            .map(|b| (b.id().to_string(), b.entry_count()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl Drop for SourceSet {
    fn drop(&mut self) {
        for backend in &mut self.backends {
            debug!("Closing backend '{}'", backend.id());
            backend.close();
        }
    }
}

/// Read-only view of the attached backends handed to plotters
#[derive(Clone, Copy)]
pub struct BackendHandles<'a> {
    sources: &'a SourceSet,
    entry: Option<usize>,
}

impl<'a> BackendHandles<'a> {
    pub fn new(sources: &'a SourceSet, entry: Option<usize>) -> Self {
        Self { sources, entry }
    }

    /// Entry the backends are positioned on, if any
    pub fn current_entry(&self) -> Option<usize> {
        self.entry
    }

    pub fn backend(&self, id: &str) -> Option<&'a dyn Backend> {
        self.sources.backend(id)
    }

    pub fn backends(&self) -> impl Iterator<Item = &'a dyn Backend> {
        self.sources.backends()
    }

    /// Records of `descriptor` from the highest-priority backend exposing it
    pub fn get_stream(&self, descriptor: &StreamDescriptor) -> Result<StreamData, BackendError> {
        for backend in self.sources.backends() {
            match backend.get_stream(descriptor) {
                Ok(data) => return Ok(data),
                Err(BackendError::StreamNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(BackendError::StreamNotFound(descriptor.clone()))
    }
}
