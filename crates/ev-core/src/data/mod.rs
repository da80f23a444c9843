//! Backend contract for per-event data readers

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised by a single backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot read {path} as {kind}: {reason}")]
    Format {
        kind: BackendKind,
        path: PathBuf,
        reason: String,
    },

    #[error("seek to entry {entry} failed: {reason}")]
    Seek { entry: usize, reason: String },

    #[error("stream {0} not found")]
    StreamNotFound(StreamDescriptor),

    #[error("listing streams failed: {0}")]
    Listing(String),
}

impl BackendError {
    pub fn format(kind: BackendKind, path: &Path, reason: impl fmt::Display) -> Self {
        BackendError::Format {
            kind,
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Families of backends, declared in canonical-count priority order.
///
/// Richer, primary formats come first so that when backends disagree on the
/// number of entries the canonical count follows the source whose streams
/// drive plotter applicability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Columnar image store keyed by event
    ImageStore,
    /// Event-record store (one record collection per product per event)
    EventRecord,
    /// Secondary trees of derived reconstruction metadata
    DerivedTree,
    /// Flat ntuple-style trees, one row per event
    Ntuple,
}

impl BackendKind {
    pub const PRIORITY: [BackendKind; 4] = [
        BackendKind::ImageStore,
        BackendKind::EventRecord,
        BackendKind::DerivedTree,
        BackendKind::Ntuple,
    ];

    /// Position in the priority order; lower wins
    pub fn priority(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::ImageStore => "image_store",
            BackendKind::EventRecord => "event_record",
            BackendKind::DerivedTree => "derived_tree",
            BackendKind::Ntuple => "ntuple",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized identity of one queryable stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub category: String,
    pub name: String,
}

impl StreamDescriptor {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Parse either `category:name` or the tree-key form `category_name_tree`.
    ///
    /// In the tree-key form the category is everything before the first
    /// underscore, so producer names may themselves contain underscores.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some((category, name)) = raw.split_once(':') {
            if category.is_empty() || name.is_empty() {
                return None;
            }
            return Some(Self::new(category, name));
        }

        let stem = raw.strip_suffix("_tree")?;
        let (category, name) = stem.split_once('_')?;
        if category.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(category, name))
    }

    /// Tree-key form of this descriptor
    pub fn tree_key(&self) -> String {
        format!("{}_{}_tree", self.category, self.name)
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.name)
    }
}

/// Records of one stream for the current entry.
///
/// The core never interprets the records; they are forwarded to plotters.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamData {
    pub descriptor: StreamDescriptor,
    pub backend_id: String,
    pub records: Vec<Value>,
}

impl StreamData {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One opened per-event data reader
pub trait Backend: Send {
    /// Stable identifier, unique within a source set
    fn id(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Number of entries; zero when the backend is unusable
    fn entry_count(&self) -> usize;

    /// Position the backend on `entry`
    fn seek(&mut self, entry: usize) -> Result<(), BackendError>;

    fn list_streams(&self) -> Result<Vec<StreamDescriptor>, BackendError>;

    /// Records of one stream at the current entry
    fn get_stream(&self, descriptor: &StreamDescriptor) -> Result<StreamData, BackendError>;

    /// Release any held resources. Called exactly once when the owning
    /// source set is dropped.
    fn close(&mut self) {}
}

/// Factory that attaches one backend kind to a list of input paths
pub trait BackendOpener: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Attach every path this kind understands.
    ///
    /// Returns `Ok(None)` when none of the paths are in this kind's format.
    fn open(&self, paths: &[PathBuf]) -> Result<Option<Box<dyn Backend>>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colon_form() {
        let desc = StreamDescriptor::parse("track:trackreco").unwrap();
        assert_eq!(desc, StreamDescriptor::new("track", "trackreco"));
        assert_eq!(desc.to_string(), "track:trackreco");
    }

    #[test]
    fn test_parse_tree_key_form() {
        let desc = StreamDescriptor::parse("opflash_simpleFlash_Beam_tree").unwrap();
        assert_eq!(desc.category, "opflash");
        assert_eq!(desc.name, "simpleFlash_Beam");
        assert_eq!(desc.tree_key(), "opflash_simpleFlash_Beam_tree");
    }

    #[test]
    fn test_parse_rejects_unknown_forms() {
        assert!(StreamDescriptor::parse("EventTree").is_none());
        assert!(StreamDescriptor::parse(":name").is_none());
        assert!(StreamDescriptor::parse("_tree").is_none());
    }

    #[test]
    fn test_priority_order() {
        let mut kinds = vec![
            BackendKind::Ntuple,
            BackendKind::ImageStore,
            BackendKind::DerivedTree,
            BackendKind::EventRecord,
        ];
        kinds.sort_by_key(|k| k.priority());
        assert_eq!(kinds, BackendKind::PRIORITY.to_vec());
    }
}
