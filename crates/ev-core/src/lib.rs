//! Core coordination layer for the event display
//!
//! This crate provides the backend contract, the synchronized entry cursor,
//! the stream catalog and the observable state store shared by every
//! other part of the viewer.

pub mod catalog;
pub mod data;
pub mod navigation;
pub mod session;
pub mod sources;
pub mod state;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export commonly used types
pub use catalog::StreamCatalog;
pub use data::{
    Backend, BackendError, BackendKind, BackendOpener, StreamData, StreamDescriptor,
};
pub use navigation::{CanonicalEntries, CursorError, EntryCursor, SeekReport};
pub use session::Session;
pub use sources::{BackendHandles, OpenError, SourceSet};
pub use state::{StateCallback, StateStore, Subscription};
