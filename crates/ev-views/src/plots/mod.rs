//! Built-in plotters

pub mod markers;
pub mod summary;

pub use markers::StreamMarkersPlotter;
pub use summary::EntrySummaryPlotter;
