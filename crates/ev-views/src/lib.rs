//! Plotters and the registry that dispatches them

pub mod plots;
mod plotter;
mod registry;

pub use plotter::{option_or, OptionMap, OptionSpec, Plotter, Renderable, StreamRequirement};
pub use plots::{EntrySummaryPlotter, StreamMarkersPlotter};
pub use registry::{DispatchError, DispatchReport, OptionOverrides, PlotterInfo, PlotterRegistry};
