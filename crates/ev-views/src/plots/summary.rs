//! Per-entry overview of every cataloged stream

use ev_core::{BackendError, BackendHandles, StreamCatalog, StreamDescriptor};
use serde_json::{json, Value};

use crate::plotter::{option_or, OptionMap, OptionSpec, Plotter, Renderable};

/// Table of record counts for the current entry
pub struct EntrySummaryPlotter {
    streams: Vec<StreamDescriptor>,
}

impl EntrySummaryPlotter {
    pub const NAME: &'static str = "entry_summary";

    /// Summarize every stream of `catalog`, in catalog order
    pub fn new(catalog: &StreamCatalog) -> Self {
        Self {
            streams: catalog.iter().cloned().collect(),
        }
    }
}

impl Plotter for EntrySummaryPlotter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Record counts per stream"
    }

    fn is_applicable(&self, catalog: &StreamCatalog) -> anyhow::Result<bool> {
        Ok(!catalog.is_empty())
    }

    fn option_schema(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::new(
            "include_empty",
            false,
            "List streams without records in this entry",
        )]
    }

    fn make_traces(
        &self,
        handles: &BackendHandles<'_>,
        options: &OptionMap,
    ) -> anyhow::Result<Vec<Renderable>> {
        let include_empty: bool = option_or(options, "include_empty", false);

        let mut rows = Vec::new();
        for descriptor in &self.streams {
            let (backend, count) = match handles.get_stream(descriptor) {
                Ok(data) => {
                    let count = data.len();
                    (Value::String(data.backend_id), count)
                }
                Err(BackendError::StreamNotFound(_)) => (Value::Null, 0),
                Err(e) => return Err(e.into()),
            };
            if count == 0 && !include_empty {
                continue;
            }
            rows.push(json!({
                "stream": descriptor.to_string(),
                "backend": backend,
                "records": count,
            }));
        }

        let entry = handles.current_entry().map_or(Value::Null, Value::from);
        Ok(vec![Renderable::new()
            .named("Entry summary")
            .with("type", "table")
            .with("entry", entry)
            .with("rows", rows)])
    }
}
