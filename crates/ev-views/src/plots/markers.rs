//! Point markers for spatial streams

use anyhow::Context;
use ev_core::{BackendHandles, StreamCatalog, StreamDescriptor};
use serde_json::{json, Value};
use tracing::debug;

use crate::plotter::{option_or, OptionMap, OptionSpec, Plotter, Renderable, StreamRequirement};

/// Draws one 3D marker trace per present stream from the `x`/`y`/`z`
/// fields of its records. Records lacking any coordinate are skipped.
pub struct StreamMarkersPlotter {
    name: String,
    description: String,
    streams: Vec<StreamDescriptor>,
}

impl StreamMarkersPlotter {
    pub fn new(name: &str, streams: Vec<StreamDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Markers for {} stream(s)", streams.len()),
            streams,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }
}

#[derive(Debug, Default, PartialEq)]
struct Points {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl Points {
    fn from_records(records: &[Value]) -> Self {
        let mut points = Points::default();
        for record in records {
            let coord = |key: &str| record.get(key).and_then(Value::as_f64);
            if let (Some(x), Some(y), Some(z)) = (coord("x"), coord("y"), coord("z")) {
                points.x.push(x);
                points.y.push(y);
                points.z.push(z);
            }
        }
        points
    }

    fn len(&self) -> usize {
        self.x.len()
    }

    /// Keep every n-th point so that at most `max_points` remain
    fn downsample(self, max_points: usize) -> Self {
        let len = self.len();
        if max_points == 0 || len <= max_points {
            return self;
        }
        let step = len.div_ceil(max_points);
        let pick = |values: Vec<f64>| values.into_iter().step_by(step).collect();
        Points {
            x: pick(self.x),
            y: pick(self.y),
            z: pick(self.z),
        }
    }
}

impl Plotter for StreamMarkersPlotter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_applicable(&self, catalog: &StreamCatalog) -> anyhow::Result<bool> {
        Ok(StreamRequirement::Any(self.streams.clone()).is_satisfied_by(catalog))
    }

    fn option_schema(&self) -> Vec<OptionSpec> {
        vec![
            OptionSpec::new("marker_size", 2, "Marker size in pixels"),
            OptionSpec::new("color", "#1f77b4", "Marker color"),
            OptionSpec::new("max_points", 50_000, "Upper bound on points per trace"),
        ]
    }

    fn make_traces(
        &self,
        handles: &BackendHandles<'_>,
        options: &OptionMap,
    ) -> anyhow::Result<Vec<Renderable>> {
        let size: f64 = option_or(options, "marker_size", 2.0);
        let color: String = option_or(options, "color", "#1f77b4".to_string());
        let max_points: usize = option_or(options, "max_points", 50_000);

        let mut traces = Vec::new();
        for descriptor in &self.streams {
            let data = match handles.get_stream(descriptor) {
                Ok(data) => data,
                Err(ev_core::BackendError::StreamNotFound(_)) => continue,
                Err(e) => return Err(e).with_context(|| format!("reading {}", descriptor)),
            };

            let points = Points::from_records(&data.records);
            let total = points.len();
            let points = points.downsample(max_points);
            debug!("{}: {} of {} points", descriptor, points.len(), total);

            traces.push(
                Renderable::new()
                    .named(descriptor.to_string())
                    .with("type", "scatter3d")
                    .with("mode", "markers")
                    .with("x", points.x)
                    .with("y", points.y)
                    .with("z", points.z)
                    .with("marker", json!({"size": size, "color": color})),
            );
        }
        Ok(traces)
    }
}
