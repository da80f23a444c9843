use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ev_core::{Backend, BackendError, BackendKind, BackendOpener, StreamData, StreamDescriptor};
use indexmap::IndexSet;
use serde_json::{Map, Value};
use tracing::debug;

use super::has_extension;

/// Event-record backend over JSON Lines files.
///
/// Every non-blank line is one entry shaped as
/// `{"<category>": {"<name>": [record, ...]}}`. Files are chained in input
/// order.
pub struct JsonlSource {
    id: String,
    events: Vec<Map<String, Value>>,
    streams: IndexSet<StreamDescriptor>,
    current: Option<usize>,
}

impl JsonlSource {
    pub fn open(files: &[PathBuf]) -> Result<Self, BackendError> {
        let mut events = Vec::new();
        let mut streams = IndexSet::new();

        for path in files {
            let before = events.len();
            let reader = BufReader::new(File::open(path)?);
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let event = parse_event(&line)
                    .map_err(|reason| format_error(path, line_no + 1, reason))?;
                for (category, products) in &event {
                    if let Value::Object(products) = products {
                        for name in products.keys() {
                            streams.insert(StreamDescriptor::new(category.as_str(), name.as_str()));
                        }
                    }
                }
                events.push(event);
            }
            debug!("{}: {} events", path.display(), events.len() - before);
        }

        Ok(Self {
            id: BackendKind::EventRecord.as_str().to_string(),
            events,
            streams,
            current: None,
        })
    }
}

fn format_error(path: &Path, line: usize, reason: String) -> BackendError {
    BackendError::format(BackendKind::EventRecord, path, format!("line {}: {}", line, reason))
}

/// Validate one line as `{category: {name: [records]}}`
fn parse_event(line: &str) -> Result<Map<String, Value>, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let Value::Object(event) = value else {
        return Err("entry is not an object".to_string());
    };
    for (category, products) in &event {
        let Value::Object(products) = products else {
            return Err(format!("category '{}' is not an object", category));
        };
        if let Some((name, _)) = products.iter().find(|(_, records)| !records.is_array()) {
            return Err(format!("stream '{}:{}' is not a list", category, name));
        }
    }
    Ok(event)
}

impl Backend for JsonlSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::EventRecord
    }

    fn entry_count(&self) -> usize {
        self.events.len()
    }

    fn seek(&mut self, entry: usize) -> Result<(), BackendError> {
        if entry >= self.events.len() {
            return Err(BackendError::Seek {
                entry,
                reason: format!("only {} events", self.events.len()),
            });
        }
        self.current = Some(entry);
        Ok(())
    }

    fn list_streams(&self) -> Result<Vec<StreamDescriptor>, BackendError> {
        Ok(self.streams.iter().cloned().collect())
    }

    fn get_stream(&self, descriptor: &StreamDescriptor) -> Result<StreamData, BackendError> {
        if !self.streams.contains(descriptor) {
            return Err(BackendError::StreamNotFound(descriptor.clone()));
        }

        // A stream missing from this particular event is simply empty.
        let records = self
            .current
            .and_then(|entry| self.events.get(entry))
            .and_then(|event| event.get(&descriptor.category))
            .and_then(|products| products.get(&descriptor.name))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(StreamData {
            descriptor: descriptor.clone(),
            backend_id: self.id.clone(),
            records,
        })
    }
}

/// Attaches every `.jsonl` input as an event-record backend
#[derive(Default)]
pub struct JsonlOpener;

impl BackendOpener for JsonlOpener {
    fn kind(&self) -> BackendKind {
        BackendKind::EventRecord
    }

    fn open(&self, paths: &[PathBuf]) -> Result<Option<Box<dyn Backend>>, BackendError> {
        let files: Vec<PathBuf> = paths
            .iter()
            .filter(|p| has_extension(p, &["jsonl", "ndjson"]))
            .cloned()
            .collect();
        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(JsonlSource::open(&files)?)))
    }
}
