use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use ev_core::{Backend, BackendError, BackendKind, BackendOpener, StreamData, StreamDescriptor};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use super::has_extension;

/// One flat tree: every file sharing a stem, chained in input order
struct CsvTree {
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

/// Flat ntuple backend over CSV files.
///
/// Each distinct file stem is a tree, each row one entry and each column a
/// stream `(stem, column)`. The first tree by name defines the entry count.
pub struct CsvSource {
    id: String,
    trees: IndexMap<String, CsvTree>,
    entries: usize,
    current: Option<usize>,
}

impl CsvSource {
    /// Read and chain every file, grouped by stem
    pub fn open(files: &[PathBuf], delimiter: u8) -> Result<Self, BackendError> {
        let mut grouped: BTreeMap<String, Vec<&Path>> = BTreeMap::new();
        for file in files {
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| BackendError::format(BackendKind::Ntuple, file, "unnamed file"))?;
            grouped.entry(stem.to_string()).or_default().push(file);
        }

        let mut trees = IndexMap::new();
        for (stem, paths) in grouped {
            let tree = Self::read_tree(&paths, delimiter)?;
            debug!("CSV tree '{}': {} rows from {} files", stem, tree.rows.len(), paths.len());
            trees.insert(stem, tree);
        }

        let entries = trees.values().next().map(|t| t.rows.len()).unwrap_or(0);
        Ok(Self {
            id: BackendKind::Ntuple.as_str().to_string(),
            trees,
            entries,
            current: None,
        })
    }

    fn read_tree(paths: &[&Path], delimiter: u8) -> Result<CsvTree, BackendError> {
        let mut headers: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for path in paths {
            let file = File::open(path)?;
            let mut reader = ReaderBuilder::new()
                .has_headers(true)
                .delimiter(delimiter)
                .from_reader(BufReader::new(file));

            let file_headers: Vec<String> = reader
                .headers()
                .map_err(|e| BackendError::format(BackendKind::Ntuple, path, e))?
                .iter()
                .map(|h| h.trim().to_string())
                .collect();

            match &headers {
                Some(expected) if *expected != file_headers => {
                    return Err(BackendError::format(
                        BackendKind::Ntuple,
                        path,
                        "header differs from the other files of this tree",
                    ));
                }
                Some(_) => {}
                None => headers = Some(file_headers),
            }

            for record in reader.records() {
                rows.push(record.map_err(|e| BackendError::format(BackendKind::Ntuple, path, e))?);
            }
        }

        Ok(CsvTree {
            headers: headers.unwrap_or_default(),
            rows,
        })
    }
}

/// Numbers and booleans become JSON scalars, empty cells null
fn parse_cell(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = cell.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = cell.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    match cell.to_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}

impl Backend for CsvSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Ntuple
    }

    fn entry_count(&self) -> usize {
        self.entries
    }

    fn seek(&mut self, entry: usize) -> Result<(), BackendError> {
        if entry >= self.entries {
            return Err(BackendError::Seek {
                entry,
                reason: format!("only {} rows", self.entries),
            });
        }
        self.current = Some(entry);
        Ok(())
    }

    fn list_streams(&self) -> Result<Vec<StreamDescriptor>, BackendError> {
        Ok(self
            .trees
            .iter()
            .flat_map(|(stem, tree)| {
                tree.headers
                    .iter()
                    .map(move |column| StreamDescriptor::new(stem.as_str(), column.as_str()))
            })
            .collect())
    }

    fn get_stream(&self, descriptor: &StreamDescriptor) -> Result<StreamData, BackendError> {
        let not_found = || BackendError::StreamNotFound(descriptor.clone());
        let tree = self.trees.get(&descriptor.category).ok_or_else(not_found)?;
        let column = tree
            .headers
            .iter()
            .position(|h| *h == descriptor.name)
            .ok_or_else(not_found)?;

        let records = self
            .current
            .and_then(|entry| tree.rows.get(entry))
            .and_then(|row| row.get(column))
            .map(|cell| vec![parse_cell(cell)])
            .unwrap_or_default();

        Ok(StreamData {
            descriptor: descriptor.clone(),
            backend_id: self.id.clone(),
            records,
        })
    }
}

/// Attaches every `.csv` input as a flat ntuple backend
pub struct CsvOpener {
    delimiter: u8,
}

impl CsvOpener {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl Default for CsvOpener {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl BackendOpener for CsvOpener {
    fn kind(&self) -> BackendKind {
        BackendKind::Ntuple
    }

    fn open(&self, paths: &[PathBuf]) -> Result<Option<Box<dyn Backend>>, BackendError> {
        let files: Vec<PathBuf> = paths
            .iter()
            .filter(|p| has_extension(p, &["csv"]))
            .cloned()
            .collect();
        if files.is_empty() {
            return Ok(None);
        }
        let source = CsvSource::open(&files, self.delimiter)?;
        Ok(Some(Box::new(source)))
    }
}
