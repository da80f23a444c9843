pub mod csv_source;
pub mod jsonl_source;

pub use csv_source::{CsvOpener, CsvSource};
pub use jsonl_source::{JsonlOpener, JsonlSource};

use std::path::Path;

/// Case-insensitive extension check
pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
