//! File-backed data sources and configuration for the event display

pub mod config;
pub mod sources;

use ev_core::BackendOpener;

// Re-exports
pub use config::{BackendsConfig, ConfigError, ViewerConfig};
pub use sources::{CsvOpener, CsvSource, JsonlOpener, JsonlSource};

/// Openers for every enabled file format
pub fn default_openers(config: &BackendsConfig) -> Vec<Box<dyn BackendOpener>> {
    let mut openers: Vec<Box<dyn BackendOpener>> = Vec::new();
    if config.jsonl {
        openers.push(Box::new(JsonlOpener));
    }
    if config.csv {
        openers.push(Box::new(CsvOpener::new(config.csv_delimiter_byte())));
    }
    openers
}

#[cfg(test)]
mod tests {
    use super::*;
    use ev_core::{BackendKind, EntryCursor, SourceSet, StreamDescriptor};
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_mixed_formats_share_one_cursor() {
        let dir = TempDir::new().unwrap();
        let records = dir.path().join("reco.jsonl");
        std::fs::write(
            &records,
            "{\"track\": {\"trackreco\": [{\"x\": 1}]}}\n{\"track\": {\"trackreco\": []}}\n{}\n",
        )
        .unwrap();
        let ntuple = dir.path().join("EventTree.csv");
        std::fs::write(&ntuple, "run,event\n1,1\n1,2\n").unwrap();
        let paths: Vec<PathBuf> = vec![ntuple, records];

        let openers = default_openers(&BackendsConfig::default());
        let sources = SourceSet::open(&paths, &openers).unwrap();
        let catalog = sources.build_catalog();
        assert!(catalog.contains(&StreamDescriptor::new("track", "trackreco")));
        assert!(catalog.contains(&StreamDescriptor::new("EventTree", "event")));

        let mut cursor = EntryCursor::new(sources).unwrap();
        assert_eq!(cursor.canonical().backend_id, BackendKind::EventRecord.as_str());
        assert_eq!(cursor.total_entries(), 3);

        assert!(cursor.seek(1).unwrap().is_complete());
        let report = cursor.seek(2).unwrap();
        assert!(report.failed.contains(BackendKind::Ntuple.as_str()));
        assert_eq!(cursor.current_entry(), Some(2));
    }

    #[test]
    fn test_disabled_formats_have_no_opener() {
        let config = BackendsConfig {
            csv: false,
            ..BackendsConfig::default()
        };
        let openers = default_openers(&config);
        assert_eq!(openers.len(), 1);
        assert_eq!(openers[0].kind(), BackendKind::EventRecord);
    }
}
