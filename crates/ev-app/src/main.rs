//! Command-line front end for the event display core

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ev_core::{Session, StateStore, StreamCatalog};
use ev_data::{default_openers, ViewerConfig};
use ev_views::{
    EntrySummaryPlotter, OptionMap, OptionOverrides, PlotterRegistry, StreamMarkersPlotter,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input files; defaults to the configured `files`
    files: Vec<PathBuf>,

    /// JSON or YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Entry to display
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    entry: i64,

    /// Plotters to run, in order
    #[arg(long = "plotter")]
    plotters: Vec<String>,

    /// Option override as PLOTTER.KEY=VALUE
    #[arg(long = "set", value_parser = parse_override)]
    overrides: Vec<(String, String, Value)>,

    /// Print entry counts, streams and applicable plotters, then exit
    #[arg(long)]
    list: bool,
}

/// Parse `PLOTTER.KEY=VALUE`; the value is read as JSON when it parses,
/// otherwise as a plain string.
fn parse_override(raw: &str) -> Result<(String, String, Value), String> {
    let (target, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PLOTTER.KEY=VALUE, got '{}'", raw))?;
    let (plotter, key) = target
        .split_once('.')
        .filter(|(plotter, key)| !plotter.is_empty() && !key.is_empty())
        .ok_or_else(|| format!("expected PLOTTER.KEY before '=', got '{}'", target))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((plotter.to_string(), key.to_string(), value))
}

fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Built-in plotters for a freshly loaded catalog
fn build_registry(state: Arc<StateStore>, catalog: &StreamCatalog) -> PlotterRegistry {
    let mut registry = PlotterRegistry::new(state);
    registry.register(
        StreamMarkersPlotter::new("markers", catalog.iter().cloned().collect())
            .with_description("Spatial markers from x/y/z record fields"),
    );
    registry.register(EntrySummaryPlotter::new(catalog));
    registry
}

fn group_overrides(overrides: Vec<(String, String, Value)>) -> OptionOverrides {
    let mut grouped = OptionOverrides::new();
    for (plotter, key, value) in overrides {
        grouped
            .entry(plotter)
            .or_insert_with(OptionMap::new)
            .insert(key, value);
    }
    grouped
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ViewerConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.log_level);

    let files = if cli.files.is_empty() {
        config.files.clone()
    } else {
        cli.files.clone()
    };
    if files.is_empty() {
        bail!("no input files given");
    }

    let state = Arc::new(StateStore::new());
    config.seed_state(&state);

    let mut session = Session::new(Arc::clone(&state), default_openers(&config.backends));
    let catalog = session
        .load(&files)
        .with_context(|| format!("loading {} file(s)", files.len()))?
        .clone();
    let registry = build_registry(Arc::clone(&state), &catalog);

    if cli.list {
        let listing = json!({
            "nentries": state.get(&["io", "nentries"], Value::Null),
            "total_entries": session.total_entries(),
            "streams": catalog.names(),
            "plotters": registry
                .applicable_plotters(&catalog)
                .into_iter()
                .map(|info| json!({"name": info.name, "description": info.description}))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    let report = session.seek(cli.entry)?;
    if !report.is_complete() {
        warn!("Backends failed to reach entry {}: {:?}", report.entry, report.failed);
    }

    let selected = if !cli.plotters.is_empty() {
        cli.plotters.clone()
    } else if !config.enabled_plotters.is_empty() {
        config.enabled_plotters.clone()
    } else {
        registry.applicable(&catalog)
    };
    info!("Dispatching plotters: {:?}", selected);

    let handles = session
        .handles()
        .context("session lost its load after seeking")?;
    let renderables = registry.dispatch(&selected, &handles, &group_overrides(cli.overrides));
    println!("{}", serde_json::to_string_pretty(&renderables)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ev_core::StreamDescriptor;

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("markers.marker_size=4").unwrap(),
            ("markers".to_string(), "marker_size".to_string(), json!(4))
        );
        assert_eq!(
            parse_override("markers.color=#ff0000").unwrap(),
            ("markers".to_string(), "color".to_string(), json!("#ff0000"))
        );
        assert_eq!(
            parse_override("entry_summary.include_empty=true").unwrap().2,
            json!(true)
        );
        assert!(parse_override("marker_size=4").is_err());
        assert!(parse_override("markers.size").is_err());
        assert!(parse_override(".size=1").is_err());
    }

    #[test]
    fn test_group_overrides() {
        let grouped = group_overrides(vec![
            ("markers".to_string(), "marker_size".to_string(), json!(4)),
            ("markers".to_string(), "color".to_string(), json!("red")),
            ("entry_summary".to_string(), "include_empty".to_string(), json!(true)),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["markers"]["color"], json!("red"));
    }

    #[test]
    fn test_builtin_registry() {
        let state = Arc::new(StateStore::new());
        state.set(&["plotters", "markers", "options", "marker_size"], 6);
        let catalog = StreamCatalog::from_descriptors([StreamDescriptor::new("track", "trackreco")]);

        let registry = build_registry(Arc::clone(&state), &catalog);

        assert_eq!(registry.applicable(&catalog), vec!["markers", "entry_summary"]);
        let options = registry.effective_options("markers", None);
        assert_eq!(options["marker_size"], json!(6));
        assert_eq!(options["max_points"], json!(50_000));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "evview", "a.jsonl", "b.csv", "--entry", "3", "--plotter", "markers",
            "--set", "markers.color=red",
        ])
        .unwrap();
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.entry, 3);
        assert_eq!(cli.plotters, vec!["markers"]);
        assert_eq!(cli.overrides[0].2, json!("red"));
        assert!(!cli.list);
    }
}
