//! Plotter registry and dispatch

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use ev_core::{BackendHandles, StateStore, StreamCatalog};
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::plotter::{OptionMap, OptionSpec, Plotter, Renderable};

/// Per-call option overrides, keyed by plotter name
pub type OptionOverrides = HashMap<String, OptionMap>;

/// Why a plotter contributed nothing to a dispatch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("plotter '{0}' not found")]
    UnknownPlotter(String),

    #[error("error creating traces for plotter '{name}': {reason}")]
    PlotterExecution { name: String, reason: String },
}

/// Everything a dispatch produced, plus what it skipped
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub renderables: Vec<Renderable>,
    pub skipped: Vec<DispatchError>,
}

/// Name and description of a registered plotter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotterInfo {
    pub name: String,
    pub description: String,
}

/// Registry of plotters keyed by name
pub struct PlotterRegistry {
    plotters: IndexMap<String, Arc<dyn Plotter>>,
    state: Arc<StateStore>,
}

impl PlotterRegistry {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self {
            plotters: IndexMap::new(),
            state,
        }
    }

    pub fn register<P: Plotter + 'static>(&mut self, plotter: P) {
        self.register_shared(Arc::new(plotter));
    }

    /// Insert `plotter`, replacing any plotter of the same name.
    ///
    /// Option defaults are seeded into the state store only for keys that
    /// have no value yet, so configured values survive re-registration.
    pub fn register_shared(&mut self, plotter: Arc<dyn Plotter>) {
        let name = plotter.name().to_string();
        if self.plotters.contains_key(&name) {
            warn!("Plotter '{}' already registered, overwriting", name);
        }

        for (key, value) in plotter.option_defaults() {
            self.state
                .set_default(&["plotters", name.as_str(), "options", key.as_str()], value);
        }

        self.plotters.insert(name.clone(), plotter);
        info!("Registered plotter: {}", name);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plotter>> {
        self.plotters.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.plotters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plotters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plotters.is_empty()
    }

    pub fn option_schema(&self, name: &str) -> Option<Vec<OptionSpec>> {
        self.get(name).map(|plotter| plotter.option_schema())
    }

    /// Names of plotters whose requirements `catalog` satisfies.
    ///
    /// Only the catalog is consulted. A predicate that errors or panics
    /// counts as not applicable.
    pub fn applicable(&self, catalog: &StreamCatalog) -> Vec<String> {
        self.applicable_plotters(catalog)
            .into_iter()
            .map(|info| info.name)
            .collect()
    }

    pub fn applicable_plotters(&self, catalog: &StreamCatalog) -> Vec<PlotterInfo> {
        self.plotters
            .iter()
            .filter(|(name, plotter)| check_applicable(name, plotter.as_ref(), catalog))
            .map(|(name, plotter)| PlotterInfo {
                name: name.clone(),
                description: plotter.description().to_string(),
            })
            .collect()
    }

    /// Stored options of `name` with `overrides` applied on top
    pub fn effective_options(&self, name: &str, overrides: Option<&OptionMap>) -> OptionMap {
        let stored = self
            .state
            .get(&["plotters", name, "options"], Value::Null);
        let mut options = match stored {
            Value::Object(map) => map,
            _ => OptionMap::new(),
        };
        if let Some(overrides) = overrides {
            options.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        options
    }

    /// Run the named plotters in order and concatenate their output.
    ///
    /// Unknown names and failing plotters are logged and skipped.
    pub fn dispatch<S: AsRef<str>>(
        &self,
        names: &[S],
        handles: &BackendHandles<'_>,
        overrides: &OptionOverrides,
    ) -> Vec<Renderable> {
        self.dispatch_report(names, handles, overrides).renderables
    }

    pub fn dispatch_report<S: AsRef<str>>(
        &self,
        names: &[S],
        handles: &BackendHandles<'_>,
        overrides: &OptionOverrides,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for name in names.iter().map(AsRef::as_ref) {
            let Some(plotter) = self.get(name) else {
                warn!("Plotter '{}' not found", name);
                report.skipped.push(DispatchError::UnknownPlotter(name.to_string()));
                continue;
            };

            let options = self.effective_options(name, overrides.get(name));
            let outcome = catch_unwind(AssertUnwindSafe(|| plotter.make_traces(handles, &options)));
            let reason = match outcome {
                Ok(Ok(traces)) => {
                    info!("Plotter '{}' created {} traces", name, traces.len());
                    report.renderables.extend(traces.into_iter().map(|mut trace| {
                        trace.group.get_or_insert_with(|| name.to_string());
                        trace
                    }));
                    continue;
                }
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };

            let failure = DispatchError::PlotterExecution {
                name: name.to_string(),
                reason,
            };
            error!("{}", failure);
            report.skipped.push(failure);
        }

        report
    }
}

fn check_applicable(name: &str, plotter: &dyn Plotter, catalog: &StreamCatalog) -> bool {
    match catch_unwind(AssertUnwindSafe(|| plotter.is_applicable(catalog))) {
        Ok(Ok(applicable)) => applicable,
        Ok(Err(e)) => {
            warn!("Applicability check of plotter '{}' failed: {:#}", name, e);
            false
        }
        Err(payload) => {
            error!(
                "Applicability check of plotter '{}' panicked: {}",
                name,
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
