//! Viewer configuration module

mod env;
pub mod viewer_config;

pub use env::{apply_env_overrides, ENV_PREFIX};
pub use viewer_config::*;
