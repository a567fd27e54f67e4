// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from defaults, an optional file (YAML or JSON) and the
/// process environment, in that order of precedence.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let settings: Settings = builder
        .add_source(config::Environment::default().try_parsing(true))
        .build()
        .context("Failed to read configuration sources")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    let config = Config::from_settings(settings)?;
    config.validate()?;
    Ok(config)
}

/// Split a comma-separated setting, dropping blanks.
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
