use anyhow::{Context, Result};
use hostlink_bridge::BridgeConfig;
use hostlink_script::InterpreterOptions;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Contents of the `--config` file. Missing sections keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub bridge: BridgeConfig,
    pub script: InterpreterOptions,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Error reading config '{}'", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config '{}'", path.display()))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
