use accord_shell_core::{Browser, Environment, ShellConfig};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Load the shell configuration, optionally forcing the environment
pub fn load(config_path: &Path, environment: Option<Environment>) -> Result<ShellConfig> {
    let mut config = ShellConfig::load(config_path).with_context(|| {
        format!("Failed to load configuration from {}", config_path.display())
    })?;

    if let Some(environment) = environment {
        config.environment = environment;
    }

    Ok(config)
}

/// Browser whose origin storage lives under `data_dir`, or in memory
pub fn browser(data_dir: Option<&Path>) -> Result<Arc<Browser>> {
    let Some(data_dir) = data_dir else {
        return Ok(Arc::new(Browser::in_memory()));
    };

    std::fs::create_dir_all(data_dir).context("Failed to create data directory")?;
    tracing::info!("Data directory: {}", data_dir.display());

    Ok(Arc::new(Browser::persistent(data_dir.to_path_buf())))
}
