pub mod clean;
pub mod list;
pub mod run;
pub mod upgrade;

use anyhow::{Context, Result};
use dox_config::{GlobalConfig, Loader};
use dox_engine::Backend;
use dox_engine::backends;
use std::sync::Arc;

/// Connect to the configured engine and make sure it answers
pub async fn connect(global: &GlobalConfig) -> Result<Arc<dyn Backend>> {
    let backend = backends::connect(&global.backend_selector())?;
    backend.is_available().await?;
    Ok(backend)
}

/// Load the global settings
pub fn load_global(loader: &Loader) -> Result<GlobalConfig> {
    loader
        .load_global()
        .context("failed to load global config")
}
