use anyhow::{Context, Result};
use dox_config::{Loader, VersionStore};
use dox_engine::{Engine, Invocation, backends};
use tracing::{info, warn};

pub async fn run(command: &str, args: Vec<String>, upgrade: bool) -> Result<i32> {
    let loader = Loader::new()?;
    let global = super::load_global(&loader)?;
    let config = loader.load_command(command)?;

    let mut versions = VersionStore::open(loader.clone());
    let changed = versions.has_command_changed(command).unwrap_or_else(|e| {
        warn!("Failed to check command version: {}", e);
        false
    });
    if changed && config.dockerfile_inline().is_some() {
        info!("Command configuration has changed, rebuilding container...");
    }

    let backend = backends::connect(&global.backend_selector())
        .context("failed to set up container engine")?;
    let mut engine = Engine::new(backend);
    if let Some(deadline) = global.deadline() {
        engine = engine.with_deadline(deadline);
    }

    let invocation = Invocation::new(command, config.to_spec())
        .with_args(args)
        .with_force_upgrade(upgrade)
        .with_definition_changed(changed);
    let outcome = engine.run(&invocation).await;

    if let Some(e) = outcome.error() {
        eprintln!("Error: {}", e);
    } else if outcome.success() && (changed || upgrade) {
        if let Err(e) = versions.update_command_version(command) {
            warn!("Failed to update command version: {}", e);
        }
    }

    Ok(outcome.code())
}
