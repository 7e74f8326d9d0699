use anyhow::{Context, Result};
use dox_config::Loader;

pub async fn run() -> Result<()> {
    let loader = Loader::new()?;
    let global = super::load_global(&loader)?;
    let backend = super::connect(&global).await?;

    println!("Removing unused containers...");
    let removed = backend
        .remove_stopped_containers()
        .await
        .context("failed to remove containers")?;

    println!("Removed {} container(s). Cleanup complete.", removed);
    Ok(())
}
