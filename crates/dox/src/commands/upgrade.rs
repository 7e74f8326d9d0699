use anyhow::{Context, Result};
use dox_config::{CommandConfig, Loader};
use dox_engine::{Backend, inline_image_name};

/// What upgrading one command did
enum Upgraded {
    /// The inline-built image was removed; the next run rebuilds it
    Removed(String),
    /// There was no inline-built image to remove
    NothingToRemove,
    /// The image is digest-pinned and was left alone
    Pinned,
    /// A fresh image was pulled
    Pulled,
}

async fn upgrade_command(
    backend: &dyn Backend,
    command: &str,
    config: &CommandConfig,
) -> Result<Upgraded> {
    if config.dockerfile_inline().is_some() {
        let image = inline_image_name(command);
        return match backend.remove_image(&image).await {
            Ok(()) => Ok(Upgraded::Removed(image)),
            Err(e) if e.is_not_found() => Ok(Upgraded::NothingToRemove),
            Err(e) => Err(e).with_context(|| format!("could not remove image {}", image)),
        };
    }

    if config.is_pinned() {
        return Ok(Upgraded::Pinned);
    }

    backend
        .pull_image(&config.image)
        .await
        .context("failed to pull image")?;
    Ok(Upgraded::Pulled)
}

pub async fn run(command: &str) -> Result<()> {
    let loader = Loader::new()?;
    let config = loader.load_command(command)?;
    let global = super::load_global(&loader)?;
    let backend = super::connect(&global).await?;

    if config.dockerfile_inline().is_some() {
        println!(
            "Command '{}' uses inline Dockerfile. Removing existing image to force rebuild...",
            command
        );
    } else if !config.is_pinned() {
        println!("Upgrading image for command '{}': {}", command, config.image);
    }

    match upgrade_command(backend.as_ref(), command, &config).await {
        Ok(Upgraded::Removed(image)) => println!(
            "Successfully removed image {}. It will be rebuilt on next run.",
            image
        ),
        Ok(Upgraded::NothingToRemove) => {}
        Ok(Upgraded::Pinned) => {
            println!("Command '{}' uses SHA-pinned image. Skipping upgrade.", command)
        }
        Ok(Upgraded::Pulled) => println!("Successfully upgraded '{}'", command),
        // A failed remove only means the next run reuses the old image
        Err(e) if config.dockerfile_inline().is_some() => println!("Warning: {:#}", e),
        Err(e) => return Err(e),
    }
    Ok(())
}

pub async fn run_all() -> Result<()> {
    let loader = Loader::new()?;
    let commands = loader
        .list_commands()
        .context("failed to list commands")?;
    if commands.is_empty() {
        println!("No commands to upgrade.");
        return Ok(());
    }

    let global = super::load_global(&loader)?;
    let backend = super::connect(&global).await?;

    let mut upgraded = 0;
    let mut failed = 0;
    for command in &commands {
        let config = match loader.load_command(command) {
            Ok(config) => config,
            Err(e) => {
                println!("Failed to load config for '{}': {}", command, e);
                failed += 1;
                continue;
            }
        };

        match upgrade_command(backend.as_ref(), command, &config).await {
            Ok(Upgraded::Removed(image)) => {
                println!("Rebuilding '{}': removed image {}", command, image);
                upgraded += 1;
            }
            Ok(Upgraded::NothingToRemove) => {}
            Ok(Upgraded::Pinned) => println!("Skipping '{}': SHA-pinned image", command),
            Ok(Upgraded::Pulled) => {
                println!("Upgraded '{}': {}", command, config.image);
                upgraded += 1;
            }
            Err(e) => {
                println!("Failed to upgrade '{}': {:#}", command, e);
                failed += 1;
            }
        }
    }

    println!("\nUpgraded {} command(s)", upgraded);
    if failed > 0 {
        println!("{} command(s) failed", failed);
    }
    Ok(())
}
