use anyhow::{Context, Result};
use dox_config::Loader;

pub fn run() -> Result<()> {
    let loader = Loader::new()?;
    let commands = loader
        .list_commands()
        .context("failed to list commands")?;

    if commands.is_empty() {
        println!("No commands configured.");
        println!("\nTo add a command, create a YAML file in:");
        println!("  {}", loader.commands_dir().join("<command>.yaml").display());
        return Ok(());
    }

    println!("Available commands:");
    for command in commands {
        println!("  {}", command);
    }
    Ok(())
}
