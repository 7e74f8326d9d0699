//! dox: run commands in containers as if they were installed on the host
//!
//! Each command is defined by a YAML file under the dox config directory.
//! `dox <command> [args...]` runs it in a transient container with the
//! current directory mounted, and exits with the container's exit code.

use clap::{Parser, Subcommand};
use dox_engine::LOCAL_FAILURE_CODE;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "dox")]
#[command(about = "Run commands in containers as if they were installed on the host")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a configured command
    Run {
        /// Pull or rebuild the image before running
        #[arg(long)]
        upgrade: bool,
        /// Command to run, then its arguments, passed on untouched
        #[arg(
            value_name = "COMMAND",
            required = true,
            num_args = 1..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        argv: Vec<String>,
    },

    /// List configured commands
    List,

    /// Refresh one command's image
    Upgrade {
        /// Command to upgrade
        command: String,
    },

    /// Refresh every command's image
    UpgradeAll,

    /// Remove stopped containers
    Clean,

    /// Show the dox version
    Version,

    /// Any other word is a configured command: `dox <command> [args...]`
    #[command(external_subcommand)]
    External(Vec<String>),
}

/// Split `command args...` into the command name and its arguments
fn split_argv(argv: Vec<String>) -> anyhow::Result<(String, Vec<String>)> {
    let mut argv = argv.into_iter();
    let command = argv
        .next()
        .ok_or_else(|| anyhow::anyhow!("no command given"))?;
    Ok((command, argv.collect()))
}

async fn dispatch(command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::Run { upgrade, argv } => {
            let (command, args) = split_argv(argv)?;
            commands::run::run(&command, args, upgrade).await
        }
        Commands::External(words) => {
            let (command, args) = split_argv(words)?;
            commands::run::run(&command, args, false).await
        }
        Commands::List => commands::list::run().map(|_| 0),
        Commands::Upgrade { command } => commands::upgrade::run(&command).await.map(|_| 0),
        Commands::UpgradeAll => commands::upgrade::run_all().await.map(|_| 0),
        Commands::Clean => commands::clean::run().await.map(|_| 0),
        Commands::Version => {
            println!("dox version {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let code = match dispatch(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            LOCAL_FAILURE_CODE
        }
    };

    // Exit directly: a blocked stdin reader would otherwise hold up runtime shutdown
    std::process::exit(code);
}
