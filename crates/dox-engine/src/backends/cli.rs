//! Command-line client backend
//!
//! Drives a container engine through its client binary (`podman` or
//! `docker`). A run is a single `<client> run --rm ...` child process whose
//! stdio is the host's own; its exit status is the container's.

use crate::backend::{Backend, ExecutionState, Session};
use crate::error::{Error, Result};
use crate::request::ExecutionRequest;
use crate::signals::SignalRelay;
use crate::terminal::RawMode;
use async_trait::async_trait;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::convert::Infallible;
use std::io::IsTerminal;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Backend invoking a container engine's client binary
#[derive(Debug, Clone)]
pub struct CliBackend {
    program: String,
}

enum Ending {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
}

impl CliBackend {
    /// Drive the given client binary
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments of the `run` invocation for `request`.
    ///
    /// Environment values are not placed on the command line; `-e NAME`
    /// makes the client read them from its own environment.
    pub fn run_args(request: &ExecutionRequest) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string(), "-i".to_string()];
        if request.tty() {
            args.push("-t".to_string());
        }
        args.push(format!("--user={}", request.user()));
        if let Some(dir) = request.working_dir() {
            args.push("-w".to_string());
            args.push(dir.to_string());
        }
        for bind in request.binds() {
            args.push("-v".to_string());
            args.push(bind.clone());
        }
        for (name, _) in request.env() {
            args.push("-e".to_string());
            args.push(name.clone());
        }
        if let Some(network) = request.network().as_engine_str() {
            args.push(format!("--network={}", network));
        }
        for binding in request.ports() {
            args.push("-p".to_string());
            args.push(binding.to_string());
        }
        args.push(request.image().to_string());
        args.extend(request.argv().iter().cloned());
        args
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.kill_on_drop(true);
        command
    }

    /// Run a client subcommand to completion, capturing its output
    async fn output(&self, args: &[&str]) -> Result<Output> {
        let line = format!("{} {}", self.program, args.join(" "));
        debug!("Running {}", line);

        let output = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::spawn_failed(&self.program, e))?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if combined.is_empty() {
                combined = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(Error::CommandFailed {
                command: line,
                output: combined,
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl Backend for CliBackend {
    fn name(&self) -> &str {
        &self.program
    }

    async fn is_available(&self) -> Result<()> {
        self.output(&["version"]).await.map_err(|e| {
            debug!("{} version failed: {}", self.program, e);
            let mut name = self.program.clone();
            if let Some(first) = name.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            Error::unavailable(format!("{} not available. Is {} installed?", name, name))
        })?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling {}", image);
        self.output(&["pull", image]).await?;
        Ok(())
    }

    async fn build_image(&self, dockerfile: &str, tag: &str) -> Result<()> {
        let context = tempfile::tempdir()?;
        let path = context.path().join("Dockerfile");
        tokio::fs::write(&path, dockerfile).await?;

        let dir = context.path().display().to_string();
        let file = path.display().to_string();
        info!("Building {}", tag);
        self.output(&["build", "-t", tag, "-f", &file, &dir]).await?;
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<String>> {
        let output = self
            .output(&["images", "--format", "{{.Repository}}:{{.Tag}}"])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.contains("<none>"))
            .map(str::to_string)
            .collect())
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        self.output(&["rmi", image]).await?;
        Ok(())
    }

    async fn remove_stopped_containers(&self) -> Result<usize> {
        let output = self
            .output(&["ps", "-aq", "--filter", "status=exited"])
            .await?;
        let ids: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        let mut removed = 0;
        for id in &ids {
            match self.output(&["rm", id]).await {
                Ok(_) => removed += 1,
                Err(e) => warn!("Failed to remove container {}: {}", id, e),
            }
        }
        Ok(removed)
    }

    async fn create_and_run(&self, request: &ExecutionRequest, session: Session) -> Result<i64> {
        let Session {
            signals,
            cancel,
            lifecycle,
            ..
        } = session;

        lifecycle.enter(ExecutionState::Creating);
        let mut command = self.command();
        command
            .args(Self::run_args(request))
            .envs(request.env().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        // A client that never reads the terminal gets its own process group,
        // so terminal signals reach it only through the relay. With stdin on
        // a terminal it must stay in the foreground group, and a non-TTY
        // Ctrl-C then arrives twice: directly and relayed.
        if !std::io::stdin().is_terminal() {
            command.process_group(0);
        }

        let raw_mode = if request.tty() {
            match RawMode::enter() {
                Ok(guard) => Some(guard),
                Err(e) => {
                    warn!("Could not switch terminal to raw mode: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut child = command
            .spawn()
            .map_err(|e| Error::spawn_failed(&self.program, e))?;
        lifecycle.enter(ExecutionState::Running);

        let pid = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(Pid::from_raw);
        let mut relay = match SignalRelay::install(signals) {
            Ok(relay) => Some(relay),
            Err(e) => {
                warn!("Signals will not be forwarded to the container: {}", e);
                None
            }
        };

        lifecycle.enter(ExecutionState::Waiting);
        let relay_signals = async {
            if let (Some(relay), Some(pid)) = (relay.as_mut(), pid) {
                relay
                    .forward(|signal| async move { kill(pid, signal).map_err(Error::from) })
                    .await;
            }
            std::future::pending::<Infallible>().await
        };

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = cancel.cancelled() => Ending::Cancelled,
            never = relay_signals => match never {},
        };
        drop(relay);
        drop(raw_mode);

        match ending {
            Ending::Exited(status) => {
                let status = status.map_err(Error::wait)?;
                Ok(exit_code(status))
            }
            Ending::Cancelled => {
                if let Err(e) = child.start_kill() {
                    debug!("Failed to kill {}: {}", self.program, e);
                }
                let _ = child.wait().await;
                Err(Error::Cancelled)
            }
        }
    }
}

/// The container's exit code as reported by the client process
fn exit_code(status: ExitStatus) -> i64 {
    match (status.code(), status.signal()) {
        (Some(code), _) => i64::from(code),
        (None, Some(signal)) => 128 + i64::from(signal),
        (None, None) => 1,
    }
}
