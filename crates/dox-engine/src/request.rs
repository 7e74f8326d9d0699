//! Container spec builder
//!
//! Turns a [`CommandSpec`] plus the invocation's arguments and host state into
//! an immutable [`ExecutionRequest`]. Building is pure: everything it reads
//! from the host is captured up front in a [`HostEnvironment`].

use crate::command::{CommandSpec, NetworkMode};
use crate::error::{Error, Result};
use crate::ports::PortBinding;
use crate::resolver::inline_image_name;
use crate::terminal::{self, TerminalSize};
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Fixed in-container mount point for the host working directory
pub const WORKSPACE_PATH: &str = "/workspace";

/// Snapshot of the host state a request is built from
#[derive(Debug, Clone, Default)]
pub struct HostEnvironment {
    /// Absolute current working directory
    pub cwd: PathBuf,
    /// Numeric user id of this process
    pub uid: u32,
    /// Numeric group id of this process
    pub gid: u32,
    /// Host environment variables
    pub vars: HashMap<String, String>,
    /// Whether stdin and stdout are both interactive terminals
    pub interactive: bool,
    /// Terminal size sampled at start, when interactive
    pub terminal_size: Option<TerminalSize>,
}

impl HostEnvironment {
    /// Capture the current process's host state
    pub fn capture() -> Result<Self> {
        let interactive = terminal::is_interactive();
        Ok(Self {
            cwd: std::env::current_dir()?,
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            vars: std::env::vars().collect(),
            interactive,
            terminal_size: if interactive {
                TerminalSize::current()
            } else {
                None
            },
        })
    }

    /// Look up a host variable, treating empty values as unset
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// `$VAR` and `${VAR}` substitution against one host's variables
struct VarExpander<'a> {
    pattern: Regex,
    vars: &'a HashMap<String, String>,
}

impl<'a> VarExpander<'a> {
    fn new(host: &'a HostEnvironment) -> Result<Self> {
        let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .map_err(|e| Error::invalid_spec(e.to_string()))?;
        Ok(Self {
            pattern,
            vars: &host.vars,
        })
    }

    /// Unset variables expand to nothing
    fn expand(&self, value: &str) -> String {
        self.pattern
            .replace_all(value, |caps: &Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                self.vars.get(name).cloned().unwrap_or_default()
            })
            .into_owned()
    }
}

/// A concrete container creation request, immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    image: String,
    argv: Vec<String>,
    env: Vec<(String, String)>,
    working_dir: Option<String>,
    binds: Vec<String>,
    uid: u32,
    gid: u32,
    tty: bool,
    terminal_size: Option<TerminalSize>,
    network: NetworkMode,
    ports: Vec<PortBinding>,
}

impl ExecutionRequest {
    /// Build a request for running `command_name` with `args`.
    ///
    /// The image name is derived from the command name when the spec uses an
    /// inline build; the resolver must produce that same name.
    pub fn build(
        spec: &CommandSpec,
        command_name: &str,
        args: &[String],
        host: &HostEnvironment,
    ) -> Result<Self> {
        spec.validate()?;

        let inline = spec.inline_build().is_some();
        let image = if inline {
            inline_image_name(command_name)
        } else {
            spec.image.trim().to_string()
        };

        let mut seen = HashSet::new();
        let env = spec
            .environment
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .filter_map(|name| {
                host.var(name)
                    .map(|value| (name.clone(), value.to_string()))
            })
            .collect();

        let argv = spec
            .command_override()
            .map(str::to_string)
            .into_iter()
            .chain(args.iter().cloned())
            .collect();

        let workspace = format!("{}:{}", host.cwd.display(), WORKSPACE_PATH);
        let mut binds = vec![workspace];
        if !spec.volumes.is_empty() {
            let expander = VarExpander::new(host)?;
            binds.extend(
                spec.volumes
                    .iter()
                    .map(|volume| expand_volume(volume, host, &expander)),
            );
        }

        let ports = if spec.network.is_host() {
            Vec::new()
        } else {
            spec.ports
                .iter()
                .map(|port| PortBinding::parse(port))
                .collect::<Result<Vec<_>>>()?
        };

        let tty = host.interactive;

        Ok(Self {
            image,
            argv,
            env,
            working_dir: (!inline).then(|| WORKSPACE_PATH.to_string()),
            binds,
            uid: host.uid,
            gid: host.gid,
            tty,
            terminal_size: if tty { host.terminal_size } else { None },
            network: spec.network.clone(),
            ports,
        })
    }

    /// Image to create the container from
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Final argv; empty means the image's default entrypoint runs
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Forwarded environment, one entry per variable
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Environment as `NAME=value` strings
    pub fn env_strings(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect()
    }

    /// Working directory override, `None` to keep the image's own
    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    /// Bind mounts; the workspace mount always comes first
    pub fn binds(&self) -> &[String] {
        &self.binds
    }

    /// `uid:gid` to run the container process as
    pub fn user(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }

    /// Whether a pseudo-terminal is requested
    pub fn tty(&self) -> bool {
        self.tty
    }

    /// Sampled terminal size, only present for TTY sessions
    pub fn terminal_size(&self) -> Option<TerminalSize> {
        self.terminal_size
    }

    /// Network mode
    pub fn network(&self) -> &NetworkMode {
        &self.network
    }

    /// Port bindings; always empty under host networking
    pub fn ports(&self) -> &[PortBinding] {
        &self.ports
    }
}

/// Rewrite a volume's source: `.` becomes the working directory, anything
/// else gets `$VAR`/`${VAR}` expansion. Strings without a `:` pass through.
fn expand_volume(volume: &str, host: &HostEnvironment, expander: &VarExpander<'_>) -> String {
    let Some((source, rest)) = volume.split_once(':') else {
        return volume.to_string();
    };
    let source = if source == "." {
        host.cwd.display().to_string()
    } else {
        expander.expand(source)
    };
    format!("{}:{}", source, rest)
}
