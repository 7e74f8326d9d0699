//! Declarative description of a containerized command
//!
//! A [`CommandSpec`] is produced by the configuration layer and consumed
//! read-only by the engine. It says WHAT to run; the engine decides how.

use crate::error::{Error, Result};
use std::fmt;

/// Network mode for the container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NetworkMode {
    /// Let the container engine pick its default
    #[default]
    Default,
    /// Share the host's network namespace
    Host,
    /// The engine's default bridge network
    Bridge,
    /// No networking at all
    Disabled,
    /// A user-defined network, by name
    Named(String),
}

impl NetworkMode {
    /// Parse a network mode as written in configuration (`""`, `host`,
    /// `bridge`, `none`, or any other name)
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" => NetworkMode::Default,
            "host" => NetworkMode::Host,
            "bridge" => NetworkMode::Bridge,
            "none" => NetworkMode::Disabled,
            other => NetworkMode::Named(other.to_string()),
        }
    }

    /// The value to hand to the container engine, or `None` for its default
    pub fn as_engine_str(&self) -> Option<&str> {
        match self {
            NetworkMode::Default => None,
            NetworkMode::Host => Some("host"),
            NetworkMode::Bridge => Some("bridge"),
            NetworkMode::Disabled => Some("none"),
            NetworkMode::Named(name) => Some(name),
        }
    }

    /// Whether the container shares the host's network namespace
    pub fn is_host(&self) -> bool {
        matches!(self, NetworkMode::Host)
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_engine_str().unwrap_or("default"))
    }
}

/// A containerized command definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Registry image reference (empty when an inline build is used)
    pub image: String,
    /// Inline Dockerfile used to build a custom image
    pub dockerfile_inline: Option<String>,
    /// Volume mounts, `source:target[:mode]`
    pub volumes: Vec<String>,
    /// Names of host environment variables to forward
    pub environment: Vec<String>,
    /// Optional command/entrypoint override
    pub command: Option<String>,
    /// Network mode
    pub network: NetworkMode,
    /// Port mappings, `[hostIP:]hostPort:containerPort[/proto]`
    pub ports: Vec<String>,
}

impl CommandSpec {
    /// Create a spec that runs a registry image
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Create a spec that builds its image from an inline Dockerfile
    pub fn from_dockerfile(dockerfile: impl Into<String>) -> Self {
        Self {
            dockerfile_inline: Some(dockerfile.into()),
            ..Default::default()
        }
    }

    /// Add a volume mount
    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volumes.push(volume.into());
        self
    }

    /// Forward a host environment variable
    pub fn with_env(mut self, name: impl Into<String>) -> Self {
        self.environment.push(name.into());
        self
    }

    /// Override the container's command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Set the network mode
    pub fn with_network(mut self, network: NetworkMode) -> Self {
        self.network = network;
        self
    }

    /// Add a port mapping
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.ports.push(port.into());
        self
    }

    /// The inline Dockerfile, if one is set and non-empty
    pub fn inline_build(&self) -> Option<&str> {
        self.dockerfile_inline
            .as_deref()
            .filter(|dockerfile| !dockerfile.trim().is_empty())
    }

    /// The command override, if one is set and non-empty
    pub fn command_override(&self) -> Option<&str> {
        self.command.as_deref().filter(|command| !command.is_empty())
    }

    /// Check that the spec names exactly one image source
    pub fn validate(&self) -> Result<()> {
        match (self.image.trim().is_empty(), self.inline_build().is_some()) {
            (true, false) => Err(Error::invalid_spec(
                "missing required field: image or build.dockerfile_inline",
            )),
            (false, true) => Err(Error::invalid_spec(
                "image and build.dockerfile_inline are mutually exclusive",
            )),
            _ => Ok(()),
        }
    }
}
