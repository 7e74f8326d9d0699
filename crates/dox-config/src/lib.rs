//! # Dox Configuration
//!
//! Global settings and per-command definitions for dox.
//!
//! Everything lives under the dox config home (`$XDG_CONFIG_HOME/dox`):
//!
//! ```text
//! dox/
//!   config.yaml              # global settings
//!   commands/<name>.yaml     # one file per command
//!   command_versions.json    # definition hashes, see [`versioning`]
//! ```

#![warn(missing_docs)]

use dox_engine::backends::BackendSelector;
use dox_engine::{CommandSpec, NetworkMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod loader;
pub mod versioning;

pub use loader::Loader;
pub use versioning::{CommandVersion, VersionStore};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or write a configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Failed to parse or write the version store
    #[error("Failed to parse version store: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("configuration {0}")]
    ValidationError(String),

    /// No definition file for the command
    #[error("command '{command}' doesn't exist. Create {}", .path.display())]
    CommandNotFound {
        /// The command that was asked for
        command: String,
        /// Where its definition was expected
        path: PathBuf,
    },

    /// No home or config directory could be determined
    #[error("Could not determine the configuration directory")]
    NoConfigHome,
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Which container engine to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    /// Docker, over its API socket
    #[default]
    Docker,
    /// Podman, through its client binary
    Podman,
    /// Docker, through its client binary
    DockerCli,
}

/// Global settings from `config.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Container engine to use
    #[serde(default)]
    pub runtime: RuntimeKind,

    /// Docker socket path or URL, instead of the local default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_host: Option<String>,

    /// Abandon a run after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl GlobalConfig {
    /// The backend the runtime setting selects
    pub fn backend_selector(&self) -> BackendSelector {
        match self.runtime {
            RuntimeKind::Docker => BackendSelector::Api {
                host: self.docker_host.clone(),
            },
            RuntimeKind::Podman => BackendSelector::Cli {
                program: "podman".to_string(),
            },
            RuntimeKind::DockerCli => BackendSelector::Cli {
                program: "docker".to_string(),
            },
        }
    }

    /// The run deadline, if one is configured
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Inline image build settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Dockerfile text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_inline: Option<String>,
}

/// A command definition from `commands/<name>.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Registry image to run
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Build a custom image instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,

    /// Extra volume mounts, `source:target[:mode]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    /// Host environment variables to forward, by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,

    /// Command placed before the user's arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Network mode: `host`, `bridge`, `none` or a network name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// Port mappings, `[hostIP:]hostPort:containerPort[/proto]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

impl CommandConfig {
    /// The inline Dockerfile, if set and non-empty
    pub fn dockerfile_inline(&self) -> Option<&str> {
        self.build
            .as_ref()
            .and_then(|build| build.dockerfile_inline.as_deref())
            .filter(|dockerfile| !dockerfile.trim().is_empty())
    }

    /// Check that exactly one image source is given
    pub fn validate(&self) -> Result<()> {
        match (self.image.trim().is_empty(), self.dockerfile_inline().is_some()) {
            (true, false) => Err(ConfigError::ValidationError(
                "missing required field: image or build.dockerfile_inline".to_string(),
            )),
            (false, true) => Err(ConfigError::ValidationError(
                "sets both image and build.dockerfile_inline".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Convert into the engine's command specification
    pub fn to_spec(&self) -> CommandSpec {
        CommandSpec {
            image: self.image.trim().to_string(),
            dockerfile_inline: self.dockerfile_inline().map(str::to_string),
            volumes: self.volumes.clone(),
            environment: self.environment.clone(),
            command: self.command.clone().filter(|command| !command.is_empty()),
            network: NetworkMode::parse(self.network.as_deref().unwrap_or_default()),
            ports: self.ports.clone(),
        }
    }

    /// Whether the image is pinned to a content digest
    pub fn is_pinned(&self) -> bool {
        dox_engine::is_pinned(&self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_selects_backend() {
        let config: GlobalConfig = serde_yaml::from_str("runtime: podman").unwrap();
        assert_eq!(
            config.backend_selector(),
            BackendSelector::Cli {
                program: "podman".to_string()
            }
        );

        let config: GlobalConfig =
            serde_yaml::from_str("runtime: docker\ndocker_host: /run/user/1000/docker.sock")
                .unwrap();
        assert_eq!(
            config.backend_selector(),
            BackendSelector::Api {
                host: Some("/run/user/1000/docker.sock".to_string())
            }
        );

        let config: GlobalConfig = serde_yaml::from_str("runtime: docker-cli").unwrap();
        assert_eq!(config.runtime, RuntimeKind::DockerCli);

        assert!(serde_yaml::from_str::<GlobalConfig>("runtime: lxc").is_err());
    }

    #[test]
    fn test_deadline() {
        let config = GlobalConfig {
            timeout_secs: Some(30),
            ..Default::default()
        };
        assert_eq!(config.deadline(), Some(Duration::from_secs(30)));
        assert_eq!(GlobalConfig::default().deadline(), None);
    }

    #[test]
    fn test_command_to_spec() {
        let yaml = r#"
image: node:20
volumes:
  - .:/src
environment:
  - NPM_TOKEN
command: npm
network: host
ports:
  - "3000:3000"
"#;
        let config: CommandConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        let spec = config.to_spec();
        assert_eq!(spec.image, "node:20");
        assert_eq!(spec.dockerfile_inline, None);
        assert_eq!(spec.command.as_deref(), Some("npm"));
        assert_eq!(spec.network, NetworkMode::Host);
        assert_eq!(spec.volumes, vec![".:/src".to_string()]);
        assert_eq!(spec.ports, vec!["3000:3000".to_string()]);
    }

    #[test]
    fn test_validation() {
        let empty = CommandConfig::default();
        assert!(matches!(
            empty.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let build: CommandConfig =
            serde_yaml::from_str("build:\n  dockerfile_inline: |\n    FROM alpine\n").unwrap();
        assert!(build.validate().is_ok());
        assert!(build.to_spec().inline_build().is_some());

        let both = CommandConfig {
            image: "alpine".to_string(),
            ..build
        };
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_missing_command_message() {
        let err = ConfigError::CommandNotFound {
            command: "jq".to_string(),
            path: PathBuf::from("/home/dev/.config/dox/commands/jq.yaml"),
        };
        assert_eq!(
            err.to_string(),
            "command 'jq' doesn't exist. Create /home/dev/.config/dox/commands/jq.yaml"
        );
    }
}
