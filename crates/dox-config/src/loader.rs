//! Locating and reading configuration files

use crate::{CommandConfig, ConfigError, GlobalConfig, Result};
use std::path::PathBuf;
use tracing::debug;

/// Directory under the config home that holds everything dox reads
pub const DOX_DIR: &str = "dox";

/// Reads configuration from a config home
#[derive(Debug, Clone)]
pub struct Loader {
    config_home: PathBuf,
}

impl Loader {
    /// Use `$XDG_CONFIG_HOME`, falling back to the platform config directory
    /// and then `~/.config`
    pub fn new() -> Result<Self> {
        let config_home = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::config_dir)
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or(ConfigError::NoConfigHome)?;
        Ok(Self::with_config_home(config_home))
    }

    /// Use an explicit config home
    pub fn with_config_home(config_home: impl Into<PathBuf>) -> Self {
        Self {
            config_home: config_home.into(),
        }
    }

    /// The `dox` directory
    pub fn dox_dir(&self) -> PathBuf {
        self.config_home.join(DOX_DIR)
    }

    /// The commands directory
    pub fn commands_dir(&self) -> PathBuf {
        self.dox_dir().join("commands")
    }

    /// Path of a command's definition file
    pub fn command_path(&self, command: &str) -> PathBuf {
        self.commands_dir().join(format!("{}.yaml", command))
    }

    /// Load `config.yaml`; a missing file yields the defaults
    pub fn load_global(&self) -> Result<GlobalConfig> {
        let path = self.dox_dir().join("config.yaml");
        match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Ok(GlobalConfig::default()),
            Ok(content) => Ok(serde_yaml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No global config at {}, using defaults", path.display());
                Ok(GlobalConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load and validate a command's definition
    pub fn load_command(&self, command: &str) -> Result<CommandConfig> {
        let path = self.command_path(command);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::CommandNotFound {
                    command: command.to_string(),
                    path,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let config: CommandConfig = if content.trim().is_empty() {
            CommandConfig::default()
        } else {
            serde_yaml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Names of all defined commands, sorted
    pub fn list_commands(&self) -> Result<Vec<String>> {
        let dir = self.commands_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut commands = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "yaml") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    commands.push(stem.to_string());
                }
            }
        }
        commands.sort();
        Ok(commands)
    }
}
