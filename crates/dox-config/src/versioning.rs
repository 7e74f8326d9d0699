//! Command definition version tracking
//!
//! Stores a SHA-256 of each command's definition file after a successful run,
//! so the next run can tell whether the definition changed and an inline
//! image needs rebuilding.

use crate::{Loader, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the version store, inside the dox directory
pub const VERSIONS_FILE: &str = "command_versions.json";

/// Recorded version of one command definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandVersion {
    /// Hex SHA-256 of the definition file
    pub hash: String,
    /// When the hash was recorded
    pub last_updated: DateTime<Utc>,
}

/// Persistent map of command name to recorded definition hash
#[derive(Debug)]
pub struct VersionStore {
    loader: Loader,
    versions: BTreeMap<String, CommandVersion>,
}

/// Hex SHA-256 of a file's contents
pub fn file_hash(path: &Path) -> Result<String> {
    let content = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&content)))
}

impl VersionStore {
    /// Open the store next to `loader`'s command definitions.
    ///
    /// An unreadable or corrupt store is treated as empty.
    pub fn open(loader: Loader) -> Self {
        let mut store = Self {
            loader,
            versions: BTreeMap::new(),
        };
        if let Err(e) = store.load() {
            debug!("Ignoring unreadable version store: {}", e);
        }
        store
    }

    /// Path of the store file
    pub fn path(&self) -> PathBuf {
        self.loader.dox_dir().join(VERSIONS_FILE)
    }

    /// Whether the command's definition differs from the recorded one.
    ///
    /// A command with no recorded version counts as changed.
    pub fn has_command_changed(&self, command: &str) -> Result<bool> {
        let current = file_hash(&self.loader.command_path(command))?;
        Ok(self
            .versions
            .get(command)
            .is_none_or(|recorded| recorded.hash != current))
    }

    /// Record the command's current definition hash
    pub fn update_command_version(&mut self, command: &str) -> Result<()> {
        let hash = file_hash(&self.loader.command_path(command))?;
        self.versions.insert(
            command.to_string(),
            CommandVersion {
                hash,
                last_updated: Utc::now(),
            },
        );
        self.save()
    }

    fn load(&mut self) -> Result<()> {
        let content = match std::fs::read_to_string(self.path()) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        self.versions = serde_json::from_str(&content)?;
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let path = self.path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(&self.versions)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}
