//! On-disk machine records.
//!
//! Layout: `<root>/machines/<name>/config.json`, next to the machine's SSH
//! key pair.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use dockyard_core::MachineRecord;
use std::fs;
use std::path::PathBuf;

/// Record file name inside a machine directory.
const RECORD_FILE: &str = "config.json";

/// Platform data directory used when no storage path is given.
pub fn default_root() -> Result<PathBuf> {
    ProjectDirs::from("io", "dockyard", "dockyard")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))
}

/// Check a machine name before it is used as a directory and remote name.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        bail!("machine name must not be empty");
    };
    if !first.is_ascii_alphanumeric() {
        bail!("machine name '{name}' must start with a letter or digit");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_') {
        bail!("machine name '{name}' may only contain letters, digits, '-', '.' and '_'");
    }
    Ok(())
}

/// Directory of machine records.
#[derive(Debug, Clone)]
pub struct MachineStore {
    root: PathBuf,
}

impl MachineStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn machine_dir(&self, name: &str) -> PathBuf {
        self.root.join("machines").join(name)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.machine_dir(name).join(RECORD_FILE)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.record_path(name).exists()
    }

    pub fn load(&self, name: &str) -> Result<MachineRecord> {
        validate_name(name)?;
        let path = self.record_path(name);
        if !path.exists() {
            bail!("machine '{name}' does not exist");
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read machine record from {:?}", path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse machine record from {:?}", path))
    }

    pub fn save(&self, record: &MachineRecord) -> Result<()> {
        let dir = self.machine_dir(&record.name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create machine directory {:?}", dir))?;

        let path = dir.join(RECORD_FILE);
        let contents = serde_json::to_string_pretty(record)?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write machine record to {:?}", path))?;

        tracing::debug!(machine = %record.name, path = %path.display(), "Saved machine record");
        Ok(())
    }

    /// Remove the machine directory, keys included.
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let dir = self.machine_dir(name);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove machine directory {:?}", dir))?;
        }
        Ok(())
    }
}
