use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::system::FileSystemInterface;

use super::types::Config;

/// Reads and writes the daemon's TOML configuration through an injected
/// file system.
pub struct ConfigLoader<F: FileSystemInterface> {
    file_system: F,
    config_path: PathBuf,
}

impl<F: FileSystemInterface> ConfigLoader<F> {
    pub fn new(file_system: F, config_path: PathBuf) -> Self {
        Self {
            file_system,
            config_path,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration for startup.
    ///
    /// A missing file is written with defaults so the user has something to
    /// edit; failure to write it still yields the defaults.
    pub fn load_config(&self) -> Result<Config> {
        if !self.file_system.config_file_exists(&self.config_path) {
            info!(
                "No configuration at {}, writing defaults",
                self.config_path.display()
            );
            let config = Config::default();
            if let Err(e) = self.save_config(&config) {
                warn!("Could not write default configuration: {:#}", e);
            }
            return Ok(config);
        }

        self.read_config()
    }

    /// Re-read the file while the daemon runs.
    ///
    /// Returns `None` when the file parses to the configuration already in
    /// use. A missing or invalid file is an error and leaves `current` in
    /// charge; defaults are never substituted mid-run.
    pub fn reload_config(&self, current: &Config) -> Result<Option<Config>> {
        if !self.file_system.config_file_exists(&self.config_path) {
            bail!(
                "configuration file {} was removed",
                self.config_path.display()
            );
        }

        let config = self.read_config()?;
        let changed = current.changed_sections(&config);
        if changed.is_empty() {
            debug!("Configuration unchanged");
            return Ok(None);
        }

        info!("Configuration changed: {}", changed.join(", "));
        Ok(Some(config))
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            self.file_system
                .create_config_dir(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content =
            toml::to_string_pretty(config).context("Failed to serialize configuration")?;
        self.file_system
            .write_config_file(&self.config_path, &content)
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    fn read_config(&self) -> Result<Config> {
        debug!("Reading configuration from {}", self.config_path.display());
        let path = self.config_path.display();

        let content = self
            .file_system
            .read_config_file(&self.config_path)
            .with_context(|| format!("Failed to read {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path))?;

        Ok(config)
    }
}

impl ConfigLoader<crate::system::StandardFileSystem> {
    pub fn new_production(config_path: PathBuf) -> Self {
        Self::new(crate::system::StandardFileSystem, config_path)
    }

    /// Loader for `~/.config/presence-player/config.toml`
    pub fn new_with_default_path() -> Result<Self> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        Ok(Self::new_production(
            home_dir.join(".config/presence-player/config.toml"),
        ))
    }
}
