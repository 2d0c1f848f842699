//! Repository configuration
//!
//! Resolved once at start-up and handed to the store constructor and the
//! build. Nothing here is cached process-wide.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::build::{default_concurrency, BuildOptions};
use crate::store::{FilesystemStore, ObjectStore};
use crate::verify::PayloadPaths;

/// Environment variable naming the repository root
pub const REPO_ENV_VAR: &str = "REPOCAT_REPO";

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Where the repository lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSettings {
    /// Repository root on local disk
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Defaults for catalog builds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    #[serde(default)]
    pub force: bool,

    #[serde(default)]
    pub skip_payload_check: bool,

    /// Worker count; host parallelism when unset
    #[serde(default)]
    pub concurrency: Option<usize>,

    #[serde(flatten)]
    pub payload_paths: PayloadPaths,
}

impl BuildSettings {
    pub fn to_options(&self) -> BuildOptions {
        BuildOptions {
            force: self.force,
            skip_payload_check: self.skip_payload_check,
            concurrency: self
                .concurrency
                .filter(|n| *n > 0)
                .unwrap_or_else(default_concurrency),
            payload_paths: self.payload_paths.clone(),
        }
    }
}

/// Configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub repo: RepoSettings,

    #[serde(default)]
    pub build: BuildSettings,
}

impl RepoConfig {
    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Invalid repocat configuration")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).context("Failed to serialize configuration")
    }

    /// Write configuration to `path`, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(path, self.to_yaml()?)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Default config file location for the current user.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "repocat", "repocat")
            .context("Could not determine config directory")?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Pick the repository root: explicit override, then file, then
    /// `REPOCAT_REPO`.
    pub fn resolve_repo_path(&self, override_path: Option<PathBuf>) -> Option<PathBuf> {
        override_path
            .or_else(|| self.repo.path.clone())
            .or_else(|| std::env::var_os(REPO_ENV_VAR).map(PathBuf::from))
    }

    /// Open the repository on local disk.
    pub async fn open_store(&self, override_path: Option<PathBuf>) -> Result<Arc<dyn ObjectStore>> {
        let Some(root) = self.resolve_repo_path(override_path) else {
            bail!(
                "No repository configured. Pass --repo, set repo.path in the config, or set {}",
                REPO_ENV_VAR
            );
        };
        let store = FilesystemStore::open(&root)
            .await
            .with_context(|| format!("Failed to open repository at {}", root.display()))?;
        Ok(Arc::new(store))
    }
}
