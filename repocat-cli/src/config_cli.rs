//! repocat config commands
//!
//! Inspect or create the YAML configuration file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use repocat_core::config::RepoConfig;

/// Config subcommand
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Write a starter configuration file
    Init {
        /// Repository root to record in the file
        #[clap(long)]
        repo: Option<PathBuf>,

        /// Overwrite an existing file
        #[clap(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self, config_path: &Path) -> Result<()> {
        match self.command {
            ConfigSubcommand::Show => execute_show(config_path),
            ConfigSubcommand::Init { repo, force } => execute_init(config_path, repo, force),
        }
    }
}

fn execute_show(config_path: &Path) -> Result<()> {
    let config = RepoConfig::load_from_path(config_path)?;
    println!("# {}", config_path.display());
    print!("{}", config.to_yaml()?);
    Ok(())
}

fn execute_init(config_path: &Path, repo: Option<PathBuf>, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "Configuration already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let mut config = RepoConfig::default();
    if let Some(repo) = repo {
        let repo = repo
            .canonicalize()
            .with_context(|| format!("Repository not found: {}", repo.display()))?;
        config.repo.path = Some(repo);
    }

    config.save_to_path(config_path)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}
