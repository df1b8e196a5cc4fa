//! Initialize the configuration directory: create ~/.rook, a default config, and the bundled prompts.
//!
//! Layout mirrors `crates/lib/config/`: `config/prompts/` → `~/.rook/prompts/`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;
use crate::prompts::BUNDLED_PROMPTS;

/// Create the config directory and default files if they do not exist.
/// - Writes `config.json` with `{}` if missing.
/// - Extracts the bundled prompts into `prompts/` unless that directory already exists.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config::config_dir(config_path);
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let prompts_dir = config_dir.join("prompts");
    if !prompts_dir.exists() {
        std::fs::create_dir_all(&prompts_dir)
            .with_context(|| format!("creating prompts directory {}", prompts_dir.display()))?;
        if let Err(e) = BUNDLED_PROMPTS.extract(&prompts_dir) {
            anyhow::bail!(
                "extracting bundled prompts to {}: {}",
                prompts_dir.display(),
                e
            );
        }
        log::info!("extracted bundled prompts to {}", prompts_dir.display());
    } else {
        log::debug!("prompts directory already exists at {}, skipping", prompts_dir.display());
    }

    Ok(config_dir)
}
