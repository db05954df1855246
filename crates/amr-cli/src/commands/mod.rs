//! Command handler modules for amr-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod fetch;
pub mod status;

use std::path::{Path, PathBuf};

use amr_config::{LoadedConfig, UnusedKeyPolicy};
use anyhow::{Context, Result};
use tracing::warn;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load layered YAML (possibly none) and warn about keys nothing reads.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = amr_config::load_layered_yaml(&path_refs).context("load config layers")?;

    let report = amr_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for p in &report.unused_leaf_pointers {
        warn!(pointer = %p, "config key is not used");
    }
    Ok(loaded)
}

/// `downloaded_<name>` next to the candidate list.
pub fn default_state_path(candidates: &Path) -> PathBuf {
    let name = candidates
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "candidates.csv".to_string());
    candidates.with_file_name(format!("downloaded_{name}"))
}
