use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use stylist_types::{Config, DEFAULT_CONFIG_PATH};

use crate::presets::resolve_presets;

/// Loads the configuration file, validates processor identities, and
/// resolves presets to concrete processors.
///
/// A missing file yields the built-in defaults: there is nothing to run,
/// but `files`/`init` still work.
pub fn load(flag_path: Option<&Path>) -> Result<Config> {
    let path = flag_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = if path.is_file() {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read config {:?}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("parse config {:?}", path.display()))?
    } else {
        debug!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };

    // The flag takes precedence over anything in the file.
    config.config_path = path.to_string_lossy().into_owned();

    config.validate()?;
    config.processors = resolve_presets(config.processors)?;

    Ok(config)
}
