//! Configuration file resolution and loading
//!
//! Config file lookup follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`<config_dir>/bvp/<app>.toml`)
//! 4. Built-in defaults (no file)
//!
//! A missing file is never fatal: callers get a warning and the defaults.
//! A file that exists but fails to parse is an error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "BVP_CONFIG";

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve which config file to read, if any
///
/// Returns `None` when no source names a file and the per-user default does
/// not exist, meaning built-in defaults apply.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config directory
    default_config_path(app_name).filter(|p| p.exists())
}

/// Platform config location for an application (`~/.config/bvp/<app>.toml` on Linux)
pub fn default_config_path(app_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bvp").join(format!("{}.toml", app_name)))
}

/// Parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    let parsed = toml::from_str(&content)?;
    Ok(parsed)
}

/// Parse a TOML file into `T`, falling back to `T::default()` if there is no file
pub fn load_toml_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} does not exist, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    info!("Loading config from {}", path.display());
    load_toml(path).map_err(|e| match e {
        Error::Toml(err) => Error::Config(format!("{}: {}", path.display(), err)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_argument_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/explicit.toml")), "BVP_UNUSED_VAR", "x");
        assert_eq!(path, Some(PathBuf::from("/tmp/explicit.toml")));
    }

    #[test]
    fn test_logging_defaults_to_info() {
        assert_eq!(LoggingConfig::default().level, "info");
    }
}
