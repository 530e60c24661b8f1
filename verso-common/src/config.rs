//! Configuration loading and data directory resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Data directory resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`data_dir` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = default_config_path() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(data_dir) = config.get("data_dir").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(data_dir));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_data_dir())
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("verso").join("config.toml"))
        .ok_or_else(|| Error::Config("Unable to determine platform config directory".to_string()))
}

/// OS-dependent default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("verso"))
        .unwrap_or_else(|| PathBuf::from("./verso-data"))
}

/// Ensure the data directory exists, creating it if missing
pub fn ensure_data_dir(path: &PathBuf) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        tracing::info!("Created data directory: {}", path.display());
    }
    Ok(())
}

/// Database file path inside the data directory
pub fn database_path(data_dir: &PathBuf) -> PathBuf {
    data_dir.join("verso.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arg_wins_over_everything() {
        let resolved = resolve_data_dir(Some("/tmp/verso-cli"), "VERSO_TEST_UNSET_VAR").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/verso-cli"));
    }

    #[test]
    fn falls_back_to_default_when_nothing_configured() {
        let resolved = resolve_data_dir(None, "VERSO_TEST_UNSET_VAR_2").unwrap();
        // Default is platform dependent; only assert it is non-empty
        assert!(!resolved.as_os_str().is_empty());
    }

    #[test]
    fn database_path_is_inside_data_dir() {
        let dir = PathBuf::from("/tmp/verso-data");
        assert_eq!(database_path(&dir), PathBuf::from("/tmp/verso-data/verso.db"));
    }
}
