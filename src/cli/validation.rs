//! Value parsers for CLI arguments that clap cannot check on its own.

use std::fs;
use std::path::PathBuf;

/// Validate that a configuration file exists, is a file and can be opened.
pub fn validate_config_file_path(path_str: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(format!("Configuration file does not exist: '{}'", path_str));
    }

    if !path.is_file() {
        return Err(format!("Configuration path is not a file: '{}'", path_str));
    }

    if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
        return Err(format!("Configuration file must be a .toml file: '{}'", path_str));
    }

    match fs::File::open(&path) {
        Ok(_) => Ok(path),
        Err(e) => Err(format!("Cannot read configuration file '{}': {}", path_str, e)),
    }
}

/// Validate a maintenance interval in seconds.
pub fn validate_interval_secs(value: &str) -> Result<u64, String> {
    let secs: u64 = value
        .parse()
        .map_err(|_| format!("Interval must be a positive number of seconds, got: '{}'", value))?;

    if secs == 0 {
        return Err("Interval must be greater than 0".to_string());
    }

    Ok(secs)
}
