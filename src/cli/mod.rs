//! Command-line interface for the `tiercache` binary.

pub mod executor;
pub mod parser;
pub mod validation;

pub use executor::execute_command;
pub use parser::{Cli, Commands};

use crate::config::{ConfigError, ConfigLoader, Settings};
use crate::logger::init_logger;

/// Load settings from `--config` when given, otherwise from the layered
/// configuration directory. Validated before returning.
pub fn load_settings(cli: &Cli) -> Result<Settings, ConfigError> {
    match &cli.config {
        Some(path) => ConfigLoader::with_config_file(path).load(),
        None => ConfigLoader::new()?.load(),
    }
}

/// Install the global subscriber from `[logger]`, honoring `--verbose` and
/// `--quiet`.
pub fn init_logger_from_settings(settings: &Settings, cli: &Cli) -> anyhow::Result<()> {
    let mut config = settings.logger.clone().into_logger_config()?;
    if let Some(level) = cli.log_level_override() {
        config = config.with_level(level)?;
    }
    init_logger(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_load_settings_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(
            &path,
            r#"
[cache.hot]
max_entries = 42

[[queues]]
name = "email"
attempts = 5
"#,
        )
        .unwrap();

        let args = ["tiercache", "--config", path.to_str().unwrap(), "check-config"];
        let cli = Cli::try_parse_from(args).unwrap();
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.cache.hot.max_entries, 42);
        assert_eq!(settings.queues.len(), 1);
        assert_eq!(settings.queues[0].attempts, 5);
    }

    #[test]
    fn test_load_settings_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[cache]\nrefresh_ahead_threshold = 3.0\n").unwrap();

        let cli = Cli::try_parse_from(["tiercache", "--config", path.to_str().unwrap()]).unwrap();
        assert!(load_settings(&cli).is_err());
    }
}
