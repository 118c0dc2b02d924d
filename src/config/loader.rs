//! Layered settings loading.
//!
//! Lowest to highest precedence: `default.toml`, `{environment}.toml`,
//! `local.toml`, then `TIERCACHE_*` variables with `__` between nested keys
//! (`TIERCACHE_CACHE__COLD__REDIS__URL` sets `cache.cold.redis.url`).
//! A single file named by `TIERCACHE_CONFIG_FILE` or `--config` replaces the
//! three file layers; variables still apply on top of it.

use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};

use crate::config::environment::Environment as AppEnvironment;
use crate::config::error::ConfigError;
use crate::config::settings::Settings;

const ENV_PREFIX: &str = "TIERCACHE";
const DIR_VAR: &str = "TIERCACHE_CONFIG_DIR";
const FILE_VAR: &str = "TIERCACHE_CONFIG_FILE";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Layered(PathBuf),
    Single(PathBuf),
}

/// A settings file the loader reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub path: PathBuf,
    pub required: bool,
}

impl Layer {
    fn required(path: PathBuf) -> Self {
        Self {
            path,
            required: true,
        }
    }

    fn optional(path: PathBuf) -> Self {
        Self {
            path,
            required: false,
        }
    }
}

#[derive(Debug)]
pub struct ConfigLoader {
    source: Source,
    environment: AppEnvironment,
}

impl ConfigLoader {
    /// Choose the source from `TIERCACHE_CONFIG_DIR` or `TIERCACHE_CONFIG_FILE`,
    /// defaulting to layered loading from `./config`.
    pub fn new() -> Result<Self, ConfigError> {
        let dir = std::env::var_os(DIR_VAR).map(PathBuf::from);
        let file = std::env::var_os(FILE_VAR).map(PathBuf::from);

        let source = match (dir, file) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingSources),
            (None, Some(file)) => Source::Single(file),
            (dir, None) => Source::Layered(dir.unwrap_or_else(|| PathBuf::from("config"))),
        };

        Ok(Self {
            source,
            environment: AppEnvironment::from_env(),
        })
    }

    pub fn with_config_file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            source: Source::Single(path.into()),
            environment: AppEnvironment::from_env(),
        }
    }

    pub fn environment(&self) -> AppEnvironment {
        self.environment
    }

    /// Files read, lowest precedence first.
    pub fn layers(&self) -> Vec<Layer> {
        match &self.source {
            Source::Single(path) => vec![Layer::required(path.clone())],
            Source::Layered(dir) => vec![
                Layer::required(dir.join("default.toml")),
                Layer::optional(dir.join(self.environment.config_file())),
                Layer::optional(dir.join("local.toml")),
            ],
        }
    }

    /// Merge every layer and the environment, then validate.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let settings: Settings = self
            .build()?
            .try_deserialize()
            .map_err(|e| ConfigError::Deserialize(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn build(&self) -> Result<Config, ConfigError> {
        let mut builder = Config::builder();
        for layer in self.layers() {
            if layer.required && !layer.path.exists() {
                return Err(ConfigError::NotFound(layer.path));
            }
            builder = builder.add_source(
                File::from(layer.path)
                    .format(FileFormat::Toml)
                    .required(layer.required),
            );
        }

        let overrides = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .ignore_empty(true)
            .try_parsing(true);

        Ok(builder.add_source(overrides).build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::ColdBackend;
    use crate::queue::Backoff;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Global mutex to ensure tests run sequentially to avoid env var conflicts
    static TEST_MUTEX: Mutex<()> = Mutex::new(());

    const DEFAULT_CONFIG: &str = r#"
[application]
name = "test-app"
version = "1.0.0"

[logger]
level = "info"

[logger.console]
enabled = true
colored = false

[cache]
default_ttl = 600

[cache.hot]
max_entries = 100

[cache.query]
max_entries = 50

[cache.cold]
backend = "memory"

[[cache.invalidation.rules]]
source = "user:*"
dependents = ["dashboard:stats", "user_list:*"]

[[queues]]
name = "email"
attempts = 3
backoff = { type = "exponential", delay_ms = 2000 }

[[queues]]
name = "cleanup"
attempts = 1
"#;

    /// Helper to create a temporary config directory with files
    fn setup_config_dir(files: &[(&str, &str)]) -> TempDir {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        for (name, content) in files {
            let path = temp_dir.path().join(name);
            fs::write(&path, content).expect("Failed to write config file");
        }
        temp_dir
    }

    /// Helper to safely set environment variables for a test
    struct EnvGuard {
        vars_to_restore: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self {
                vars_to_restore: Vec::new(),
            }
        }

        fn set(&mut self, key: &str, value: &str) {
            let original = std::env::var(key).ok();
            self.vars_to_restore.push((key.to_string(), original));
            unsafe {
                std::env::set_var(key, value);
            }
        }

        fn remove(&mut self, key: &str) {
            let original = std::env::var(key).ok();
            self.vars_to_restore.push((key.to_string(), original));
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, original_value) in self.vars_to_restore.iter().rev() {
                unsafe {
                    match original_value {
                        Some(value) => std::env::set_var(key, value),
                        None => std::env::remove_var(key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_layers_default_to_config_dir() {
        let _guard = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();

        env.remove("TIERCACHE_CONFIG_DIR");
        env.remove("TIERCACHE_CONFIG_FILE");
        env.set("TIERCACHE_APP_ENV", "prod");

        let loader = ConfigLoader::new().expect("Should create loader");
        assert_eq!(loader.environment(), AppEnvironment::Production);
        assert_eq!(
            loader.layers(),
            vec![
                Layer::required(PathBuf::from("config/default.toml")),
                Layer::optional(PathBuf::from("config/production.toml")),
                Layer::optional(PathBuf::from("config/local.toml")),
            ]
        );
    }

    #[test]
    fn test_config_file_var_selects_single_layer() {
        let _guard = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();

        env.remove("TIERCACHE_CONFIG_DIR");
        env.set("TIERCACHE_CONFIG_FILE", "/etc/tiercache.toml");

        let loader = ConfigLoader::new().unwrap();
        assert_eq!(
            loader.layers(),
            vec![Layer::required(PathBuf::from("/etc/tiercache.toml"))]
        );
    }

    #[test]
    fn test_dir_and_file_vars_conflict() {
        let _guard = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();

        env.set("TIERCACHE_CONFIG_DIR", "/custom/config");
        env.set("TIERCACHE_CONFIG_FILE", "/path/to/config.toml");

        assert!(matches!(
            ConfigLoader::new(),
            Err(ConfigError::ConflictingSources)
        ));
    }

    #[test]
    fn test_load_missing_default_toml() {
        let _guard = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();

        let temp_dir = setup_config_dir(&[]);

        env.set("TIERCACHE_CONFIG_DIR", temp_dir.path().to_str().unwrap());
        env.remove("TIERCACHE_CONFIG_FILE");
        env.remove("TIERCACHE_APP_ENV");

        let loader = ConfigLoader::new().expect("Should create loader");
        match loader.load() {
            Err(ConfigError::NotFound(path)) => assert!(path.ends_with("default.toml")),
            other => panic!("Expected NotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_default_toml_only() {
        let _guard = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();

        let temp_dir = setup_config_dir(&[("default.toml", DEFAULT_CONFIG)]);

        env.set("TIERCACHE_CONFIG_DIR", temp_dir.path().to_str().unwrap());
        env.remove("TIERCACHE_CONFIG_FILE");
        env.remove("TIERCACHE_APP_ENV");

        let settings = ConfigLoader::new().unwrap().load().expect("Should load settings");

        assert_eq!(settings.application.name, "test-app");
        assert_eq!(settings.cache.default_ttl, 600);
        assert_eq!(settings.cache.hot.max_entries, 100);
        assert_eq!(settings.cache.cold.backend, ColdBackend::Memory);
        assert_eq!(settings.cache.invalidation.rules.len(), 1);
        assert_eq!(
            settings.cache.invalidation.rules[0].dependents,
            vec!["dashboard:stats".to_string(), "user_list:*".to_string()]
        );

        assert_eq!(settings.queues.len(), 2);
        assert_eq!(settings.queues[0].name, "email");
        assert_eq!(
            settings.queues[0].backoff,
            Backoff::Exponential { delay_ms: 2000 }
        );
        assert_eq!(settings.queues[1].attempts, 1);
        assert_eq!(settings.queues[1].keep_completed, 100);
    }

    #[test]
    fn test_load_full_precedence_chain() {
        let _guard = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();

        let development_config = r#"
[application]
name = "dev-app"

[cache]
default_ttl = 60

[cache.hot]
max_entries = 10
"#;

        let local_config = r#"
[cache.hot]
max_entries = 20
"#;

        let temp_dir = setup_config_dir(&[
            ("default.toml", DEFAULT_CONFIG),
            ("development.toml", development_config),
            ("local.toml", local_config),
        ]);

        env.set("TIERCACHE_CONFIG_DIR", temp_dir.path().to_str().unwrap());
        env.remove("TIERCACHE_CONFIG_FILE");
        env.remove("TIERCACHE_APP_ENV");
        env.set("TIERCACHE_CACHE__DEFAULT_TTL", "30");

        let settings = ConfigLoader::new().unwrap().load().expect("Should load settings");

        // Environment variable has highest priority
        assert_eq!(settings.cache.default_ttl, 30);
        // local.toml overrides development.toml
        assert_eq!(settings.cache.hot.max_entries, 20);
        // development.toml overrides default.toml
        assert_eq!(settings.application.name, "dev-app");
        // default.toml provides base values
        assert_eq!(settings.cache.query.max_entries, 50);
        assert_eq!(settings.application.version, "1.0.0");
    }

    #[test]
    fn test_load_single_file_mode() {
        let _guard = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();

        let temp_dir = setup_config_dir(&[("single.toml", DEFAULT_CONFIG)]);
        let config_file_path = temp_dir.path().join("single.toml");

        env.remove("TIERCACHE_CONFIG_DIR");
        env.remove("TIERCACHE_APP_ENV");
        env.remove("TIERCACHE_CACHE__DEFAULT_TTL");

        let settings = ConfigLoader::with_config_file(config_file_path)
            .load()
            .expect("Should load settings");

        assert_eq!(settings.application.name, "test-app");
        assert_eq!(settings.queues.len(), 2);
    }

    #[test]
    fn test_load_rejects_invalid_settings() {
        let _guard = TEST_MUTEX.lock().unwrap();
        let mut env = EnvGuard::new();

        let broken = format!("{}\n[[queues]]\nname = \"email\"\n", DEFAULT_CONFIG);
        let temp_dir = setup_config_dir(&[("default.toml", broken.as_str())]);

        env.set("TIERCACHE_CONFIG_DIR", temp_dir.path().to_str().unwrap());
        env.remove("TIERCACHE_CONFIG_FILE");
        env.remove("TIERCACHE_APP_ENV");
        env.remove("TIERCACHE_CACHE__DEFAULT_TTL");

        let err = ConfigLoader::new().unwrap().load().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { field, .. } if field == "queues[2].name"));
    }
}
