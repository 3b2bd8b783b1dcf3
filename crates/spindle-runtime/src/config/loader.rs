//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config`: enables `spindle.toml` (on by default in the `spindle` crate)
//! - `yaml-config`: enables `spindle.yaml` / `spindle.yml`
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile-specific config file (`spindle.{profile}.toml`)
//! 3. Main config file (`spindle.toml`)
//! 4. Environment variables (`SPINDLE_*`)
//! 5. Programmatic overrides
//!
//! # Environment Variable Mapping
//!
//! Variables use the `SPINDLE_` prefix with `__` as the nesting separator:
//!
//! - `SPINDLE_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `SPINDLE_OPTIONS__CACHE__ENABLE=false` → `options.cache.enable = false`
//! - `SPINDLE_OPTIONS__FILTER__EXTENSION=.hdl` → `options.filter.extension = ".hdl"`
//!
//! # Example
//!
//! ```rust,ignore
//! use spindle_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./config/spindle.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::SpindleConfig;
use super::validation::validate_config;

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "SPINDLE_";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name. `prod` and `dev` are accepted as aliases.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `SPINDLE_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("SPINDLE_PROFILE")
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader reading the profile from `SPINDLE_PROFILE`.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the user config directory (`~/.config/spindle` on Linux).
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join("spindle")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a configuration over every other source.
    pub fn merge(mut self, config: SpindleConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and validates the configuration.
    pub fn load(self) -> ConfigResult<SpindleConfig> {
        let profile = self.profile.clone();
        let config: SpindleConfig = self.build_figment()?.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            level = %config.logging.level,
            cache = config.options.cache.enable,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(SpindleConfig::default()));

        match self.config_file.take() {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration file");
                figment = merge_config_file(figment, &path)?;
            }
            Some(path) => return Err(ConfigError::FileNotFound(path)),
            None => figment = self.load_config_files(figment),
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        let overrides = std::mem::take(&mut self.figment);
        Ok(figment.merge(overrides))
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }

        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("spindle"));
        }
        paths
    }

    /// Tries `stem.{profile}.ext` then `stem.ext` in every search path. Stops
    /// at the first directory holding a base file.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        extensions: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for ext in extensions {
                let profile_path = search_path.join(format!("spindle.{}.{ext}", self.profile));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(format!("spindle.{ext}"));
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return (merge_fn(figment, &base_path), true);
                }
            }
        }
        (figment, false)
    }

    fn load_config_files(&self, figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        #[allow(unused_mut)]
        let (mut figment, mut found) = (figment, false);

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(figment, &search_paths, &["toml"], |fig, path| {
                fig.merge(Toml::file(path))
            });
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(figment, &search_paths, &["yaml", "yml"], |fig, path| {
                fig.merge(Yaml::file(path))
            });
            figment = f;
            found |= ok;
        }

        if !found {
            warn!(paths = ?search_paths, "No configuration file found, using defaults");
        }
        figment
    }
}

/// Merges one file, dispatching on its extension.
fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<SpindleConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from `path`, with environment overrides.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<SpindleConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogLevel, LogOutput};
    use spindle_core::CacheDriver;
    use std::fs;

    fn isolated() -> (tempfile::TempDir, ConfigLoader) {
        let dir = tempfile::TempDir::new().unwrap();
        let loader = ConfigLoader::new().without_env().search_path(dir.path());
        (dir, loader)
    }

    #[test]
    fn test_defaults_without_files() {
        let (_dir, loader) = isolated();
        let config = loader.load().unwrap();
        assert_eq!(config, SpindleConfig::default());
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse("Development"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_base_file_overrides_profile_file() {
        let (dir, loader) = isolated();
        fs::write(
            dir.path().join("spindle.staging.toml"),
            "[logging]\nlevel = \"trace\"\noutput = \"stderr\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("spindle.toml"),
            "[logging]\nlevel = \"debug\"\n\n[options.cache]\ndriver = \"sorted\"\n",
        )
        .unwrap();

        let config = loader.profile("staging").load().unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.output, LogOutput::Stderr);
        assert_eq!(config.options.cache.driver, CacheDriver::Sorted);
        assert_eq!(config.options.nomenclature.code, "code");
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_programmatic_merge_wins() {
        let (dir, loader) = isolated();
        fs::write(dir.path().join("spindle.toml"), "[options.cache]\nenable = true\n").unwrap();

        let mut overrides = SpindleConfig::default();
        overrides.options.cache.enable = false;
        let config = loader.merge(overrides).load().unwrap();
        assert!(!config.options.cache.enable);
    }

    #[test]
    fn test_missing_explicit_file() {
        let (dir, loader) = isolated();
        let err = loader.file(dir.path().join("nope.toml")).load().unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_invalid_file_fails_validation() {
        let (dir, loader) = isolated();
        let path = dir.path().join("spindle.toml");
        fs::write(&path, "[options.filter]\nextension = \"toml\"\n").unwrap();

        let err = loader.file(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }
}
