//! Configuration validation utilities.

use std::collections::HashMap;

use spindle_core::{Nomenclature, Options};

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, SpindleConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &SpindleConfig) -> ConfigResult<()> {
    validate_options(&config.options)?;
    validate_logging(&config.logging)?;
    Ok(())
}

/// Validates application options.
pub fn validate_options(options: &Options) -> ConfigResult<()> {
    validate_nomenclature(&options.nomenclature)?;

    let extension = &options.filter.extension;
    if !extension.is_empty() && !extension.starts_with('.') {
        return Err(ConfigError::validation(format!(
            "filter extension '{extension}' must be empty or start with '.'"
        )));
    }
    Ok(())
}

fn validate_nomenclature(nomenclature: &Nomenclature) -> ConfigResult<()> {
    let fields = [
        ("data", &nomenclature.data),
        ("event", &nomenclature.event),
        ("once", &nomenclature.once),
        ("code", &nomenclature.code),
        ("name", &nomenclature.name),
    ];

    let mut seen: HashMap<&str, &'static str> = HashMap::new();
    for (field, key) in fields {
        if key.trim().is_empty() {
            return Err(ConfigError::validation(format!("nomenclature.{field} cannot be empty")));
        }
        if let Some(first) = seen.insert(key.as_str(), field) {
            return Err(ConfigError::DuplicateNomenclature {
                key: key.clone(),
                first,
                second: field,
            });
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation("logging.output = \"file\" requires logging.file_path"));
    }
    if logging.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation("logging.filters cannot contain an empty target"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&SpindleConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_extension_disables_filter() {
        let mut config = SpindleConfig::default();
        config.options.filter.extension.clear();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_extension_needs_dot() {
        let mut config = SpindleConfig::default();
        config.options.filter.extension = "toml".to_string();
        assert!(matches!(validate_config(&config), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_nomenclature_keys_are_distinct() {
        let mut config = SpindleConfig::default();
        config.options.nomenclature.name = "code".to_string();
        match validate_config(&config) {
            Err(ConfigError::DuplicateNomenclature { key, first, second }) => {
                assert_eq!(key, "code");
                assert_eq!(first, "code");
                assert_eq!(second, "name");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_nomenclature_keys_are_not_blank() {
        let mut config = SpindleConfig::default();
        config.options.nomenclature.event = " ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = SpindleConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some(PathBuf::from("spindle.log"));
        assert!(validate_config(&config).is_ok());
    }
}
