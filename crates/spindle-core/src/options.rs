//! Application options and the structural deep-merge used to build them.
//!
//! User options arrive as a JSON object and are merged over
//! [`Options::default`]. Keys present in both must carry the same JSON type;
//! objects are merged recursively, everything else is replaced. Keys the
//! defaults do not know are carried through and ignored on decode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, json_type};

/// Field names looked up on record artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nomenclature {
    /// Field holding the record's payload.
    pub data: String,
    /// Field declaring the target event.
    pub event: String,
    /// Field declaring once-vs-on mode.
    pub once: String,
    /// Field holding the callable; also the required name of bare functions.
    pub code: String,
    /// Field holding the display name.
    pub name: String,
}

impl Default for Nomenclature {
    fn default() -> Self {
        Self {
            data: "data".to_string(),
            event: "event".to_string(),
            once: "once".to_string(),
            code: "code".to_string(),
            name: "name".to_string(),
        }
    }
}

/// File filtering options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    /// File name suffix to scan for. Empty disables filtering.
    pub extension: String,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            extension: ".toml".to_string(),
        }
    }
}

/// Associative container backing the event cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    /// Insertion-ordered maps. Dispatch order equals discovery order.
    #[default]
    Ordered,
    /// Key-ordered maps. Dispatch order follows path order.
    Sorted,
}

/// Cache options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Whether resolved handlers are memoized per event.
    pub enable: bool,
    /// Container implementation.
    pub driver: CacheDriver,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enable: true,
            driver: CacheDriver::Ordered,
        }
    }
}

/// Application options. Immutable once the application is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Record field names.
    pub nomenclature: Nomenclature,
    /// File filtering.
    pub filter: FilterOptions,
    /// Handler cache.
    pub cache: CacheOptions,
}

impl Options {
    /// Builds options by deep-merging `user` over the defaults.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::MissingOptions`] if `user` is `null`
    /// - [`ErrorKind::InvalidOptionsProvided`] if `user` is not an object
    /// - [`ErrorKind::InvalidOptionProvided`] on a type mismatch
    /// - [`ErrorKind::Options`] if the merged value does not decode
    pub fn from_value(user: Value) -> Result<Self, ErrorKind> {
        let user = match user {
            Value::Null => return Err(ErrorKind::MissingOptions),
            Value::Object(map) => map,
            other => {
                return Err(ErrorKind::InvalidOptionsProvided {
                    found: json_type(&other),
                });
            }
        };

        let defaults = serde_json::to_value(Self::default()).map_err(ErrorKind::Options)?;
        let merged = deep_merge(defaults, Value::Object(user))?;
        serde_json::from_value(merged).map_err(ErrorKind::Options)
    }
}

/// Merges `user` over `base`.
///
/// Both values must be objects for a merge to happen; otherwise `user` wins.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidOptionProvided`] naming the dotted key path when
/// a key exists in both with different JSON types.
pub fn deep_merge(base: Value, user: Value) -> Result<Value, ErrorKind> {
    match (base, user) {
        (Value::Object(mut base), Value::Object(user)) => {
            merge_map(&mut base, user, "")?;
            Ok(Value::Object(base))
        }
        (_, user) => Ok(user),
    }
}

fn merge_map(base: &mut Map<String, Value>, user: Map<String, Value>, prefix: &str) -> Result<(), ErrorKind> {
    for (key, value) in user {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match base.get_mut(&key) {
            Some(existing) => {
                let expected = json_type(existing);
                let found = json_type(&value);
                if expected != found {
                    return Err(ErrorKind::InvalidOptionProvided {
                        key: path,
                        expected,
                        found,
                    });
                }
                match (existing, value) {
                    (Value::Object(existing), Value::Object(value)) => {
                        merge_map(existing, value, &path)?;
                    }
                    (existing, value) => *existing = value,
                }
            }
            None => {
                base.insert(key, value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_yields_defaults() {
        let options = Options::from_value(json!({})).unwrap();
        assert_eq!(options, Options::default());
        assert_eq!(options.filter.extension, ".toml");
        assert!(options.cache.enable);
    }

    #[test]
    fn test_nested_override_keeps_siblings() {
        let options = Options::from_value(json!({
            "nomenclature": { "code": "run" },
            "cache": { "enable": false }
        }))
        .unwrap();

        assert_eq!(options.nomenclature.code, "run");
        assert_eq!(options.nomenclature.data, "data");
        assert!(!options.cache.enable);
        assert_eq!(options.cache.driver, CacheDriver::Ordered);
    }

    #[test]
    fn test_driver_selection() {
        let options = Options::from_value(json!({ "cache": { "driver": "sorted" } })).unwrap();
        assert_eq!(options.cache.driver, CacheDriver::Sorted);

        let err = Options::from_value(json!({ "cache": { "driver": "lru" } })).unwrap_err();
        assert!(matches!(err, ErrorKind::Options(_)));
    }

    #[test]
    fn test_type_mismatch_names_key() {
        let err = Options::from_value(json!({ "cache": { "enable": "yes" } })).unwrap_err();
        match err {
            ErrorKind::InvalidOptionProvided {
                key,
                expected,
                found,
            } => {
                assert_eq!(key, "cache.enable");
                assert_eq!(expected, "boolean");
                assert_eq!(found, "string");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_object_replaced_by_scalar_is_rejected() {
        let err = Options::from_value(json!({ "filter": ".rs" })).unwrap_err();
        assert!(matches!(err, ErrorKind::InvalidOptionProvided { key, .. } if key == "filter"));
    }

    #[test]
    fn test_missing_and_invalid_options() {
        assert!(matches!(
            Options::from_value(Value::Null),
            Err(ErrorKind::MissingOptions)
        ));
        assert!(matches!(
            Options::from_value(json!([1, 2])),
            Err(ErrorKind::InvalidOptionsProvided { found: "array" })
        ));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let options = Options::from_value(json!({ "extra": { "deep": 1 } })).unwrap();
        assert_eq!(options, Options::default());
    }

    #[test]
    fn test_deep_merge_leaves_user_only_keys() {
        let merged = deep_merge(json!({ "a": { "b": 1 } }), json!({ "a": { "c": 2 } })).unwrap();
        assert_eq!(merged, json!({ "a": { "b": 1, "c": 2 } }));
    }
}
