//! Agent configuration (skylight.toml)
//!
//! ```toml
//! library_path = "/opt/skylight/libskylight.so"
//!
//! [env]
//! SKYLIGHT_AUTHENTICATION = "abc123"
//! SKYLIGHT_VERSION = "5.0.0"
//! ```
//!
//! The `[env]` table is what `instrumenter_new` receives, flattened into
//! `[KEY, VALUE, KEY, VALUE, ...]`. Process environment variables can
//! override both parts; see [`SkylightConfig::with_env_overrides`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate::{Gate, LoadStatus};
use crate::instrumenter::MAX_ENV_ENTRIES;
use crate::loader::LoadError;

/// Variable that overrides `library_path`
pub const LIB_PATH_VAR: &str = "SKYLIGHT_LIB_PATH";

/// Prefix of variables merged into `env`
pub const ENV_PREFIX: &str = "SKYLIGHT_";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to render TOML
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    Validation(String),

    /// Neither the file nor the environment named a library
    #[error("No libskylight path configured (set library_path or SKYLIGHT_LIB_PATH)")]
    MissingLibraryPath,

    /// The configured library could not be loaded
    #[error("Failed to load libskylight: {0}")]
    Load(#[from] LoadError),
}

/// Where libskylight lives and what it is told at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SkylightConfig {
    /// Path of the shared library
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_path: Option<PathBuf>,

    /// Settings handed to the instrumenter
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl SkylightConfig {
    /// Load a config from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Render the config back to skylight.toml form
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Parse a config from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: SkylightConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(std::env::vars_os().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    /// Apply overrides from `vars`.
    ///
    /// `SKYLIGHT_LIB_PATH` replaces `library_path`; every other
    /// `SKYLIGHT_*` variable is merged into `env`, replacing a value the
    /// file set for the same key.
    pub fn with_overrides<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if key == LIB_PATH_VAR {
                if !value.is_empty() {
                    self.library_path = Some(PathBuf::from(value));
                }
            } else if key.starts_with(ENV_PREFIX) {
                self.env.insert(key, value);
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in self.env.keys() {
            validate_key(key)?;
        }

        let entries = self.env.len() * 2;
        if entries > MAX_ENV_ENTRIES {
            return Err(ConfigError::Validation(format!(
                "{} env settings flatten to {} entries, at most {} are allowed",
                self.env.len(),
                entries,
                MAX_ENV_ENTRIES
            )));
        }

        if let Some(path) = &self.library_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "library_path cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// `env` flattened in key order
    pub fn env_pairs(&self) -> Vec<Vec<u8>> {
        self.env
            .iter()
            .flat_map(|(key, value)| [key.as_bytes().to_vec(), value.as_bytes().to_vec()])
            .collect()
    }

    /// Load the configured library into `gate`
    pub fn load_library(&self, gate: &Gate) -> Result<LoadStatus, ConfigError> {
        let path = self
            .library_path
            .as_deref()
            .ok_or(ConfigError::MissingLibraryPath)?;
        Ok(gate.load(path)?)
    }
}

fn validate_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::Validation(
            "env key cannot be empty".to_string(),
        ));
    }
    if key.contains('=') || key.contains('\0') {
        return Err(ConfigError::Validation(format!(
            "Invalid env key: {:?}. Keys cannot contain '=' or NUL",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_config() {
        let config = SkylightConfig::from_str(
            r#"
library_path = "/opt/skylight/libskylight.so"

[env]
SKYLIGHT_VERSION = "5.0.0"
SKYLIGHT_AUTHENTICATION = "abc123"
"#,
        )
        .unwrap();

        assert_eq!(
            config.library_path.as_deref(),
            Some(Path::new("/opt/skylight/libskylight.so"))
        );
        assert_eq!(config.env.len(), 2);
    }

    #[test]
    fn test_empty_config() {
        let config = SkylightConfig::from_str("").unwrap();
        assert_eq!(config, SkylightConfig::default());
        assert!(config.env_pairs().is_empty());
    }

    #[test]
    fn test_env_pairs_are_sorted_and_flat() {
        let config = SkylightConfig::from_str(
            r#"
[env]
SKYLIGHT_VERSION = "5.0.0"
SKYLIGHT_AUTHENTICATION = "abc123"
"#,
        )
        .unwrap();

        assert_eq!(
            config.env_pairs(),
            vec![
                b"SKYLIGHT_AUTHENTICATION".to_vec(),
                b"abc123".to_vec(),
                b"SKYLIGHT_VERSION".to_vec(),
                b"5.0.0".to_vec(),
            ]
        );
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            SkylightConfig::from_str("[env]\n\"\" = \"x\"\n"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            SkylightConfig::from_str("[env]\n\"A=B\" = \"x\"\n"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        assert!(matches!(
            SkylightConfig::from_str("libary_path = \"/x\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_bound() {
        let mut config = SkylightConfig::default();
        for i in 0..MAX_ENV_ENTRIES / 2 {
            config.env.insert(format!("SKYLIGHT_K{}", i), "v".to_string());
        }
        assert!(config.validate().is_ok());
        assert_eq!(config.env_pairs().len(), 254);

        config.env.insert("SKYLIGHT_ONE_MORE".to_string(), "v".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_overrides() {
        let config = SkylightConfig::from_str(
            r#"
library_path = "/from/file.so"

[env]
SKYLIGHT_VERSION = "5.0.0"
"#,
        )
        .unwrap()
        .with_overrides(vars(&[
            ("SKYLIGHT_LIB_PATH", "/from/env.so"),
            ("SKYLIGHT_VERSION", "5.1.0"),
            ("SKYLIGHT_LAZY_START", "true"),
            ("HOME", "/root"),
        ]))
        .unwrap();

        assert_eq!(config.library_path.as_deref(), Some(Path::new("/from/env.so")));
        assert_eq!(config.env.get("SKYLIGHT_VERSION").map(String::as_str), Some("5.1.0"));
        assert_eq!(config.env.get("SKYLIGHT_LAZY_START").map(String::as_str), Some("true"));
        assert!(!config.env.contains_key("HOME"));
        assert!(!config.env.contains_key("SKYLIGHT_LIB_PATH"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "library_path = \"/opt/libskylight.so\"").unwrap();
        let config = SkylightConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.library_path.as_deref(),
            Some(Path::new("/opt/libskylight.so"))
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SkylightConfig::from_file(&dir.path().join("skylight.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_load_library_needs_path() {
        let gate = Gate::new();
        assert!(matches!(
            SkylightConfig::default().load_library(&gate),
            Err(ConfigError::MissingLibraryPath)
        ));

        let config = SkylightConfig {
            library_path: Some(PathBuf::from("/nonexistent/libskylight.so")),
            env: BTreeMap::new(),
        };
        assert!(matches!(
            config.load_library(&gate),
            Err(ConfigError::Load(LoadError::NotFound { .. }))
        ));
        assert!(!gate.is_loaded());
    }

    #[test]
    fn test_toml_output_parses_back() {
        let config = SkylightConfig::default()
            .with_overrides(vars(&[
                ("SKYLIGHT_LIB_PATH", "/opt/skylight/libskylight.so"),
                ("SKYLIGHT_VERSION", "5.0.0"),
            ]))
            .unwrap();

        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("library_path = \"/opt/skylight/libskylight.so\""));
        assert_eq!(SkylightConfig::from_str(&rendered).unwrap(), config);
    }

    #[test]
    fn test_toml_output_omits_unset_library_path() {
        let rendered = SkylightConfig::default().to_toml_string().unwrap();
        assert!(!rendered.contains("library_path"));
        assert_eq!(
            SkylightConfig::from_str(&rendered).unwrap(),
            SkylightConfig::default()
        );
    }
}
