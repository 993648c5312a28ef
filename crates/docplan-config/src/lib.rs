use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

/// Identity recorded on tracked changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// How edits are recorded when a request does not say.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeModeSetting {
    #[default]
    Direct,
    Tracked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Literal text selectors compare case-sensitively when true.
    pub case_sensitive: bool,
    /// Upper bound for compiled regular expressions, in bytes.
    pub regex_size_limit: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            regex_size_limit: 1 << 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub change_mode: ChangeModeSetting,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorConfig>,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        Self::from_toml_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })
    }

    /// Parse a config document and expand variables in the author identity.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;

        if let Some(author) = config.author.as_mut() {
            author.name = Self::expand_value(&author.name).unwrap_or_else(|| author.name.clone());
            if let Some(email) = author.email.as_mut() {
                *email = Self::expand_value(email).unwrap_or_else(|| email.clone());
            }
        }

        Ok(config)
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/docplan");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn expand_value(value: &str) -> Option<String> {
        match shellexpand::full(value) {
            Ok(expanded) => Some(expanded.into_owned()),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_path() {
        let config_path = Config::config_path();
        let path_str = config_path.to_string_lossy();

        // Should not contain tilde anymore
        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/docplan/config.toml"));
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.change_mode, ChangeModeSetting::Direct);
        assert!(!config.matching.case_sensitive);
        assert_eq!(config.discovery.default_limit, 50);
        assert_eq!(config.discovery.max_limit, 500);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let original = Config {
            change_mode: ChangeModeSetting::Tracked,
            author: Some(AuthorConfig {
                name: "Reviewer".to_string(),
                email: Some("reviewer@example.com".to_string()),
            }),
            matching: MatchingConfig {
                case_sensitive: true,
                regex_size_limit: 4096,
            },
            discovery: DiscoveryConfig {
                default_limit: 10,
                max_limit: 20,
            },
        };

        let toml_str = toml::to_string(&original).unwrap();
        let deserialized = Config::from_toml_str(&toml_str).unwrap();

        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_partial_sections_keep_field_defaults() {
        let config = Config::from_toml_str(
            r#"
change_mode = "tracked"

[matching]
case_sensitive = true
"#,
        )
        .unwrap();

        assert_eq!(config.change_mode, ChangeModeSetting::Tracked);
        assert!(config.matching.case_sensitive);
        assert_eq!(config.matching.regex_size_limit, 1 << 20);
        assert_eq!(config.discovery, DiscoveryConfig::default());
    }

    #[test]
    fn test_author_with_env_var_in_toml() {
        unsafe {
            env::set_var("DOCPLAN_TEST_AUTHOR", "Ada");
        }

        let config = Config::from_toml_str(
            r#"
[author]
name = "$DOCPLAN_TEST_AUTHOR"
email = "ada@example.com"
"#,
        )
        .unwrap();

        let author = config.author.unwrap();
        assert_eq!(author.name, "Ada");
        assert_eq!(author.email.as_deref(), Some("ada@example.com"));

        unsafe {
            env::remove_var("DOCPLAN_TEST_AUTHOR");
        }
    }

    #[test]
    fn test_unknown_change_mode_is_a_parse_error() {
        let result = Config::from_toml_str(r#"change_mode = "sometimes""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let non_existent_config = temp_dir.path().join("nonexistent.toml");

        let result = Config::load_from_path(&non_existent_config).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_load_reports_parse_error_with_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(&config_file, "change_mode = [").unwrap();

        let err = Config::load_from_path(&config_file).unwrap_err();

        assert!(matches!(err, ConfigError::ConfigParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("nested").join("config.toml");
        let test_config = Config {
            author: Some(AuthorConfig {
                name: "Grace".to_string(),
                email: None,
            }),
            ..Config::default()
        };

        test_config.save_to_path(&config_file).unwrap();
        let loaded_config = Config::load_from_path(&config_file).unwrap().unwrap();

        assert_eq!(loaded_config, test_config);
    }
}
