use crate::engine::DEFAULT_MMDC_COMMAND;
use crate::generate::{DEFAULT_API_KEY_ENV, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "draftmaid";
const CONFIG_FILE: &str = "config.toml";
const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file as TOML ({toml}) or YAML ({yaml})")]
    Parse { toml: String, yaml: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default = "default_mmdc")]
    pub mmdc: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Preferences file; defaults to the per-user config directory.
    #[serde(default)]
    pub preferences: Option<PathBuf>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}
fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}
fn default_mmdc() -> PathBuf {
    PathBuf::from(DEFAULT_MMDC_COMMAND)
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self { mmdc: default_mmdc() }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Parse as TOML first, then YAML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        match Self::from_toml(content) {
            Ok(config) => Ok(config),
            Err(toml_err) => Self::from_yaml(content).map_err(|yaml_err| ConfigError::Parse {
                toml: toml_err.message().to_string(),
                yaml: yaml_err.to_string(),
            }),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load `explicit` if given (it must exist), otherwise the per-user config
    /// file when there is one, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.storage.preferences.clone().unwrap_or_else(|| {
            config_dir().join(PREFERENCES_FILE)
        })
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.generation.model, "gemini-2.5-flash");
        assert_eq!(config.generation.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.renderer.mmdc, PathBuf::from("mmdc"));
    }

    #[test]
    fn toml_overrides_single_fields() {
        let config = Config::parse(
            r#"
[generation]
model = "gemini-2.0-flash"

[export]
output_dir = "out"
"#,
        )
        .unwrap();
        assert_eq!(config.generation.model, "gemini-2.0-flash");
        assert_eq!(config.generation.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.export.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn yaml_is_accepted_when_toml_fails() {
        let config = Config::parse(
            "renderer:\n  mmdc: /opt/mermaid/bin/mmdc\nstorage:\n  preferences: /tmp/prefs.json\n",
        )
        .unwrap();
        assert_eq!(config.renderer.mmdc, PathBuf::from("/opt/mermaid/bin/mmdc"));
        assert_eq!(config.preferences_path(), PathBuf::from("/tmp/prefs.json"));
    }

    #[test]
    fn garbage_reports_both_parsers() {
        let err = Config::parse("generation: [unterminated").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(Config::load(Some(&missing)), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draftmaid.toml");
        std::fs::write(&path, "[generation]\napi_key_env = \"API_KEY\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.generation.api_key_env, "API_KEY");
    }
}
