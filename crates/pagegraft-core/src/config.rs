//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors raised while loading or writing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config {path}: {message}")]
    Toml { path: String, message: String },

    #[error("Failed to parse JSON config {path}: {message}")]
    Json { path: String, message: String },

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

/// Names of the query parameters that never take part in a page key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlParams {
    /// Monotonic cache-buster appended by the transport.
    #[serde(default = "default_cache_buster")]
    pub cache_buster: String,

    /// Short-lived anti-cache token.
    #[serde(default = "default_anti_cache")]
    pub anti_cache: String,

    /// Fragment-request parameter carrying the key path to render.
    #[serde(default = "default_fragment_query")]
    pub fragment_query: String,
}

fn default_cache_buster() -> String {
    "__".to_string()
}

fn default_anti_cache() -> String {
    "_".to_string()
}

fn default_fragment_query() -> String {
    "bzq".to_string()
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            cache_buster: default_cache_buster(),
            anti_cache: default_anti_cache(),
            fragment_query: default_fragment_query(),
        }
    }
}

/// Notification channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Buffered notices per subscriber before the slowest one starts lagging.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    64
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL recorded in the session meta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Control query parameter names.
    #[serde(default)]
    pub params: ControlParams,

    /// Notification channel settings.
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl EngineConfig {
    /// Load config from a file. `.json` files are read as JSON, anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        if display.ends_with(".json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Json {
                path: display,
                message: e.to_string(),
            })
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Toml {
                path: display,
                message: e.to_string(),
            })
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Toml {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Render config as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Save config to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = if path.extension().is_some_and(|e| e == "json") {
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            self.to_toml_string()?
        };

        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Override the control parameter names.
    pub fn with_params(mut self, params: ControlParams) -> Self {
        self.params = params;
        self
    }
}

/// Generate a default pagegraft.toml config file.
pub fn generate_default_config() -> String {
    r#"# pagegraft engine configuration

# base_url = "https://example.com"

[params]
cache_buster = "__"
anti_cache = "_"
fragment_query = "bzq"

[notify]
capacity = 64
"#
    .to_string()
}
