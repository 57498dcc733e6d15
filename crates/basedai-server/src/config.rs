//! Server configuration.
//!
//! Loaded once at start-up from `~/.config/basedai/config.toml` (or the path
//! given with `--config` / `BASEDAI_CONFIG`) and shared read-only afterwards.
//!
//! ## Example Configuration
//!
//! ```toml
//! [model]
//! provider = "ollama"
//! model = "llama3.1"
//! base_url = "http://localhost:11434/v1"
//!
//! [prompting]
//! app_name = "BasedAI"
//! character_name = "Jarvis"
//! system_prompt = "You are a helpful assistant. Use tools when they help."
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [tools]
//! search_api_key_env = "BRAVE_API_KEY"
//!
//! [settings]
//! max_turns = 10
//! tool_timeout_seconds = 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use basedai::{Config, ToolSettings};
use basedai_tools::settings::{DEFAULT_FORECAST_URL, DEFAULT_GEOCODING_URL, DEFAULT_SEARCH_URL};

use crate::error::{Result, ServerError};

/// Complete server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelSection,
    pub prompting: PromptingSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub settings: Settings,
}

/// Which language model to talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: String,
    /// OpenAI-compatible endpoint; the client falls back to OpenAI's when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key. Local servers need none.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptingSection {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    pub system_prompt: String,
    /// Name the speak tool attributes messages to.
    #[serde(default = "default_character_name")]
    pub character_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upstream services used by the built-in tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_search_key_env")]
    pub search_api_key_env: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    #[serde(default = "default_search_url")]
    pub search_url: String,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            search_api_key_env: default_search_key_env(),
            http_timeout_seconds: default_http_timeout(),
            geocoding_url: default_geocoding_url(),
            forecast_url: default_forecast_url(),
            search_url: default_search_url(),
        }
    }
}

/// Orchestration limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Model requests allowed per question (default: 10)
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Budget for a single tool call in seconds (default: 30)
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            tool_timeout_seconds: default_tool_timeout(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_app_name() -> String {
    "BasedAI".to_string()
}

fn default_character_name() -> String {
    basedai_tools::settings::DEFAULT_CHARACTER_NAME.to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_search_key_env() -> String {
    "BRAVE_API_KEY".to_string()
}

const fn default_http_timeout() -> u64 {
    15
}

fn default_geocoding_url() -> String {
    DEFAULT_GEOCODING_URL.to_string()
}

fn default_forecast_url() -> String {
    DEFAULT_FORECAST_URL.to_string()
}

fn default_search_url() -> String {
    DEFAULT_SEARCH_URL.to_string()
}

const fn default_max_turns() -> u32 {
    10
}

const fn default_tool_timeout() -> u64 {
    30
}

/// Reads a secret from the environment, treating blank values as unset.
fn secret_from_env(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(SecretString::from)
}

fn check_http_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| ServerError::Config(format!("{field} '{value}' is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ServerError::Config(format!(
            "{field} '{value}' must use http or https"
        )));
    }
    Ok(())
}

impl AppConfig {
    /// Loads configuration from `path`, or from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config directory cannot be determined
    /// - The file doesn't exist or cannot be read
    /// - Deserialization or validation fails
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if !path.exists() {
            return Err(ServerError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| ServerError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml_str(&contents)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ServerError::Config("Failed to determine config directory".to_string()))?
            .join("basedai");

        Ok(config_dir.join("config.toml"))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model name or system prompt is empty
    /// - The port, turn limit or a timeout is zero
    /// - A URL does not parse as http(s)
    /// - The temperature is out of range
    pub fn validate(&self) -> Result<()> {
        if self.model.model.trim().is_empty() {
            return Err(ServerError::Config("model.model must not be empty".to_string()));
        }
        if self.prompting.system_prompt.trim().is_empty() {
            return Err(ServerError::Config(
                "prompting.system_prompt must not be empty".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ServerError::Config("server.port must not be 0".to_string()));
        }
        if self.settings.max_turns == 0 {
            return Err(ServerError::Config(
                "settings.max_turns must be at least 1".to_string(),
            ));
        }
        if self.settings.tool_timeout_seconds == 0 || self.tools.http_timeout_seconds == 0 {
            return Err(ServerError::Config("timeouts must be at least 1 second".to_string()));
        }

        if let Some(base_url) = &self.model.base_url {
            check_http_url("model.base_url", base_url)?;
        }
        check_http_url("tools.geocoding_url", &self.tools.geocoding_url)?;
        check_http_url("tools.forecast_url", &self.tools.forecast_url)?;
        check_http_url("tools.search_url", &self.tools.search_url)?;

        self.client_config()
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Language-model client configuration, with the API key read from the environment.
    #[must_use]
    pub fn client_config(&self) -> Config {
        let mut config = Config::new(self.model.provider.clone(), self.model.model.clone());
        config.base_url.clone_from(&self.model.base_url);
        config.timeout_seconds = self.model.timeout_seconds;
        config.temperature = self.model.temperature;
        config.api_key = self.model.api_key_env.as_deref().and_then(secret_from_env);
        config
    }

    /// Tool settings, with the search key read from the environment.
    #[must_use]
    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings::builder()
            .http_timeout(Duration::from_secs(self.tools.http_timeout_seconds))
            .geocoding_url(self.tools.geocoding_url.clone())
            .forecast_url(self.tools.forecast_url.clone())
            .search_url(self.tools.search_url.clone())
            .search_api_key(secret_from_env(&self.tools.search_api_key_env))
            .character_name(self.prompting.character_name.clone())
            .build()
    }

    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.tool_timeout_seconds)
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::io::Write;

    use super::*;

    fn sample_config_toml() -> &'static str {
        r#"
[model]
provider = "ollama"
model = "llama3.1"
base_url = "http://localhost:11434/v1"
api_key_env = "BASEDAI_TEST_UNSET_MODEL_KEY"
temperature = 0.4

[prompting]
app_name = "Test"
character_name = "Jarvis"
system_prompt = "You are terse."

[server]
port = 9090

[tools]
search_api_key_env = "BASEDAI_TEST_UNSET_SEARCH_KEY"

[settings]
max_turns = 4
tool_timeout_seconds = 5
        "#
    }

    fn minimal_config_toml() -> &'static str {
        r#"
[model]
model = "llama3.1"

[prompting]
system_prompt = "You are terse."
        "#
    }

    #[test]
    fn test_parse_config() {
        let config = AppConfig::from_toml_str(sample_config_toml()).unwrap();

        assert_eq!(config.model.model, "llama3.1");
        assert_eq!(config.prompting.character_name, "Jarvis");
        assert_eq!(config.bind_addr(), "127.0.0.1:9090");
        assert_eq!(config.settings.max_turns, 4);
        assert_eq!(config.tool_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_sections() {
        let config = AppConfig::from_toml_str(minimal_config_toml()).unwrap();

        assert_eq!(config.model.provider, "ollama");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.settings.max_turns, 10);
        assert_eq!(config.settings.tool_timeout_seconds, 30);
        assert_eq!(config.tools.search_api_key_env, "BRAVE_API_KEY");
        assert_eq!(config.tools.forecast_url, DEFAULT_FORECAST_URL);
    }

    #[test]
    fn test_client_config_without_key() {
        let config = AppConfig::from_toml_str(sample_config_toml()).unwrap();
        let client = config.client_config();

        assert_eq!(client.model, "llama3.1");
        assert_eq!(client.base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(client.temperature, Some(0.4));
        assert!(client.api_key.is_none());
    }

    #[test]
    fn test_tool_settings_without_search_key() {
        let config = AppConfig::from_toml_str(sample_config_toml()).unwrap();
        let settings = config.tool_settings();

        assert!(settings.search_api_key.is_none());
        assert_eq!(settings.character_name, "Jarvis");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            minimal_config_toml().replace("llama3.1", " "),
            minimal_config_toml().replace("You are terse.", ""),
            format!("{}\n[server]\nport = 0\n", minimal_config_toml()),
            format!("{}\n[settings]\nmax_turns = 0\n", minimal_config_toml()),
            format!("{}\n[tools]\nsearch_url = \"not a url\"\n", minimal_config_toml()),
            minimal_config_toml().replace(
                "model = \"llama3.1\"",
                "model = \"llama3.1\"\ntemperature = 3.5",
            ),
        ];

        for case in &cases {
            let err = AppConfig::from_toml_str(case).unwrap_err();
            assert!(matches!(err, ServerError::Config(_)), "{case}: {err}");
        }
    }

    #[test]
    fn test_missing_sections_fail() {
        let err = AppConfig::from_toml_str("[model]\nmodel = \"x\"\n").unwrap_err();
        assert!(matches!(err, ServerError::Toml(_)));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(minimal_config_toml().as_bytes()).unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.model.model, "llama3.1");

        let missing = AppConfig::load(Some(Path::new("/nonexistent/basedai.toml"))).unwrap_err();
        assert!(missing.to_string().contains("not found"));
    }
}
