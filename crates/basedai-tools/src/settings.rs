//! Settings shared by the built-in tools and the registry builder.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use typed_builder::TypedBuilder;

use crate::http::build_client;
use crate::{
    BrowsePageTool, DateTimeTool, SpeakSink, SpeakTool, ToolRegistry, WeatherTool, WebSearchTool,
};

pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com";
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com";
pub const DEFAULT_SEARCH_URL: &str = "https://api.search.brave.com";
pub const DEFAULT_CHARACTER_NAME: &str = "Assistant";

/// Upstream endpoints, credentials and presentation settings for the tools.
#[derive(Clone, TypedBuilder)]
pub struct ToolSettings {
    /// Timeout applied to every upstream HTTP request.
    #[builder(default = Duration::from_secs(15))]
    pub http_timeout: Duration,

    #[builder(default = DEFAULT_GEOCODING_URL.to_string(), setter(into))]
    pub geocoding_url: String,

    #[builder(default = DEFAULT_FORECAST_URL.to_string(), setter(into))]
    pub forecast_url: String,

    #[builder(default = DEFAULT_SEARCH_URL.to_string(), setter(into))]
    pub search_url: String,

    /// Web search subscription key. Searching without one yields an error result.
    #[builder(default)]
    pub search_api_key: Option<SecretString>,

    /// Name the speak tool attributes messages to.
    #[builder(default = DEFAULT_CHARACTER_NAME.to_string(), setter(into))]
    pub character_name: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for ToolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSettings")
            .field("http_timeout", &self.http_timeout)
            .field("geocoding_url", &self.geocoding_url)
            .field("forecast_url", &self.forecast_url)
            .field("search_url", &self.search_url)
            .field(
                "search_api_key",
                &self.search_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("character_name", &self.character_name)
            .finish()
    }
}

/// Builds a registry holding every built-in tool.
///
/// `speak_sink` receives rendered speech; `None` prints it to stdout.
///
/// # Errors
///
/// Returns an error if the shared HTTP client cannot be built.
pub fn standard_registry(
    settings: &ToolSettings,
    speak_sink: Option<SpeakSink>,
) -> Result<ToolRegistry> {
    let client = build_client(settings.http_timeout).context("failed to build tool HTTP client")?;

    let speak = match speak_sink {
        Some(sink) => SpeakTool::with_sink(settings.character_name.clone(), sink),
        None => SpeakTool::new(settings.character_name.clone()),
    };

    let registry = ToolRegistry::new();
    registry.register(Arc::new(speak))?;
    registry.register(Arc::new(DateTimeTool::new()))?;
    registry.register(Arc::new(WeatherTool::new(
        client.clone(),
        settings.geocoding_url.clone(),
        settings.forecast_url.clone(),
    )))?;
    registry.register(Arc::new(WebSearchTool::new(
        client.clone(),
        settings.search_url.clone(),
        settings.search_api_key.clone(),
    )))?;
    registry.register(Arc::new(BrowsePageTool::new(client)))?;

    Ok(registry)
}
