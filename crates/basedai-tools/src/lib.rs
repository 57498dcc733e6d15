//! # basedai-tools
//!
//! Tools the model can call, and the registry the orchestration loop resolves
//! them from.
//!
//! ## Core Components
//!
//! - [`ToolImplementation`]: the contract every tool satisfies (descriptor, validation, execution)
//! - [`ToolRegistry`]: thread-safe name-to-tool table with duplicate detection
//! - [`error_result`]: renders a failure as result text carrying the [`ERROR_PREFIX`] marker
//!
//! ## Built-in Tools
//!
//! - [`SpeakTool`]: the model's channel for speaking to the user
//! - [`DateTimeTool`]: current date and time for a city or IANA zone
//! - [`WeatherTool`]: geocoding plus current conditions and forecasts from Open-Meteo
//! - [`WebSearchTool`]: Brave web search with argument repair
//! - [`BrowsePageTool`]: fetches a page and extracts readable text
//!
//! ## Example: A Custom Tool
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use basedai_common::tools::{ParameterDescriptor, ToolDescriptor, ToolInvocation};
//! use basedai_tools::{ToolImplementation, ToolRegistry};
//!
//! struct GreetingTool {
//!     descriptor: ToolDescriptor,
//! }
//!
//! #[async_trait]
//! impl ToolImplementation for GreetingTool {
//!     fn descriptor(&self) -> &ToolDescriptor {
//!         &self.descriptor
//!     }
//!
//!     async fn execute(&self, invocation: &ToolInvocation) -> String {
//!         let name = invocation.get_str("name").unwrap_or("stranger");
//!         format!("Hello, {name}!")
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let greet = GreetingTool {
//!     descriptor: ToolDescriptor::builder()
//!         .name("greet")
//!         .description("Greet a person by name")
//!         .required_parameters(vec![ParameterDescriptor::string("name", "The person's name")])
//!         .build(),
//! };
//!
//! let registry = ToolRegistry::new();
//! registry.register(Arc::new(greet))?;
//!
//! let tool = registry.resolve("greet")?;
//! let invocation = tool.validate(r#"{"name": "Case"}"#)?;
//! assert_eq!(tool.execute(&invocation).await, "Hello, Case!");
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! The [`ToolRegistry`] uses `DashMap` for concurrent access, so many runs can
//! resolve tools from one registry at the same time.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::debug;
use thiserror::Error;

use basedai_common::tools::{Tool, ToolDescriptor, ToolInvocation, ValidationError};

mod browse_page;
mod date_time;
pub mod http;
pub mod settings;
mod speak;
mod weather;
mod web_search;

pub use browse_page::BrowsePageTool;
pub use date_time::DateTimeTool;
pub use settings::{ToolSettings, standard_registry};
pub use speak::{SpeakSink, SpeakTool};
pub use weather::{ForecastKind, WeatherTool};
pub use web_search::{WebSearchTool, clamp_result_count, repair_query};

/// Marker every failure result starts with.
pub const ERROR_PREFIX: &str = "Error:";

/// Renders a failure as result text for the model.
///
/// ```
/// use basedai_tools::{error_result, is_error_result};
///
/// let text = error_result("upstream returned 503");
/// assert_eq!(text, "Error: upstream returned 503");
/// assert!(is_error_result(&text));
/// ```
pub fn error_result(message: impl fmt::Display) -> String {
    format!("{ERROR_PREFIX} {message}")
}

/// Returns `true` if `text` is a failure result.
#[must_use]
pub fn is_error_result(text: &str) -> bool {
    text.starts_with(ERROR_PREFIX)
}

/// The contract every tool satisfies.
///
/// `execute` returns text for both success and failure: network errors, parse
/// errors and missing data are rendered with [`error_result`] instead of being
/// returned as errors, so a broken tool never aborts a run.
#[async_trait]
pub trait ToolImplementation: Send + Sync {
    /// Name, description and parameters of this tool.
    fn descriptor(&self) -> &ToolDescriptor;

    /// The function-calling schema advertised to the model.
    fn get_definition(&self) -> Tool {
        self.descriptor().to_tool()
    }

    /// Decodes raw model arguments against this tool's descriptor.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the offending parameter when a
    /// required parameter is missing or any parameter has the wrong type.
    fn validate(&self, raw_arguments: &str) -> Result<ToolInvocation, ValidationError> {
        self.descriptor().decode(raw_arguments)
    }

    /// Runs the tool. Never fails; failures come back as [`ERROR_PREFIX`] text.
    async fn execute(&self, invocation: &ToolInvocation) -> String;
}

/// Errors raised while building or querying a [`ToolRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    /// No tool with this name is registered.
    #[error("tool '{0}' not found")]
    NotFound(String),
}

/// Name-to-tool table consulted by the orchestration loop.
///
/// Built once at start-up and only read afterwards.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<DashMap<String, Arc<dyn ToolImplementation>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: Arc::new(DashMap::new()),
        }
    }

    /// Adds a tool under its descriptor name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] if the name is already taken.
    pub fn register(&self, tool: Arc<dyn ToolImplementation>) -> Result<(), RegistryError> {
        let name = tool.descriptor().name.clone();
        match self.tools.entry(name) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateTool(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!("Registered tool '{}'", entry.key());
                entry.insert(tool);
                Ok(())
            }
        }
    }

    /// Looks up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if no tool has that name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ToolImplementation>, RegistryError> {
        self.tools
            .get(name)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Schemas for every registered tool, sorted by name.
    #[must_use]
    pub fn get_all_definitions(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.iter().map(|t| t.get_definition()).collect();
        tools.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        tools
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
