//! Web search through the Brave Search API.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use basedai_common::tools::{ParameterDescriptor, ToolDescriptor, ToolInvocation};

use crate::http::endpoint;
use crate::{ToolImplementation, error_result};

const DESCRIPTION: &str = "Searches the web for information on a given query using Brave Search API. \
Returns top results with titles, descriptions, and URLs. \
Use this when you need real-time or external knowledge. Max 20 results.";

const MIN_RESULTS: i64 = 1;
const MAX_RESULTS: i64 = 20;
const DEFAULT_RESULTS: i64 = 5;

const WRAP_START: &str = "<|python_start|>";
const WRAP_END: &str = "<|python_end|>";

/// Sub-fields consulted, in order, when a text field arrives as an object.
const NESTED_TEXT_FIELDS: [&str; 3] = ["rawTitle", "content", "description"];

/// Clamps a requested result count into the range the API accepts.
#[must_use]
pub fn clamp_result_count(requested: i64) -> i64 {
    requested.clamp(MIN_RESULTS, MAX_RESULTS)
}

/// One unwrap step: strips the python markers and pulls out `parameters.query`.
///
/// Returns `None` when the text is not a wrapped call.
fn repair_step(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix(WRAP_START)
        .and_then(|rest| rest.strip_suffix(WRAP_END))
        .unwrap_or(trimmed);

    if !inner.contains("\"parameters\"") {
        return None;
    }

    let parsed: Value = serde_json::from_str(inner).ok()?;
    match parsed.get("parameters")?.get("query")? {
        Value::String(s) => Some(s.clone()),
        value @ (Value::Number(_) | Value::Bool(_)) => Some(value.to_string()),
        _ => None,
    }
}

/// Recovers the real query from a model that wrapped its whole call in the
/// `query` argument, e.g.
/// `<|python_start|>{"name": "search_the_web", "parameters": {"query": "rust"}}<|python_end|>`.
///
/// Clean queries come back unchanged, and `repair_query(&repair_query(q)) == repair_query(q)`.
#[must_use]
pub fn repair_query(query: &str) -> String {
    let mut current = query.to_string();
    while let Some(next) = repair_step(&current) {
        if next == current {
            break;
        }
        debug!("Repaired search query '{current}' -> '{next}'");
        current = next;
    }
    current
}

/// The shapes a text-bearing field of the search payload arrives in.
enum TextShape<'a> {
    Missing,
    Plain(String),
    Nested(&'a Map<String, Value>),
    Raw(&'a Value),
}

impl<'a> From<Option<&'a Value>> for TextShape<'a> {
    fn from(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::String(s)) => Self::Plain(s.clone()),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Self::Plain(v.to_string()),
            Some(Value::Object(map)) => Self::Nested(map),
            Some(v @ Value::Array(_)) => Self::Raw(v),
        }
    }
}

impl TextShape<'_> {
    fn into_text(self) -> String {
        match self {
            Self::Missing => String::new(),
            Self::Plain(text) => text,
            Self::Nested(map) => NESTED_TEXT_FIELDS
                .iter()
                .find_map(|field| map.get(*field))
                .map_or_else(
                    || Value::Object(map.clone()).to_string().trim_matches('"').to_string(),
                    |inner| Self::from(Some(inner)).into_text(),
                ),
            Self::Raw(value) => value.to_string(),
        }
    }
}

/// Normalises a payload field that may be a string or a nested object to plain text.
fn coerce_text(value: Option<&Value>) -> String {
    TextShape::from(value).into_text()
}

fn render_results(query: &str, count: i64, payload: &Value) -> String {
    let entries: Vec<String> = payload
        .get("web")
        .and_then(|web| web.get("results"))
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .take(usize::try_from(count).unwrap_or(usize::MAX))
                .map(|result| {
                    format!(
                        "{}\nURL: {}\nSnippet: {}\n---",
                        coerce_text(result.get("title")),
                        coerce_text(result.get("url")),
                        coerce_text(result.get("description")),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let body = if entries.is_empty() {
        "No results found.".to_string()
    } else {
        entries.join("\n")
    };
    format!("Top {count} results for '{query}':\n\n{body}")
}

/// Brave-backed web search with argument repair and tolerant response decoding.
pub struct WebSearchTool {
    descriptor: ToolDescriptor,
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl std::fmt::Debug for WebSearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchTool")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl WebSearchTool {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            descriptor: ToolDescriptor::builder()
                .name("search_the_web")
                .description(DESCRIPTION)
                .required_parameters(vec![ParameterDescriptor::string(
                    "query",
                    "The search query (e.g., 'Browns preseason score today').",
                )])
                .optional_parameters(vec![
                    ParameterDescriptor::integer("num_results", "Optional number of results (1-20).")
                        .with_default(DEFAULT_RESULTS),
                ])
                .build(),
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    async fn search(&self, key: &SecretString, query: &str, count: i64) -> String {
        let response = self
            .client
            .get(endpoint(&self.base_url, "/res/v1/web/search"))
            .header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()))
            .header("x-subscription-token", key.expose_secret())
            .query(&[
                ("q", query.to_string()),
                ("count", count.to_string()),
                ("search_lang", "en".to_string()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return failure(&e),
        };
        let status = response.status();
        let payload: Value = match response.json().await {
            Ok(payload) => payload,
            Err(e) if status.is_success() => return failure(&e),
            Err(_) => return failure(&format!("search service returned HTTP {status}")),
        };

        let upstream_error = coerce_text(payload.get("error"));
        if !upstream_error.is_empty() {
            warn!("Search service reported an error: {upstream_error}");
            return error_result(format!("search service reported: {upstream_error}"));
        }
        if !status.is_success() {
            return failure(&format!("search service returned HTTP {status}"));
        }

        render_results(query, count, &payload)
    }
}

fn failure(cause: &dyn std::fmt::Display) -> String {
    warn!("Web search failed: {cause}");
    error_result(format!(
        "web search failed: {cause}. Check the API key or connectivity."
    ))
}

#[async_trait]
impl ToolImplementation for WebSearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, invocation: &ToolInvocation) -> String {
        let query = repair_query(invocation.get_str("query").unwrap_or_default());
        if query.trim().is_empty() {
            return error_result("search query is empty");
        }
        let count = clamp_result_count(invocation.get_i64("num_results").unwrap_or(DEFAULT_RESULTS));

        let Some(key) = &self.api_key else {
            return error_result(
                "no web search API key configured. Get a Brave Search key at \
                 https://api.search.brave.com and set the configured key environment variable.",
            );
        };

        self.search(key, &query, count).await
    }
}
