//! Fetches a web page and extracts its readable text.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Response};
use scraper::{ElementRef, Html, Node};
use url::Url;

use basedai_common::tools::{ParameterDescriptor, ToolDescriptor, ToolInvocation};

use crate::{ToolImplementation, error_result};

const DESCRIPTION: &str = "Fetches and analyzes the content of a webpage. \
Returns the main text content from the page's body (e.g., paragraphs, headings, articles). \
If instructions are provided, focuses the output based on them (e.g., 'extract product prices'). \
Use this to get detailed information from a specific webpage URL.";

/// Elements whose whole subtree is dropped before text extraction.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "iframe",
];

/// Maximum characters of page text returned to the model.
pub const MAX_PAGE_CHARS: usize = 2000;
const TRUNCATION_MARKER: &str = "...";

/// Maximum bytes of HTML read from a response; the rest is discarded unread.
pub const MAX_PAGE_BYTES: usize = 1024 * 1024;

fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            }
            Node::Element(el) if !SKIPPED_TAGS.contains(&el.name()) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, out);
                }
            }
            _ => {}
        }
    }
}

/// Extracts whitespace-collapsed text from the document body.
///
/// Paragraphs, headings and articles all live under `<body>`, so walking the
/// body once yields each piece of text exactly once.
#[must_use]
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let body = root
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "body")
        .unwrap_or(root);

    let mut pieces = Vec::new();
    collect_text(body, &mut pieces);
    pieces
        .iter()
        .flat_map(|piece| piece.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cuts `text` to [`MAX_PAGE_CHARS`] characters, marking the cut.
#[must_use]
pub fn truncate_text(text: &str) -> String {
    if text.chars().count() <= MAX_PAGE_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_PAGE_CHARS).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Page fetcher and text extractor.
#[derive(Debug)]
pub struct BrowsePageTool {
    descriptor: ToolDescriptor,
    client: Client,
    max_bytes: usize,
}

impl BrowsePageTool {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: ToolDescriptor::builder()
                .name("browse_page")
                .description(DESCRIPTION)
                .required_parameters(vec![ParameterDescriptor::string(
                    "url",
                    "The URL of the webpage (e.g., 'https://example.com').",
                )])
                .optional_parameters(vec![ParameterDescriptor::string(
                    "instructions",
                    "Optional instructions for analysis (e.g., 'extract product prices'). \
                     If none, returns cleaned text content.",
                )])
                .build(),
            client,
            max_bytes: MAX_PAGE_BYTES,
        }
    }

    /// Overrides how much of a page body is read.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn read_capped(&self, mut response: Response) -> Result<String> {
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("could not read page body")?
        {
            let room = self.max_bytes - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                debug!("Page body cut at {} bytes", self.max_bytes);
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn fetch_text(&self, raw_url: &str) -> Result<String> {
        let url = Url::parse(raw_url.trim()).context("invalid URL")?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("unsupported scheme '{}'", url.scheme());
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("request failed")?
            .error_for_status()
            .context("page returned an error status")?;
        let html = self.read_capped(response).await?;

        Ok(truncate_text(&extract_text(&html)))
    }
}

#[async_trait]
impl ToolImplementation for BrowsePageTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, invocation: &ToolInvocation) -> String {
        let url = invocation.get_str("url").unwrap_or_default();

        match self.fetch_text(url).await {
            Ok(text) => match invocation.non_blank_str("instructions") {
                Some(focus) => {
                    format!("Analyzed content from {url} (focused on '{focus}'): \n{text}")
                }
                None => format!("Content from {url}: \n{text}"),
            },
            Err(e) => {
                warn!("Browsing {url} failed: {e:#}");
                error_result(format!(
                    "could not browse page: {e:#}. Ensure the URL is valid, accessible, \
                     and starts with http:// or https://."
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::is_error_result;

    const PAGE: &str = r"<html>
<head><title>Ignored title</title><style>body { color: red; }</style></head>
<body>
  <header><h1>Site banner</h1></header>
  <nav><a href='/'>Home</a></nav>
  <article>
    <h1>Neon   Rain</h1>
    <p>The sky above the port
       was the colour of television.</p>
    <script>track();</script>
  </article>
  <footer>Copyright</footer>
</body>
</html>";

    #[test]
    fn test_extract_skips_chrome_and_collapses_whitespace() {
        assert_eq!(
            extract_text(PAGE),
            "Neon Rain The sky above the port was the colour of television."
        );
    }

    #[test]
    fn test_truncation_marker_only_when_cut() {
        let exact = "a".repeat(MAX_PAGE_CHARS);
        assert_eq!(truncate_text(&exact), exact);

        let long = "é".repeat(MAX_PAGE_CHARS + 10);
        let truncated = truncate_text(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), MAX_PAGE_CHARS + 3);
    }

    #[tokio::test]
    async fn test_browse_with_instructions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let tool = BrowsePageTool::new(Client::new());
        let url = format!("{}/story", server.uri());
        let invocation = tool
            .validate(&json!({"url": url, "instructions": "the weather"}).to_string())
            .unwrap();
        let result = tool.execute(&invocation).await;

        assert_eq!(
            result,
            format!(
                "Analyzed content from {url} (focused on 'the weather'): \n\
                 Neon Rain The sky above the port was the colour of television."
            )
        );
    }

    #[tokio::test]
    async fn test_browse_without_instructions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Hello</p>"))
            .mount(&server)
            .await;

        let tool = BrowsePageTool::new(Client::new());
        let url = server.uri();
        let invocation = tool.validate(&json!({"url": url}).to_string()).unwrap();

        assert_eq!(
            tool.execute(&invocation).await,
            format!("Content from {url}: \nHello")
        );
    }

    #[tokio::test]
    async fn test_large_page_is_read_up_to_byte_budget() {
        let page = format!(
            "<html><body><p>Opening line</p><p>{}</p><p>Closing line</p></body></html>",
            "filler ".repeat(5000)
        );
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let tool = BrowsePageTool::new(Client::new()).with_max_bytes(512);
        let invocation = tool
            .validate(&json!({"url": server.uri()}).to_string())
            .unwrap();
        let result = tool.execute(&invocation).await;

        assert!(!is_error_result(&result));
        assert!(result.contains("Opening line"));
        assert!(!result.contains("Closing line"));
    }

    #[tokio::test]
    async fn test_http_error_is_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tool = BrowsePageTool::new(Client::new());
        let invocation = tool
            .validate(&json!({"url": server.uri()}).to_string())
            .unwrap();
        let result = tool.execute(&invocation).await;

        assert!(is_error_result(&result));
        assert!(result.contains("starts with http:// or https://"));
    }

    #[tokio::test]
    async fn test_rejects_bad_urls() {
        let tool = BrowsePageTool::new(Client::new());
        for url in ["not a url", "ftp://example.com/file"] {
            let invocation = tool.validate(&json!({"url": url}).to_string()).unwrap();
            assert!(is_error_result(&tool.execute(&invocation).await), "{url}");
        }
    }
}
