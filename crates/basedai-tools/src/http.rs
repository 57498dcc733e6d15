//! Shared HTTP plumbing for tools that call upstream services.

use std::time::Duration;

use reqwest::Client;

/// User agent sent with every upstream request.
pub const USER_AGENT: &str = concat!("basedai/", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client shared by the network-backed tools.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Joins a base URL and an absolute path, tolerating a trailing slash on the base.
#[must_use]
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("https://api.open-meteo.com/", "/v1/forecast"),
            "https://api.open-meteo.com/v1/forecast"
        );
        assert_eq!(endpoint("http://127.0.0.1:9000", "/v1/search"), "http://127.0.0.1:9000/v1/search");
    }
}
