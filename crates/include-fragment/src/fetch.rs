//! Network collaborator — the pluggable fetch-like transport.
//!
//! The core never hardcodes a transport. Hosts hand an element any
//! [`Fetch`] implementation: the bundled [`HttpFetcher`] over reqwest, or an
//! async closure wrapped in [`FetchFn`].

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Outgoing request for a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRequest {
    /// Absolute (or host-relative) URL of the fragment.
    pub url: String,
    /// HTTP method. Always `GET` for fragment loads.
    pub method: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
}

impl FragmentRequest {
    /// A `GET` request for `url` with no headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Path component of the URL, for routing in hosts and test doubles.
    pub fn path(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(u) => u.path().to_string(),
            Err(_) => self
                .url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Response to a fragment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentResponse {
    /// Final URL after redirects.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// All response headers.
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
}

impl FragmentResponse {
    /// A response with the given status and body and no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            url: String::new(),
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A `200` response declaring `content_type`.
    pub fn ok(content_type: &str, body: impl Into<String>) -> Self {
        Self::new(200, body).with_header("Content-Type", content_type)
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Declared `Content-Type`, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// A fetch-like transport. An `Err` means the transport itself failed
/// (connection refused, timeout); HTTP error statuses are `Ok` responses.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FragmentRequest) -> Result<FragmentResponse>;
}

/// Adapts an async closure into a [`Fetch`] implementation.
pub struct FetchFn<F>(pub F);

#[async_trait]
impl<F, Fut> Fetch for FetchFn<F>
where
    F: Fn(FragmentRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FragmentResponse>> + Send,
{
    async fn fetch(&self, request: FragmentRequest) -> Result<FragmentResponse> {
        (self.0)(request).await
    }
}

/// HTTP transport over reqwest.
///
/// One attempt per request: no retries, no backoff. A failed load is
/// terminal until the caller explicitly refetches.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpFetcher {
    /// Create a transport with the given per-request timeout.
    pub fn new(timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("include-fragment/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self { client, timeout_ms }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: FragmentRequest) -> Result<FragmentResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())?;
        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(Duration::from_millis(self.timeout_ms));

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let r = builder.send().await?;
        let status = r.status().as_u16();
        let url = r.url().to_string();

        let headers: Vec<(String, String)> = r
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let body = r.text().await?;

        tracing::debug!("GET {} -> {status} ({} bytes)", request.url, body.len());

        Ok(FragmentResponse {
            url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = FragmentResponse::ok("text/html", "<p>hi</p>")
            .with_header("X-Server-Sanitized", "sanitized=true");
        assert_eq!(resp.content_type(), Some("text/html"));
        assert_eq!(resp.header("x-server-sanitized"), Some("sanitized=true"));
        assert_eq!(resp.header("missing"), None);
    }

    #[test]
    fn test_request_path() {
        let req = FragmentRequest::get("http://localhost:3000/hello?x=1");
        assert_eq!(req.path(), "/hello");
        let req = FragmentRequest::get("/count#frag");
        assert_eq!(req.path(), "/count");
    }

    #[test]
    fn test_is_success() {
        assert!(FragmentResponse::new(200, "").is_success());
        assert!(FragmentResponse::new(204, "").is_success());
        assert!(!FragmentResponse::new(406, "").is_success());
        assert!(!FragmentResponse::new(500, "").is_success());
    }

    #[tokio::test]
    async fn test_fetch_fn_adapter() {
        let fetcher = FetchFn(|req: FragmentRequest| async move {
            let accept = req.header("Accept").unwrap_or("").to_string();
            Ok::<_, anyhow::Error>(FragmentResponse::ok("text/plain", accept))
        });
        let resp = fetcher
            .fetch(FragmentRequest::get("/echo").with_header("Accept", "text/fragment+html"))
            .await
            .unwrap();
        assert_eq!(resp.body, "text/fragment+html");
    }
}
