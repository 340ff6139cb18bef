//! HTML page fetching with retries, redacted logging, and an explicit TLS policy.
//!
//! - Per-request options: headers, query params, timeout, retry budget
//! - Retries 429/5xx and network failures with exponential backoff, honouring `Retry-After`
//! - Secret-looking query values are redacted in every log line
//! - Optional raw request/response logging (target `http.raw`) via `PORTWATCH_HTTP_RAW=1`
//!
//! ```no_run
//! # async fn demo() -> Result<(), portwatch_http::HttpError> {
//! let client = portwatch_http::HttpClient::new("https://port.example.com")?;
//! let html = client
//!     .get_text("movements", portwatch_http::RequestOpts::default())
//!     .await?;
//! assert!(!html.is_empty());
//! # Ok(()) }
//! ```
//!
//! Certificate verification stays on unless a client is built with
//! [`ClientOpts::tls_verify`] set to `false`, which is logged at `warn`
//! whenever such a client is constructed.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, Request, Url};
pub use reqwest::StatusCode;
use std::borrow::Cow;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;

const RAW_ENV: &str = "PORTWATCH_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_MAX: usize = 500;
const RATE_LIMIT_FLOOR: Duration = Duration::from_millis(1100);
const SECRET_PARAMS: &[&str] = &[
    "access_token",
    "api_key",
    "auth",
    "authorization",
    "client_secret",
    "key",
    "secret",
    "token",
];

const DEFAULT_USER_AGENT: &str = concat!("portwatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("client build failed: {0}")]
    Build(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned error {status} for {url}: {snippet}")]
    Api {
        status: StatusCode,
        url: String,
        snippet: String,
    },
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout(err.to_string())
        } else if err.is_builder() {
            HttpError::Build(err.to_string())
        } else {
            HttpError::Network(err.to_string())
        }
    }
}

/// Connection-level settings fixed when the client is built.
///
/// ```
/// use portwatch_http::ClientOpts;
/// use std::time::Duration;
///
/// let opts = ClientOpts {
///     tls_verify: false,
///     ..Default::default()
/// };
/// assert_eq!(opts.connect_timeout, Duration::from_secs(5));
/// assert!(!opts.tls_verify);
/// ```
#[derive(Clone, Debug)]
pub struct ClientOpts {
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// When `false`, invalid or self-signed certificates are accepted.
    pub tls_verify: bool,
}

impl Default for ClientOpts {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            tls_verify: true,
        }
    }
}

/// Per-request overrides.
///
/// ```
/// use portwatch_http::RequestOpts;
/// use std::borrow::Cow;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     query: Some(vec![("page", Cow::Borrowed("2"))]),
///     ..Default::default()
/// };
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(!opts.allow_absolute);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
    /// Treat an absolute `path` as the full URL instead of joining it to the base.
    pub allow_absolute: bool,
}

/// A document fetched with a success status.
#[derive(Clone, Debug)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub body: String,
}

/// Transport seam used by the extractors.
///
/// `Ok` only for success statuses; timeouts, connection errors and
/// non-success statuses (after any retries) are an [`HttpError`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, HttpError>;
}

/// Result of a single send.
enum Attempt {
    Done(FetchedPage),
    /// Worth another try: network failure, 429 or 5xx.
    Retry {
        error: HttpError,
        retry_after: Option<Duration>,
        rate_limited: bool,
    },
    Fail(HttpError),
}

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    tls_verify: bool,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Client anchored to `base` with default [`ClientOpts`].
    ///
    /// ```no_run
    /// use portwatch_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://port.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        Self::with_opts(base, ClientOpts::default())
    }

    /// ```no_run
    /// use portwatch_http::{ClientOpts, HttpClient, HttpError};
    ///
    /// let client = HttpClient::with_opts(
    ///     "https://self-signed.example.com",
    ///     ClientOpts { tls_verify: false, ..Default::default() },
    /// )?;
    /// assert!(!client.verifies_tls());
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn with_opts(base: &str, opts: ClientOpts) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        if !opts.tls_verify {
            tracing::warn!(
                host = %base.host_str().unwrap_or("-"),
                "http.tls_verification_disabled"
            );
        }
        let inner = Client::builder()
            .connect_timeout(opts.connect_timeout)
            .user_agent(opts.user_agent)
            .danger_accept_invalid_certs(!opts.tls_verify)
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            tls_verify: opts.tls_verify,
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn verifies_tls(&self) -> bool {
        self.tls_verify
    }

    pub async fn get_text(&self, path: &str, opts: RequestOpts<'_>) -> Result<String, HttpError> {
        self.get_page(path, opts).await.map(|page| page.body)
    }

    /// GET `path` (relative to the base unless `allow_absolute`), retrying
    /// transient failures within the retry budget.
    pub async fn get_page(
        &self,
        path: &str,
        opts: RequestOpts<'_>,
    ) -> Result<FetchedPage, HttpError> {
        let url = self.resolve(path, opts.allow_absolute)?;
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);

        let mut attempt = 0usize;
        loop {
            let request = self.build_request(&url, &opts, timeout)?;
            let logged_url = loggable_url(request.url());
            tracing::debug!(
                attempt = attempt + 1,
                max_retries,
                url = %logged_url,
                timeout_ms = timeout.as_millis() as u64,
                tls_verify = self.tls_verify,
                "http.request.start"
            );
            if raw_enabled() {
                tracing::debug!(target: "http.raw", curl = %self.as_curl(&request), "request");
            }

            match self.send_once(request).await {
                Attempt::Done(page) => return Ok(page),
                Attempt::Retry {
                    error,
                    retry_after,
                    rate_limited,
                } if attempt < max_retries => {
                    attempt += 1;
                    let delay = retry_delay(attempt, retry_after, rate_limited);
                    tracing::warn!(
                        attempt,
                        max_retries,
                        url = %logged_url,
                        backoff_ms = delay.as_millis() as u64,
                        error = %error,
                        "http.retrying"
                    );
                    sleep(delay).await;
                }
                Attempt::Retry { error, .. } | Attempt::Fail(error) => {
                    tracing::warn!(attempt = attempt + 1, url = %logged_url, error = %error, "http.error");
                    return Err(error);
                }
            }
        }
    }

    fn resolve(&self, path: &str, allow_absolute: bool) -> Result<Url, HttpError> {
        if allow_absolute {
            if let Ok(abs) = Url::parse(path) {
                return Ok(abs);
            }
        }
        self.base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))
    }

    fn build_request(
        &self,
        url: &Url,
        opts: &RequestOpts<'_>,
        timeout: Duration,
    ) -> Result<Request, HttpError> {
        let mut rb = self.inner.get(url.clone()).timeout(timeout);
        if let Some(query) = &opts.query {
            let pairs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_ref())).collect();
            rb = rb.query(&pairs);
        }
        if let Some(headers) = &opts.headers {
            rb = rb.headers(headers.clone());
        }
        rb.build().map_err(|e| HttpError::Build(e.to_string()))
    }

    async fn send_once(&self, request: Request) -> Attempt {
        let started = Instant::now();
        let resp = match self.inner.execute(request).await {
            Ok(resp) => resp,
            Err(err) => return retry_network(err),
        };

        let status = resp.status();
        let final_url = resp.url().clone();
        let headers = resp.headers().clone();
        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return retry_network(err),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            %status,
            duration_ms = elapsed_ms,
            body_len = bytes.len(),
            content_type = ?headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            "http.response.headers"
        );
        if raw_enabled() {
            let shown = &bytes[..bytes.len().min(RAW_MAX_BODY)];
            tracing::info!(
                target: "http.raw",
                %status,
                duration_ms = elapsed_ms,
                body = %String::from_utf8_lossy(shown),
                truncated = bytes.len() > RAW_MAX_BODY
            );
        }

        if status.is_success() {
            return Attempt::Done(FetchedPage {
                url: final_url,
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let error = HttpError::Api {
            status,
            url: loggable_url(&final_url),
            snippet: snip_body(&bytes),
        };
        let rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
        if rate_limited || status.is_server_error() {
            Attempt::Retry {
                error,
                retry_after: retry_after(&headers),
                rate_limited,
            }
        } else {
            Attempt::Fail(error)
        }
    }

    /// A curl line reproducing `request`, secrets redacted.
    fn as_curl(&self, request: &Request) -> String {
        let mut parts = vec![format!("curl -X{}", request.method())];
        if !self.tls_verify {
            parts.push("--insecure".into());
        }
        for (name, value) in request.headers() {
            let value = value.to_str().unwrap_or("").replace('\'', r"'\''");
            parts.push(format!("-H '{name}: {value}'"));
        }
        parts.push(format!("'{}'", loggable_url(request.url())));
        parts.join(" ")
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, HttpError> {
        self.get_page(
            url.as_str(),
            RequestOpts {
                allow_absolute: true,
                ..Default::default()
            },
        )
        .await
    }
}

fn raw_enabled() -> bool {
    matches!(
        std::env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn retry_network(err: reqwest::Error) -> Attempt {
    Attempt::Retry {
        error: err.into(),
        retry_after: None,
        rate_limited: false,
    }
}

/// `Retry-After` wins; otherwise 200 ms doubling per attempt, at least
/// 1.1 s after a 429.
fn retry_delay(attempt: usize, retry_after: Option<Duration>, rate_limited: bool) -> Duration {
    if let Some(wait) = retry_after {
        return wait;
    }
    let exp = backoff(attempt);
    if rate_limited { exp.max(RATE_LIMIT_FLOOR) } else { exp }
}

fn backoff(attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    Duration::from_millis(200u64 << shift)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}

fn snip_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= SNIPPET_MAX {
        return text.into_owned();
    }
    let mut cut = SNIPPET_MAX;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

/// The URL with secret-looking query values replaced by `<redacted>`.
fn loggable_url(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let secret = SECRET_PARAMS.contains(&k.to_ascii_lowercase().as_str());
            let v = if secret { "<redacted>".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    let mut shown = url.clone();
    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}
