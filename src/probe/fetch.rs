// src/probe/fetch.rs
// =============================================================================
// This module performs the actual HTTP requests against an address.
//
// Key functionality:
// - A small Fetch trait so the probe engine can be driven by a real HTTP
//   client in production and by a scripted fake in tests
// - HttpFetcher: the reqwest-backed implementation
// - Classification of transport failures (timeout, refused, TLS, ...)
//
// Any HTTP response counts as a successful fetch, whatever its status.
// Deciding whether a 503 means "unavailable" is the engine's job, not ours.
//
// Rust concepts:
// - Traits + async-trait: async methods behind a trait object
// - Result<T, E>: transport failures are values, not panics
// =============================================================================

use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::time::Duration;

use crate::config::ProbeConfig;
use crate::error::Result;
use crate::record::Headers;

/// An HTTP response, reduced to what a snapshot records.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

impl FetchedPage {
    /// 2xx status codes mean success
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why a request never produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Request timed out
    Timeout,
    /// Connection refused, reset or unreachable
    Connect,
    /// TLS handshake or certificate error
    Tls,
    /// Too many redirects (redirect loop)
    TooManyRedirects,
    /// Headers arrived but the body could not be read
    Body,
    /// Anything else
    Other(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Timeout => f.write_str("request timed out"),
            FetchFailure::Connect => f.write_str("connection failed"),
            FetchFailure::Tls => f.write_str("TLS error"),
            FetchFailure::TooManyRedirects => f.write_str("too many redirects"),
            FetchFailure::Body => f.write_str("failed to read response body"),
            FetchFailure::Other(message) => f.write_str(message),
        }
    }
}

/// Anything that can GET a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<FetchedPage, FetchFailure>;
}

/// reqwest-backed fetcher used in production.
///
/// The client is built once and cloned cheaply into every probe, so all
/// workers share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            // Certificates of bare IP addresses almost never carry the IP as a
            // name, so strict verification would mark nearly every host down
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            // Every host is visited once per pass, idle connections are waste
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Duration::from_secs(1))
            .build()?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> std::result::Result<FetchedPage, FetchFailure> {
        let mut response = self.client.get(url).send().await.map_err(categorize_error)?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());

        // Read chunk by chunk so a huge page never sits in memory whole
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(categorize_error)? {
            let room = self.max_body_bytes.saturating_sub(body.len());
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedPage {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

// Flattens a header map into name -> value, joining repeated headers with ", "
fn collect_headers(map: &reqwest::header::HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    headers
}

// Categorizes different error types from reqwest
//
// reqwest errors can happen for many reasons:
// - Network timeout
// - Connection refused / host unreachable
// - TLS certificate issues
// - Too many redirects
// - etc.
fn categorize_error(error: reqwest::Error) -> FetchFailure {
    // Convert error to string once, the source chain carries the details
    let error_string = format!("{:?}", error).to_lowercase();

    if error.is_timeout() {
        FetchFailure::Timeout
    } else if error.is_redirect() {
        FetchFailure::TooManyRedirects
    } else if error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("handshake")
    {
        FetchFailure::Tls
    } else if error.is_connect() {
        FetchFailure::Connect
    } else if error.is_body() || error.is_decode() {
        FetchFailure::Body
    } else {
        FetchFailure::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE, SERVER};

    #[test]
    fn test_success_range() {
        let page = |status| FetchedPage {
            status,
            headers: Headers::new(),
            body: String::new(),
        };
        assert!(page(200).is_success());
        assert!(page(204).is_success());
        assert!(!page(301).is_success());
        assert!(!page(404).is_success());
        assert!(!page(503).is_success());
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let mut map = HeaderMap::new();
        map.insert(SERVER, HeaderValue::from_static("nginx"));
        map.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        map.append(SET_COOKIE, HeaderValue::from_static("b=2"));

        let headers = collect_headers(&map);
        assert_eq!(headers["server"], "nginx");
        assert_eq!(headers["set-cookie"], "a=1, b=2");
    }

    #[test]
    fn test_client_builds_from_default_config() {
        assert!(HttpFetcher::new(&ProbeConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_value() {
        // Port 9 on loopback (discard) is closed on any sane test machine
        let config = ProbeConfig {
            timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let result = fetcher.get("http://127.0.0.1:9/").await;
        assert!(result.is_err());
    }
}
