// src/probe/engine.rs
// =============================================================================
// The probe engine: given one address, find out what answers on it.
//
// For each requested scheme:
// 1. GET scheme://address/
// 2. If that returned 2xx, record the body and headers, then
//    GET scheme://address/robots.txt and extract the crawl policy
// 3. Otherwise mark the scheme unavailable and keep whatever status we got
//
// The two schemes run concurrently and never affect each other. Nothing in
// here returns an error: a timeout or a refused connection is just another
// outcome that ends up in the snapshot.
//
// Courtesy toward the host is expressed by reading and recording its policy.
// The engine does not throttle; each address is visited once per pass.
// =============================================================================

use chrono::Utc;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::fetch::{Fetch, FetchFailure, FetchedPage};
use super::robots::{parse_policy, RobotsPolicy, WILDCARD_AGENT};
use crate::record::{SchemeOutcome, Snapshot, Scheme, STATUS_NO_RESPONSE};

/// Probes addresses over HTTP and HTTPS.
///
/// Cheap to share: wrap it in an `Arc` and hand it to every worker.
pub struct ProbeEngine {
    fetcher: Arc<dyn Fetch>,
    timeout: Duration,
}

impl ProbeEngine {
    /// `timeout` bounds every single request the engine makes, on top of
    /// whatever the fetcher enforces itself.
    pub fn new(fetcher: Arc<dyn Fetch>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Probes `address` on the requested schemes and assembles a snapshot.
    ///
    /// Schemes that are not requested are left out of the snapshot entirely.
    /// `last_checked` is always stamped; `last_online` only when a scheme
    /// answered with a success status.
    pub async fn probe(&self, address: Ipv4Addr, check_http: bool, check_https: bool) -> Snapshot {
        let http = async {
            if check_http {
                Some(self.probe_scheme(address, Scheme::Http).await)
            } else {
                None
            }
        };
        let https = async {
            if check_https {
                Some(self.probe_scheme(address, Scheme::Https).await)
            } else {
                None
            }
        };

        let (http, https) = futures::join!(http, https);
        Snapshot::from_outcomes(http, https, Utc::now())
    }

    /// Fetches `{base_url}/robots.txt` and returns the policy declared for
    /// the wildcard user agent.
    ///
    /// A missing file, a non-2xx answer or a failed request all give the
    /// empty policy.
    pub async fn robots_policy(&self, base_url: &str) -> RobotsPolicy {
        let url = format!("{}/robots.txt", base_url.trim_end_matches('/'));
        match self.fetch(&url).await {
            Ok(page) if page.is_success() => parse_policy(&page.body, WILDCARD_AGENT),
            Ok(page) => {
                debug!(%url, status = page.status, "no robots.txt");
                RobotsPolicy::default()
            }
            Err(failure) => {
                debug!(%url, %failure, "robots.txt fetch failed");
                RobotsPolicy::default()
            }
        }
    }

    async fn probe_scheme(&self, address: Ipv4Addr, scheme: Scheme) -> SchemeOutcome {
        let origin = scheme.origin(address);
        let url = format!("{}/", origin);

        match self.fetch(&url).await {
            Ok(page) if page.is_success() => {
                let robots = self.robots_policy(&origin).await;
                debug!(%address, %scheme, status = page.status, "available");
                SchemeOutcome {
                    scheme,
                    available: true,
                    status_code: i32::from(page.status),
                    content: page.body,
                    headers: page.headers,
                    robots,
                }
            }
            Ok(page) => {
                debug!(%address, %scheme, status = page.status, "unavailable");
                SchemeOutcome::unavailable(scheme, i32::from(page.status))
            }
            Err(failure) => {
                debug!(%address, %scheme, %failure, "no response");
                SchemeOutcome::unavailable(scheme, STATUS_NO_RESPONSE)
            }
        }
    }

    // One request, bounded by our own timeout
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchFailure> {
        match tokio::time::timeout(self.timeout, self.fetcher.get(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::Timeout),
        }
    }
}
