// src/record.rs
// =============================================================================
// The documents we keep per address.
//
// - AddressRecord: the full record, one per globally-routable IPv4 host.
//   The Seeder creates it in its "seed state" (both schemes assumed available,
//   status codes -1).
// - Snapshot: what one probe learned. It is a PARTIAL document: schemes that
//   were not probed leave their fields out, so writing it as a partial update
//   only touches what was actually checked.
//
// AddressRecord::apply() performs the same merge a store does for a partial
// update, which keeps the in-memory store and the tests honest.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::probe::RobotsPolicy;

/// Status code written at seed time: the scheme has never been probed.
pub const STATUS_NOT_PROBED: i32 = -1;

/// Status code written when a probe was attempted but no HTTP response came back.
pub const STATUS_NO_RESPONSE: i32 = 0;

pub type Headers = BTreeMap<String, String>;

/// The two schemes every address is checked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// Origin URL for an address, without a trailing slash.
    pub fn origin(self, address: Ipv4Addr) -> String {
        format!("{}://{}", self.as_str(), address)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored document per address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: String,
    pub http_available: bool,
    pub http_status_code: i32,
    #[serde(default)]
    pub http_content: String,
    pub https_available: bool,
    pub https_status_code: i32,
    #[serde(default)]
    pub https_content: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub robots: RobotsPolicy,
    pub last_checked: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_online: Option<DateTime<Utc>>,
}

impl AddressRecord {
    /// Builds the placeholder record the Seeder writes for a fresh address.
    pub fn seed(address: Ipv4Addr, now: DateTime<Utc>) -> Self {
        Self {
            address: address.to_string(),
            http_available: true,
            http_status_code: STATUS_NOT_PROBED,
            http_content: String::new(),
            https_available: true,
            https_status_code: STATUS_NOT_PROBED,
            https_content: String::new(),
            headers: Headers::new(),
            robots: RobotsPolicy::default(),
            last_checked: now,
            last_online: None,
        }
    }

    /// Store key of this record.
    pub fn id(&self) -> &str {
        &self.address
    }

    /// Merges a snapshot into this record the way a partial update does:
    /// fields the snapshot carries overwrite, everything else stays.
    pub fn apply(&mut self, snapshot: &Snapshot) {
        if let Some(available) = snapshot.http_available {
            self.http_available = available;
        }
        if let Some(code) = snapshot.http_status_code {
            self.http_status_code = code;
        }
        if let Some(content) = &snapshot.http_content {
            self.http_content.clone_from(content);
        }
        if let Some(available) = snapshot.https_available {
            self.https_available = available;
        }
        if let Some(code) = snapshot.https_status_code {
            self.https_status_code = code;
        }
        if let Some(content) = &snapshot.https_content {
            self.https_content.clone_from(content);
        }
        if let Some(headers) = &snapshot.headers {
            self.headers.clone_from(headers);
        }
        if let Some(robots) = &snapshot.robots {
            self.robots.clone_from(robots);
        }
        self.last_checked = snapshot.last_checked;
        if snapshot.last_online.is_some() {
            self.last_online = snapshot.last_online;
        }
    }
}

/// What a single scheme's probe produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeOutcome {
    pub scheme: Scheme,
    pub available: bool,
    pub status_code: i32,
    pub content: String,
    pub headers: Headers,
    pub robots: RobotsPolicy,
}

impl SchemeOutcome {
    /// Outcome of a probe that did not succeed.
    pub fn unavailable(scheme: Scheme, status_code: i32) -> Self {
        Self {
            scheme,
            available: false,
            status_code,
            content: String::new(),
            headers: Headers::new(),
            robots: RobotsPolicy::default(),
        }
    }
}

/// The partial document one probe writes back to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_status_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robots: Option<RobotsPolicy>,
    pub last_checked: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_online: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Assembles a snapshot from the outcomes of the schemes that were probed.
    ///
    /// Headers and robots come from the last successful scheme in probe order
    /// (HTTP, then HTTPS). If schemes were probed but none succeeded they are
    /// cleared; if nothing was probed they are left out entirely.
    pub fn from_outcomes(
        http: Option<SchemeOutcome>,
        https: Option<SchemeOutcome>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let probed = http.is_some() || https.is_some();
        let winner = [&http, &https]
            .into_iter()
            .flatten()
            .filter(|outcome| outcome.available)
            .last();

        let (headers, robots) = match (probed, winner) {
            (_, Some(outcome)) => (Some(outcome.headers.clone()), Some(outcome.robots.clone())),
            (true, None) => (Some(Headers::new()), Some(RobotsPolicy::default())),
            (false, None) => (None, None),
        };
        let last_online = winner.map(|_| checked_at);

        Self {
            http_available: http.as_ref().map(|o| o.available),
            http_status_code: http.as_ref().map(|o| o.status_code),
            https_available: https.as_ref().map(|o| o.available),
            https_status_code: https.as_ref().map(|o| o.status_code),
            http_content: http.map(|o| o.content),
            https_content: https.map(|o| o.content),
            headers,
            robots,
            last_checked: checked_at,
            last_online,
        }
    }

    /// True when at least one probed scheme answered with a success status.
    pub fn is_online(&self) -> bool {
        self.last_online.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_outcome(scheme: Scheme, delay: u32) -> SchemeOutcome {
        let mut headers = Headers::new();
        headers.insert("server".to_string(), scheme.to_string());
        SchemeOutcome {
            scheme,
            available: true,
            status_code: 200,
            content: format!("hello over {}", scheme),
            headers,
            robots: RobotsPolicy {
                crawl_delay: Some(delay),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_seed_state() {
        let now = Utc::now();
        let record = AddressRecord::seed(Ipv4Addr::new(93, 184, 216, 34), now);
        assert_eq!(record.id(), "93.184.216.34");
        assert!(record.http_available && record.https_available);
        assert_eq!(record.http_status_code, STATUS_NOT_PROBED);
        assert_eq!(record.https_status_code, STATUS_NOT_PROBED);
        assert!(record.headers.is_empty());
        assert!(record.robots.is_empty());
        assert_eq!(record.last_checked, now);
        assert_eq!(record.last_online, None);
    }

    #[test]
    fn test_seed_document_shape() {
        let record = AddressRecord::seed(Ipv4Addr::new(1, 2, 3, 4), Utc::now());
        let doc = serde_json::to_value(&record).unwrap();
        assert_eq!(doc["http_status_code"], -1);
        assert_eq!(doc["robots"], serde_json::json!({}));
        assert!(doc.get("last_online").is_none());
    }

    #[test]
    fn test_https_wins_headers_when_both_succeed() {
        let snapshot = Snapshot::from_outcomes(
            Some(ok_outcome(Scheme::Http, 1)),
            Some(ok_outcome(Scheme::Https, 2)),
            Utc::now(),
        );
        assert_eq!(snapshot.headers.unwrap()["server"], "https");
        assert_eq!(snapshot.robots.unwrap().crawl_delay, Some(2));
        assert!(snapshot.last_online.is_some());
    }

    #[test]
    fn test_failed_https_does_not_clobber_http_robots() {
        let snapshot = Snapshot::from_outcomes(
            Some(ok_outcome(Scheme::Http, 4)),
            Some(SchemeOutcome::unavailable(Scheme::Https, STATUS_NO_RESPONSE)),
            Utc::now(),
        );
        assert_eq!(snapshot.robots.unwrap().crawl_delay, Some(4));
        assert_eq!(snapshot.https_available, Some(false));
        assert_eq!(snapshot.https_content.as_deref(), Some(""));
    }

    #[test]
    fn test_skipped_scheme_is_left_out_of_the_document() {
        let snapshot = Snapshot::from_outcomes(
            None,
            Some(SchemeOutcome::unavailable(Scheme::Https, 503)),
            Utc::now(),
        );
        let doc = serde_json::to_value(&snapshot).unwrap();
        assert!(doc.get("http_available").is_none());
        assert!(doc.get("http_status_code").is_none());
        assert_eq!(doc["https_status_code"], 503);
        assert_eq!(doc["headers"], serde_json::json!({}));
        assert!(doc.get("last_online").is_none());
        assert!(doc.get("last_checked").is_some());
    }

    #[test]
    fn test_apply_keeps_untouched_fields() {
        let seeded_at = Utc::now();
        let mut record = AddressRecord::seed(Ipv4Addr::new(8, 8, 8, 8), seeded_at);
        record.http_available = false;
        record.http_status_code = 404;

        let checked_at = seeded_at + chrono::Duration::seconds(60);
        let snapshot = Snapshot::from_outcomes(None, Some(ok_outcome(Scheme::Https, 9)), checked_at);
        record.apply(&snapshot);

        assert!(!record.http_available);
        assert_eq!(record.http_status_code, 404);
        assert!(record.https_available);
        assert_eq!(record.https_status_code, 200);
        assert_eq!(record.robots.crawl_delay, Some(9));
        assert_eq!(record.last_checked, checked_at);
        assert_eq!(record.last_online, Some(checked_at));
    }

    #[test]
    fn test_apply_offline_snapshot_keeps_last_online() {
        let first = Utc::now();
        let mut record = AddressRecord::seed(Ipv4Addr::new(8, 8, 4, 4), first);
        record.last_online = Some(first);

        let later = first + chrono::Duration::seconds(5);
        let snapshot = Snapshot::from_outcomes(
            Some(SchemeOutcome::unavailable(Scheme::Http, STATUS_NO_RESPONSE)),
            None,
            later,
        );
        record.apply(&snapshot);

        assert_eq!(record.last_online, Some(first));
        assert_eq!(record.last_checked, later);
        assert_eq!(record.http_status_code, STATUS_NO_RESPONSE);
    }

    #[test]
    fn test_apply_replaces_headers_and_robots() {
        let now = Utc::now();
        let mut record = AddressRecord::seed(Ipv4Addr::new(1, 0, 0, 1), now);
        record.headers.insert("server".to_string(), "a".to_string());
        record.headers.insert("x-old".to_string(), "1".to_string());
        record.robots.crawl_delay = Some(30);

        let mut outcome = ok_outcome(Scheme::Http, 0);
        outcome.headers.insert("server".to_string(), "b".to_string());
        outcome.robots = RobotsPolicy::default();
        record.apply(&Snapshot::from_outcomes(Some(outcome), None, now));

        assert_eq!(record.headers.get("server").map(String::as_str), Some("b"));
        assert!(!record.headers.contains_key("x-old"));
        assert!(record.robots.is_empty());
    }
}
