// src/store/elastic.rs
// =============================================================================
// RecordStore backed by Elasticsearch, spoken to over its REST API.
//
// Endpoints used:
// - POST {index}/_bulk?...        NDJSON "create" actions, _id = address
// - POST {index}/_search?scroll=  first page of a match_all scan
// - POST _search/scroll           following pages
// - DELETE _search/scroll         release the scroll context at the end
// - PUT  {index}                  create the index with its mapping
// - POST {index}/_update/{id}     scripted partial update
//
// A plain {"doc": ...} update merges objects recursively, so stale header
// names and robots fields would survive. The update script assigns every
// top-level field of the snapshot instead, which replaces headers and robots
// wholesale and leaves fields absent from the snapshot untouched.
//
// "create" actions make re-seeding safe: an address that already has a
// document comes back as HTTP 409 for that item and is counted as already
// present instead of being overwritten.
// =============================================================================

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

use super::{BulkOutcome, RecordStore, StoredRecord};
use crate::config::ElasticConfig;
use crate::error::StoreError;
use crate::record::{AddressRecord, Snapshot};

pub struct ElasticStore {
    client: Client,
    base: Url,
    index: String,
    scroll_size: usize,
    scroll_keep_alive: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: String,
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: Value,
}

impl ElasticStore {
    pub fn new(config: &ElasticConfig) -> Result<Self, StoreError> {
        let mut base = Url::parse(&config.url)?;
        // Url::join replaces the last path segment unless the base ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            base,
            index: config.index.clone(),
            scroll_size: config.scroll_size,
            scroll_keep_alive: config.scroll_keep_alive.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        Ok(self.base.join(path)?)
    }

    /// Creates the index with its mapping. An index that already exists is
    /// left as it is.
    pub async fn ensure_index(&self) -> Result<(), StoreError> {
        let url = self.endpoint(&self.index)?;
        let response = self.client.put(url).json(&index_mapping()).send().await?;

        match check(response).await {
            Ok(_) => {
                debug!(index = %self.index, "created index");
                Ok(())
            }
            Err(StoreError::Status { status: 400, body })
                if body.contains("resource_already_exists_exception") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // Opens a scroll over the whole index and returns its first page
    async fn open_scroll(&self) -> Result<SearchResponse, StoreError> {
        let mut url = self.endpoint(&format!("{}/_search", self.index))?;
        url.query_pairs_mut()
            .append_pair("scroll", &self.scroll_keep_alive);

        let body = json!({
            "size": self.scroll_size,
            "query": { "match_all": {} },
            "sort": ["_doc"],
        });
        let response = self.client.post(url).json(&body).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn next_page(&self, scroll_id: &str) -> Result<SearchResponse, StoreError> {
        let url = self.endpoint("_search/scroll")?;
        let body = json!({ "scroll": self.scroll_keep_alive, "scroll_id": scroll_id });
        let response = self.client.post(url).json(&body).send().await?;
        Ok(check(response).await?.json().await?)
    }

    // Best effort: an abandoned scroll expires on its own after the keep-alive
    async fn clear_scroll(&self, scroll_id: &str) {
        let Ok(url) = self.endpoint("_search/scroll") else {
            return;
        };
        let body = json!({ "scroll_id": [scroll_id] });
        if let Err(e) = self.client.delete(url).json(&body).send().await {
            debug!(error = %e, "failed to clear scroll");
        }
    }
}

#[async_trait]
impl RecordStore for ElasticStore {
    async fn bulk_insert(&self, records: Vec<AddressRecord>) -> Result<BulkOutcome, StoreError> {
        if records.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let body = bulk_body(&self.index, &records)?;
        let url = self.endpoint("_bulk")?;
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let parsed: BulkResponse = check(response).await?.json().await?;
        Ok(tally(&parsed))
    }

    fn scan(&self) -> BoxStream<'_, Result<StoredRecord, StoreError>> {
        // State is the scroll id of the previous page; None before the first
        stream::try_unfold(None::<String>, move |scroll_id| async move {
            let page = match scroll_id {
                None => self.open_scroll().await?,
                Some(id) => self.next_page(&id).await?,
            };

            if page.hits.hits.is_empty() {
                self.clear_scroll(&page.scroll_id).await;
                return Ok::<_, StoreError>(None);
            }

            let records: Vec<Result<StoredRecord, StoreError>> =
                page.hits.hits.into_iter().map(decode_hit).collect();
            Ok(Some((stream::iter(records), Some(page.scroll_id))))
        })
        .try_flatten()
        .boxed()
    }

    async fn update(&self, id: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        let url = self.endpoint(&format!("{}/_update/{}", self.index, id))?;
        let response = self
            .client
            .post(url)
            .json(&update_body(snapshot)?)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_string()));
        }
        check(response).await?;
        Ok(())
    }
}

// Turns a non-success response into a StoreError carrying the body
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 512 {
        let mut cut = 512;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

// Builds the NDJSON body for a bulk create request
fn bulk_body(index: &str, records: &[AddressRecord]) -> Result<String, StoreError> {
    let mut body = String::new();
    for record in records {
        let action = json!({ "create": { "_index": index, "_id": record.id() } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(record)?);
        body.push('\n');
    }
    Ok(body)
}

// Painless script assigning each given field at the top level of _source
const UPDATE_SCRIPT: &str =
    "for (entry in params.fields.entrySet()) { ctx._source[entry.getKey()] = entry.getValue(); }";

// Builds the body of a scripted update that replaces the snapshot's fields
fn update_body(snapshot: &Snapshot) -> Result<Value, StoreError> {
    Ok(json!({
        "script": {
            "lang": "painless",
            "source": UPDATE_SCRIPT,
            "params": { "fields": serde_json::to_value(snapshot)? },
        }
    }))
}

// Header names are arbitrary, so they go in one flattened field instead of
// growing the mapping with every new name
fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "address": { "type": "ip" },
                "http_available": { "type": "boolean" },
                "https_available": { "type": "boolean" },
                "http_status_code": { "type": "integer" },
                "https_status_code": { "type": "integer" },
                "http_content": { "type": "text", "index": false },
                "https_content": { "type": "text", "index": false },
                "headers": { "type": "flattened" },
                "robots": {
                    "properties": {
                        "requests": { "type": "integer" },
                        "seconds": { "type": "integer" },
                        "crawl_delay": { "type": "integer" }
                    }
                },
                "last_checked": { "type": "date" },
                "last_online": { "type": "date" }
            }
        }
    })
}

// Counts created / already present / failed items of a bulk response
fn tally(response: &BulkResponse) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    for item in response.items.iter().flat_map(|entry| entry.values()) {
        match item.status {
            200..=299 => outcome.created += 1,
            409 => outcome.already_present += 1,
            status => {
                if outcome.failed == 0 {
                    warn!(status, error = ?item.error, "bulk item rejected");
                }
                outcome.failed += 1;
            }
        }
    }
    outcome
}

fn decode_hit(hit: Hit) -> Result<StoredRecord, StoreError> {
    let record: AddressRecord = serde_json::from_value(hit.source)?;
    Ok(StoredRecord { id: hit.id, record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let config = ElasticConfig {
            url: "http://search.internal:9200/es".to_string(),
            ..Default::default()
        };
        let store = ElasticStore::new(&config).unwrap();
        assert_eq!(
            store.endpoint("ipv4addresses/_update/1.2.3.4").unwrap().as_str(),
            "http://search.internal:9200/es/ipv4addresses/_update/1.2.3.4"
        );
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = ElasticConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(ElasticStore::new(&config), Err(StoreError::Url(_))));
    }

    #[test]
    fn test_bulk_body_uses_create_with_address_id() {
        let record = AddressRecord::seed(Ipv4Addr::new(93, 184, 216, 34), Utc::now());
        let body = bulk_body("ipv4addresses", &[record]).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["create"]["_id"], "93.184.216.34");
        assert_eq!(action["create"]["_index"], "ipv4addresses");

        let doc: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(doc["address"], "93.184.216.34");
        assert_eq!(doc["https_status_code"], -1);
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_tally_counts_conflicts_separately() {
        let response: BulkResponse = serde_json::from_value(json!({
            "errors": true,
            "items": [
                { "create": { "_id": "1.1.1.1", "status": 201 } },
                { "create": { "_id": "1.1.1.2", "status": 409,
                              "error": { "type": "version_conflict_engine_exception" } } },
                { "create": { "_id": "1.1.1.3", "status": 400,
                              "error": { "type": "mapper_parsing_exception" } } }
            ]
        }))
        .unwrap();

        assert_eq!(
            tally(&response),
            BulkOutcome {
                created: 1,
                already_present: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn test_decode_hit() {
        let record = AddressRecord::seed(Ipv4Addr::new(8, 8, 8, 8), Utc::now());
        let hit = Hit {
            id: "8.8.8.8".to_string(),
            source: serde_json::to_value(&record).unwrap(),
        };
        let stored = decode_hit(hit).unwrap();
        assert_eq!(stored.id, "8.8.8.8");
        assert_eq!(stored.record, record);

        let broken = Hit {
            id: "x".to_string(),
            source: json!({ "address": 5 }),
        };
        assert!(decode_hit(broken).is_err());
    }

    #[test]
    fn test_update_replaces_headers_and_robots() {
        let mut headers = crate::record::Headers::new();
        headers.insert("server".to_string(), "b".to_string());
        let snapshot = Snapshot {
            http_available: Some(true),
            http_status_code: Some(200),
            http_content: Some("hello".to_string()),
            https_available: None,
            https_status_code: None,
            https_content: None,
            headers: Some(headers),
            robots: Some(Default::default()),
            last_checked: Utc::now(),
            last_online: None,
        };

        let body = update_body(&snapshot).unwrap();
        assert!(body.get("doc").is_none());
        assert_eq!(body["script"]["source"], UPDATE_SCRIPT);

        let fields = &body["script"]["params"]["fields"];
        assert_eq!(fields["headers"], json!({ "server": "b" }));
        assert_eq!(fields["robots"], json!({}));
        assert_eq!(fields["http_status_code"], 200);
        // Skipped scheme stays out of the update
        assert!(fields.get("https_status_code").is_none());
    }

    #[test]
    fn test_mapping_flattens_headers() {
        let mapping = index_mapping();
        let properties = &mapping["mappings"]["properties"];
        assert_eq!(properties["headers"]["type"], "flattened");
        assert_eq!(properties["address"]["type"], "ip");
    }
}
