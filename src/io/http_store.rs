//! Record store over a REST collection API
//!
//! Endpoints (relative to `base_url`):
//! - `GET  /api/collections/{c}/records?filter=(card_id='X')&perPage=1`
//! - `GET  /api/collections/{c}/records/{id}`
//! - `PATCH /api/collections/{c}/records/{id}` with `{"status": "..."}`
//! - `GET  /api/collections/{c}/records?page=N&perPage=P`
//!
//! The client timeout from config is the only bound on any call.

use crate::domain::types::{CardId, Pilgrim, PilgrimId, PilgrimStatus};
use crate::infra::config::Config;
use crate::io::store::{RecordStore, StoreError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, error, info};

/// What an HTTP 404 means for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Addresses one record: 404 is a missing record
    Record,
    /// Addresses the collection: 404 is a wrong collection or base URL
    Collection,
}

/// One page of records as returned by the list endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordPage {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
    items: Vec<Pilgrim>,
}

pub struct HttpRecordStore {
    client: Client,
    records_url: String,
    page_size: u32,
}

impl HttpRecordStore {
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        // Create HTTP client once for reuse (connection pooling)
        let client = Client::builder()
            .timeout(config.store_timeout())
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let records_url = format!(
            "{}/api/collections/{}/records",
            config.store_base_url(),
            config.store_collection()
        );

        info!(records_url = %records_url, "http_store_initialized");

        Ok(Self { client, records_url, page_size: config.store_page_size() })
    }

    fn record_url(&self, id: &PilgrimId) -> String {
        format!("{}/{}", self.records_url, id.0)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        op: &'static str,
        scope: Scope,
        request: RequestBuilder,
    ) -> Result<T, StoreError> {
        let start = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    op = op,
                    latency_us = %start.elapsed().as_micros(),
                    error = %e,
                    "http_store_request_error"
                );
                return Err(StoreError::Network(e.to_string()));
            }
        };

        let status = response.status();
        debug!(
            op = op,
            status = %status.as_u16(),
            latency_us = %start.elapsed().as_micros(),
            "http_store_response"
        );

        if status == StatusCode::NOT_FOUND && scope == Scope::Record {
            return Err(StoreError::NotFound);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(op = op, status = %status.as_u16(), body = %body, "http_store_server_error");
            return Err(StoreError::Server {
                status: Some(status.as_u16()),
                message: format!("{} {}", status.as_u16(), truncate(&body, 200)),
            });
        }

        response.json::<T>().await.map_err(|e| {
            error!(op = op, error = %e, "http_store_decode_error");
            if e.is_decode() {
                StoreError::Server { status: Some(status.as_u16()), message: e.to_string() }
            } else {
                StoreError::Network(e.to_string())
            }
        })
    }
}

/// Quote a value for use inside a filter expression
fn filter_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn find_by_card_id(&self, card_id: &CardId) -> Result<Pilgrim, StoreError> {
        let filter = format!("(card_id={})", filter_literal(&card_id.0));
        let request = self
            .client
            .get(&self.records_url)
            .query(&[("filter", filter.as_str()), ("perPage", "1")]);

        let page: RecordPage = self.fetch("find_by_card_id", Scope::Collection, request).await?;
        page.items.into_iter().next().ok_or(StoreError::NotFound)
    }

    async fn find_by_id(&self, id: &PilgrimId) -> Result<Pilgrim, StoreError> {
        let request = self.client.get(self.record_url(id));
        self.fetch("find_by_id", Scope::Record, request).await
    }

    async fn update_status(
        &self,
        id: &PilgrimId,
        status: PilgrimStatus,
    ) -> Result<Pilgrim, StoreError> {
        let request = self
            .client
            .patch(self.record_url(id))
            .json(&serde_json::json!({ "status": status }));

        let pilgrim: Pilgrim = self.fetch("update_status", Scope::Record, request).await?;
        info!(pilgrim_id = %id, status = %pilgrim.status, "http_store_status_updated");
        Ok(pilgrim)
    }

    async fn list_all(&self) -> Result<Vec<Pilgrim>, StoreError> {
        let per_page = self.page_size.to_string();
        let mut pilgrims = Vec::new();
        let mut page_no: u32 = 1;

        loop {
            let page_param = page_no.to_string();
            let request = self.client.get(&self.records_url).query(&[
                ("page", page_param.as_str()),
                ("perPage", per_page.as_str()),
                ("sort", "name"),
            ]);
            let page: RecordPage = self.fetch("list_all", Scope::Collection, request).await?;
            let fetched = page.items.len();
            pilgrims.extend(page.items);

            if fetched == 0 || page.page >= page.total_pages {
                break;
            }
            page_no += 1;
        }

        debug!(count = pilgrims.len(), "http_store_listed");
        Ok(pilgrims)
    }
}
