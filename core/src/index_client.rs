//! HTTP client for the Solr-compatible search index.
//!
//! Mirrors the shape of the player's `ApiClient`: one shared `reqwest::Client`
//! with a fixed timeout, a base URL baked in at construction, and a thin
//! per-endpoint method instead of a generic "execute" escape hatch, since the
//! index only exposes three operations this pipeline needs.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct IndexClient {
    client: Client,
    base_url: String,
}

impl IndexClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Index)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `POST {base}/update?commit=true` with a single document. Fields named
    /// in the collaborator's excluded-field set (`event_type`, `queued_at`,
    /// `format`) must already be stripped by the caller before this is
    /// called — this client is a thin transport, not a schema filter.
    pub async fn upsert(&self, document: &Value) -> Result<()> {
        let url = format!("{}/update?commit=true", self.base_url);
        let body = json!([document]);
        let response = self.client.post(&url).json(&body).send().await?;
        self.check_update_response(response, document_path(document)).await
    }

    /// Delete-by-query: `POST {base}/update?commit=true` with an XML body
    /// `<delete><query>{field}:"{value}"</query></delete>`. Used both to
    /// retire a document on a `deleted` event (`field = "file_path"`) and by
    /// the duplicate-cleanup CLI (`field = "id"`).
    pub async fn delete_by_query(&self, field: &str, value: &str) -> Result<()> {
        let url = format!("{}/update?commit=true", self.base_url);
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        let body = format!("<delete><query>{field}:\"{escaped}\"</query></delete>");
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "text/xml")
            .body(body)
            .send()
            .await?;
        self.check_update_response(response, value.to_string()).await
    }

    async fn check_update_response(
        &self,
        response: reqwest::Response,
        context: String,
    ) -> Result<()> {
        if response.status().is_success() {
            debug!(context, "index update accepted");
            return Ok(());
        }
        let status = response.status();
        let detail = response
            .text()
            .await
            .unwrap_or_else(|_| "<no response body>".to_string());
        warn!(context, %status, detail, "index rejected update");
        Err(Error::IndexRejected {
            path: context,
            detail: format!("{status}: {detail}"),
        })
    }

    /// `GET {base}/select` with arbitrary Solr query parameters, used by the
    /// query API and the duplicate-cleanup CLIs. Returns the raw decoded JSON
    /// body; callers that need a typed view parse out of this.
    pub async fn select(&self, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/select", self.base_url);
        let response = self.client.get(&url).query(params).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::IndexRejected {
                path: url,
                detail: format!("{status}: {detail}"),
            });
        }
        Ok(response.json().await?)
    }

    /// `GET {base}/admin/ping`, used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/admin/ping", self.base_url);
        let response = self.client.get(&url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::IndexRejected {
                path: url,
                detail: response.status().to_string(),
            })
        }
    }
}

fn document_path(document: &Value) -> String {
    document
        .get("file_path")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string()
}
