//! Read-only HTTP query surface over the index and thumbnail store.
//!
//! This is the only client-facing surface in the system; every other
//! component is headless. It never enqueues events, acquires locks, or
//! mutates the index - it shares the state-store and index-HTTP plumbing
//! with the rest of the pipeline but runs as its own bound listener.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use nas_indexer_core::index_client::IndexClient;
use nas_indexer_core::state_store::StateStore;
use serde::{Deserialize, Serialize};
use serde_json::Value as RawJson;
use tracing::{debug, warn};

const FACET_FIELDS: &str = "file_type,content_type,camera_make,camera_model,author,artist,genre,directory_path";
const RETURN_FIELDS: &str = "*,score";

#[derive(Clone)]
pub struct AppState {
    pub index: IndexClient,
    pub store: StateStore,
    pub thumbnail_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", get(search))
        .route("/search/debug", get(search_debug))
        .route("/stats", get(stats))
        .route("/suggest", get(suggest))
        .route("/thumbnail", get(thumbnail))
        .with_state(Arc::new(state))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    index: String,
    state_store: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let index_ok = state.index.ping().await.is_ok();
    let store_ok = state.store.ping().await.is_ok();
    let (status, index, state_store) = match (index_ok, store_ok) {
        (true, true) => ("healthy", "ok".to_string(), "ok".to_string()),
        (false, false) => ("unhealthy", "unreachable".to_string(), "unreachable".to_string()),
        (true, false) => ("degraded", "ok".to_string(), "unreachable".to_string()),
        (false, true) => ("degraded", "unreachable".to_string(), "ok".to_string()),
    };
    Json(HealthResponse { status, index, state_store })
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(flatten)]
    raw: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    total: u64,
    start: u64,
    rows: u64,
    docs: Vec<SearchResult>,
    facets: SearchFacets,
    query_time: u64,
}

/// Exposes the full set of type-specific metadata fields from §4.4 as
/// optional fields, present only for matching file types, plus per-document
/// highlight snippets.
#[derive(Debug, Default, Serialize)]
struct SearchResult {
    #[serde(flatten)]
    fields: serde_json::Map<String, RawJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    highlights: Option<RawJson>,
}

#[derive(Debug, Default, Serialize)]
struct SearchFacets {
    #[serde(flatten)]
    fields: serde_json::Map<String, RawJson>,
}

fn resolved_params(raw: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = vec![
        ("wt".to_string(), "json".to_string()),
        ("facet".to_string(), "true".to_string()),
        ("facet.field".to_string(), FACET_FIELDS.to_string()),
        ("hl".to_string(), "true".to_string()),
        ("hl.fl".to_string(), "content".to_string()),
        ("fl".to_string(), RETURN_FIELDS.to_string()),
        ("q".to_string(), "*:*".to_string()),
    ];
    // Caller-supplied parameters take precedence over the defaults above.
    for (key, value) in raw {
        if let Some(existing) = params.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value.clone();
        } else {
            params.push((key.clone(), value.clone()));
        }
    }
    params
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let resolved = resolved_params(&params.raw);
    let query = resolved.iter().find(|(k, _)| k == "q").map(|(_, v)| v.clone()).unwrap_or_default();
    let param_refs: Vec<(&str, &str)> = resolved.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let raw = state.index.select(&param_refs).await.map_err(ApiError::from)?;
    Ok(Json(reshape_search_response(query, raw)))
}

async fn search_debug(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resolved = resolved_params(&params.raw);
    let param_refs: Vec<(&str, &str)> = resolved.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let raw = state.index.select(&param_refs).await.map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "resolved_params": resolved, "raw_response": raw })))
}

fn reshape_search_response(query: String, raw: RawJson) -> SearchResponse {
    let response = raw.get("response").cloned().unwrap_or_default();
    let total = response.get("numFound").and_then(RawJson::as_u64).unwrap_or(0);
    let start = response.get("start").and_then(RawJson::as_u64).unwrap_or(0);
    let rows = response
        .get("docs")
        .and_then(RawJson::as_array)
        .map(|docs| docs.len() as u64)
        .unwrap_or(0);
    let highlighting = raw.get("highlighting").cloned();

    let docs = response
        .get("docs")
        .and_then(RawJson::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|doc| {
            let id = doc.get("id").and_then(RawJson::as_str).map(str::to_string);
            let fields = match doc {
                RawJson::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            let highlights = id.and_then(|id| highlighting.as_ref()?.get(&id).cloned());
            SearchResult { fields, highlights }
        })
        .collect();

    let facet_fields = raw
        .get("facet_counts")
        .and_then(|f| f.get("facet_fields"))
        .cloned()
        .and_then(|v| match v {
            RawJson::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();

    let query_time = raw
        .get("responseHeader")
        .and_then(|h| h.get("QTime"))
        .and_then(RawJson::as_u64)
        .unwrap_or(0);

    SearchResponse {
        query,
        total,
        start,
        rows,
        docs,
        facets: SearchFacets { fields: facet_fields },
        query_time,
    }
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    total_documents: u64,
    by_file_type: serde_json::Map<String, RawJson>,
    by_content_type: serde_json::Map<String, RawJson>,
    index_status: &'static str,
}

async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let raw = state
        .index
        .select(&[
            ("q", "*:*"),
            ("rows", "0"),
            ("facet", "true"),
            ("facet.field", "file_type"),
            ("facet.field", "content_type"),
            ("wt", "json"),
        ])
        .await
        .map_err(ApiError::from)?;

    let total_documents = raw
        .get("response")
        .and_then(|r| r.get("numFound"))
        .and_then(RawJson::as_u64)
        .unwrap_or(0);

    let facet_fields = raw.get("facet_counts").and_then(|f| f.get("facet_fields"));
    let by_file_type = facet_fields
        .and_then(|f| f.get("file_type"))
        .cloned()
        .map(facet_pairs_to_map)
        .unwrap_or_default();
    let by_content_type = facet_fields
        .and_then(|f| f.get("content_type"))
        .cloned()
        .map(facet_pairs_to_map)
        .unwrap_or_default();

    let index_status = if state.index.ping().await.is_ok() { "healthy" } else { "unreachable" };

    Ok(Json(StatsResponse { total_documents, by_file_type, by_content_type, index_status }))
}

/// Solr encodes facet counts as a flat `[name, count, name, count, ...]`
/// array; reshape it into a map.
fn facet_pairs_to_map(value: RawJson) -> serde_json::Map<String, RawJson> {
    let mut map = serde_json::Map::new();
    if let Some(array) = value.as_array() {
        let mut iter = array.iter();
        while let (Some(name), Some(count)) = (iter.next(), iter.next()) {
            if let Some(name) = name.as_str() {
                map.insert(name.to_string(), count.clone());
            }
        }
    }
    map
}

#[derive(Debug, Deserialize)]
struct SuggestParams {
    q: Option<String>,
    count: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SuggestResponse {
    suggestions: Vec<String>,
}

async fn suggest(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<SuggestResponse>, ApiError> {
    let prefix = params.q.unwrap_or_default();
    let count = params.count.unwrap_or(5).clamp(1, 20);
    if prefix.trim().is_empty() {
        return Ok(Json(SuggestResponse { suggestions: Vec::new() }));
    }

    let escaped = prefix.replace('\\', "\\\\").replace('"', "\\\"");
    let query = format!("file_name:*{escaped}* OR content:*{escaped}*");
    let rows = count.to_string();
    let raw = state
        .index
        .select(&[("q", query.as_str()), ("rows", rows.as_str()), ("fl", "file_name"), ("wt", "json")])
        .await
        .map_err(ApiError::from)?;

    let mut seen = std::collections::HashSet::new();
    let suggestions = raw
        .get("response")
        .and_then(|r| r.get("docs"))
        .and_then(RawJson::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|doc| doc.get("file_name").and_then(RawJson::as_str).map(str::to_string))
        .filter(|name| seen.insert(name.clone()))
        .take(count as usize)
        .collect();

    Ok(Json(SuggestResponse { suggestions }))
}

#[derive(Debug, Deserialize)]
struct ThumbnailParams {
    file_path: String,
    size: String,
}

async fn thumbnail(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ThumbnailParams>,
) -> Result<Response, ApiError> {
    if !matches!(params.size.as_str(), "small" | "medium" | "large") {
        return Err(ApiError::BadRequest(format!("invalid size {:?}, expected small|medium|large", params.size)));
    }

    let key = format!("thumbnails:{}", params.file_path);
    let path = state
        .store
        .hget(&key, &params.size)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("no thumbnail recorded for this path/size".into()))?;

    let bytes = tokio::fs::read(&path).await.map_err(|err| {
        warn!(path, error = %err, "thumbnail: file missing on disk despite recorded lookup");
        ApiError::NotFound("thumbnail file missing on disk".into())
    })?;

    debug!(file_path = params.file_path, size = params.size, "thumbnail served");
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/jpeg"), (header::CACHE_CONTROL, "public, max-age=86400")],
        bytes,
    )
        .into_response())
}

enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<nas_indexer_core::error::Error> for ApiError {
    fn from(err: nas_indexer_core::error::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
