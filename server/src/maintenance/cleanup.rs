//! Duplicate-cleanup maintenance subcommand.
//!
//! More than one index document can end up sharing a `file_path` (stale
//! documents left behind by a schema change, a restored snapshot, or a
//! pre-deterministic-id migration). This walks the index, finds paths with
//! more than one document, and keeps only the newest by `modified_date`.

use std::collections::HashMap;

use anyhow::Result;
use nas_indexer_core::index_client::IndexClient;
use serde_json::Value as Json;
use tracing::{info, warn};

const PAGE_SIZE: u32 = 500;

pub struct CleanupReport {
    pub duplicate_paths: usize,
    pub documents_removed: usize,
}

pub async fn run(index: &IndexClient, execute: bool, fast: bool) -> Result<CleanupReport> {
    if fast { run_fast(index, execute).await } else { run_full_scan(index, execute).await }
}

/// Pages through the entire document set once, grouping by `file_path` in
/// memory, then deletes every duplicate but the newest by `modified_date`.
async fn run_full_scan(index: &IndexClient, execute: bool) -> Result<CleanupReport> {
    let mut groups: HashMap<String, Vec<Json>> = HashMap::new();
    let mut start: u32 = 0;

    loop {
        let start_str = start.to_string();
        let rows_str = PAGE_SIZE.to_string();
        let response = index
            .select(&[
                ("q", "*:*"),
                ("start", start_str.as_str()),
                ("rows", rows_str.as_str()),
                ("fl", "id,file_path,modified_date"),
                ("sort", "id asc"),
                ("wt", "json"),
            ])
            .await?;

        let docs = response
            .get("response")
            .and_then(|r| r.get("docs"))
            .and_then(Json::as_array)
            .cloned()
            .unwrap_or_default();
        if docs.is_empty() {
            break;
        }

        let page_len = docs.len();
        for doc in docs {
            if let Some(path) = doc.get("file_path").and_then(Json::as_str) {
                groups.entry(path.to_string()).or_default().push(doc);
            }
        }

        if (page_len as u32) < PAGE_SIZE {
            break;
        }
        start += PAGE_SIZE;
    }

    let mut duplicate_paths = 0usize;
    let mut documents_removed = 0usize;

    for (path, mut docs) in groups {
        if docs.len() < 2 {
            continue;
        }
        duplicate_paths += 1;
        docs.sort_by(|a, b| modified_date(b).cmp(&modified_date(a)));
        let keep_id = docs[0].get("id").and_then(Json::as_str).map(str::to_string);
        let to_remove = &docs[1..];
        documents_removed += to_remove.len();

        info!(
            path,
            total = docs.len(),
            keep_id,
            "duplicate index documents found"
        );

        if execute {
            for doc in to_remove {
                if let Some(id) = doc.get("id").and_then(Json::as_str)
                    && let Err(err) = index.delete_by_query("id", id).await
                {
                    warn!(path, id, error = %err, "cleanup: failed to delete duplicate");
                }
            }
        }
    }

    Ok(CleanupReport { duplicate_paths, documents_removed })
}

/// Skips paging the full set: facets on `file_path` with `facet.mincount=2`
/// to find only the paths that actually have duplicates, then for each one
/// deletes every document and re-adds the single newest.
async fn run_fast(index: &IndexClient, execute: bool) -> Result<CleanupReport> {
    let facet_response = index
        .select(&[
            ("q", "*:*"),
            ("rows", "0"),
            ("facet", "true"),
            ("facet.field", "file_path"),
            ("facet.mincount", "2"),
            ("facet.limit", "-1"),
            ("wt", "json"),
        ])
        .await?;

    let facet_pairs = facet_response
        .get("facet_counts")
        .and_then(|f| f.get("facet_fields"))
        .and_then(|f| f.get("file_path"))
        .and_then(Json::as_array)
        .cloned()
        .unwrap_or_default();

    let mut duplicate_paths = 0usize;
    let mut documents_removed = 0usize;

    let mut iter = facet_pairs.into_iter();
    while let (Some(name), Some(_count)) = (iter.next(), iter.next()) {
        let Some(path) = name.as_str() else { continue };
        duplicate_paths += 1;

        let escaped = path.replace('\\', "\\\\").replace('"', "\\\"");
        let query = format!("file_path:\"{escaped}\"");
        let response = index.select(&[("q", query.as_str()), ("rows", "100"), ("wt", "json")]).await?;
        let mut docs = response
            .get("response")
            .and_then(|r| r.get("docs"))
            .and_then(Json::as_array)
            .cloned()
            .unwrap_or_default();

        if docs.len() < 2 {
            continue;
        }
        docs.sort_by(|a, b| modified_date(b).cmp(&modified_date(a)));
        let newest = docs[0].clone();
        documents_removed += docs.len() - 1;

        info!(path, total = docs.len(), "duplicate index documents found (fast scan)");

        if execute {
            if let Err(err) = index.delete_by_query("file_path", path).await {
                warn!(path, error = %err, "cleanup: failed to delete duplicate group");
                continue;
            }
            if let Err(err) = index.upsert(&newest).await {
                warn!(path, error = %err, "cleanup: failed to re-add newest document after delete");
            }
        }
    }

    Ok(CleanupReport { duplicate_paths, documents_removed })
}

fn modified_date(doc: &Json) -> String {
    doc.get("modified_date").and_then(Json::as_str).unwrap_or_default().to_string()
}

pub fn print_report(report: &CleanupReport, execute: bool) {
    if execute {
        println!(
            "duplicate cleanup: {} duplicate path(s), {} document(s) removed",
            report.duplicate_paths, report.documents_removed
        );
    } else {
        println!(
            "duplicate cleanup (dry run): {} duplicate path(s), {} document(s) would be removed. Pass --execute to commit.",
            report.duplicate_paths, report.documents_removed
        );
    }
}
