//! `getMarkers` fan-out: list an owner's marker records, then resolve every
//! entry they reference.
//!
//! Each distinct entry URI is fetched once per call, however many markers
//! reference it, with at most `concurrency` lookups in flight.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info};

use super::entries::fetch_entry_view;
use super::markers::{ValidMarker, extract_valid_marker_record, make_location_source_view};
use crate::atproto::RepoReader;
use crate::error::AppError;
use crate::lexicon::{EntryView, MARKER_NSID, MarkerView};

#[derive(Debug, Clone, Default)]
pub struct GetMarkersParams {
    pub owner: String,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetMarkersOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub markers: Vec<MarkerView>,
}

pub struct Aggregator {
    reader: Arc<dyn RepoReader>,
    default_limit: u32,
    concurrency: usize,
}

impl Aggregator {
    pub fn new(reader: Arc<dyn RepoReader>, default_limit: u32, concurrency: usize) -> Self {
        Self { reader, default_limit, concurrency: concurrency.max(1) }
    }

    pub async fn get_markers(&self, params: &GetMarkersParams) -> Result<GetMarkersOutput, AppError> {
        let limit = params.limit.unwrap_or(self.default_limit);
        let page = self
            .reader
            .list_records(&params.owner, MARKER_NSID, limit, params.cursor.as_deref())
            .await
            .map_err(|e| match e {
                AppError::Xrpc(_) => e,
                other => AppError::Xrpc(format!("listing markers of {}: {other}", params.owner)),
            })?;
        let listed = page.records.len();

        let markers: Vec<ValidMarker> =
            page.records.iter().filter_map(extract_valid_marker_record).collect();

        let uris = unique_entry_uris(&markers);
        let views = self.resolve_entries(uris).await;

        info!(
            owner = %params.owner,
            listed,
            valid = markers.len(),
            entries = views.len(),
            "getMarkers resolved"
        );

        let markers = markers
            .into_iter()
            .map(|m| {
                let entries = m
                    .record
                    .marked_entries()
                    .iter()
                    .filter_map(|uri| views.get(uri).cloned())
                    .collect();
                let service = make_location_source_view(m.record.location_source.as_deref());
                MarkerView::new(m.uri, m.record, entries).with_location_service(service)
            })
            .collect();

        Ok(GetMarkersOutput { cursor: page.cursor, markers })
    }

    async fn resolve_entries(&self, uris: Vec<String>) -> HashMap<String, EntryView> {
        let reader = self.reader.as_ref();
        debug!(count = uris.len(), concurrency = self.concurrency, "resolving entries");
        stream::iter(uris)
            .map(|uri| async move {
                let view = fetch_entry_view(reader, &uri).await;
                (uri, view)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

/// All entry URIs across `markers`, first-seen order, duplicates removed.
pub fn unique_entry_uris(markers: &[ValidMarker]) -> Vec<String> {
    let mut seen = HashSet::new();
    markers
        .iter()
        .flat_map(|m| m.record.marked_entries())
        .filter(|uri| seen.insert(uri.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atproto::MemoryRepo;
    use serde_json::{Value, json};

    const OWNER: &str = "did:plc:owner";

    fn marker(label: &str, entries: &[&str]) -> Value {
        json!({
            "$type": MARKER_NSID,
            "label": label,
            "location": { "$type": "community.lexicon.location.geo", "latitude": "40.7", "longitude": "-74.0" },
            "markedEntries": entries,
        })
    }

    fn params() -> GetMarkersParams {
        GetMarkersParams { owner: OWNER.into(), ..Default::default() }
    }

    #[tokio::test]
    async fn dedupes_entry_lookups_across_markers() {
        let repo = Arc::new(MemoryRepo::new());
        let post = repo.insert("did:plc:friend", "app.bsky.feed.post", "p1", json!({ "text": "hello" }));
        repo.insert(OWNER, MARKER_NSID, "m1", marker("one", &[post.as_str()]));
        repo.insert(OWNER, MARKER_NSID, "m2", marker("two", &[post.as_str(), post.as_str()]));

        let agg = Aggregator::new(repo.clone(), 100, 4);
        let out = agg.get_markers(&params()).await.unwrap();

        assert_eq!(out.markers.len(), 2);
        assert_eq!(repo.lookups(&post), 1);
        let second = &out.markers[1];
        assert_eq!(second.marked_entries.len(), 2);
        assert_eq!(
            second.marked_entries[0].record.as_ref().and_then(|r| r.text.as_deref()),
            Some("hello")
        );
    }

    #[tokio::test]
    async fn missing_entries_resolve_to_null_record() {
        let repo = Arc::new(MemoryRepo::new());
        let gone = "at://did:plc:friend/app.bsky.feed.post/deleted";
        repo.insert(OWNER, MARKER_NSID, "m1", marker("one", &[gone]));
        repo.fail_repo("did:plc:down");
        repo.insert(OWNER, MARKER_NSID, "m2", marker("two", &["at://did:plc:down/app.bsky.feed.post/x"]));

        let out = Aggregator::new(repo, 100, 2).get_markers(&params()).await.unwrap();
        assert_eq!(out.markers.len(), 2);
        for m in &out.markers {
            assert_eq!(m.marked_entries.len(), 1);
            assert!(m.marked_entries[0].record.is_none());
        }
    }

    #[tokio::test]
    async fn invalid_markers_skipped_and_order_kept() {
        let repo = Arc::new(MemoryRepo::new());
        repo.insert(OWNER, MARKER_NSID, "a", marker("first", &[]));
        repo.insert(OWNER, MARKER_NSID, "b", json!({ "$type": MARKER_NSID, "label": "no location" }));
        repo.insert(OWNER, MARKER_NSID, "c", json!({
            "$type": MARKER_NSID,
            "location": { "$type": "community.lexicon.location.hthree", "value": "8549b11bfffffff" },
            "locationSource": "at://did:web:places.example.com/com.example.place/1"
        }));

        let out = Aggregator::new(repo, 100, 2).get_markers(&params()).await.unwrap();
        let labels: Vec<_> = out.markers.iter().map(|m| m.label.clone()).collect();
        assert_eq!(labels, vec![Some("first".to_string()), None]);
        assert!(out.markers[1].marked_entries.is_empty());
        assert_eq!(
            out.markers[1].location_service.as_ref().map(|s| s.name.as_str()),
            Some("places.example.com")
        );
    }

    #[tokio::test]
    async fn list_failure_is_an_error() {
        let repo = Arc::new(MemoryRepo::new());
        repo.fail_repo(OWNER);
        let err = Aggregator::new(repo, 100, 2).get_markers(&params()).await.unwrap_err();
        assert!(matches!(err, AppError::Xrpc(_)));
    }

    #[tokio::test]
    async fn limit_and_cursor_page_through() {
        let repo = Arc::new(MemoryRepo::new());
        for k in ["a", "b", "c"] {
            repo.insert(OWNER, MARKER_NSID, k, marker(k, &[]));
        }
        let agg = Aggregator::new(repo, 100, 2);
        let first = agg
            .get_markers(&GetMarkersParams { limit: Some(2), ..params() })
            .await
            .unwrap();
        assert_eq!(first.markers.len(), 2);
        let next = agg
            .get_markers(&GetMarkersParams { limit: Some(2), cursor: first.cursor, ..params() })
            .await
            .unwrap();
        assert_eq!(next.markers.len(), 1);
        assert!(next.cursor.is_none());
    }

    #[test]
    fn unique_uris_keep_first_seen_order() {
        let mk = |entries: &[&str]| ValidMarker {
            uri: "at://x/y/z".into(),
            record: crate::lexicon::validate_marker_record(&marker("m", entries)).unwrap(),
        };
        let a = "at://did:plc:a/app.bsky.feed.post/1";
        let b = "at://did:plc:b/app.bsky.feed.post/2";
        let uris = unique_entry_uris(&[mk(&[b, a]), mk(&[a, b, a])]);
        assert_eq!(uris, vec![b.to_string(), a.to_string()]);
    }
}
