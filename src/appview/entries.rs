//! Resolve a marked entry URI into an [`EntryView`].

use tracing::{debug, warn};

use crate::atproto::{AtUri, RepoReader};
use crate::error::AppError;
use crate::lexicon::{EntryRecordView, EntryView};

/// Fetch the record behind `entry_uri`. Never fails: an entry that cannot be
/// fetched comes back with `record: null`.
pub async fn fetch_entry_view(reader: &dyn RepoReader, entry_uri: &str) -> EntryView {
    let parsed = match AtUri::parse(entry_uri) {
        Ok(uri) => uri,
        Err(e) => {
            debug!(%entry_uri, "unparseable entry uri: {e}");
            return EntryView::unresolved(entry_uri);
        }
    };
    let Some((repo, collection, rkey)) = parsed.record_parts() else {
        debug!(%entry_uri, "entry uri does not name a record");
        return EntryView::unresolved(entry_uri);
    };

    match reader.get_record(repo, collection, rkey).await {
        Ok(record) => EntryView::resolved(
            entry_uri,
            EntryRecordView {
                kind: collection.to_string(),
                text: record.value.get("text").and_then(|t| t.as_str()).map(str::to_string),
            },
        ),
        Err(AppError::NotFound(e)) => {
            debug!(%entry_uri, "entry not found: {e}");
            EntryView::unresolved(entry_uri)
        }
        Err(e) => {
            warn!(%entry_uri, "entry lookup failed: {e}");
            EntryView::unresolved(entry_uri)
        }
    }
}
