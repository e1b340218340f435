//! `POST /api/markers`: create a marker in the signed-in user's repo.

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::info;

use super::WebState;
use super::auth::current_user;
use super::uris::to_at_uri;
use crate::atproto::identity::IdentityResolver;
use crate::error::AppError;
use crate::lexicon::{EntryView, MARKER_NSID, MarkerRecord, MarkerView, validate_marker_record};

/// Split browser input into the record to validate and the raw entry links.
///
/// `location` may arrive bare or wrapped as `{ location, sourceUri }`; a
/// blank label is treated as absent.
pub fn normalize_input(input: &Value) -> Result<(Value, Vec<String>), AppError> {
    let obj = input
        .as_object()
        .ok_or_else(|| AppError::InvalidRequest("body must be a JSON object".into()))?;
    let mut record = Map::new();

    if let Some(label) = obj.get("label").and_then(Value::as_str).map(str::trim) {
        if !label.is_empty() {
            record.insert("label".into(), Value::String(label.to_string()));
        }
    } else if let Some(other) = obj.get("label").filter(|v| !v.is_null()) {
        record.insert("label".into(), other.clone());
    }

    match obj.get("location") {
        Some(Value::Object(wrapped)) if wrapped.contains_key("location") => {
            if let Some(loc) = wrapped.get("location") {
                record.insert("location".into(), loc.clone());
            }
            if let Some(src) = wrapped.get("sourceUri").filter(|v| !v.is_null()) {
                record.insert("locationSource".into(), src.clone());
            }
        }
        Some(loc) => {
            record.insert("location".into(), loc.clone());
        }
        None => {}
    }
    if let Some(src) = obj.get("locationSource").filter(|v| !v.is_null()) {
        record.insert("locationSource".into(), src.clone());
    }

    let entries = match obj.get("markedEntries") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::InvalidRequest("markedEntries must be strings".into()))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::String(single)) => vec![single.clone()],
        Some(_) => return Err(AppError::InvalidRequest("markedEntries must be an array".into())),
    };

    Ok((Value::Object(record), entries))
}

/// Convert every non-blank entry to an AT URI, in order.
pub async fn convert_entries(entries: &[String], resolver: &IdentityResolver) -> Result<Vec<String>, AppError> {
    let pending = entries.iter().filter(|e| !e.trim().is_empty()).map(|entry| async move {
        to_at_uri(entry, resolver)
            .await?
            .ok_or_else(|| AppError::InvalidRequest(format!("cannot convert '{entry}' to an at:// URI")))
    });
    try_join_all(pending).await
}

pub async fn create_marker(
    State(state): State<WebState>,
    headers: HeaderMap,
    Json(input): Json<Value>,
) -> Result<Json<MarkerView>, AppError> {
    let (_, session) = current_user(&state, &headers).await?;

    let (raw, entries) = normalize_input(&input)?;
    let mut record: MarkerRecord = validate_marker_record(&raw).map_err(AppError::Validation)?;
    let entries = convert_entries(&entries, state.oauth.resolver()).await?;
    record.marked_entries = Some(entries.clone());

    let created = session.create_record(MARKER_NSID, &record.to_repo_value()).await?;
    info!(did = %session.did(), uri = %created.uri, entries = entries.len(), "marker created");

    let views = entries.into_iter().map(EntryView::unresolved).collect();
    Ok(Json(MarkerView::new(created.uri, record, views)))
}
