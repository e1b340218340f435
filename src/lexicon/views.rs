//! `community.atprotocol.geomarker.defs` view objects returned to clients.

use serde::{Deserialize, Serialize};

use super::{ENTRY_VIEW_TYPE, LOCATION_SERVICE_VIEW_TYPE, Location, MARKER_VIEW_TYPE, MarkerRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerView {
    #[serde(rename = "$type")]
    pub kind: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_service: Option<LocationServiceView>,
    pub marked_entries: Vec<EntryView>,
}

impl MarkerView {
    pub fn new(uri: impl Into<String>, record: MarkerRecord, marked_entries: Vec<EntryView>) -> Self {
        Self {
            kind: MARKER_VIEW_TYPE.to_string(),
            uri: uri.into(),
            label: record.label,
            location: record.location,
            location_source: record.location_source,
            location_service: None,
            marked_entries,
        }
    }

    pub fn with_location_service(mut self, view: Option<LocationServiceView>) -> Self {
        self.location_service = view;
        self
    }
}

/// A referenced entry; `record` is `null` when it could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryView {
    #[serde(rename = "$type")]
    pub kind: String,
    pub uri: String,
    pub record: Option<EntryRecordView>,
}

impl EntryView {
    pub fn resolved(uri: impl Into<String>, record: EntryRecordView) -> Self {
        Self { kind: ENTRY_VIEW_TYPE.to_string(), uri: uri.into(), record: Some(record) }
    }

    pub fn unresolved(uri: impl Into<String>) -> Self {
        Self { kind: ENTRY_VIEW_TYPE.to_string(), uri: uri.into(), record: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecordView {
    /// Collection NSID of the referenced record.
    #[serde(rename = "$type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationServiceView {
    #[serde(rename = "$type")]
    pub kind: String,
    pub name: String,
    pub original_uri: String,
}

impl LocationServiceView {
    pub fn new(name: impl Into<String>, original_uri: impl Into<String>) -> Self {
        Self {
            kind: LOCATION_SERVICE_VIEW_TYPE.to_string(),
            name: name.into(),
            original_uri: original_uri.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::location::Hthree;

    #[test]
    fn unresolved_entry_serialises_null_record() {
        let v = serde_json::to_value(EntryView::unresolved("at://did:plc:a/app.bsky.feed.post/1")).unwrap();
        assert_eq!(v["$type"], ENTRY_VIEW_TYPE);
        assert!(v["record"].is_null());
    }

    #[test]
    fn marker_view_uses_camel_case() {
        let record = MarkerRecord {
            label: Some("home".into()),
            location: Location::Hthree(Hthree { value: "8549b11bfffffff".into(), name: None }),
            location_source: Some("at://did:plc:a/diary.places/1".into()),
            marked_entries: None,
        };
        let view = MarkerView::new("at://did:plc:a/community.atprotocol.geomarker.marker/1", record, vec![])
            .with_location_service(Some(LocationServiceView::new("diary.places", "at://did:plc:a/diary.places/1")));
        let v = serde_json::to_value(&view).unwrap();
        assert_eq!(v["$type"], MARKER_VIEW_TYPE);
        assert_eq!(v["locationSource"], "at://did:plc:a/diary.places/1");
        assert_eq!(v["locationService"]["originalUri"], "at://did:plc:a/diary.places/1");
        assert_eq!(v["markedEntries"].as_array().unwrap().len(), 0);
    }
}
