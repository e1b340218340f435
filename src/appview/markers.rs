//! Marker record extraction and location-source naming.

use tracing::debug;

use crate::atproto::{AtUri, ListedRecord};
use crate::lexicon::{LocationServiceView, MarkerRecord, validate_marker_record};

/// A listed record that passed marker validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidMarker {
    pub uri: String,
    pub record: MarkerRecord,
}

/// Validate a listed record; anything that is not a well-formed marker is
/// dropped.
pub fn extract_valid_marker_record(listed: &ListedRecord) -> Option<ValidMarker> {
    match validate_marker_record(&listed.value) {
        Ok(record) => Some(ValidMarker { uri: listed.uri.clone(), record }),
        Err(errors) => {
            debug!(uri = %listed.uri, %errors, "skipping invalid marker record");
            None
        }
    }
}

/// Human-facing name for the service a location came from.
///
/// `did:web` sources are named by their web host, `did:plc` sources by the
/// collection holding the record, anything else by its authority.
pub fn location_service_name(source: &AtUri) -> String {
    if let Some(host) = source.host.strip_prefix("did:web:") {
        return host.to_string();
    }
    if source.host.starts_with("did:plc:") {
        if let Some(collection) = &source.collection {
            return collection.clone();
        }
    }
    source.host.clone()
}

pub fn make_location_source_view(source: Option<&str>) -> Option<LocationServiceView> {
    let source = source?;
    let uri = AtUri::parse(source).ok()?;
    Some(LocationServiceView::new(location_service_name(&uri), source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listed(value: serde_json::Value) -> ListedRecord {
        ListedRecord {
            uri: "at://did:plc:owner/community.atprotocol.geomarker.marker/3k".into(),
            cid: None,
            value,
        }
    }

    #[test]
    fn keeps_valid_records_with_uri() {
        let rec = listed(json!({
            "$type": "community.atprotocol.geomarker.marker",
            "location": { "$type": "community.lexicon.location.hthree", "value": "8549b11bfffffff" }
        }));
        let marker = extract_valid_marker_record(&rec).unwrap();
        assert_eq!(marker.uri, rec.uri);
    }

    #[test]
    fn drops_invalid_records() {
        assert!(extract_valid_marker_record(&listed(json!({ "label": "no location" }))).is_none());
    }

    #[test]
    fn service_names() {
        let web = AtUri::parse("at://did:web:places.example.com/com.example.place/1").unwrap();
        assert_eq!(location_service_name(&web), "places.example.com");
        let plc = AtUri::parse("at://did:plc:abc/diary.relationships.places/key").unwrap();
        assert_eq!(location_service_name(&plc), "diary.relationships.places");
        let handle = AtUri::parse("at://events.example.com/events.hipmaps.tours/key").unwrap();
        assert_eq!(location_service_name(&handle), "events.example.com");
    }

    #[test]
    fn source_view() {
        assert!(make_location_source_view(None).is_none());
        assert!(make_location_source_view(Some("not a uri")).is_none());
        let view = make_location_source_view(Some("at://did:plc:abc/com.foursquare.places/fsq1")).unwrap();
        assert_eq!(view.name, "com.foursquare.places");
        assert_eq!(view.original_uri, "at://did:plc:abc/com.foursquare.places/fsq1");
    }
}
