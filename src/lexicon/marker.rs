//! `community.atprotocol.geomarker.marker` records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Location, MARKER_NSID, ValidationErrors};
use crate::atproto::AtUri;

/// Longest label accepted, in characters.
const MAX_LABEL_CHARS: usize = 640;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub location: Location,
    /// AT URI of the record the location was taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_entries: Option<Vec<String>>,
}

impl MarkerRecord {
    pub fn marked_entries(&self) -> &[String] {
        self.marked_entries.as_deref().unwrap_or_default()
    }

    /// The record as written to a repository, `$type` included.
    pub fn to_repo_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("$type".into(), Value::String(MARKER_NSID.into()));
        }
        value
    }
}

/// Validate an untyped record value against the marker lexicon.
///
/// `$type` may be absent (form input) but, when present, must name the marker
/// collection. All failures are collected rather than stopping at the first.
pub fn validate_marker_record(value: &Value) -> Result<MarkerRecord, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let Some(obj) = value.as_object() else {
        errors.push("$", "record must be an object");
        return Err(errors);
    };

    match obj.get("$type") {
        None => {}
        Some(Value::String(t)) if t == MARKER_NSID => {}
        Some(other) => errors.push("$type", format!("expected {MARKER_NSID}, got {other}")),
    }

    let label = match obj.get("label") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.chars().count() > MAX_LABEL_CHARS => {
            errors.push("label", format!("must be at most {MAX_LABEL_CHARS} characters"));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push("label", "must be a string");
            None
        }
    };

    let location = match obj.get("location") {
        None | Some(Value::Null) => {
            errors.push("location", "is required");
            None
        }
        Some(raw) => match serde_json::from_value::<Location>(raw.clone()) {
            Ok(loc) => {
                loc.validate("location", &mut errors);
                Some(loc)
            }
            Err(e) => {
                errors.push("location", format!("not a known location: {e}"));
                None
            }
        },
    };

    let location_source = match obj.get("locationSource") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            if AtUri::parse(s).is_err() {
                errors.push("locationSource", "must be an at:// URI");
            }
            Some(s.clone())
        }
        Some(_) => {
            errors.push("locationSource", "must be a string");
            None
        }
    };

    let marked_entries = match obj.get("markedEntries") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut entries = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) if AtUri::parse(s).is_ok() => entries.push(s.to_string()),
                    Some(_) => errors.push(format!("markedEntries[{i}]"), "must be an at:// URI"),
                    None => errors.push(format!("markedEntries[{i}]"), "must be a string"),
                }
            }
            Some(entries)
        }
        Some(_) => {
            errors.push("markedEntries", "must be an array");
            None
        }
    };

    match location {
        Some(location) if errors.is_empty() => Ok(MarkerRecord {
            label,
            location,
            location_source,
            marked_entries,
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn address() -> Value {
        json!({
            "$type": "community.lexicon.location.address",
            "country": "US",
            "street": "1000 Cool Location Avenue",
            "locality": "Awesome City"
        })
    }

    #[test]
    fn valid_listed_record() {
        let v = json!({
            "$type": MARKER_NSID,
            "label": "coffee",
            "location": address(),
            "locationSource": "at://did:web:places.example.com/com.example.place/1",
            "markedEntries": ["at://did:plc:abc/app.bsky.feed.post/3k1"]
        });
        let rec = validate_marker_record(&v).unwrap();
        assert_eq!(rec.label.as_deref(), Some("coffee"));
        assert_eq!(rec.marked_entries().len(), 1);
        assert_eq!(rec.location.nsid(), "community.lexicon.location.address");
    }

    #[test]
    fn form_input_without_type_and_entries() {
        let rec = validate_marker_record(&json!({ "location": address() })).unwrap();
        assert!(rec.label.is_none());
        assert!(rec.marked_entries().is_empty());
    }

    #[test]
    fn collects_every_error() {
        let v = json!({
            "$type": "app.bsky.feed.post",
            "label": 7,
            "locationSource": "https://example.com",
            "markedEntries": ["at://did:plc:abc/app.bsky.feed.post/1", "bsky.app/x", 3]
        });
        let errors = validate_marker_record(&v).unwrap_err();
        for path in ["$type", "label", "location", "locationSource", "markedEntries[1]", "markedEntries[2]"] {
            assert!(errors.has_path(path), "missing error for {path}: {errors}");
        }
        assert!(!errors.has_path("markedEntries[0]"));
    }

    #[test]
    fn nested_location_errors_have_paths() {
        let v = json!({
            "location": { "$type": "community.lexicon.location.geo", "latitude": "x", "longitude": "0" }
        });
        let errors = validate_marker_record(&v).unwrap_err();
        assert!(errors.has_path("location.latitude"));
    }

    #[test]
    fn non_object_rejected() {
        assert!(validate_marker_record(&json!("marker")).is_err());
    }

    #[test]
    fn repo_value_carries_type() {
        let rec = validate_marker_record(&json!({ "label": "x", "location": address() })).unwrap();
        let v = rec.to_repo_value();
        assert_eq!(v["$type"], MARKER_NSID);
        assert_eq!(v["location"]["$type"], "community.lexicon.location.address");
        assert!(v.get("markedEntries").is_none());
        assert_eq!(validate_marker_record(&v).unwrap(), rec);
    }
}
