//! Lexicon types for geomarker records, their views, and the location
//! lexicons they embed.
//!
//! Validation is hand-written per record type and collects every problem
//! with a field path, so callers can point a form at the exact field.

pub mod location;
pub mod marker;
pub mod views;

use std::fmt;

use serde::Serialize;

pub use location::Location;
pub use marker::{MarkerRecord, validate_marker_record};
pub use views::{EntryRecordView, EntryView, LocationServiceView, MarkerView};

pub const MARKER_NSID: &str = "community.atprotocol.geomarker.marker";
pub const GET_MARKERS_NSID: &str = "community.atprotocol.geomarker.getMarkers";
pub const MARKER_VIEW_TYPE: &str = "community.atprotocol.geomarker.defs#markerView";
pub const ENTRY_VIEW_TYPE: &str = "community.atprotocol.geomarker.defs#entryView";
pub const LOCATION_SERVICE_VIEW_TYPE: &str =
    "community.atprotocol.geomarker.defs#locationServiceView";

pub const LOCATION_GEO_NSID: &str = "community.lexicon.location.geo";
pub const LOCATION_ADDRESS_NSID: &str = "community.lexicon.location.address";
pub const LOCATION_HTHREE_NSID: &str = "community.lexicon.location.hthree";
pub const LOCATION_FSQ_NSID: &str = "community.lexicon.location.fsq";

/// One validation failure, addressed by a dotted/indexed path
/// (`location.latitude`, `markedEntries[2]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

/// Non-empty list of [`FieldError`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(path, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[FieldError] {
        &self.0
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|e| e.path == path)
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| format!("{}: {}", e.path, e.message)).collect();
        write!(f, "{}", parts.join("; "))
    }
}
