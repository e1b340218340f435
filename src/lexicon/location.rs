//! `community.lexicon.location.*`: the location union a marker carries.

use serde::{Deserialize, Serialize};

use super::ValidationErrors;

/// H3 cell indexes are 15 hex digits.
const H3_INDEX_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum Location {
    #[serde(rename = "community.lexicon.location.geo")]
    Geo(Geo),
    #[serde(rename = "community.lexicon.location.address")]
    Address(Address),
    #[serde(rename = "community.lexicon.location.hthree")]
    Hthree(Hthree),
    #[serde(rename = "community.lexicon.location.fsq")]
    Fsq(Fsq),
}

/// Decimal coordinates, kept as strings on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub latitude: String,
    pub longitude: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hthree {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Foursquare place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fsq {
    pub fsq_place_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    pub fn nsid(&self) -> &'static str {
        match self {
            Location::Geo(_) => super::LOCATION_GEO_NSID,
            Location::Address(_) => super::LOCATION_ADDRESS_NSID,
            Location::Hthree(_) => super::LOCATION_HTHREE_NSID,
            Location::Fsq(_) => super::LOCATION_FSQ_NSID,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Location::Geo(g) => g.name.as_deref(),
            Location::Address(a) => a.name.as_deref(),
            Location::Hthree(h) => h.name.as_deref(),
            Location::Fsq(f) => f.name.as_deref(),
        }
    }

    /// Check field constraints the type system does not carry.
    /// Errors are recorded under `prefix.<field>`.
    pub fn validate(&self, prefix: &str, errors: &mut ValidationErrors) {
        let path = |field: &str| format!("{prefix}.{field}");
        match self {
            Location::Geo(g) => {
                check_coordinate(&g.latitude, 90.0, &path("latitude"), errors);
                check_coordinate(&g.longitude, 180.0, &path("longitude"), errors);
                if let Some(alt) = &g.altitude {
                    if alt.trim().parse::<f64>().map(|v| !v.is_finite()).unwrap_or(true) {
                        errors.push(path("altitude"), "must be a decimal number");
                    }
                }
            }
            Location::Address(a) => {
                let len = a.country.trim().chars().count();
                if !(2..=10).contains(&len) {
                    errors.push(path("country"), "must be 2 to 10 characters");
                }
            }
            Location::Hthree(h) => {
                let v = h.value.trim();
                if v.len() != H3_INDEX_LEN || !v.chars().all(|c| c.is_ascii_hexdigit()) {
                    errors.push(path("value"), "must be a 15 digit hexadecimal H3 index");
                }
            }
            Location::Fsq(f) => {
                if f.fsq_place_id.trim().is_empty() {
                    errors.push(path("fsq_place_id"), "must not be empty");
                }
                if let Some(lat) = &f.latitude {
                    check_coordinate(lat, 90.0, &path("latitude"), errors);
                }
                if let Some(lon) = &f.longitude {
                    check_coordinate(lon, 180.0, &path("longitude"), errors);
                }
            }
        }
    }
}

fn check_coordinate(raw: &str, bound: f64, path: &str, errors: &mut ValidationErrors) {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= bound => {}
        Ok(_) => errors.push(path, format!("must be within ±{bound}")),
        Err(_) => errors.push(path, "must be a decimal number"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn errors_for(loc: &Location) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        loc.validate("location", &mut errors);
        errors
    }

    #[test]
    fn tagged_by_type() {
        let loc: Location = serde_json::from_value(json!({
            "$type": "community.lexicon.location.hthree",
            "name": "Cool Location Avenue",
            "value": "8549b11bfffffff"
        }))
        .unwrap();
        assert_eq!(loc.nsid(), "community.lexicon.location.hthree");
        assert_eq!(loc.name(), Some("Cool Location Avenue"));
        assert!(errors_for(&loc).is_empty());

        let back = serde_json::to_value(&loc).unwrap();
        assert_eq!(back["$type"], "community.lexicon.location.hthree");
    }

    #[test]
    fn unknown_type_rejected() {
        let r: Result<Location, _> = serde_json::from_value(json!({
            "$type": "community.lexicon.location.plus_code", "code": "849VCWC8+R9"
        }));
        assert!(r.is_err());
    }

    #[test]
    fn geo_ranges() {
        let loc = Location::Geo(Geo {
            latitude: "91.0".into(),
            longitude: "east".into(),
            altitude: None,
            name: None,
        });
        let errors = errors_for(&loc);
        assert!(errors.has_path("location.latitude"));
        assert!(errors.has_path("location.longitude"));

        let ok = Location::Geo(Geo {
            latitude: "52.5200".into(),
            longitude: "-13.4050".into(),
            altitude: Some("34".into()),
            name: Some("Berlin".into()),
        });
        assert!(errors_for(&ok).is_empty());
    }

    #[test]
    fn address_country_length() {
        let loc: Location = serde_json::from_value(json!({
            "$type": "community.lexicon.location.address",
            "country": "U",
            "postalCode": "94110"
        }))
        .unwrap();
        assert!(errors_for(&loc).has_path("location.country"));
    }

    #[test]
    fn hthree_must_be_hex() {
        let loc = Location::Hthree(Hthree { value: "not-an-h3-index".into(), name: None });
        assert!(errors_for(&loc).has_path("location.value"));
    }

    #[test]
    fn fsq_optional_coordinates_checked() {
        let loc = Location::Fsq(Fsq {
            fsq_place_id: "fsqid_123".into(),
            latitude: Some("1337".into()),
            longitude: None,
            name: Some("Venue".into()),
        });
        let errors = errors_for(&loc);
        assert!(errors.has_path("location.latitude"));
        assert!(!errors.has_path("location.fsq_place_id"));
    }
}
