//! OpenStreetMap Nominatim search and conversion to marker locations.

use std::time::Duration;

use axum::{
    Json,
    extract::{Query, State},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::WebState;
use crate::config::NominatimConfig;
use crate::error::AppError;
use crate::lexicon::Location;
use crate::lexicon::location::{Address, Geo};

/// The parts of a Nominatim result used for conversion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NominatimPlace {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: NominatimAddress,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NominatimAddress {
    pub house_number: Option<String>,
    pub road: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

/// A search result and the marker location derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub result: Value,
    pub location: Location,
}

/// Postal address when country code, road and postcode are all known,
/// plain coordinates otherwise.
pub fn to_location(place: &NominatimPlace) -> Location {
    extract_address(place).map(Location::Address).unwrap_or_else(|| Location::Geo(extract_geo(place)))
}

fn extract_geo(place: &NominatimPlace) -> Geo {
    Geo {
        latitude: place.lat.clone(),
        longitude: place.lon.clone(),
        altitude: None,
        name: place.display_name.clone(),
    }
}

fn extract_address(place: &NominatimPlace) -> Option<Address> {
    let a = &place.address;
    // The full country name does not fit the lexicon's country field.
    let country = non_empty(&a.country_code)?.to_uppercase();
    let road = non_empty(&a.road)?;
    let postcode = non_empty(&a.postcode)?;

    let street = match non_empty(&a.house_number) {
        Some(number) => format!("{number} {road}"),
        None => road.to_string(),
    };
    Some(Address {
        country,
        postal_code: Some(postcode.to_string()),
        region: a.state.clone(),
        locality: [&a.city, &a.county, &a.suburb].into_iter().find_map(|v| non_empty(v)).map(str::to_string),
        street: Some(street.trim().to_string()),
        name: place.display_name.clone(),
    })
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct NominatimClient {
    http: Client,
    base_url: String,
    limit: u32,
}

impl NominatimClient {
    pub fn new(config: &NominatimConfig, timeout_seconds: u64) -> Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Xrpc(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limit: config.limit,
        })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, AppError> {
        let limit = self.limit.to_string();
        let resp = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json"), ("addressdetails", "1"), ("limit", limit.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Xrpc(format!("nominatim search returned {}", resp.status())));
        }
        let results: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| AppError::Xrpc(format!("malformed nominatim response: {e}")))?;
        debug!(%query, count = results.len(), "nominatim search");
        Ok(results.into_iter().filter_map(into_hit).collect())
    }
}

/// Results without coordinates are dropped.
fn into_hit(result: Value) -> Option<SearchHit> {
    let place: NominatimPlace = serde_json::from_value(result.clone()).ok()?;
    Some(SearchHit { location: to_location(&place), result })
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// `GET /api/locations/search?q=`
pub async fn search(
    State(state): State<WebState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(state.nominatim.search(q).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn place(address: Value) -> NominatimPlace {
        serde_json::from_value(json!({
            "lat": "40.7484",
            "lon": "-73.9857",
            "display_name": "Empire State Building",
            "address": address,
        }))
        .unwrap()
    }

    #[test]
    fn full_address_preferred() {
        let loc = to_location(&place(json!({
            "house_number": "350",
            "road": "5th Avenue",
            "suburb": "Manhattan",
            "county": "New York County",
            "state": "New York",
            "postcode": "10118",
            "country": "United States",
            "country_code": "us"
        })));
        let Location::Address(a) = loc else { panic!("expected address") };
        assert_eq!(a.country, "US");
        assert_eq!(a.street.as_deref(), Some("350 5th Avenue"));
        assert_eq!(a.locality.as_deref(), Some("New York County"));
        assert_eq!(a.region.as_deref(), Some("New York"));
        assert_eq!(a.postal_code.as_deref(), Some("10118"));
    }

    #[test]
    fn street_without_house_number() {
        let loc = to_location(&place(json!({
            "road": "Main Street", "city": "Springfield", "postcode": "12345", "country_code": "us"
        })));
        let Location::Address(a) = loc else { panic!("expected address") };
        assert_eq!(a.street.as_deref(), Some("Main Street"));
        assert_eq!(a.locality.as_deref(), Some("Springfield"));
    }

    #[test]
    fn falls_back_to_geo() {
        let loc = to_location(&place(json!({ "road": "Main Street", "country_code": "us" })));
        let Location::Geo(g) = loc else { panic!("expected geo") };
        assert_eq!(g.latitude, "40.7484");
        assert_eq!(g.name.as_deref(), Some("Empire State Building"));
    }

    #[test]
    fn country_name_without_code_falls_back_to_geo() {
        let loc = to_location(&place(json!({
            "house_number": "350",
            "road": "5th Avenue",
            "postcode": "10118",
            "country": "United States"
        })));
        let Location::Geo(g) = loc else { panic!("expected geo") };
        assert_eq!(g.longitude, "-73.9857");
        let mut errors = crate::lexicon::ValidationErrors::default();
        Location::Geo(g).validate("location", &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn hits_without_coordinates_dropped() {
        assert!(into_hit(json!({ "display_name": "nowhere" })).is_none());
        assert!(into_hit(json!({ "lat": "1", "lon": "2" })).is_some());
    }
}
