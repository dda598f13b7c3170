use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const MAPBOX_PLACES_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places/";
const SUBURB_CONTEXT_PREFIXES: [&str; 4] = ["locality.", "place.", "neighborhood.", "district."];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeocodeError {
    #[error("Please enter an address")]
    EmptyQuery,
    #[error("Geocoding is not configured")]
    NotConfigured,
    #[error("No results found")]
    NotFound,
    #[error("Geocoding request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeMatch {
    pub lat: f64,
    pub lng: f64,
    pub place_name: String,
    pub suburb: Option<String>,
    /// "<house number> <street>" where available
    pub canonical_address: String,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<GeocodeMatch, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct MapboxResponse {
    #[serde(default)]
    features: Vec<MapboxFeature>,
}

#[derive(Debug, Deserialize)]
struct MapboxFeature {
    #[serde(default)]
    center: Vec<f64>,
    #[serde(default)]
    place_name: Option<String>,
    #[serde(default)]
    text: Option<String>,
    /// House number
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    context: Vec<MapboxContext>,
}

#[derive(Debug, Deserialize)]
struct MapboxContext {
    #[serde(default)]
    id: String,
    #[serde(default)]
    text: Option<String>,
}

/// Picks the best match out of a Mapbox places response body.
pub fn parse_mapbox_response(query: &str, body: &str) -> Result<GeocodeMatch, GeocodeError> {
    let response: MapboxResponse =
        serde_json::from_str(body).map_err(|e| GeocodeError::Request(e.to_string()))?;
    let feature = response
        .features
        .into_iter()
        .next()
        .ok_or(GeocodeError::NotFound)?;

    let (lng, lat) = match feature.center.as_slice() {
        [lng, lat, ..] => (*lng, *lat),
        _ => return Err(GeocodeError::NotFound),
    };
    let place_name = feature.place_name.unwrap_or_default();

    let suburb = feature
        .context
        .iter()
        .find(|c| SUBURB_CONTEXT_PREFIXES.iter().any(|p| c.id.starts_with(p)))
        .and_then(|c| c.text.clone())
        .or_else(|| feature.text.clone());

    let canonical_address = match (&feature.address, &feature.text) {
        (Some(number), Some(street)) if !number.is_empty() && !street.is_empty() => {
            format!("{} {}", number, street)
        }
        _ if !place_name.is_empty() => place_name
            .split(',')
            .next()
            .unwrap_or(&place_name)
            .to_string(),
        _ => query.to_string(),
    };

    Ok(GeocodeMatch {
        lat,
        lng,
        place_name,
        suburb,
        canonical_address,
    })
}

pub struct MapboxGeocoder {
    client: reqwest::Client,
    token: Option<String>,
    country: String,
    base_url: String,
}

impl MapboxGeocoder {
    pub fn new(token: Option<String>, country: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            token,
            country: country.into(),
            base_url: MAPBOX_PLACES_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn usable_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != "test")
    }

    pub fn request_url(&self, query: &str, token: &str) -> String {
        format!(
            "{}{}.json?access_token={}&limit=1&country={}",
            self.base_url,
            urlencoding::encode(query),
            urlencoding::encode(token),
            self.country
        )
    }
}

#[async_trait]
impl Geocoder for MapboxGeocoder {
    async fn lookup(&self, query: &str) -> Result<GeocodeMatch, GeocodeError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(GeocodeError::EmptyQuery);
        }
        let token = self.usable_token().ok_or(GeocodeError::NotConfigured)?;

        info!("Geocoding address — query={}", query);
        let response = self
            .client
            .get(self.request_url(query, token))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GeocodeError::Request(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| GeocodeError::Request(e.to_string()))?;

        let found = parse_mapbox_response(query, &body)?;
        debug!(
            "Geocode match — query={} lat={} lng={} suburb={:?}",
            query, found.lat, found.lng, found.suburb
        );
        Ok(found)
    }
}
