//! GeoJSON point-set payload as served by the places endpoint.

use crate::itinerary::ItineraryEntry;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::OnceLock;

pub const TOP_TEN: u32 = 10;
pub const UNTITLED: &str = "Untitled";
pub const DEFAULT_MARKER: &str = "christmas-bauble";

static HOUSE_NUMBER: OnceLock<Option<Regex>> = OnceLock::new();

/// Drops a leading house number ("12 Jingle Street" -> "Jingle Street").
pub fn strip_house_number(address: &str) -> String {
    let re = HOUSE_NUMBER.get_or_init(|| Regex::new(r"^\s*\d+\s+").ok());
    match re {
        Some(re) => re.replace(address, "").into_owned(),
        None => address.to_string(),
    }
}

/// Place ids arrive as either JSON numbers or strings depending on the backend.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "unsupported place id: {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceProperties {
    #[serde(deserialize_with = "deserialize_id", default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub votes: u64,
    #[serde(default)]
    pub hide_number: bool,
    /// 1..=10 for the current top ten, absent otherwise
    #[serde(default)]
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type", default = "point_kind")]
    pub kind: String,
    /// `[lng, lat]`, GeoJSON order
    pub coordinates: [f64; 2],
}

fn point_kind() -> String {
    "Point".to_string()
}

fn feature_kind() -> String {
    "Feature".to_string()
}

fn collection_kind() -> String {
    "FeatureCollection".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_kind")]
    pub kind: String,
    pub geometry: PointGeometry,
    pub properties: PlaceProperties,
}

impl Feature {
    pub fn new(properties: PlaceProperties, lat: f64, lng: f64) -> Self {
        Self {
            kind: feature_kind(),
            geometry: PointGeometry {
                kind: point_kind(),
                coordinates: [lng, lat],
            },
            properties,
        }
    }

    pub fn id(&self) -> &str {
        &self.properties.id
    }

    pub fn lat(&self) -> f64 {
        self.geometry.coordinates[1]
    }

    pub fn lng(&self) -> f64 {
        self.geometry.coordinates[0]
    }

    pub fn raw_title(&self) -> &str {
        self.properties.title.as_deref().unwrap_or(UNTITLED)
    }

    /// Title shown to visitors, honoring the submitter's "hide house number" choice.
    pub fn display_title(&self) -> String {
        if self.properties.hide_number {
            strip_house_number(self.raw_title())
        } else {
            self.raw_title().to_string()
        }
    }

    /// Rank if it sits inside the top ten, ignoring stray out-of-range values.
    pub fn top_rank(&self) -> Option<u32> {
        self.properties.rank.filter(|r| (1..=TOP_TEN).contains(r))
    }

    pub fn is_top_ten(&self) -> bool {
        self.top_rank().is_some()
    }

    /// Map icon name: numbered marker for the top ten, bauble for everything else.
    pub fn marker_icon(&self) -> String {
        match self.top_rank() {
            Some(rank) => format!("christmas-marker-{}", rank),
            None => DEFAULT_MARKER.to_string(),
        }
    }

    pub fn rank_badge(&self, region_label: &str) -> Option<String> {
        self.top_rank()
            .map(|rank| format!("#{} in {}", rank, region_label))
    }

    pub fn to_itinerary_entry(&self) -> ItineraryEntry {
        ItineraryEntry {
            id: self.properties.id.clone(),
            address: self.display_title(),
            suburb: self.properties.suburb.clone(),
            lat: self.lat(),
            lng: self.lng(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "collection_kind")]
    pub kind: String,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: collection_kind(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id() == id)
    }

    /// Ranked features ordered 1..=10.
    pub fn top_ten(&self) -> Vec<Feature> {
        let mut ranked: Vec<Feature> = self
            .features
            .iter()
            .filter(|f| f.is_top_ten())
            .cloned()
            .collect();
        ranked.sort_by_key(|f| f.top_rank());
        ranked
    }

    /// Same collection restricted to ranked features, keeping payload order.
    pub fn top_ten_subset(&self) -> FeatureCollection {
        FeatureCollection::new(
            self.features
                .iter()
                .filter(|f| f.is_top_ten())
                .cloned()
                .collect(),
        )
    }
}
