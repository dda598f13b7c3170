//! Point-set query service: approved displays for a season, optionally only
//! the ones lit right now.

use crate::place::{deserialize_id, strip_house_number, Feature, FeatureCollection, PlaceProperties};
use crate::season::Season;
use crate::LoadError;
use async_trait::async_trait;
use chrono::{NaiveTime, Timelike};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

#[async_trait]
pub trait PlaceQuery: Send + Sync {
    async fn fetch(&self, season: Season, open_now: bool) -> Result<FeatureCollection, LoadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// A submitted display as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    pub lat: f64,
    pub lng: f64,
    /// "HH:MM"
    #[serde(default)]
    pub open_start: Option<String>,
    #[serde(default)]
    pub open_end: Option<String>,
    pub season: Season,
    #[serde(default)]
    pub status: ModerationStatus,
    #[serde(default)]
    pub hide_number: bool,
}

/// Minutes since midnight for an "HH:MM" string.
pub fn parse_clock_minutes(value: &str) -> Option<u32> {
    let (h, m) = value.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.get(..2).unwrap_or(m).parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

impl PlaceRecord {
    /// Inclusive window check. Records without both ends of a window are never lit,
    /// and windows do not wrap past midnight.
    pub fn is_lit_at(&self, now: NaiveTime) -> bool {
        let (Some(start), Some(end)) = (self.open_start.as_deref(), self.open_end.as_deref()) else {
            return false;
        };
        let (Some(start), Some(end)) = (parse_clock_minutes(start), parse_clock_minutes(end)) else {
            return false;
        };
        let minutes = now.hour() * 60 + now.minute();
        minutes >= start && minutes <= end
    }

    pub fn to_feature(&self, votes: u64) -> Feature {
        Feature::new(
            PlaceProperties {
                id: self.id.clone(),
                title: Some(self.title.clone()),
                description: self.description.clone(),
                suburb: self.suburb.clone(),
                votes,
                hide_number: self.hide_number,
                rank: None,
            },
            self.lat,
            self.lng,
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("Place not found")]
    NotFound,
    #[error("Failed to load place: {0}")]
    Request(String),
}

/// A single approved display as shown on its share page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceDetail {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    pub season: Season,
    #[serde(default)]
    pub open_start: Option<String>,
    #[serde(default)]
    pub open_end: Option<String>,
    #[serde(default)]
    pub hide_number: bool,
    #[serde(default)]
    pub votes: u64,
}

impl PlaceDetail {
    pub fn display_address(&self) -> String {
        if self.hide_number {
            strip_house_number(&self.address)
        } else {
            self.address.trim().to_string()
        }
    }

    /// "18:30 – 22:00" when both ends are known.
    pub fn hours_label(&self) -> Option<String> {
        let start = self.open_start.as_deref()?;
        let end = self.open_end.as_deref()?;
        let short = |t: &str| t.get(..5).unwrap_or(t).to_string();
        Some(format!("{} – {}", short(start), short(end)))
    }
}

/// Ids that can never name a stored place.
pub fn is_usable_place_id(id: &str) -> bool {
    let id = id.trim();
    !id.is_empty() && id != "undefined"
}

#[async_trait]
pub trait PlaceLookup: Send + Sync {
    async fn place(&self, id: &str) -> Result<PlaceDetail, LookupError>;
}

type Clock = Box<dyn Fn() -> NaiveTime + Send + Sync>;

/// In-process query service over a fixed set of records.
pub struct MemoryPlaceQuery {
    places: Vec<PlaceRecord>,
    votes: HashMap<String, u64>,
    clock: Clock,
    latency: Option<Duration>,
    fetches: AtomicUsize,
}

impl MemoryPlaceQuery {
    pub fn new(places: Vec<PlaceRecord>) -> Self {
        Self {
            places,
            votes: HashMap::new(),
            clock: Box::new(|| chrono::Local::now().time()),
            latency: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_votes(mut self, votes: HashMap<String, u64>) -> Self {
        self.votes = votes;
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveTime + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Simulated network delay before each response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaceQuery for MemoryPlaceQuery {
    async fn fetch(&self, season: Season, open_now: bool) -> Result<FeatureCollection, LoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let now = (self.clock)();
        let features: Vec<Feature> = self
            .places
            .iter()
            .filter(|p| p.status == ModerationStatus::Approved && p.season == season)
            .filter(|p| !open_now || p.is_lit_at(now))
            .map(|p| p.to_feature(self.votes.get(&p.id).copied().unwrap_or(0)))
            .collect();

        debug!(
            "Memory place query — season={} open_now={} features={}",
            season,
            open_now,
            features.len()
        );
        Ok(FeatureCollection::new(features))
    }
}

#[async_trait]
impl PlaceLookup for MemoryPlaceQuery {
    async fn place(&self, id: &str) -> Result<PlaceDetail, LookupError> {
        if !is_usable_place_id(id) {
            return Err(LookupError::NotFound);
        }
        let id = id.trim();
        let record = self
            .places
            .iter()
            .find(|p| p.id == id && p.status == ModerationStatus::Approved)
            .ok_or(LookupError::NotFound)?;
        Ok(PlaceDetail {
            id: record.id.clone(),
            address: record.title.clone(),
            description: record.description.clone(),
            suburb: record.suburb.clone(),
            season: record.season,
            open_start: record.open_start.clone(),
            open_end: record.open_end.clone(),
            hide_number: record.hide_number,
            votes: self.votes.get(&record.id).copied().unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, status: ModerationStatus, season: Season, window: Option<(&str, &str)>) -> PlaceRecord {
        PlaceRecord {
            id: id.to_string(),
            title: format!("{} Reindeer Rd", id),
            description: None,
            suburb: Some("Robina".to_string()),
            lat: -28.07,
            lng: 153.38,
            open_start: window.map(|w| w.0.to_string()),
            open_end: window.map(|w| w.1.to_string()),
            season,
            status,
            hide_number: false,
        }
    }

    #[test]
    fn test_parse_clock_minutes() {
        assert_eq!(parse_clock_minutes("18:30"), Some(1110));
        assert_eq!(parse_clock_minutes("00:00"), Some(0));
        assert_eq!(parse_clock_minutes("18:30:00"), Some(1110));
        assert_eq!(parse_clock_minutes("25:00"), None);
        assert_eq!(parse_clock_minutes("dusk"), None);
    }

    #[test]
    fn test_window_is_inclusive() {
        let p = record("1", ModerationStatus::Approved, Season::Christmas, Some(("18:00", "22:00")));
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert!(p.is_lit_at(at(18, 0)));
        assert!(p.is_lit_at(at(22, 0)));
        assert!(!p.is_lit_at(at(22, 1)));
        assert!(!p.is_lit_at(at(17, 59)));

        let unscheduled = record("2", ModerationStatus::Approved, Season::Christmas, None);
        assert!(!unscheduled.is_lit_at(at(19, 0)));
    }

    #[tokio::test]
    async fn test_only_approved_in_season() {
        let query = MemoryPlaceQuery::new(vec![
            record("1", ModerationStatus::Approved, Season::Christmas, None),
            record("2", ModerationStatus::Pending, Season::Christmas, None),
            record("3", ModerationStatus::Rejected, Season::Christmas, None),
            record("4", ModerationStatus::Approved, Season::Halloween, None),
        ]);
        let fc = query.fetch(Season::Christmas, false).await.unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.features[0].id(), "1");
        assert_eq!(query.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_place_lookup_hides_unapproved() {
        let query = MemoryPlaceQuery::new(vec![
            record("1", ModerationStatus::Approved, Season::Christmas, Some(("18:30:00", "22:00:00"))),
            record("2", ModerationStatus::Pending, Season::Christmas, None),
        ])
        .with_votes(HashMap::from([("1".to_string(), 4)]));

        let detail = query.place(" 1 ").await.unwrap();
        assert_eq!(detail.address, "1 Reindeer Rd");
        assert_eq!(detail.votes, 4);
        assert_eq!(detail.hours_label().as_deref(), Some("18:30 – 22:00"));

        assert_eq!(query.place("2").await, Err(LookupError::NotFound));
        assert_eq!(query.place("99").await, Err(LookupError::NotFound));
        assert_eq!(query.place("").await, Err(LookupError::NotFound));
        assert_eq!(query.place("undefined").await, Err(LookupError::NotFound));
    }

    #[test]
    fn test_place_detail_hides_number() {
        let detail: PlaceDetail = serde_json::from_str(
            r#"{"id":7,"address":"12 Holly Ct, Robina","season":"christmas","hide_number":true}"#,
        )
        .unwrap();
        assert_eq!(detail.id, "7");
        assert_eq!(detail.display_address(), strip_house_number("12 Holly Ct, Robina"));
        assert_eq!(detail.votes, 0);
        assert_eq!(detail.hours_label(), None);
    }

    #[tokio::test]
    async fn test_open_now_uses_clock() {
        let query = MemoryPlaceQuery::new(vec![
            record("early", ModerationStatus::Approved, Season::Christmas, Some(("17:00", "19:00"))),
            record("late", ModerationStatus::Approved, Season::Christmas, Some(("20:00", "23:00"))),
        ])
        .with_clock(|| NaiveTime::from_hms_opt(21, 15, 0).unwrap());

        let lit = query.fetch(Season::Christmas, true).await.unwrap();
        assert_eq!(lit.len(), 1);
        assert_eq!(lit.features[0].id(), "late");
    }
}
