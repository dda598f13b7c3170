pub mod cache;
pub mod config;
pub mod controller;
pub mod filter;
pub mod geocode;
pub mod itinerary;
pub mod leaderboard;
pub mod place;
pub mod query;
pub mod ranking;
pub mod remote;
pub mod route;
pub mod season;
pub mod session;
pub mod storage;
pub mod submit;
pub mod vote;

use std::path::PathBuf;
use thiserror::Error;

pub use cache::{FeatureCache, MemoryFeatureCache, PlaceLoader, QuerySignature};
pub use config::Config;
pub use controller::{MapController, PopupSession};
pub use filter::FilterMode;
pub use itinerary::{ItineraryEntry, ItineraryStore};
pub use place::{Feature, FeatureCollection, PlaceProperties};
pub use query::{LookupError, PlaceDetail, PlaceLookup};
pub use route::build_route_url;
pub use season::Season;
pub use submit::{Submission, SubmitError, SubmitFlow};
pub use vote::{VoteError, VoteOutcome, VoteSync};

/// Failure of a point-set fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Failed to load places: {0}")]
    Request(String),
    #[error("Malformed places payload: {0}")]
    Malformed(String),
}

/// Returns the directory holding `config.json` and the persisted run.
pub fn get_config_root() -> PathBuf {
    directories::ProjectDirs::from("org", "lightrun", "LightRun")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".lightrun"))
}
