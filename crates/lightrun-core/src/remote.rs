//! HTTP adapters for the hosted backend: the web app's API routes and the
//! PostgREST vote tables.

use crate::leaderboard::LeaderboardRow;
use crate::place::FeatureCollection;
use crate::place::deserialize_id;
use crate::query::{is_usable_place_id, LookupError, PlaceDetail, PlaceLookup, PlaceQuery};
use crate::season::Season;
use crate::session::Visitor;
use crate::submit::{SubmitClient, SubmitError, SubmitPayload};
use crate::vote::{InsertOutcome, VoteStore, VoteStoreError};
use crate::LoadError;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const UNIQUE_VIOLATION: &str = "23505";

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

fn join(base: &Url, path: &str) -> Result<Url, String> {
    base.join(path).map_err(|e| format!("invalid URL {}{}: {}", base, path, e))
}

/// Places and leaderboard endpoints of the web app.
pub struct PlacesApi {
    client: reqwest::Client,
    base: Url,
}

impl PlacesApi {
    pub fn new(base_url: &str) -> Result<Self, LoadError> {
        let base = Url::parse(base_url).map_err(|e| LoadError::Request(e.to_string()))?;
        Ok(Self {
            client: build_client(),
            base,
        })
    }

    pub fn places_url(&self, season: Season, open_now: bool) -> Result<Url, LoadError> {
        let mut url = join(&self.base, "api/places").map_err(LoadError::Request)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("season", season.as_str());
            if open_now {
                pairs.append_pair("openNow", "true");
            }
        }
        Ok(url)
    }

    pub fn place_url(&self, id: &str) -> Result<Url, String> {
        join(&self.base, &format!("api/place/{}", urlencoding::encode(id)))
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardRow>, LoadError> {
        let url = join(&self.base, "api/leaderboard").map_err(LoadError::Request)?;
        info!("Fetching leaderboard — url={}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LoadError::Request(e.to_string()))?;
        response
            .json::<Vec<LeaderboardRow>>()
            .await
            .map_err(|e| LoadError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct SubmittedPlace {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    place: Option<SubmittedPlace>,
    #[serde(default)]
    error: Option<String>,
}

/// Reads the submit endpoint's `{ok, place}` / `{error}` body.
pub fn parse_submit_response(status: StatusCode, body: &str) -> Result<String, SubmitError> {
    let parsed = serde_json::from_str::<SubmitResponse>(body).ok();
    if !status.is_success() {
        let message = parsed
            .and_then(|r| r.error)
            .unwrap_or_else(|| format!("{} {}", status, body.trim()));
        return Err(SubmitError::Rejected(message));
    }
    parsed
        .and_then(|r| r.place)
        .map(|p| p.id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SubmitError::Request(format!("unexpected response: {}", body.trim())))
}

#[async_trait]
impl SubmitClient for PlacesApi {
    async fn submit(&self, payload: &SubmitPayload) -> Result<String, SubmitError> {
        let url = join(&self.base, "api/submit").map_err(SubmitError::Request)?;
        info!("POST submission — url={} address={}", url, payload.address);
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| SubmitError::Request(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        parse_submit_response(status, &body)
    }
}

#[async_trait]
impl PlaceLookup for PlacesApi {
    async fn place(&self, id: &str) -> Result<PlaceDetail, LookupError> {
        if !is_usable_place_id(id) {
            return Err(LookupError::NotFound);
        }
        let url = self.place_url(id.trim()).map_err(LookupError::Request)?;
        debug!("GET place — url={}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!("Place not found — id={}", id);
            return Err(LookupError::NotFound);
        }
        response
            .error_for_status()
            .map_err(|e| LookupError::Request(e.to_string()))?
            .json::<PlaceDetail>()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))
    }
}

#[async_trait]
impl PlaceQuery for PlacesApi {
    async fn fetch(&self, season: Season, open_now: bool) -> Result<FeatureCollection, LoadError> {
        let url = self.places_url(season, open_now)?;
        debug!("GET places — url={}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LoadError::Request(e.to_string()))?;
        response
            .json::<FeatureCollection>()
            .await
            .map_err(|e| LoadError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct VoteRow<'a> {
    user_id: &'a str,
    place_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    #[serde(default)]
    votes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
}

/// Vote store backed by the `votes` table and `vote_counts` view.
pub struct RestVoteStore {
    client: reqwest::Client,
    rest_base: Url,
    anon_key: String,
}

impl RestVoteStore {
    pub fn new(project_url: &str, anon_key: impl Into<String>) -> Result<Self, VoteStoreError> {
        let base = Url::parse(project_url).map_err(|e| VoteStoreError::Request(e.to_string()))?;
        let rest_base = join(&base, "rest/v1/").map_err(VoteStoreError::Request)?;
        Ok(Self {
            client: build_client(),
            rest_base,
            anon_key: anon_key.into(),
        })
    }

    pub fn table_url(&self, table: &str, filters: &[(&str, String)]) -> Result<Url, VoteStoreError> {
        let mut url = join(&self.rest_base, table).map_err(VoteStoreError::Request)?;
        if !filters.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (column, value) in filters {
                pairs.append_pair(column, value);
            }
        }
        Ok(url)
    }

    fn vote_filters(visitor: &Visitor, place_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("user_id", format!("eq.{}", visitor.id)),
            ("place_id", format!("eq.{}", place_id)),
        ]
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: Url,
        visitor: Option<&Visitor>,
    ) -> reqwest::RequestBuilder {
        let bearer = visitor
            .and_then(|v| v.access_token.as_deref())
            .unwrap_or(self.anon_key.as_str());
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }
}

fn transport(e: reqwest::Error) -> VoteStoreError {
    VoteStoreError::Request(e.to_string())
}

#[async_trait]
impl VoteStore for RestVoteStore {
    async fn has_voted(&self, visitor: &Visitor, place_id: &str) -> Result<bool, VoteStoreError> {
        let mut filters = Self::vote_filters(visitor, place_id);
        filters.insert(0, ("select", "id".to_string()));
        let url = self.table_url("votes", &filters)?;

        let rows: Vec<serde_json::Value> = self
            .request(reqwest::Method::GET, url, Some(visitor))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;
        Ok(!rows.is_empty())
    }

    async fn insert(&self, visitor: &Visitor, place_id: &str) -> Result<InsertOutcome, VoteStoreError> {
        let url = self.table_url("votes", &[])?;
        let response = self
            .request(reqwest::Method::POST, url, Some(visitor))
            .header("Prefer", "return=minimal")
            .json(&VoteRow {
                user_id: &visitor.id,
                place_id,
            })
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(InsertOutcome::Inserted);
        }
        let body = response.text().await.unwrap_or_default();
        classify_insert_failure(status, &body)
    }

    async fn delete(&self, visitor: &Visitor, place_id: &str) -> Result<(), VoteStoreError> {
        let url = self.table_url("votes", &Self::vote_filters(visitor, place_id))?;
        self.request(reqwest::Method::DELETE, url, Some(visitor))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transport)?;
        Ok(())
    }

    async fn count(&self, place_id: &str) -> Result<u64, VoteStoreError> {
        let url = self.table_url(
            "vote_counts",
            &[
                ("select", "votes".to_string()),
                ("place_id", format!("eq.{}", place_id)),
            ],
        )?;
        let rows: Vec<CountRow> = self
            .request(reqwest::Method::GET, url, None)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;
        Ok(rows.first().and_then(|r| r.votes).unwrap_or(0))
    }
}

/// A conflict on the (user, place) key means the vote is already there.
pub fn classify_insert_failure(status: StatusCode, body: &str) -> Result<InsertOutcome, VoteStoreError> {
    let code = serde_json::from_str::<PostgrestError>(body)
        .ok()
        .and_then(|e| e.code);
    if status == StatusCode::CONFLICT || code.as_deref() == Some(UNIQUE_VIOLATION) {
        return Ok(InsertOutcome::AlreadyExists);
    }
    Err(VoteStoreError::Rejected(format!("{} {}", status, body)))
}
