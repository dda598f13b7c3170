// SPDX-License-Identifier: MIT
// Copyright (c) 2026 LightRun contributors

//! "Add a display" submissions.
//!
//! A submission is validated locally, geocoded when it arrives without
//! coordinates, and posted to the submit endpoint. The backend stores it as
//! `pending` under the current season until a moderator approves it.

use crate::geocode::{GeocodeError, Geocoder};
use crate::query::{parse_clock_minutes, ModerationStatus, PlaceRecord};
use crate::season::Season;
use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    #[error("Address is required")]
    MissingAddress,
    #[error("Contact name and email are required")]
    MissingContact,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Times must look like HH:MM: {0}")]
    InvalidTime(String),
    #[error(transparent)]
    Lookup(#[from] GeocodeError),
    #[error("A submission is already in progress")]
    Busy,
    #[error("{0}")]
    Rejected(String),
    #[error("Failed to save: {0}")]
    Request(String),
}

/// What the visitor typed into the form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub address: String,
    pub description: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub suburb: Option<String>,
    /// "HH:MM"
    pub open_start: Option<String>,
    pub open_end: Option<String>,
    pub hide_number: bool,
    pub is_owner: bool,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// One `@`, something before it, and a dotted domain after it.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .map(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
            .unwrap_or(false)
}

/// "18:30" becomes "18:30:00"; blank means no time; full "HH:MM:SS" is kept.
pub fn to_storage_time(value: &Option<String>) -> Result<Option<String>, SubmitError> {
    let Some(raw) = non_blank(value) else {
        return Ok(None);
    };
    if parse_clock_minutes(&raw).is_none() {
        return Err(SubmitError::InvalidTime(raw));
    }
    match raw.len() {
        5 => Ok(Some(format!("{}:00", raw))),
        8 => Ok(Some(raw)),
        _ => Err(SubmitError::InvalidTime(raw)),
    }
}

impl Submission {
    pub fn validate(&self) -> Result<(), SubmitError> {
        if self.address.trim().is_empty() {
            return Err(SubmitError::MissingAddress);
        }
        if self.contact_name.trim().is_empty() || self.contact_email.trim().is_empty() {
            return Err(SubmitError::MissingContact);
        }
        if !is_plausible_email(&self.contact_email) {
            return Err(SubmitError::InvalidEmail);
        }
        to_storage_time(&self.open_start)?;
        to_storage_time(&self.open_end)?;
        Ok(())
    }

    pub fn has_coordinates(&self) -> bool {
        matches!((self.lat, self.lng), (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite())
    }

    /// Request body for the submit endpoint.
    pub fn to_payload(&self, season: Season) -> Result<SubmitPayload, SubmitError> {
        self.validate()?;
        Ok(SubmitPayload {
            address: self.address.trim().to_string(),
            description: non_blank(&self.description),
            lat: self.lat,
            lng: self.lng,
            suburb: non_blank(&self.suburb),
            open_start: to_storage_time(&self.open_start)?,
            open_end: to_storage_time(&self.open_end)?,
            hide_number: self.hide_number,
            is_owner: self.is_owner,
            contact_name: self.contact_name.trim().to_string(),
            contact_email: self.contact_email.trim().to_string(),
            contact_phone: non_blank(&self.contact_phone),
            season,
            status: ModerationStatus::Pending,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitPayload {
    pub address: String,
    pub description: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub suburb: Option<String>,
    /// "HH:MM:00"
    pub open_start: Option<String>,
    pub open_end: Option<String>,
    pub hide_number: bool,
    pub is_owner: bool,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub season: Season,
    pub status: ModerationStatus,
}

impl SubmitPayload {
    /// The stored row; the address doubles as the title.
    pub fn to_record(&self, id: impl Into<String>) -> PlaceRecord {
        PlaceRecord {
            id: id.into(),
            title: self.address.clone(),
            description: self.description.clone(),
            suburb: self.suburb.clone(),
            lat: self.lat.unwrap_or_default(),
            lng: self.lng.unwrap_or_default(),
            open_start: self.open_start.clone(),
            open_end: self.open_end.clone(),
            season: self.season,
            status: self.status,
            hide_number: self.hide_number,
        }
    }
}

#[async_trait]
pub trait SubmitClient: Send + Sync {
    /// Returns the new place id.
    async fn submit(&self, payload: &SubmitPayload) -> Result<String, SubmitError>;
}

/// Accepts everything and keeps the stored rows.
#[derive(Debug, Default)]
pub struct MemorySubmitClient {
    records: Mutex<Vec<PlaceRecord>>,
    next_id: AtomicUsize,
}

impl MemorySubmitClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PlaceRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SubmitClient for MemorySubmitClient {
    async fn submit(&self, payload: &SubmitPayload) -> Result<String, SubmitError> {
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload.to_record(id.clone()));
        Ok(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReceipt {
    pub place_id: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Coordinates came from the address lookup rather than the form.
    pub geocoded: bool,
}

/// Submit button.
pub struct SubmitFlow {
    client: Arc<dyn SubmitClient>,
    geocoder: Arc<dyn Geocoder>,
    season: Season,
    submitting: AtomicBool,
}

struct Submitting<'a>(&'a AtomicBool);

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SubmitFlow {
    pub fn new(client: Arc<dyn SubmitClient>, geocoder: Arc<dyn Geocoder>, season: Season) -> Self {
        Self {
            client,
            geocoder,
            season,
            submitting: AtomicBool::new(false),
        }
    }

    /// False while a submission round trip is running.
    pub fn is_enabled(&self) -> bool {
        !self.submitting.load(Ordering::SeqCst)
    }

    pub async fn submit(&self, mut submission: Submission) -> Result<SubmitReceipt, SubmitError> {
        let Some(_guard) = self
            .submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Submitting(&self.submitting))
        else {
            debug!("Submit ignored while busy — address={}", submission.address);
            return Err(SubmitError::Busy);
        };

        submission.validate()?;

        let mut geocoded = false;
        if !submission.has_coordinates() {
            let found = self.geocoder.lookup(&submission.address).await?;
            submission.lat = Some(found.lat);
            submission.lng = Some(found.lng);
            if non_blank(&submission.suburb).is_none() {
                submission.suburb = found.suburb;
            }
            geocoded = true;
        }

        let payload = submission.to_payload(self.season)?;
        let place_id = self.client.submit(&payload).await.map_err(|e| {
            error!("Submission failed — address={} error={}", payload.address, e);
            e
        })?;
        info!(
            "Display submitted — place_id={} season={} geocoded={}",
            place_id, payload.season, geocoded
        );
        Ok(SubmitReceipt {
            place_id,
            lat: payload.lat,
            lng: payload.lng,
            geocoded,
        })
    }
}
