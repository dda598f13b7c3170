// SPDX-License-Identifier: MIT
// Copyright (c) 2026 LightRun contributors

//! "My Run": the visitor's ordered list of displays to drive past.

use crate::storage::{KeyValueStore, StorageError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const RUN_KEY: &str = "my_run_v1";
pub const DUPLICATE_WARNING: &str = "This display is already in your run.";
pub const UNNAMED_DISPLAY: &str = "Unnamed display";
pub const DEFAULT_PULSE: Duration = Duration::from_millis(280);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryEntry {
    pub id: String,
    pub address: String,
    pub suburb: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

impl ItineraryEntry {
    /// Accepts a stored entry only if it has an id and numeric coordinates.
    fn from_stored(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = match obj.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let lat = obj.get("lat")?.as_f64()?;
        let lng = obj.get("lng")?.as_f64()?;
        let address = match obj.get("address") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let suburb = obj
            .get("suburb")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string());
        Some(Self {
            id,
            address,
            suburb,
            lat,
            lng,
        })
    }
}

/// Visual state of the run summary panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelState {
    #[default]
    Collapsed,
    Expanded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Nothing changed; carries the message to show the visitor.
    AlreadyPresent(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}

pub struct ItineraryStore {
    storage: Arc<dyn KeyValueStore>,
    entries: Vec<ItineraryEntry>,
    panel: PanelState,
    pulse_duration: Duration,
    pulse_until: Option<Instant>,
}

impl ItineraryStore {
    /// Reads the persisted run. Malformed entries are dropped; unreadable or
    /// non-list data yields an empty run.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let entries = match storage.get(RUN_KEY) {
            Ok(Some(raw)) => parse_stored(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Could not read saved run; starting empty — error={}", e);
                Vec::new()
            }
        };
        debug!("Loaded run — entries={}", entries.len());

        Self {
            storage,
            entries,
            panel: PanelState::default(),
            pulse_duration: DEFAULT_PULSE,
            pulse_until: None,
        }
    }

    pub fn with_pulse_duration(mut self, duration: Duration) -> Self {
        self.pulse_duration = duration;
        self
    }

    pub fn entries(&self) -> &[ItineraryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn add(&mut self, entry: ItineraryEntry) -> Result<AddOutcome, StorageError> {
        if self.contains(&entry.id) {
            info!("Display already in run — id={}", entry.id);
            return Ok(AddOutcome::AlreadyPresent(DUPLICATE_WARNING));
        }
        let mut next = self.entries.clone();
        next.push(entry);
        self.commit(next)?;
        Ok(AddOutcome::Added)
    }

    /// Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> Result<bool, StorageError> {
        if !self.contains(id) {
            return Ok(false);
        }
        let next: Vec<ItineraryEntry> = self
            .entries
            .iter()
            .filter(|e| e.id != id)
            .cloned()
            .collect();
        self.commit(next)?;
        Ok(true)
    }

    /// Popup run button: add when absent, remove when present.
    pub fn toggle(&mut self, entry: ItineraryEntry) -> Result<ToggleOutcome, StorageError> {
        if self.contains(&entry.id) {
            self.remove(&entry.id)?;
            Ok(ToggleOutcome::Removed)
        } else {
            self.add(entry)?;
            Ok(ToggleOutcome::Added)
        }
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.commit(Vec::new())
    }

    /// Replaces the whole run, keeping the first occurrence of each id.
    pub fn replace_all(&mut self, entries: Vec<ItineraryEntry>) -> Result<(), StorageError> {
        let mut next: Vec<ItineraryEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if !next.iter().any(|e| e.id == entry.id) {
                next.push(entry);
            }
        }
        self.commit(next)
    }

    pub fn panel(&self) -> PanelState {
        self.panel
    }

    pub fn set_panel(&mut self, panel: PanelState) {
        self.panel = panel;
    }

    /// True while the collapsed summary pill should play its "added" cue.
    pub fn is_pulsing(&self, now: Instant) -> bool {
        self.pulse_until.map(|until| now < until).unwrap_or(false)
    }

    /// Persists `next` and only then makes it the current run.
    fn commit(&mut self, next: Vec<ItineraryEntry>) -> Result<(), StorageError> {
        let content = serde_json::to_string(&next)?;
        self.storage.set(RUN_KEY, &content)?;
        info!("Saved run — entries={}", next.len());

        let grew = next.len() > self.entries.len();
        self.entries = next;

        if grew && self.panel == PanelState::Collapsed {
            self.pulse_until = Some(Instant::now() + self.pulse_duration);
        }
        Ok(())
    }
}

fn parse_stored(raw: &str) -> Vec<ItineraryEntry> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Saved run is not valid JSON; ignoring — error={}", e);
            return Vec::new();
        }
    };
    let Some(items) = parsed.as_array() else {
        warn!("Saved run is not a list; ignoring");
        return Vec::new();
    };

    let entries: Vec<ItineraryEntry> = items.iter().filter_map(ItineraryEntry::from_stored).collect();
    let dropped = items.len() - entries.len();
    if dropped > 0 {
        warn!("Dropped malformed run entries — dropped={} kept={}", dropped, entries.len());
    }
    entries
}
