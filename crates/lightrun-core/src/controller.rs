// SPDX-License-Identifier: MIT
// Copyright (c) 2026 LightRun contributors

//! Map page state: filter cycling, the rendered point set, the visitor's run
//! and the one live popup.
//!
//! Popups are handed out as [`PopupSession`]s. Each carries the generation it
//! was opened under; once another popup opens, or the session is closed or
//! dropped, its handlers become inert and report [`PopupEvent::Detached`].

use crate::cache::{PlaceLoader, QuerySignature};
use crate::filter::{FilterMode, FilterStyle};
use crate::itinerary::{AddOutcome, ItineraryEntry, ItineraryStore, PanelState, ToggleOutcome};
use crate::place::{Feature, FeatureCollection};
use crate::route::build_route_url_with_base;
use crate::season::Season;
use crate::storage::StorageError;
use crate::vote::{vote_button_label, vote_count_label, VoteError, VoteSync};
use crate::LoadError;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use thiserror::Error;

pub const LOAD_FAILED: &str = "Failed to load places";

#[derive(Error, Debug)]
pub enum InteractionError {
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error("Could not update your run: {0}")]
    Storage(#[from] StorageError),
    #[error("Top 10 data isn't loaded yet. Try again in a moment.")]
    TopTenNotLoaded,
    #[error(transparent)]
    Load(#[from] LoadError),
}

type SharedRun = Arc<Mutex<ItineraryStore>>;

fn lock_run(run: &SharedRun) -> MutexGuard<'_, ItineraryStore> {
    run.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct MapController {
    season: Season,
    filter: FilterMode,
    loader: Arc<PlaceLoader>,
    votes: Arc<VoteSync>,
    run: SharedRun,
    region_label: String,
    directions_base: String,
    active_popup: Arc<AtomicU64>,
    popup_counter: u64,
    full: Option<Arc<FeatureCollection>>,
    rendered: FeatureCollection,
    top_ten: Vec<Feature>,
    pending_focus: Option<String>,
    last_error: Option<String>,
}

impl MapController {
    pub fn new(
        season: Season,
        loader: Arc<PlaceLoader>,
        votes: Arc<VoteSync>,
        run: ItineraryStore,
    ) -> Self {
        Self {
            season,
            filter: FilterMode::default(),
            loader,
            votes,
            run: Arc::new(Mutex::new(run)),
            region_label: "Gold Coast".to_string(),
            directions_base: crate::route::DIRECTIONS_BASE_URL.to_string(),
            active_popup: Arc::new(AtomicU64::new(0)),
            popup_counter: 0,
            full: None,
            rendered: FeatureCollection::default(),
            top_ten: Vec::new(),
            pending_focus: None,
            last_error: None,
        }
    }

    pub fn with_region_label(mut self, label: impl Into<String>) -> Self {
        self.region_label = label.into();
        self
    }

    pub fn with_directions_base(mut self, base: impl Into<String>) -> Self {
        self.directions_base = base.into();
        self
    }

    pub fn season(&self) -> Season {
        self.season
    }

    /// Switching season changes the signature, so the next refresh may fetch.
    pub fn set_season(&mut self, season: Season) {
        self.season = season;
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn filter_style(&self) -> FilterStyle {
        self.filter.style()
    }

    pub fn signature(&self) -> QuerySignature {
        QuerySignature::new(self.season, self.filter.open_now())
    }

    /// Advances the filter button. The returned style is final before any refetch.
    pub fn cycle_filter(&mut self) -> FilterStyle {
        self.filter = self.filter.next();
        debug!("Filter cycled — mode={:?}", self.filter);
        self.filter.style()
    }

    /// Features currently on the map.
    pub fn rendered(&self) -> &FeatureCollection {
        &self.rendered
    }

    pub fn top_ten(&self) -> &[Feature] {
        &self.top_ten
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Remembers a place to open once it shows up in a fetch.
    pub fn set_focus(&mut self, place_id: impl Into<String>) {
        self.pending_focus = Some(place_id.into());
    }

    /// Picks up `?id=<place>` from a deep link.
    pub fn focus_from_query(&mut self, query: &str) {
        let query = query.trim_start_matches('?');
        if let Some((_, id)) = url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, v)| k == "id" && !v.is_empty())
        {
            self.set_focus(id.into_owned());
        }
    }

    pub fn pending_focus(&self) -> Option<&str> {
        self.pending_focus.as_deref()
    }

    /// Loads (or reuses) the point set for the current signature and applies
    /// the filter's local subset. Opens the focused place if it is present.
    ///
    /// On failure the previously rendered features stay on the map.
    pub async fn refresh(&mut self) -> Result<Option<PopupSession>, InteractionError> {
        let signature = self.signature();
        let full = match self.loader.load(&signature).await {
            Ok(full) => full,
            Err(e) => {
                error!("Refresh failed — signature={} error={}", signature, e);
                self.last_error = Some(LOAD_FAILED.to_string());
                return Err(e.into());
            }
        };

        self.last_error = None;
        self.top_ten = full.top_ten();
        self.rendered = self.filter.apply(&full);
        self.full = Some(Arc::clone(&full));
        info!(
            "Map refreshed — signature={} mode={:?} rendered={}",
            signature,
            self.filter,
            self.rendered.len()
        );

        let Some(focus) = self.pending_focus.clone() else {
            return Ok(None);
        };
        match full.find(&focus) {
            Some(feature) => {
                let feature = feature.clone();
                self.pending_focus = None;
                Ok(Some(self.open_popup(feature).await))
            }
            None => {
                debug!("Focus place not in current set — place_id={}", focus);
                Ok(None)
            }
        }
    }

    /// Opens a popup for a clicked point, replacing any popup already open.
    pub async fn open_popup(&mut self, feature: Feature) -> PopupSession {
        self.popup_counter += 1;
        let generation = self.popup_counter;
        self.active_popup.store(generation, Ordering::SeqCst);

        let voted = match self.votes.current_state(feature.id()).await {
            Ok(state) => state.unwrap_or(false),
            Err(e) => {
                warn!("Could not read vote state — place_id={} error={}", feature.id(), e);
                false
            }
        };

        debug!("Popup opened — place_id={} generation={}", feature.id(), generation);
        PopupSession {
            generation,
            active: Arc::clone(&self.active_popup),
            state: Mutex::new(PopupState {
                voted,
                votes: feature.properties.votes,
            }),
            voting: AtomicBool::new(false),
            feature,
            region_label: self.region_label.clone(),
            votes: Arc::clone(&self.votes),
            run: Arc::clone(&self.run),
        }
    }

    pub fn close_popup(&mut self) {
        self.active_popup.store(0, Ordering::SeqCst);
    }

    pub fn run_entries(&self) -> Vec<ItineraryEntry> {
        lock_run(&self.run).entries().to_vec()
    }

    pub fn add_to_run(&self, entry: ItineraryEntry) -> Result<AddOutcome, InteractionError> {
        Ok(lock_run(&self.run).add(entry)?)
    }

    pub fn remove_from_run(&self, id: &str) -> Result<bool, InteractionError> {
        Ok(lock_run(&self.run).remove(id)?)
    }

    pub fn clear_run(&self) -> Result<(), InteractionError> {
        Ok(lock_run(&self.run).clear()?)
    }

    /// Replaces the run with the current top ten in rank order.
    pub fn load_top_ten_route(&self) -> Result<usize, InteractionError> {
        if self.top_ten.is_empty() {
            return Err(InteractionError::TopTenNotLoaded);
        }
        let entries: Vec<ItineraryEntry> =
            self.top_ten.iter().map(Feature::to_itinerary_entry).collect();
        let count = entries.len();
        let mut run = lock_run(&self.run);
        run.replace_all(entries)?;
        run.set_panel(PanelState::Expanded);
        Ok(count)
    }

    pub fn route_url(&self) -> Option<String> {
        build_route_url_with_base(&self.directions_base, lock_run(&self.run).entries())
    }

    pub fn set_run_panel(&self, panel: PanelState) {
        lock_run(&self.run).set_panel(panel);
    }

    pub fn run_panel(&self) -> PanelState {
        lock_run(&self.run).panel()
    }

    pub fn is_run_pulsing(&self, now: Instant) -> bool {
        lock_run(&self.run).is_pulsing(now)
    }
}

#[derive(Debug, Clone, Copy)]
struct PopupState {
    voted: bool,
    votes: u64,
}

/// Everything a popup renders.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupView {
    pub place_id: String,
    pub title: String,
    pub description: String,
    pub detail_link: String,
    pub rank_badge: Option<String>,
    pub votes_label: String,
    pub vote_button: &'static str,
    pub vote_enabled: bool,
    pub run_button: &'static str,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupEvent {
    VoteUpdated { voted: bool, votes: u64 },
    RunUpdated { in_run: bool },
    /// A vote round trip is already running for this popup.
    Busy,
    /// The popup is no longer the live one; nothing was rendered.
    Detached,
}

fn run_button_label(in_run: bool) -> &'static str {
    if in_run {
        "Remove from run"
    } else {
        "Add to run"
    }
}

pub struct PopupSession {
    generation: u64,
    active: Arc<AtomicU64>,
    state: Mutex<PopupState>,
    voting: AtomicBool,
    feature: Feature,
    region_label: String,
    votes: Arc<VoteSync>,
    run: SharedRun,
}

/// Vote button disabled for as long as this lives.
struct VoteInFlight<'a>(&'a AtomicBool);

impl Drop for VoteInFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PopupSession {
    pub fn place_id(&self) -> &str {
        self.feature.id()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) == self.generation
    }

    pub fn is_voting(&self) -> bool {
        self.voting.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> MutexGuard<'_, PopupState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn view(&self) -> PopupView {
        let state = *self.lock_state();
        let in_run = lock_run(&self.run).contains(self.feature.id());
        PopupView {
            place_id: self.feature.id().to_string(),
            title: self.feature.display_title(),
            description: self.feature.properties.description.clone().unwrap_or_default(),
            detail_link: format!("/place/{}", self.feature.id()),
            rank_badge: self.feature.rank_badge(&self.region_label),
            votes_label: vote_count_label(state.votes),
            vote_button: vote_button_label(state.voted),
            vote_enabled: !self.is_voting(),
            run_button: run_button_label(in_run),
            lat: self.feature.lat(),
            lng: self.feature.lng(),
        }
    }

    fn begin_vote(&self) -> Option<VoteInFlight<'_>> {
        self.voting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| VoteInFlight(&self.voting))
    }

    /// Vote button handler. At most one round trip per popup at a time.
    pub async fn click_vote(&self) -> Result<PopupEvent, InteractionError> {
        if !self.is_active() {
            return Ok(PopupEvent::Detached);
        }
        let Some(_in_flight) = self.begin_vote() else {
            debug!("Vote click ignored while busy — place_id={}", self.place_id());
            return Ok(PopupEvent::Busy);
        };

        let result = self.votes.toggle(self.feature.id()).await;

        if !self.is_active() {
            debug!(
                "Vote finished after popup closed — place_id={} ok={}",
                self.place_id(),
                result.is_ok()
            );
            return Ok(PopupEvent::Detached);
        }

        let outcome = result?;
        let mut state = self.lock_state();
        state.voted = outcome.voted;
        if let Some(votes) = outcome.votes {
            state.votes = votes;
        }
        Ok(PopupEvent::VoteUpdated {
            voted: state.voted,
            votes: state.votes,
        })
    }

    /// Run button handler: toggles membership and expands the run panel.
    pub fn click_run(&self) -> Result<PopupEvent, InteractionError> {
        if !self.is_active() {
            return Ok(PopupEvent::Detached);
        }
        let mut run = lock_run(&self.run);
        let outcome = run.toggle(self.feature.to_itinerary_entry())?;
        run.set_panel(PanelState::Expanded);
        Ok(PopupEvent::RunUpdated {
            in_run: outcome == ToggleOutcome::Added,
        })
    }

    pub fn close(self) {}
}

impl Drop for PopupSession {
    fn drop(&mut self) {
        // Only clear if no newer popup has taken over
        let _ = self
            .active
            .compare_exchange(self.generation, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}
