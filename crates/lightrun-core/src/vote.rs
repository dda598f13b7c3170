// SPDX-License-Identifier: MIT
// Copyright (c) 2026 LightRun contributors

//! Vote toggling against the authoritative vote store.
//!
//! The displayed count is always the store's answer after the mutation; it is
//! never incremented locally.

use crate::session::{SessionProvider, Visitor};
use async_trait::async_trait;
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoteStoreError {
    #[error("Vote store request failed: {0}")]
    Request(String),
    #[error("Vote store rejected the request: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoteError {
    #[error("Please log in on the Login page before voting.")]
    Unauthenticated,
    #[error("Could not update your vote. Please try again.")]
    Store(#[from] VoteStoreError),
}

/// Result of inserting a vote row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The row was already there (double click, second tab). Not an error.
    AlreadyExists,
}

#[async_trait]
pub trait VoteStore: Send + Sync {
    async fn has_voted(&self, visitor: &Visitor, place_id: &str) -> Result<bool, VoteStoreError>;
    async fn insert(&self, visitor: &Visitor, place_id: &str) -> Result<InsertOutcome, VoteStoreError>;
    async fn delete(&self, visitor: &Visitor, place_id: &str) -> Result<(), VoteStoreError>;
    async fn count(&self, place_id: &str) -> Result<u64, VoteStoreError>;
}

pub fn vote_count_label(votes: u64) -> String {
    if votes == 1 {
        "1 vote".to_string()
    } else {
        format!("{} votes", votes)
    }
}

pub fn vote_button_label(voted: bool) -> &'static str {
    if voted {
        "VOTED"
    } else {
        "VOTE"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    /// Visitor's vote state after this toggle.
    pub voted: bool,
    /// Re-read aggregate; `None` if the re-read failed and the old count should stay.
    pub votes: Option<u64>,
    /// An insert hit an existing row and was treated as success.
    pub race_absorbed: bool,
}

pub struct VoteSync {
    store: Arc<dyn VoteStore>,
    session: Arc<dyn SessionProvider>,
}

impl VoteSync {
    pub fn new(store: Arc<dyn VoteStore>, session: Arc<dyn SessionProvider>) -> Self {
        Self { store, session }
    }

    /// Whether the signed-in visitor has voted for `place_id`; `None` when anonymous.
    pub async fn current_state(&self, place_id: &str) -> Result<Option<bool>, VoteError> {
        let Some(visitor) = self.session.current_visitor().await else {
            return Ok(None);
        };
        Ok(Some(self.store.has_voted(&visitor, place_id).await?))
    }

    pub async fn toggle(&self, place_id: &str) -> Result<VoteOutcome, VoteError> {
        let visitor = self
            .session
            .current_visitor()
            .await
            .ok_or(VoteError::Unauthenticated)?;

        let existing = self
            .store
            .has_voted(&visitor, place_id)
            .await
            .map_err(|e| log_store_error("lookup", place_id, e))?;

        let mut race_absorbed = false;
        if existing {
            self.store
                .delete(&visitor, place_id)
                .await
                .map_err(|e| log_store_error("delete", place_id, e))?;
        } else {
            let outcome = self
                .store
                .insert(&visitor, place_id)
                .await
                .map_err(|e| log_store_error("insert", place_id, e))?;
            if outcome == InsertOutcome::AlreadyExists {
                warn!("Duplicate vote absorbed — place_id={} visitor={}", place_id, visitor.id);
                race_absorbed = true;
            }
        }

        let votes = match self.store.count(place_id).await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Vote count re-read failed — place_id={} error={}", place_id, e);
                None
            }
        };

        info!(
            "Vote toggled — place_id={} voted={} votes={:?}",
            place_id, !existing, votes
        );
        Ok(VoteOutcome {
            voted: !existing,
            votes,
            race_absorbed,
        })
    }
}

fn log_store_error(step: &str, place_id: &str, e: VoteStoreError) -> VoteError {
    error!("Vote {} failed — place_id={} error={}", step, place_id, e);
    VoteError::Store(e)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteCall {
    Lookup,
    Insert,
    Delete,
    Count,
}

/// Stand-in when no vote backend is configured; every call fails.
#[derive(Debug, Clone)]
pub struct UnconfiguredVoteStore;

impl UnconfiguredVoteStore {
    fn refuse<T>(&self) -> Result<T, VoteStoreError> {
        Err(VoteStoreError::Request("not configured".to_string()))
    }
}

#[async_trait]
impl VoteStore for UnconfiguredVoteStore {
    async fn has_voted(&self, _visitor: &Visitor, _place_id: &str) -> Result<bool, VoteStoreError> {
        self.refuse()
    }

    async fn insert(&self, _visitor: &Visitor, _place_id: &str) -> Result<InsertOutcome, VoteStoreError> {
        self.refuse()
    }

    async fn delete(&self, _visitor: &Visitor, _place_id: &str) -> Result<(), VoteStoreError> {
        self.refuse()
    }

    async fn count(&self, _place_id: &str) -> Result<u64, VoteStoreError> {
        self.refuse()
    }
}

/// In-memory vote store that records every call.
#[derive(Debug, Default)]
pub struct MemoryVoteStore {
    rows: Mutex<HashSet<(String, String)>>,
    baseline: Mutex<HashMap<String, u64>>,
    calls: Mutex<Vec<VoteCall>>,
    failing: Mutex<HashSet<VoteCall>>,
    racing_insert: Mutex<bool>,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Votes from other visitors, counted but not attributable.
    pub fn with_baseline(self, place_id: &str, votes: u64) -> Self {
        self.baseline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(place_id.to_string(), votes);
        self
    }

    /// Every call of `kind` fails until cleared.
    pub fn fail_on(&self, kind: VoteCall) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).insert(kind);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Next insert behaves as if a concurrent request inserted the same row first.
    pub fn race_next_insert(&self) {
        *self.racing_insert.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn calls(&self) -> Vec<VoteCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count_of(&self, kind: VoteCall) -> usize {
        self.calls().iter().filter(|c| **c == kind).count()
    }

    fn record(&self, kind: VoteCall) -> Result<(), VoteStoreError> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(kind);
        if self.failing.lock().unwrap_or_else(|e| e.into_inner()).contains(&kind) {
            return Err(VoteStoreError::Request(format!("{:?} unavailable", kind)));
        }
        Ok(())
    }
}

#[async_trait]
impl VoteStore for MemoryVoteStore {
    async fn has_voted(&self, visitor: &Visitor, place_id: &str) -> Result<bool, VoteStoreError> {
        self.record(VoteCall::Lookup)?;
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.contains(&(visitor.id.clone(), place_id.to_string())))
    }

    async fn insert(&self, visitor: &Visitor, place_id: &str) -> Result<InsertOutcome, VoteStoreError> {
        self.record(VoteCall::Insert)?;
        let key = (visitor.id.clone(), place_id.to_string());
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());

        let mut racing = self.racing_insert.lock().unwrap_or_else(|e| e.into_inner());
        if *racing {
            *racing = false;
            rows.insert(key);
            return Ok(InsertOutcome::AlreadyExists);
        }

        if rows.insert(key) {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    async fn delete(&self, visitor: &Visitor, place_id: &str) -> Result<(), VoteStoreError> {
        self.record(VoteCall::Delete)?;
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.remove(&(visitor.id.clone(), place_id.to_string()));
        Ok(())
    }

    async fn count(&self, place_id: &str) -> Result<u64, VoteStoreError> {
        self.record(VoteCall::Count)?;
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let own = rows.iter().filter(|(_, p)| p == place_id).count() as u64;
        let baseline = self
            .baseline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(place_id)
            .copied()
            .unwrap_or(0);
        Ok(own + baseline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticSession;

    #[test]
    fn test_labels() {
        assert_eq!(vote_count_label(0), "0 votes");
        assert_eq!(vote_count_label(1), "1 vote");
        assert_eq!(vote_count_label(12), "12 votes");
        assert_eq!(vote_button_label(true), "VOTED");
        assert_eq!(vote_button_label(false), "VOTE");
    }

    #[tokio::test]
    async fn test_race_is_absorbed() {
        let store = Arc::new(MemoryVoteStore::new().with_baseline("p1", 4));
        let session = Arc::new(StaticSession::signed_in(Visitor::new("v1")));
        let sync = VoteSync::new(store.clone(), session);

        store.race_next_insert();
        let outcome = sync.toggle("p1").await.unwrap();
        assert!(outcome.voted);
        assert!(outcome.race_absorbed);
        assert_eq!(outcome.votes, Some(5));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_before_count() {
        let store = Arc::new(MemoryVoteStore::new());
        let session = Arc::new(StaticSession::signed_in(Visitor::new("v1")));
        let sync = VoteSync::new(store.clone(), session);

        store.fail_on(VoteCall::Insert);
        let err = sync.toggle("p1").await.unwrap_err();
        assert!(matches!(err, VoteError::Store(_)));
        assert_eq!(store.count_of(VoteCall::Count), 0);

        // Manual retry succeeds once the store recovers
        store.clear_failures();
        assert_eq!(sync.toggle("p1").await.unwrap().votes, Some(1));
    }

    #[tokio::test]
    async fn test_failed_recount_keeps_vote_state() {
        let store = Arc::new(MemoryVoteStore::new());
        let session = Arc::new(StaticSession::signed_in(Visitor::new("v1")));
        let sync = VoteSync::new(store.clone(), session);

        store.fail_on(VoteCall::Count);
        let outcome = sync.toggle("p1").await.unwrap();
        assert!(outcome.voted);
        assert_eq!(outcome.votes, None);
    }

    #[tokio::test]
    async fn test_unconfigured_store_refuses_votes() {
        let session = Arc::new(StaticSession::signed_in(Visitor::new("v1")));
        let sync = VoteSync::new(Arc::new(UnconfiguredVoteStore), session);
        assert_eq!(
            sync.toggle("p1").await,
            Err(VoteError::Store(VoteStoreError::Request("not configured".to_string())))
        );
        assert!(sync.current_state("p1").await.is_err());
    }

    #[tokio::test]
    async fn test_current_state_anonymous() {
        let store = Arc::new(MemoryVoteStore::new());
        let sync = VoteSync::new(store.clone(), Arc::new(StaticSession::anonymous()));
        assert_eq!(sync.current_state("p1").await.unwrap(), None);
        assert!(store.calls().is_empty());
    }
}
