//! Session cache of fetched point sets, keyed by query signature.
//!
//! Entries live for the whole session; the point set only changes when a
//! moderator approves something, so staleness is accepted. Concurrent misses
//! on the same signature share a single fetch. A failed fetch is not cached;
//! a caller queued behind it issues the next attempt itself.

use crate::place::FeatureCollection;
use crate::query::PlaceQuery;
use crate::ranking::assign_ranks;
use crate::season::Season;
use crate::LoadError;
use log::{debug, error, info};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Normalized identity of one fetchable query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuerySignature {
    pub season: Season,
    pub open_now: bool,
}

impl QuerySignature {
    pub fn new(season: Season, open_now: bool) -> Self {
        Self { season, open_now }
    }

    /// Query-string form, also used as the places endpoint's parameters.
    pub fn key(&self) -> String {
        if self.open_now {
            format!("season={}&openNow=true", self.season)
        } else {
            format!("season={}", self.season)
        }
    }
}

impl fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

pub trait FeatureCache: Send + Sync {
    fn get(&self, signature: &QuerySignature) -> Option<Arc<FeatureCollection>>;
    fn put(&self, signature: &QuerySignature, payload: Arc<FeatureCollection>);
    /// `None` drops everything.
    fn invalidate(&self, signature: Option<&QuerySignature>);
}

#[derive(Debug, Default)]
pub struct MemoryFeatureCache {
    entries: Mutex<HashMap<String, Arc<FeatureCollection>>>,
}

impl MemoryFeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FeatureCache for MemoryFeatureCache {
    fn get(&self, signature: &QuerySignature) -> Option<Arc<FeatureCollection>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(&signature.key()).cloned()
    }

    fn put(&self, signature: &QuerySignature, payload: Arc<FeatureCollection>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(signature.key(), payload);
    }

    fn invalidate(&self, signature: Option<&QuerySignature>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match signature {
            Some(sig) => {
                entries.remove(&sig.key());
            }
            None => entries.clear(),
        }
    }
}

/// Cache-first loader with per-signature fetch coalescing.
pub struct PlaceLoader {
    query: Arc<dyn PlaceQuery>,
    cache: Arc<dyn FeatureCache>,
    inflight: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    fetches: AtomicUsize,
}

impl PlaceLoader {
    pub fn new(query: Arc<dyn PlaceQuery>, cache: Arc<dyn FeatureCache>) -> Self {
        Self {
            query,
            cache,
            inflight: AsyncMutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<dyn FeatureCache> {
        &self.cache
    }

    /// Network fetches issued by this loader so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Returns the full ranked point set for `signature`.
    ///
    /// Ranks are recomputed from vote counts on every network fetch; cached
    /// payloads are returned as stored.
    pub async fn load(&self, signature: &QuerySignature) -> Result<Arc<FeatureCollection>, LoadError> {
        if let Some(hit) = self.cache.get(signature) {
            debug!("Places cache hit — signature={}", signature);
            return Ok(hit);
        }

        let _guard = self.acquire(&signature.key()).await;

        // Someone else may have filled it while we waited
        if let Some(hit) = self.cache.get(signature) {
            debug!("Places fetch coalesced — signature={}", signature);
            return Ok(hit);
        }

        self.fetches.fetch_add(1, Ordering::SeqCst);
        info!("Fetching places — signature={}", signature);
        let result = self
            .query
            .fetch(signature.season, signature.open_now)
            .await;

        match result {
            Ok(mut collection) => {
                assign_ranks(&mut collection);
                let payload = Arc::new(collection);
                self.cache.put(signature, Arc::clone(&payload));
                info!(
                    "Places cached — signature={} features={}",
                    signature,
                    payload.len()
                );
                Ok(payload)
            }
            Err(e) => {
                error!("Places fetch failed — signature={} error={}", signature, e);
                Err(e)
            }
        }
    }

    /// One lock per signature, kept for the loader's lifetime.
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_keys() {
        let plain = QuerySignature::new(Season::Christmas, false);
        let lit = QuerySignature::new(Season::Christmas, true);
        assert_eq!(plain.key(), "season=christmas");
        assert_eq!(lit.key(), "season=christmas&openNow=true");
        assert_ne!(plain.key(), QuerySignature::new(Season::Halloween, false).key());
    }

    #[test]
    fn test_invalidate_single_and_all() {
        let cache = MemoryFeatureCache::new();
        let a = QuerySignature::new(Season::Christmas, false);
        let b = QuerySignature::new(Season::Christmas, true);
        cache.put(&a, Arc::new(FeatureCollection::default()));
        cache.put(&b, Arc::new(FeatureCollection::default()));
        assert_eq!(cache.len(), 2);

        cache.invalidate(Some(&a));
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());

        cache.invalidate(None);
        assert!(cache.is_empty());
    }
}
