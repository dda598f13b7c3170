use async_trait::async_trait;
use lightrun_core::cache::{FeatureCache, MemoryFeatureCache, PlaceLoader, QuerySignature};
use lightrun_core::place::FeatureCollection;
use lightrun_core::query::{MemoryPlaceQuery, ModerationStatus, PlaceQuery, PlaceRecord};
use lightrun_core::season::Season;
use lightrun_core::LoadError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn record(id: &str, title: &str) -> PlaceRecord {
    PlaceRecord {
        id: id.to_string(),
        title: title.to_string(),
        description: Some("Synchronised to music".to_string()),
        suburb: Some("Helensvale".to_string()),
        lat: -27.92,
        lng: 153.33,
        open_start: Some("00:00".to_string()),
        open_end: Some("23:59".to_string()),
        season: Season::Christmas,
        status: ModerationStatus::Approved,
        hide_number: false,
    }
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let query = Arc::new(
        MemoryPlaceQuery::new(vec![record("1", "1 Frost Rd"), record("2", "2 Frost Rd")])
            .with_latency(Duration::from_millis(50)),
    );
    let loader = PlaceLoader::new(query.clone(), Arc::new(MemoryFeatureCache::new()));
    let sig = QuerySignature::new(Season::Christmas, false);

    let (a, b) = futures::join!(loader.load(&sig), loader.load(&sig));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(query.fetch_count(), 1);
    assert_eq!(loader.fetch_count(), 1);
    assert!(Arc::ptr_eq(&a, &b), "Both waiters should get the same payload");
}

#[tokio::test]
async fn test_distinct_signatures_fetch_separately_then_cache() {
    let query = Arc::new(MemoryPlaceQuery::new(vec![record("1", "1 Frost Rd")]));
    let cache = Arc::new(MemoryFeatureCache::new());
    let loader = PlaceLoader::new(query.clone(), cache.clone());

    let all = QuerySignature::new(Season::Christmas, false);
    let lit = QuerySignature::new(Season::Christmas, true);

    let (x, y) = futures::join!(loader.load(&all), loader.load(&lit));
    assert!(x.is_ok() && y.is_ok());
    assert_eq!(query.fetch_count(), 2);

    loader.load(&all).await.unwrap();
    loader.load(&lit).await.unwrap();
    assert_eq!(query.fetch_count(), 2);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_ranks_computed_on_fetch() {
    let mut votes = HashMap::new();
    votes.insert("1".to_string(), 2);
    votes.insert("2".to_string(), 8);
    let query = Arc::new(
        MemoryPlaceQuery::new(vec![record("1", "1 Frost Rd"), record("2", "2 Frost Rd")])
            .with_votes(votes),
    );
    let loader = PlaceLoader::new(query, Arc::new(MemoryFeatureCache::new()));

    let fc = loader
        .load(&QuerySignature::new(Season::Christmas, false))
        .await
        .unwrap();
    assert_eq!(fc.find("2").unwrap().properties.rank, Some(1));
    assert_eq!(fc.find("1").unwrap().properties.rank, Some(2));
}

/// Fails the first `failures` fetches, then serves an empty set.
struct FlakyQuery {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl PlaceQuery for FlakyQuery {
    async fn fetch(&self, _season: Season, _open_now: bool) -> Result<FeatureCollection, LoadError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(LoadError::Request("503 Service Unavailable".to_string()));
        }
        Ok(FeatureCollection::default())
    }
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let query = Arc::new(FlakyQuery {
        failures: 1,
        calls: AtomicUsize::new(0),
    });
    let cache = Arc::new(MemoryFeatureCache::new());
    let loader = PlaceLoader::new(query.clone(), cache.clone());
    let sig = QuerySignature::new(Season::Halloween, false);

    assert!(matches!(loader.load(&sig).await, Err(LoadError::Request(_))));
    assert!(cache.get(&sig).is_none());

    // Manual retry goes back to the network
    assert!(loader.load(&sig).await.is_ok());
    assert_eq!(query.calls.load(Ordering::SeqCst), 2);
}

/// Cache double that counts lookups and writes.
#[derive(Default)]
struct CountingCache {
    inner: MemoryFeatureCache,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl FeatureCache for CountingCache {
    fn get(&self, signature: &QuerySignature) -> Option<Arc<FeatureCollection>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(signature)
    }

    fn put(&self, signature: &QuerySignature, payload: Arc<FeatureCollection>) {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(signature, payload)
    }

    fn invalidate(&self, signature: Option<&QuerySignature>) {
        self.inner.invalidate(signature)
    }
}

#[tokio::test]
async fn test_injected_cache_and_invalidation() {
    let query = Arc::new(MemoryPlaceQuery::new(vec![record("1", "1 Frost Rd")]));
    let cache = Arc::new(CountingCache::default());
    let loader = PlaceLoader::new(query.clone(), cache.clone());
    let sig = QuerySignature::new(Season::Christmas, false);

    loader.load(&sig).await.unwrap();
    loader.load(&sig).await.unwrap();
    assert_eq!(cache.puts.load(Ordering::SeqCst), 1);
    assert!(cache.gets.load(Ordering::SeqCst) >= 2);

    loader.cache().invalidate(Some(&sig));
    loader.load(&sig).await.unwrap();
    assert_eq!(query.fetch_count(), 2);
    assert_eq!(cache.puts.load(Ordering::SeqCst), 2);
}
