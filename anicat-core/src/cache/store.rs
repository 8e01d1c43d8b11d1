use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::Arc,
    time::Duration,
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;
use tokio::{task::JoinError, time::Instant};
use tracing::{debug, trace};

use crate::error::FetchError;

/// Deadline used when a TTL is too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);
/// Shortest sweep period; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// A stored value and the instant after which it must not be returned.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            expires_at: now
                .checked_add(ttl)
                .unwrap_or_else(|| now + FAR_FUTURE),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type PendingFetch<V, E> = Shared<BoxFuture<'static, Result<V, Arc<E>>>>;

struct CacheInner<V, E> {
    entries: HashMap<String, CacheEntry<V>>,
    pending: HashMap<String, PendingFetch<V, E>>,
}

impl<V: Clone, E> CacheInner<V, E> {
    fn live(&mut self, key: &str) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                trace!(key, "lazily evicted expired cache entry");
                None
            }
            None => None,
        }
    }
}

/// Process-local key/value store with per-entry TTL and in-flight request
/// coalescing.
///
/// Expired entries are never returned: every read checks the deadline and
/// drops the entry when it has passed. [`TtlCache::evict_expired`] exists to
/// bound memory for keys that are never read again.
///
/// [`TtlCache::get_or_fetch`] guarantees at most one producer per key is
/// running at any time. Producers run on their own task, so a caller that
/// stops waiting does not cancel the fetch for the other waiters.
pub struct TtlCache<V, E = FetchError> {
    name: &'static str,
    inner: Arc<Mutex<CacheInner<V, E>>>,
}

impl<V, E> Clone for TtlCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> fmt::Debug for TtlCache<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (entries, pending) = {
            let inner = self.inner.lock();
            (inner.entries.len(), inner.pending.len())
        };
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("entries", &entries)
            .field("pending", &pending)
            .finish()
    }
}

impl<V, E> TtlCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: From<JoinError> + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                pending: HashMap::new(),
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.inner
            .lock()
            .entries
            .insert(key.into(), CacheEntry::new(value, ttl));
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().live(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn del(&self, key: &str) {
        self.inner.lock().entries.remove(key);
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetches currently in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(cache = self.name, removed, "evicted expired cache entries");
        }
        removed
    }

    /// Return the live value for `key`, join the fetch already in flight for
    /// it, or start `producer` and share its outcome with every caller that
    /// joins before it settles.
    ///
    /// Only successful results are stored. The pending registration is
    /// removed before any waiter observes the result, so a call made after
    /// settlement starts a fresh fetch.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<V, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let pending = {
            let mut inner = self.inner.lock();
            if let Some(value) = inner.live(key) {
                trace!(cache = self.name, key, "cache hit");
                return Ok(value);
            }

            if let Some(pending) = inner.pending.get(key) {
                debug!(cache = self.name, key, "joining in-flight fetch");
                pending.clone()
            } else {
                debug!(cache = self.name, key, "cache miss; starting fetch");
                let pending = self.start_fetch(key.to_owned(), ttl, producer());
                inner.pending.insert(key.to_owned(), pending.clone());
                pending
            }
        };

        pending.await
    }

    fn start_fetch<Fut>(
        &self,
        key: String,
        ttl: Duration,
        fetch: Fut,
    ) -> PendingFetch<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let task_inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = fetch.await.map_err(Arc::new);
            let mut inner = task_inner.lock();
            inner.pending.remove(&task_key);
            if let Ok(value) = &result {
                inner
                    .entries
                    .insert(task_key, CacheEntry::new(value.clone(), ttl));
            }
            result
        });

        let inner = Arc::clone(&self.inner);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => {
                    // The task never reached its own cleanup.
                    inner.lock().pending.remove(&key);
                    Err(Arc::new(E::from(err)))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Snapshot of live entries with their remaining lifetime.
    pub(crate) fn live_entries(&self) -> Vec<(String, V, Duration)> {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| {
                (key.clone(), entry.value.clone(), entry.expires_at - now)
            })
            .collect()
    }

    /// Run [`TtlCache::evict_expired`] on a fixed cadence until the runtime
    /// shuts down.
    pub fn spawn_sweeper(
        &self,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(MIN_PERIOD));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.evict_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> TtlCache<String> {
        TtlCache::new("test")
    }

    #[tokio::test(start_paused = true)]
    async fn zero_sweep_period_keeps_the_sweeper_alive() {
        let cache = cache();
        cache.set("k", "v".to_string(), Duration::from_secs(1));
        let sweeper = cache.spawn_sweeper(Duration::ZERO);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!sweeper.is_finished());
        assert!(cache.is_empty());
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_ttl_is_capped_instead_of_overflowing() {
        let cache = cache();
        cache.set("k", "v".to_string(), Duration::MAX);
        tokio::time::advance(Duration::from_secs(365 * 86400)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert_eq!(cache.live_entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn value_is_visible_until_ttl_elapses() {
        let cache = cache();
        cache.set("k", "v".to_string(), Duration::from_secs(10));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert!(cache.has("k"));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k"), None);
        assert!(!cache.has("k"));
        // Lazy expiry removed the entry on read.
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_and_del_removes() {
        let cache = cache();
        cache.set("k", "a".to_string(), Duration::from_secs(5));
        cache.set("k", "b".to_string(), Duration::from_secs(5));
        assert_eq!(cache.get("k").as_deref(), Some("b"));

        cache.del("k");
        cache.del("missing");
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired_entries() {
        let cache = cache();
        cache.set("short", "a".to_string(), Duration::from_secs(1));
        cache.set("long", "b".to_string(), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.has("long"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_producer() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..8).map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            async move {
                cache
                    .get_or_fetch("k", Duration::from_secs(60), move || {
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50))
                                .await;
                            Ok("fetched".to_string())
                        }
                    })
                    .await
            }
        });

        let results = futures::future::join_all(callers).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), "fetched");
        }
        assert_eq!(cache.pending_len(), 0);
        assert_eq!(cache.get("k").as_deref(), Some("fetched"));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_shared_and_not_cached() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = |calls: Arc<AtomicUsize>| {
            let cache = cache.clone();
            async move {
                cache
                    .get_or_fetch("k", Duration::from_secs(60), move || {
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10))
                                .await;
                            Err(FetchError::NotFound("k".into()))
                        }
                    })
                    .await
            }
        };

        let (a, b) =
            tokio::join!(fetch(Arc::clone(&calls)), fetch(Arc::clone(&calls)));
        let a = a.unwrap_err();
        let b = b.unwrap_err();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.has("k"));

        // Settled fetches are not joined again.
        let _ = fetch(Arc::clone(&calls)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_completes_when_caller_gives_up() {
        let cache = cache();
        let fetch = cache.get_or_fetch("k", Duration::from_secs(60), || {
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok("late".to_string())
            }
        });
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), fetch).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k").as_deref(), Some("late"));
        assert_eq!(cache.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_exactly_one_refetch() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = "catalog:trending:1:";

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            cache
                .get_or_fetch(key, Duration::from_secs(3600), move || {
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("page".to_string())
                    }
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(3700)).await;
        let refetch = Arc::clone(&calls);
        cache
            .get_or_fetch(key, Duration::from_secs(3600), move || {
                async move {
                    refetch.fetch_add(1, Ordering::SeqCst);
                    Ok("page2".to_string())
                }
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get(key).as_deref(), Some("page2"));
    }
}
