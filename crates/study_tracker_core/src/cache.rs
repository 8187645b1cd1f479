//! crates/study_tracker_core/src/cache.rs
//!
//! Time-boxed read cache in front of the document gateway.
//!
//! Each entry remembers when its value was fetched. Reads younger than the
//! caller's TTL are served locally; anything older goes back to the loader.
//! Entries are also bounded by a least-recently-used capacity.
//!
//! Overlapping loads of one key settle by fetch time: the load that started
//! last wins, whichever finishes first.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::{LessonContentItem, Timetable, UserProfile};
use crate::ports::{Clock, PortResult};

/// Cache key builders. Everything owned by one user shares the
/// [`user_scope`] prefix so it can be dropped on sign-out.
pub mod keys {
    pub fn user_scope(uid: &str) -> String {
        format!("user:{uid}:")
    }

    pub fn timetable(uid: &str) -> String {
        format!("{}timetable", user_scope(uid))
    }

    pub fn profile(uid: &str) -> String {
        format!("{}profile", user_scope(uid))
    }

    pub fn lesson_content(lesson_id: &str) -> String {
        format!("lesson:{lesson_id}:content")
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at_ms: i64,
    last_used: u64,
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    epoch: u64,
    use_counter: u64,
    in_flight: usize,
    /// Invalidations and write-throughs seen while loads were in flight, as `(key, epoch)`.
    tombstones: Vec<(String, u64)>,
    prefix_tombstones: Vec<(String, u64)>,
}

impl<V> CacheInner<V> {
    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    fn invalidated_since(&self, key: &str, since: u64) -> bool {
        self.tombstones
            .iter()
            .any(|(k, epoch)| *epoch > since && k == key)
            || self
                .prefix_tombstones
                .iter()
                .any(|(prefix, epoch)| *epoch > since && key.starts_with(prefix.as_str()))
    }

    /// Whether a load that started at `started_at` (epoch `since`) must not be stored.
    fn superseded(&self, key: &str, since: u64, started_at: i64) -> bool {
        self.invalidated_since(key, since)
            || self
                .entries
                .get(key)
                .is_some_and(|e| e.fetched_at_ms > started_at)
    }

    fn evict_to(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    debug!(%key, "cache capacity reached, evicting least recently used");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

/// A per-key store of `(value, fetched_at)` pairs with TTL-based refresh.
pub struct TtlCache<V> {
    clock: Arc<dyn Clock>,
    capacity: usize,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            clock,
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                epoch: 0,
                use_counter: 0,
                in_flight: 0,
                tombstones: Vec::new(),
                prefix_tombstones: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the cached value for `key` if it is younger than `ttl`,
    /// otherwise runs `loader`, stores its value, and returns it.
    ///
    /// A failing loader leaves the cache untouched and its error is returned.
    /// A loaded value is not stored if the key was invalidated or written
    /// through after the load started, or if the entry present was fetched
    /// later than this load began.
    pub async fn get<F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> PortResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PortResult<V>>,
    {
        let started_at = self.clock.now_ms();
        let start_epoch = {
            let mut inner = self.lock();
            inner.use_counter += 1;
            let used = inner.use_counter;
            if let Some(entry) = inner.entries.get_mut(key) {
                if started_at - entry.fetched_at_ms < ttl_ms(ttl) {
                    entry.last_used = used;
                    debug!(%key, "cache hit");
                    return Ok(entry.value.clone());
                }
            }
            inner.in_flight += 1;
            inner.epoch
        };

        debug!(%key, "cache miss, loading");
        let loaded = loader().await;

        let mut inner = self.lock();
        inner.in_flight -= 1;
        let result = match loaded {
            Ok(value) => {
                if inner.superseded(key, start_epoch, started_at) {
                    debug!(%key, "discarding load superseded by a newer write");
                } else {
                    inner.use_counter += 1;
                    let last_used = inner.use_counter;
                    inner.entries.insert(
                        key.to_string(),
                        CacheEntry {
                            value: value.clone(),
                            fetched_at_ms: started_at,
                            last_used,
                        },
                    );
                    inner.evict_to(self.capacity);
                }
                Ok(value)
            }
            Err(e) => {
                warn!(%key, error = %e, "cache refresh failed");
                Err(e)
            }
        };
        if inner.in_flight == 0 {
            inner.tombstones.clear();
            inner.prefix_tombstones.clear();
        }
        result
    }

    /// Stores a value that was just written through to the gateway.
    pub fn put(&self, key: &str, value: V) {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        if inner.in_flight > 0 {
            let epoch = inner.next_epoch();
            inner.tombstones.push((key.to_string(), epoch));
        }
        inner.use_counter += 1;
        let last_used = inner.use_counter;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                fetched_at_ms: now,
                last_used,
            },
        );
        inner.evict_to(self.capacity);
    }

    pub fn invalidate(&self, key: &str) {
        let mut inner = self.lock();
        inner.entries.remove(key);
        if inner.in_flight > 0 {
            let epoch = inner.next_epoch();
            inner.tombstones.push((key.to_string(), epoch));
        }
    }

    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut inner = self.lock();
        inner.entries.retain(|k, _| !k.starts_with(prefix));
        if inner.in_flight > 0 {
            let epoch = inner.next_epoch();
            inner.prefix_tombstones.push((prefix.to_string(), epoch));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the stored value for `key` was fetched, if there is one.
    pub fn fetched_at(&self, key: &str) -> Option<i64> {
        self.lock().entries.get(key).map(|e| e.fetched_at_ms)
    }
}

fn ttl_ms(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// The cache namespaces the router reads through.
pub struct Caches {
    pub timetable: TtlCache<Timetable>,
    pub lesson_content: TtlCache<Vec<LessonContentItem>>,
    pub profile: TtlCache<Option<UserProfile>>,
}

impl Caches {
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            timetable: TtlCache::new(clock.clone(), capacity),
            lesson_content: TtlCache::new(clock.clone(), capacity),
            profile: TtlCache::new(clock, capacity),
        }
    }

    /// Drops every entry tied to `uid`.
    pub fn forget_user(&self, uid: &str) {
        let scope = keys::user_scope(uid);
        self.timetable.invalidate_prefix(&scope);
        self.profile.invalidate_prefix(&scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ManualClock;
    use crate::ports::PortError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    fn cache(clock: &Arc<ManualClock>) -> TtlCache<u32> {
        TtlCache::new(clock.clone(), 16)
    }

    const TTL: Duration = Duration::from_millis(30_000);

    async fn counted(calls: &AtomicUsize, value: u32) -> PortResult<u32> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[tokio::test]
    async fn serves_cached_value_within_ttl() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let calls = AtomicUsize::new(0);

        assert_eq!(cache.get("k", TTL, || counted(&calls, 1)).await, Ok(1));
        clock.advance(29_999);
        assert_eq!(cache.get("k", TTL, || counted(&calls, 2)).await, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reloads_once_ttl_has_elapsed() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let calls = AtomicUsize::new(0);

        cache.get("k", TTL, || counted(&calls, 1)).await.unwrap();
        clock.advance(30_000);
        assert_eq!(cache.get("k", TTL, || counted(&calls, 2)).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.fetched_at("k"), Some(30_000));
    }

    #[tokio::test]
    async fn invalidate_forces_a_reload() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let calls = AtomicUsize::new(0);

        cache.get("k", TTL, || counted(&calls, 1)).await.unwrap();
        cache.invalidate("k");
        assert_eq!(cache.get("k", TTL, || counted(&calls, 2)).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);

        let err = cache
            .get("k", TTL, || async { Err(PortError::Unexpected("offline".into())) })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());

        let calls = AtomicUsize::new(0);
        assert_eq!(cache.get("k", TTL, || counted(&calls, 7)).await, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prefix_invalidation_only_touches_matching_keys() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        cache.put(&keys::timetable("a"), 1);
        cache.put(&keys::profile("a"), 2);
        cache.put(&keys::timetable("ab"), 3);

        cache.invalidate_prefix(&keys::user_scope("a"));

        assert_eq!(cache.len(), 1);
        assert!(cache.fetched_at(&keys::timetable("ab")).is_some());
    }

    #[tokio::test]
    async fn load_started_before_invalidate_is_not_stored() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let (release, wait) = tokio::sync::oneshot::channel::<()>();

        let slow = cache.get("k", TTL, || async move {
            let _ = wait.await;
            Ok(1)
        });
        let writer = async {
            tokio::task::yield_now().await;
            cache.invalidate("k");
            cache.put("k", 2);
            let _ = release.send(());
        };
        let (loaded, ()) = tokio::join!(slow, writer);

        assert_eq!(loaded, Ok(1));
        let calls = AtomicUsize::new(0);
        assert_eq!(cache.get("k", TTL, || counted(&calls, 9)).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    /// A load parked inside its loader until `finish` is called.
    struct ParkedLoad {
        handle: JoinHandle<PortResult<u32>>,
        release: oneshot::Sender<()>,
    }

    impl ParkedLoad {
        async fn start(cache: &Arc<TtlCache<u32>>, key: &str, value: u32) -> Self {
            let (entered_tx, entered) = oneshot::channel();
            let (release, wait) = oneshot::channel::<()>();
            let cache = cache.clone();
            let key = key.to_string();
            let handle = tokio::spawn(async move {
                cache
                    .get(&key, TTL, move || async move {
                        let _ = entered_tx.send(());
                        let _ = wait.await;
                        Ok(value)
                    })
                    .await
            });
            entered.await.unwrap();
            Self { handle, release }
        }

        async fn finish(self) -> PortResult<u32> {
            self.release.send(()).unwrap();
            self.handle.await.unwrap()
        }
    }

    #[tokio::test]
    async fn later_started_load_wins_when_it_finishes_last() {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(cache(&clock));

        let older = ParkedLoad::start(&cache, "k", 1).await;
        clock.advance(10);
        let newer = ParkedLoad::start(&cache, "k", 2).await;

        assert_eq!(older.finish().await, Ok(1));
        assert_eq!(newer.finish().await, Ok(2));

        assert_eq!(cache.fetched_at("k"), Some(10));
        let calls = AtomicUsize::new(0);
        assert_eq!(cache.get("k", TTL, || counted(&calls, 9)).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn earlier_started_load_does_not_replace_a_newer_entry() {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(cache(&clock));

        let older = ParkedLoad::start(&cache, "k", 1).await;
        clock.advance(10);
        let newer = ParkedLoad::start(&cache, "k", 2).await;

        assert_eq!(newer.finish().await, Ok(2));
        assert_eq!(older.finish().await, Ok(1));

        assert_eq!(cache.fetched_at("k"), Some(10));
        let calls = AtomicUsize::new(0);
        assert_eq!(cache.get("k", TTL, || counted(&calls, 9)).await, Ok(2));
    }

    #[tokio::test]
    async fn load_finishing_after_prefix_invalidation_is_dropped() {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(cache(&clock));

        let departed = ParkedLoad::start(&cache, &keys::timetable("u1"), 1).await;
        cache.invalidate_prefix(&keys::user_scope("u1"));
        assert_eq!(departed.finish().await, Ok(1));

        assert!(cache.is_empty());
        assert!(cache.fetched_at(&keys::timetable("u1")).is_none());
    }

    #[tokio::test]
    async fn prefix_invalidation_spares_loads_for_other_users() {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(cache(&clock));

        let other = ParkedLoad::start(&cache, &keys::timetable("u2"), 5).await;
        cache.invalidate_prefix(&keys::user_scope("u1"));
        assert_eq!(other.finish().await, Ok(5));

        assert_eq!(cache.fetched_at(&keys::timetable("u2")), Some(0));
    }

    #[tokio::test]
    async fn evicts_least_recently_used_beyond_capacity() {
        let clock = Arc::new(ManualClock::default());
        let cache: TtlCache<u32> = TtlCache::new(clock.clone(), 2);
        let calls = AtomicUsize::new(0);

        cache.put("a", 1);
        cache.put("b", 2);
        cache.get("a", TTL, || counted(&calls, 0)).await.unwrap();
        cache.put("c", 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.fetched_at("a").is_some());
        assert!(cache.fetched_at("b").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
