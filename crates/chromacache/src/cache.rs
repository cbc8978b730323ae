//! The concurrent link cache
//!
//! One mutex guards all cache state. Two condvars hang off it:
//! `valid_cv` wakes threads waiting for an in-flight build to publish
//! (or fail), `slot_cv` wakes threads waiting for a resident entry to
//! go idle so its slot can be reclaimed. Every wait sits in a
//! predicate re-check loop; a wakeup proves nothing by itself.
//!
//! A slot is reserved (placeholder entry, `valid = false`) before the
//! engine build starts, so the capacity bound holds even mid-build.
//! The build itself runs with the mutex released; a slow engine never
//! stalls unrelated hits.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use chromacms::{BufferDesc, CmsEngine, CmsTransform, Error, LinkRequest, Result};

use crate::key::LinkKey;
use crate::stats::CacheStats;

/// Default bound on resident transforms
pub const DEFAULT_CAPACITY: usize = 50;

/// One cache-resident record
///
/// `generation` pins a checkout to the reservation it was taken
/// against: slots are recycled, and a waiter that slept through a
/// failed build must not mistake a successor entry for its own.
struct Entry {
    key: LinkKey,
    transform: Option<Arc<dyn CmsTransform>>,
    checked_out: u32,
    valid: bool,
    is_identity: bool,
    idle_at: Option<u64>,
    generation: u64,
}

struct State {
    map: HashMap<LinkKey, usize, RandomState>,
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    len: usize,
    idle_clock: u64,
    next_generation: u64,
}

struct Shared {
    state: Mutex<State>,
    /// Signaled (broadcast) when a build publishes or fails
    valid_cv: Condvar,
    /// Signaled when an entry goes idle or a reservation is rolled back
    slot_cv: Condvar,
    capacity: usize,
    wait_timeout: Option<Duration>,
    engine: Arc<dyn CmsEngine>,
    stats: CacheStats,
}

enum Outcome {
    Ready(Link),
    Retry,
    Reserved { slot: usize, generation: u64 },
}

/// Concurrent cache of built color transforms
///
/// Cheap to clone; clones share the same cache. Dropping the last
/// clone (and the last outstanding [`Link`]) tears the cache down and
/// destroys every resident transform.
#[derive(Clone)]
pub struct LinkCache {
    shared: Arc<Shared>,
}

impl LinkCache {
    /// Create a cache bounded to `capacity` resident transforms
    pub fn new(engine: Arc<dyn CmsEngine>, capacity: usize) -> Self {
        Self::build_cache(engine, capacity, None)
    }

    /// Create a cache with the default capacity bound
    pub fn with_default_capacity(engine: Arc<dyn CmsEngine>) -> Self {
        Self::build_cache(engine, DEFAULT_CAPACITY, None)
    }

    /// Create a cache whose blocking waits give up after `timeout`
    ///
    /// Both wait points are bounded: waiting for another thread's
    /// build to publish, and waiting for a slot when every resident
    /// entry is checked out. Expiry surfaces as [`Error::Timeout`].
    pub fn with_wait_timeout(
        engine: Arc<dyn CmsEngine>,
        capacity: usize,
        timeout: Duration,
    ) -> Self {
        Self::build_cache(engine, capacity, Some(timeout))
    }

    fn build_cache(
        engine: Arc<dyn CmsEngine>,
        capacity: usize,
        wait_timeout: Option<Duration>,
    ) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        LinkCache {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    map: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
                    slots: Vec::with_capacity(capacity),
                    free: Vec::new(),
                    len: 0,
                    idle_clock: 0,
                    next_generation: 0,
                }),
                valid_cv: Condvar::new(),
                slot_cv: Condvar::new(),
                capacity,
                wait_timeout,
                engine,
                stats: CacheStats::new(),
            }),
        }
    }

    /// Fetch or build the transform for `req`
    ///
    /// On a hit the resident transform is returned at once (waiting
    /// first if another thread is still building it). On a miss this
    /// thread reserves a slot, builds through the engine, publishes,
    /// and returns. The returned [`Link`] holds one checkout; the
    /// entry cannot be evicted until it is dropped.
    pub fn get_link(&self, req: &LinkRequest<'_>) -> Result<Link> {
        let key = LinkKey::for_request(req);
        loop {
            match self.lookup_or_reserve(&key)? {
                Outcome::Ready(link) => return Ok(link),
                Outcome::Retry => continue,
                Outcome::Reserved { slot, generation } => {
                    return self.build(req, key, slot, generation)
                }
            }
        }
    }

    /// Number of resident entries, including ones mid-build
    pub fn len(&self) -> usize {
        self.shared.state.lock().len
    }

    /// True when no transforms are resident
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum resident entry count
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Behavior counters
    pub fn stats(&self) -> &CacheStats {
        &self.shared.stats
    }

    fn lookup_or_reserve(&self, key: &LinkKey) -> Result<Outcome> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();

        if let Some(&slot) = state.map.get(key) {
            let generation = {
                let entry = state.slots[slot].as_mut().expect("mapped slot is live");
                entry.checked_out += 1;
                entry.idle_at = None;
                entry.generation
            };
            loop {
                match state.slots[slot].as_ref() {
                    Some(entry) if entry.generation == generation => {
                        if entry.valid {
                            let transform = entry
                                .transform
                                .clone()
                                .expect("valid entry carries a transform");
                            let is_identity = entry.is_identity;
                            shared.stats.record_hit();
                            trace!(key = key.combined(), "link cache hit");
                            return Ok(Outcome::Ready(Link {
                                shared: Arc::clone(&self.shared),
                                slot,
                                generation,
                                transform,
                                is_identity,
                            }));
                        }
                    }
                    _ => {
                        // The building thread failed and dismantled the
                        // entry; our checkout died with it. Restart the
                        // lookup, which will now observe a miss.
                        return Ok(Outcome::Retry);
                    }
                }
                let timed_out = match shared.wait_timeout {
                    Some(limit) => shared.valid_cv.wait_for(&mut state, limit).timed_out(),
                    None => {
                        shared.valid_cv.wait(&mut state);
                        false
                    }
                };
                if timed_out {
                    if let Some(entry) = state.slots[slot].as_mut() {
                        if entry.generation == generation && !entry.valid {
                            // The builder still owns a checkout, so ours
                            // cannot be the last one.
                            entry.checked_out -= 1;
                            debug_assert!(entry.checked_out > 0);
                            return Err(Error::Timeout);
                        }
                    }
                    // Resolved between expiry and re-lock; the predicate
                    // check above settles it.
                }
            }
        }

        // Miss. Reclaim a slot first if the cache is at capacity.
        let mut reclaimed = None;
        while state.len == shared.capacity {
            match oldest_idle(&state) {
                Some(victim) => {
                    let entry = state.slots[victim].take().expect("idle slot is live");
                    debug_assert_eq!(entry.checked_out, 0);
                    state.map.remove(&entry.key);
                    state.free.push(victim);
                    state.len -= 1;
                    shared.stats.record_eviction();
                    debug!(key = entry.key.combined(), "evicting idle link");
                    reclaimed = Some(entry);
                }
                None => {
                    // Every resident entry is checked out. Wait for a
                    // release, then restart the whole lookup: another
                    // thread may have built our key in the meantime.
                    let timed_out = match shared.wait_timeout {
                        Some(limit) => shared.slot_cv.wait_for(&mut state, limit).timed_out(),
                        None => {
                            shared.slot_cv.wait(&mut state);
                            false
                        }
                    };
                    if timed_out
                        && state.len == shared.capacity
                        && oldest_idle(&state).is_none()
                    {
                        return Err(Error::Timeout);
                    }
                    return Ok(Outcome::Retry);
                }
            }
        }

        // Reserve the placeholder before any engine work so the
        // capacity bound holds mid-build. checked_out starts at 1: the
        // builder's own checkout, which the returned Link takes over.
        state.next_generation += 1;
        let generation = state.next_generation;
        let slot = match state.free.pop() {
            Some(idx) => idx,
            None => {
                state.slots.push(None);
                state.slots.len() - 1
            }
        };
        state.slots[slot] = Some(Entry {
            key: *key,
            transform: None,
            checked_out: 1,
            valid: false,
            is_identity: false,
            idle_at: None,
            generation,
        });
        state.map.insert(*key, slot);
        state.len += 1;
        shared.stats.record_miss();
        drop(state);
        // Evicted transform's native handle is destroyed here, after
        // the mutex is released.
        drop(reclaimed);
        Ok(Outcome::Reserved { slot, generation })
    }

    fn build(
        &self,
        req: &LinkRequest<'_>,
        key: LinkKey,
        slot: usize,
        generation: u64,
    ) -> Result<Link> {
        let shared = &*self.shared;
        debug!(key = key.combined(), "building link");
        // Engine work happens without the cache mutex.
        let built = shared.engine.build_link(req);

        let mut state = shared.state.lock();
        match built {
            Ok(transform) => {
                let transform: Arc<dyn CmsTransform> = Arc::from(transform);
                let is_identity = key.is_identity();
                let entry = state.slots[slot].as_mut().expect("reserved slot is live");
                debug_assert_eq!(entry.generation, generation);
                entry.transform = Some(Arc::clone(&transform));
                entry.is_identity = is_identity;
                entry.valid = true;
                shared.stats.record_build();
                shared.valid_cv.notify_all();
                debug!(key = key.combined(), "published link");
                drop(state);
                Ok(Link {
                    shared: Arc::clone(&self.shared),
                    slot,
                    generation,
                    transform,
                    is_identity,
                })
            }
            Err(err) => {
                // Roll the reservation back before anyone can observe a
                // stale failed entry. Waiters re-run their lookup and
                // see a miss; one slot-waiter may take the freed slot.
                let entry = state.slots[slot].take().expect("reserved slot is live");
                debug_assert_eq!(entry.generation, generation);
                debug_assert!(entry.checked_out >= 1);
                state.map.remove(&key);
                state.free.push(slot);
                state.len -= 1;
                shared.stats.record_build_failure();
                shared.valid_cv.notify_all();
                shared.slot_cv.notify_one();
                debug!(key = key.combined(), error = %err, "link build failed");
                Err(err)
            }
        }
    }
}

impl fmt::Debug for LinkCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkCache")
            .field("len", &self.len())
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

impl Shared {
    fn release(&self, slot: usize, generation: u64) {
        let mut state = self.state.lock();
        let next_idle = state.idle_clock + 1;
        let entry = state.slots[slot]
            .as_mut()
            .expect("released link points at a live slot");
        assert_eq!(
            entry.generation, generation,
            "released link points at a recycled slot"
        );
        assert!(entry.checked_out > 0, "release without a matching checkout");
        entry.checked_out -= 1;
        trace!(
            key = entry.key.combined(),
            checked_out = entry.checked_out,
            "link released"
        );
        if entry.checked_out == 0 {
            entry.idle_at = Some(next_idle);
            state.idle_clock = next_idle;
            self.slot_cv.notify_one();
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Every Link holds an Arc to this struct, so reaching here
        // means no checkouts can remain. Verify rather than trust.
        let state = self.state.get_mut();
        for slot in state.slots.iter_mut() {
            if let Some(entry) = slot.take() {
                assert_eq!(
                    entry.checked_out, 0,
                    "link cache torn down with an outstanding checkout"
                );
            }
        }
    }
}

fn oldest_idle(state: &State) -> Option<usize> {
    let mut best: Option<(u64, usize)> = None;
    for (idx, slot) in state.slots.iter().enumerate() {
        let Some(entry) = slot else { continue };
        if entry.checked_out != 0 {
            continue;
        }
        debug_assert!(entry.valid, "idle entry must be published");
        let stamp = entry.idle_at.expect("idle entry carries a stamp");
        if best.map_or(true, |(b, _)| stamp < b) {
            best = Some((stamp, idx));
        }
    }
    best.map(|(_, idx)| idx)
}

/// One checkout of a cached transform
///
/// Holds the entry busy until dropped; while any `Link` to an entry is
/// alive, the entry cannot be evicted. `apply` may be called
/// concurrently from any number of holders.
pub struct Link {
    shared: Arc<Shared>,
    slot: usize,
    generation: u64,
    transform: Arc<dyn CmsTransform>,
    is_identity: bool,
}

impl Link {
    /// Map pixels from `src` into `dst` through the cached transform
    pub fn apply(
        &self,
        src_desc: &BufferDesc,
        src: &[u8],
        dst_desc: &BufferDesc,
        dst: &mut [u8],
    ) -> Result<()> {
        self.transform.apply(src_desc, src, dst_desc, dst)
    }

    /// Source and destination are the same color space; the caller may
    /// skip `apply` and use the source pixels directly.
    pub fn is_identity(&self) -> bool {
        self.is_identity
    }

    /// Return the checkout to the cache
    ///
    /// Equivalent to dropping the link; provided so call sites can
    /// make the hand-back explicit.
    pub fn release(self) {}
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shared.release(self.slot, self.generation);
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("slot", &self.slot)
            .field("is_identity", &self.is_identity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromacms::parser::{build_header, ColorSpace};
    use chromacms::{IccProfile, RenderingParams};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::thread;

    struct CopyTransform;

    impl CmsTransform for CopyTransform {
        fn apply(
            &self,
            _src_desc: &BufferDesc,
            src: &[u8],
            _dst_desc: &BufferDesc,
            dst: &mut [u8],
        ) -> Result<()> {
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
            Ok(())
        }
    }

    struct TestEngine {
        builds: AtomicU32,
        fail_next: AtomicU32,
        build_delay: Duration,
    }

    impl TestEngine {
        fn new() -> Arc<Self> {
            Arc::new(TestEngine {
                builds: AtomicU32::new(0),
                fail_next: AtomicU32::new(0),
                build_delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(TestEngine {
                builds: AtomicU32::new(0),
                fail_next: AtomicU32::new(0),
                build_delay: delay,
            })
        }

        fn failing(times: u32) -> Arc<Self> {
            Arc::new(TestEngine {
                builds: AtomicU32::new(0),
                fail_next: AtomicU32::new(times),
                build_delay: Duration::ZERO,
            })
        }

        fn build_count(&self) -> u32 {
            self.builds.load(Ordering::SeqCst)
        }
    }

    impl CmsEngine for TestEngine {
        fn build_link(&self, _req: &LinkRequest<'_>) -> Result<Box<dyn CmsTransform>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if !self.build_delay.is_zero() {
                thread::sleep(self.build_delay);
            }
            let remaining = self.fail_next.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_next.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::BuildFailed("induced failure".to_string()));
            }
            Ok(Box::new(CopyTransform))
        }
    }

    fn profile(tag: u8) -> IccProfile {
        let mut bytes = build_header(ColorSpace::Rgb, ColorSpace::Xyz);
        bytes.push(tag);
        IccProfile::from_bytes(bytes).unwrap()
    }

    fn request<'a>(src: &'a IccProfile, dst: &'a IccProfile) -> LinkRequest<'a> {
        LinkRequest {
            src,
            dst,
            proof: None,
            params: RenderingParams::default(),
        }
    }

    #[test]
    fn test_hit_after_release() {
        let engine = TestEngine::new();
        let cache = LinkCache::new(engine.clone(), 10);
        let src = profile(1);
        let dst = profile(2);

        let link = cache.get_link(&request(&src, &dst)).unwrap();
        drop(link);

        // Idle, not evicted: the second get is a pure hit.
        let link = cache.get_link(&request(&src, &dst)).unwrap();
        drop(link);

        assert_eq!(engine.build_count(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn test_checkout_counts_conserved() {
        let engine = TestEngine::new();
        let cache = LinkCache::new(engine, 10);
        let src = profile(1);
        let dst = profile(2);
        let key = LinkKey::for_request(&request(&src, &dst));

        let a = cache.get_link(&request(&src, &dst)).unwrap();
        let b = cache.get_link(&request(&src, &dst)).unwrap();
        let c = cache.get_link(&request(&src, &dst)).unwrap();

        let checked_out = |cache: &LinkCache| {
            let state = cache.shared.state.lock();
            let slot = state.map[&key];
            state.slots[slot].as_ref().unwrap().checked_out
        };
        assert_eq!(checked_out(&cache), 3);

        drop(b);
        assert_eq!(checked_out(&cache), 2);
        drop(a);
        drop(c);
        assert_eq!(checked_out(&cache), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_identity_flag() {
        let engine = TestEngine::new();
        let cache = LinkCache::new(engine, 10);
        let src = profile(1);
        let dst = profile(2);

        let same = cache.get_link(&request(&src, &src)).unwrap();
        assert!(same.is_identity());

        let cross = cache.get_link(&request(&src, &dst)).unwrap();
        assert!(!cross.is_identity());
    }

    #[test]
    fn test_apply_through_link() {
        let engine = TestEngine::new();
        let cache = LinkCache::new(engine, 10);
        let src = profile(1);
        let dst = profile(2);

        let link = cache.get_link(&request(&src, &dst)).unwrap();
        let desc = BufferDesc::interleaved(3, 1, 1, 2);
        let pixels = [1u8, 2, 3, 4, 5, 6];
        let mut out = [0u8; 6];
        link.apply(&desc, &pixels, &desc, &mut out).unwrap();
        assert_eq!(out, pixels);
    }

    #[test]
    fn test_concurrent_same_key_builds_once() {
        let engine = TestEngine::slow(Duration::from_millis(50));
        let cache = LinkCache::new(engine.clone(), 8);
        let src = profile(1);
        let dst = profile(2);
        let barrier = Barrier::new(4);

        thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get_link(&request(&src, &dst)).unwrap()
                    })
                })
                .collect();
            let links: Vec<Link> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            // All callers share the one transform that was built.
            for link in &links[1..] {
                assert!(Arc::ptr_eq(&links[0].transform, &link.transform));
            }
        });

        assert_eq!(engine.build_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_full_of_busy_blocks_until_release() {
        let engine = TestEngine::new();
        let cache = LinkCache::new(engine.clone(), 1);
        let p1 = profile(1);
        let p2 = profile(2);
        let dst = profile(3);

        let first = cache.get_link(&request(&p1, &dst)).unwrap();

        thread::scope(|s| {
            let cache2 = cache.clone();
            let p2 = &p2;
            let dst = &dst;
            let (tx, rx) = mpsc::channel();
            s.spawn(move || {
                let second = cache2.get_link(&request(p2, dst)).unwrap();
                tx.send(()).unwrap();
                drop(second);
            });

            // The only resident entry is checked out: the second get
            // must block rather than error or evict.
            assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

            drop(first);
            rx.recv_timeout(Duration::from_secs(5))
                .expect("second get should finish once the entry idles");
        });

        assert_eq!(engine.build_count(), 2);
        assert_eq!(cache.stats().evictions(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_oldest_idle_evicted_first() {
        let engine = TestEngine::new();
        let cache = LinkCache::new(engine.clone(), 2);
        let p1 = profile(1);
        let p2 = profile(2);
        let p3 = profile(3);
        let dst = profile(9);

        cache.get_link(&request(&p1, &dst)).unwrap().release();
        cache.get_link(&request(&p2, &dst)).unwrap().release();

        // Full of idle entries; p1 idled first and must go.
        let third = cache.get_link(&request(&p3, &dst)).unwrap();

        // p2 survived: this is a hit, no new build.
        let second = cache.get_link(&request(&p2, &dst)).unwrap();

        assert_eq!(engine.build_count(), 3);
        assert_eq!(cache.stats().evictions(), 1);
        drop(third);
        drop(second);
    }

    #[test]
    fn test_re_get_refreshes_idle_order() {
        let engine = TestEngine::new();
        let cache = LinkCache::new(engine.clone(), 2);
        let p1 = profile(1);
        let p2 = profile(2);
        let dst = profile(9);

        cache.get_link(&request(&p1, &dst)).unwrap().release();
        cache.get_link(&request(&p2, &dst)).unwrap().release();

        // Touch p1 again: p2 becomes the oldest idle entry.
        cache.get_link(&request(&p1, &dst)).unwrap().release();

        let p3 = profile(3);
        cache.get_link(&request(&p3, &dst)).unwrap().release();

        // p1 must still be resident.
        cache.get_link(&request(&p1, &dst)).unwrap().release();
        assert_eq!(engine.build_count(), 3);
    }

    #[test]
    fn test_failed_build_not_cached() {
        let engine = TestEngine::failing(1);
        let cache = LinkCache::new(engine.clone(), 10);
        let src = profile(1);
        let dst = profile(2);

        let result = cache.get_link(&request(&src, &dst));
        assert!(matches!(result, Err(Error::BuildFailed(_))));
        assert_eq!(cache.len(), 0);

        // No poisoned entry persists: the next get builds again.
        let link = cache.get_link(&request(&src, &dst)).unwrap();
        assert_eq!(engine.build_count(), 2);
        assert_eq!(cache.stats().build_failures(), 1);
        drop(link);
    }

    #[test]
    fn test_waiter_retries_after_failed_build() {
        let engine = Arc::new(TestEngine {
            builds: AtomicU32::new(0),
            fail_next: AtomicU32::new(1),
            build_delay: Duration::from_millis(50),
        });
        let cache = LinkCache::new(engine.clone(), 4);
        let src = profile(1);
        let dst = profile(2);
        let barrier = Barrier::new(2);

        let (oks, errs) = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get_link(&request(&src, &dst)).map(|l| l.release())
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            (
                results.iter().filter(|r| r.is_ok()).count(),
                results.iter().filter(|r| r.is_err()).count(),
            )
        });

        // The thread that owned the failing build surfaces the error;
        // the waiter re-enters as a fresh miss and succeeds.
        assert_eq!(oks, 1);
        assert_eq!(errs, 1);
        assert_eq!(engine.build_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_bound_under_load() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let engine = TestEngine::slow(Duration::from_millis(1));
        let cache = LinkCache::new(engine.clone(), 3);
        let profiles: Vec<IccProfile> = (0..6).map(profile).collect();
        let dst = profile(200);

        thread::scope(|s| {
            for t in 0..8usize {
                let cache = cache.clone();
                let profiles = &profiles;
                let dst = &dst;
                s.spawn(move || {
                    for i in 0..20 {
                        let src = &profiles[(t + i) % profiles.len()];
                        let link = cache.get_link(&request(src, dst)).unwrap();
                        let desc = BufferDesc::interleaved(3, 1, 1, 1);
                        let mut out = [0u8; 3];
                        link.apply(&desc, &[1, 2, 3], &desc, &mut out).unwrap();
                    }
                });
            }
        });

        assert!(cache.len() <= 3);
        // Every successful build is either resident or was evicted.
        let snap = cache.stats().snapshot();
        assert_eq!(snap.builds, snap.evictions + cache.len() as u64);
        assert_eq!(snap.build_failures, 0);
    }

    #[test]
    fn test_timeout_when_full_of_busy() {
        let engine = TestEngine::new();
        let cache =
            LinkCache::with_wait_timeout(engine, 1, Duration::from_millis(50));
        let p1 = profile(1);
        let p2 = profile(2);
        let dst = profile(3);

        let held = cache.get_link(&request(&p1, &dst)).unwrap();
        let result = cache.get_link(&request(&p2, &dst));
        assert!(matches!(result, Err(Error::Timeout)));
        drop(held);

        // With the entry idle the same get now succeeds by eviction.
        let link = cache.get_link(&request(&p2, &dst)).unwrap();
        drop(link);
    }

    #[test]
    fn test_timeout_waiting_for_validity() {
        let engine = TestEngine::slow(Duration::from_millis(400));
        let cache =
            LinkCache::with_wait_timeout(engine.clone(), 4, Duration::from_millis(50));
        let src = profile(1);
        let dst = profile(2);

        thread::scope(|s| {
            let builder = {
                let cache = cache.clone();
                let src = &src;
                let dst = &dst;
                s.spawn(move || cache.get_link(&request(src, dst)))
            };

            // Give the builder time to reserve its entry.
            thread::sleep(Duration::from_millis(100));

            let result = cache.get_link(&request(&src, &dst));
            assert!(matches!(result, Err(Error::Timeout)));

            let link = builder.join().unwrap().unwrap();
            drop(link);
        });

        // The timed-out checkout was rolled back: the entry idles and
        // can be fetched normally.
        let link = cache.get_link(&request(&src, &dst)).unwrap();
        assert_eq!(engine.build_count(), 1);
        drop(link);
    }

    #[test]
    fn test_default_capacity() {
        let cache = LinkCache::with_default_capacity(TestEngine::new());
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
        assert!(cache.is_empty());
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        let _ = LinkCache::new(TestEngine::new(), 0);
    }
}
