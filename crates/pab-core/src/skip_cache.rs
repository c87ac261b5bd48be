//! Time-bounded set of skipped candidate ids.
//!
//! Lookups treat expired entries as absent, so correctness does not depend on
//! the sweeper; the sweeper only keeps memory bounded. A TTL too large to
//! represent as an `Instant` makes entries permanent.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_SKIP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Debug)]
pub struct SkipCache {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    ttl: Duration,
    /// `None` = never expires.
    entries: Mutex<HashMap<String, Option<Instant>>>,
}

impl Default for SkipCache {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_TTL)
    }
}

impl SkipCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Option<Instant>>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, id: &str) {
        self.insert_at(id, Instant::now());
    }

    /// Insert (or refresh) `id`, expiring `ttl` after `now`.
    pub fn insert_at(&self, id: &str, now: Instant) {
        let expires_at = now.checked_add(self.inner.ttl);
        self.entries().insert(id.to_string(), expires_at);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.contains_at(id, Instant::now())
    }

    pub fn contains_at(&self, id: &str, now: Instant) -> bool {
        self.entries()
            .get(id)
            .map(|expires_at| is_live(expires_at, now))
            .unwrap_or(false)
    }

    /// Number of live entries at `now`.
    pub fn len_at(&self, now: Instant) -> usize {
        self.entries().values().filter(|exp| is_live(exp, now)).count()
    }

    pub fn len(&self) -> usize {
        self.len_at(Instant::now())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, expires_at| is_live(expires_at, now));
        before - entries.len()
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Spawn the background expiry sweep. Stops when `cancel` fires.
    pub fn spawn_sweeper(&self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tokio::select! {
                  _ = cancel.cancelled() => break,
                  _ = tick.tick() => {
                    let removed = cache.purge_expired();
                    if removed > 0 {
                      tracing::debug!(removed, "expired skip entries purged");
                    }
                  }
                }
            }
        })
    }
}

fn is_live(expires_at: &Option<Instant>, now: Instant) -> bool {
    expires_at.map_or(true, |at| at > now)
}
