//! Sharded per-aggregate write locks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const SHARDS: usize = 64;

/// A fixed set of mutexes keyed by aggregate id.
///
/// Held around append + projection so that one aggregate's events are
/// projected in version order. Different aggregates almost always land on
/// different shards and proceed in parallel.
pub(crate) struct AggregateLocks {
    shards: Vec<Mutex<()>>,
}

/// Guards for one or more shards, released on drop.
pub(crate) struct LockSet<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}

impl AggregateLocks {
    pub(crate) fn new() -> Self {
        AggregateLocks {
            shards: (0..SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard(id: Uuid) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() as usize) % SHARDS
    }

    pub(crate) fn lock(&self, id: Uuid) -> LockSet<'_> {
        self.lock_many(&[id])
    }

    /// Lock every shard covering `ids`, in ascending shard order so that
    /// concurrent multi-aggregate commands cannot deadlock.
    pub(crate) fn lock_many(&self, ids: &[Uuid]) -> LockSet<'_> {
        let mut shards: Vec<usize> = ids.iter().map(|id| Self::shard(*id)).collect();
        shards.sort_unstable();
        shards.dedup();
        self.acquire(shards)
    }

    /// Lock every shard; no command can be mid-commit while held.
    pub(crate) fn lock_all(&self) -> LockSet<'_> {
        self.acquire((0..SHARDS).collect())
    }

    fn acquire(&self, shards: Vec<usize>) -> LockSet<'_> {
        let guards = shards
            .into_iter()
            .map(|i| self.shards[i].lock().unwrap_or_else(PoisonError::into_inner))
            .collect();
        LockSet { _guards: guards }
    }
}
