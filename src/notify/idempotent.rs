// src/notify/idempotent.rs

//! At-most-once listener execution.
//!
//! The poller does not persist which files it has applied, so a restart
//! replays every job's control and event files and re-emits transitions the
//! previous process already dispatched. [`IdempotentListener`] absorbs those
//! replays: each logical transition is identified by [`idempotency_key`] and
//! the delegate only runs for keys the [`IdempotentStore`] has not seen.
//!
//! Marking happens before the delegate runs, through a single atomic
//! `mark_if_absent`, so two concurrent calls with the same key can never both
//! reach the delegate. If the delegate fails the key is released again so a
//! later delivery of the same transition may retry it.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::state::{Job, Transition};

use super::TransitionListener;

/// Key identifying one logical transition of one job.
pub fn idempotency_key(correlation_id: &str, transition: &Transition) -> String {
    format!(
        "{}:{}:{}:{}",
        correlation_id, transition.event, transition.from, transition.to
    )
}

/// Key -> seen store with an atomic check-and-mark.
pub trait IdempotentStore: Send + Sync {
    /// Record `key`. Returns `true` if it was not present before.
    fn mark_if_absent(&self, key: &str) -> Result<bool>;

    /// Forget `key` so that it can be marked again.
    fn release(&self, key: &str) -> Result<()>;

    fn contains(&self, key: &str) -> Result<bool>;
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps seen keys in memory only (lost on restart).
#[derive(Debug, Default)]
pub struct MemoryIdempotentStore {
    keys: Mutex<HashSet<String>>,
}

impl MemoryIdempotentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        locked(&self.keys).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdempotentStore for MemoryIdempotentStore {
    fn mark_if_absent(&self, key: &str) -> Result<bool> {
        Ok(locked(&self.keys).insert(key.to_string()))
    }

    fn release(&self, key: &str) -> Result<()> {
        locked(&self.keys).remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(locked(&self.keys).contains(key))
    }
}

/// Keys a [`FileIdempotentStore`] keeps unless told otherwise.
pub const DEFAULT_STORE_CAPACITY: usize = 1000;

/// Keeps seen keys in a file, one key per line, so suppression survives a
/// restart.
///
/// The store holds at most `capacity` keys. Past that the oldest key is
/// dropped, so only a replay of a transition older than the last `capacity`
/// dispatches can run its listener again. The file is read once on open;
/// afterwards marks are appended, and evictions and releases rewrite the
/// whole file in insertion order. All file access happens under the key lock.
#[derive(Debug)]
pub struct FileIdempotentStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    capacity: usize,
    keys: Mutex<OrderedKeys>,
}

#[derive(Debug, Clone, Default)]
struct OrderedKeys {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl OrderedKeys {
    fn push(&mut self, key: &str) -> bool {
        if !self.seen.insert(key.to_string()) {
            return false;
        }
        self.order.push_back(key.to_string());
        true
    }

    fn evict_to(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
                evicted += 1;
            }
        }
        evicted
    }

    fn remove(&mut self, key: &str) -> bool {
        if !self.seen.remove(key) {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }

    fn contents(&self) -> String {
        let mut contents = String::new();
        for key in &self.order {
            contents.push_str(key);
            contents.push('\n');
        }
        contents
    }
}

impl FileIdempotentStore {
    pub fn open(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_capacity(fs, path, DEFAULT_STORE_CAPACITY)
    }

    /// Open the store keeping at most `capacity` keys (at least one).
    pub fn open_with_capacity(
        fs: Arc<dyn FileSystem>,
        path: impl Into<PathBuf>,
        capacity: usize,
    ) -> Result<Self> {
        let path = path.into();
        let capacity = capacity.max(1);
        let mut keys = OrderedKeys::default();

        if fs.is_file(&path) {
            let contents = fs.read_to_string(&path)?;
            for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
                keys.push(line);
            }
            let evicted = keys.evict_to(capacity);
            if evicted > 0 {
                fs.write(&path, keys.contents().as_bytes())?;
            }
            info!(
                path = ?path,
                keys = keys.order.len(),
                evicted,
                "loaded idempotent keys (file)"
            );
        }

        Ok(Self {
            path,
            fs,
            capacity,
            keys: Mutex::new(keys),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        locked(&self.keys).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdempotentStore for FileIdempotentStore {
    fn mark_if_absent(&self, key: &str) -> Result<bool> {
        let mut keys = locked(&self.keys);
        if keys.seen.contains(key) {
            return Ok(false);
        }

        if keys.order.len() < self.capacity {
            self.fs.append(&self.path, format!("{key}\n").as_bytes())?;
            keys.push(key);
            return Ok(true);
        }

        let mut next = keys.clone();
        next.push(key);
        next.evict_to(self.capacity);
        self.fs.write(&self.path, next.contents().as_bytes())?;
        debug!(path = ?self.path, capacity = self.capacity, "evicted oldest idempotent key");
        *keys = next;
        Ok(true)
    }

    fn release(&self, key: &str) -> Result<()> {
        let mut keys = locked(&self.keys);
        if !keys.seen.contains(key) {
            return Ok(());
        }
        let mut next = keys.clone();
        next.remove(key);
        self.fs.write(&self.path, next.contents().as_bytes())?;
        *keys = next;
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(locked(&self.keys).seen.contains(key))
    }
}

/// Runs its delegate at most once per [`idempotency_key`].
pub struct IdempotentListener {
    delegate: Arc<dyn TransitionListener>,
    store: Arc<dyn IdempotentStore>,
}

impl IdempotentListener {
    pub fn new(delegate: Arc<dyn TransitionListener>, store: Arc<dyn IdempotentStore>) -> Self {
        Self { delegate, store }
    }
}

impl TransitionListener for IdempotentListener {
    fn on_transition(&self, job: &Job, transition: &Transition) -> Result<()> {
        let key = idempotency_key(job.correlation_id(), transition);

        if !self.store.mark_if_absent(&key)? {
            debug!(key = %key, "transition already handled; skipping listener");
            return Ok(());
        }

        if let Err(err) = self.delegate.on_transition(job, transition) {
            if let Err(release_err) = self.store.release(&key) {
                warn!(key = %key, error = %release_err, "failed to release idempotent key");
            }
            return Err(err);
        }

        Ok(())
    }
}
