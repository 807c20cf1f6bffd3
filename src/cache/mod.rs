//! The key cache: a concurrent map of UUID → DbKey, bounded by size and TTL.
//!
//! Three indexes (see [`entry::CacheEntry`] and the module-level invariants
//! in the crate docs):
//!
//! - **by-UUID** (`DashMap<Uuid, CacheEntry>`): the primary index, read by
//!   [`KeyCache::lookup`] without coordinating with the writer task.
//! - **freshness** (`DashMap<Uuid, i64>`): a lock-light projection of
//!   `expires_at`, read by [`KeyCache::is_fresh`] — the fast-path gate for
//!   `encrypt`/`decrypt`.
//! - **by-recency** (`BTreeMap<u64, Uuid>`): private to the coordinator
//!   task; gives it an O(log n) LRU victim lookup. Never read from outside.
//!
//! All writes (`insert`, the recency bump, `sweep_expired`) funnel through a
//! single coordinator task reached over an `mpsc` channel, so writes for the
//! same UUID are totally ordered. Reads may race a writer in flight; that
//! race is benign (see `KeyCache::lookup` and `is_fresh`).

pub mod entry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::{Config, LAST_ACCESSED_INACTIVITY_SEC};
use crate::error::{Error, Result};
use crate::key::DbKey;
use entry::{now, CacheEntry};

/// How long `KeyCache::spawn` waits for the coordinator task to report
/// readiness before giving up.
const COORDINATOR_READY_GRACE: Duration = Duration::from_secs(60);

/// Idle timeout between coordinator requests; used only to keep the
/// coordinator loop observably alive (a heartbeat, not a correctness
/// mechanism — see crate-level concurrency docs).
const COORDINATOR_IDLE_HEARTBEAT: Duration = Duration::from_secs(10);

const WRITE_CHANNEL_CAPACITY: usize = 1024;

enum WriteCmd {
    Insert {
        uuid: Uuid,
        db_key: DbKey,
        reply: oneshot::Sender<Result<()>>,
    },
    Bump {
        uuid: Uuid,
    },
    Sweep {
        reply: oneshot::Sender<Result<usize>>,
    },
}

/// Handle to the key cache. Cheaply `Clone`-able; every clone shares the
/// same underlying indexes and coordinator task.
#[derive(Clone)]
pub struct KeyCache {
    by_uuid: Arc<DashMap<Uuid, CacheEntry>>,
    freshness: Arc<DashMap<Uuid, i64>>,
    writer: mpsc::Sender<WriteCmd>,
}

impl KeyCache {
    /// Spawns the coordinator task and returns a handle to it.
    ///
    /// Waits up to 60 s for the coordinator to report readiness; this is a
    /// generous grace for process startup, not a steady-state latency bound.
    pub async fn spawn() -> Result<Self> {
        let by_uuid = Arc::new(DashMap::new());
        let freshness = Arc::new(DashMap::new());
        let (tx, rx) = mpsc::channel(WRITE_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();

        let coordinator = Coordinator {
            by_uuid: by_uuid.clone(),
            freshness: freshness.clone(),
            by_recency: BTreeMap::new(),
            next_counter: 0,
        };
        tokio::spawn(coordinator.run(rx, ready_tx));

        tokio::time::timeout(COORDINATOR_READY_GRACE, ready_rx)
            .await
            .map_err(|_| Error::Invariant("cache coordinator did not become ready".into()))?
            .map_err(|_| Error::Invariant("cache coordinator dropped readiness signal".into()))?;

        Ok(Self {
            by_uuid,
            freshness,
            writer: tx,
        })
    }

    /// Inserts (or replaces) the entry for `uuid`.
    ///
    /// If an entry for `uuid` already exists it is deleted first. Evicts
    /// the LRU entry afterwards if the cache limit was crossed.
    pub async fn insert(&self, uuid: Uuid, db_key: DbKey) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.writer
            .send(WriteCmd::Insert {
                uuid,
                db_key,
                reply,
            })
            .await
            .map_err(|_| Error::Invariant("cache coordinator is not running".into()))?;
        rx.await
            .map_err(|_| Error::Invariant("cache coordinator dropped the reply".into()))?
    }

    /// Reads the by-UUID index. May race a concurrent writer; that race is
    /// benign (see module docs).
    ///
    /// On a hit, if the entry hasn't been touched in more than
    /// `LAST_ACCESSED_INACTIVITY_SEC` seconds, schedules a best-effort
    /// recency bump (lost bumps — e.g. the entry is concurrently evicted —
    /// are acceptable).
    pub fn lookup(&self, uuid: Uuid) -> Option<DbKey> {
        let entry = self.by_uuid.get(&uuid)?;
        let db_key = entry.db_key.clone();
        let last_accessed = entry.last_accessed;
        drop(entry);

        if now() - last_accessed > LAST_ACCESSED_INACTIVITY_SEC {
            // Best-effort: a full channel or a dead coordinator just means
            // we lose this bump, which is an accepted trade per spec.
            let _ = self.writer.try_send(WriteCmd::Bump { uuid });
        }

        Some(db_key)
    }

    /// Fast-path freshness gate: `true` iff an `expires_at` is recorded for
    /// `uuid` and it hasn't passed. Reads the freshness index directly,
    /// without coordinating with the writer task — so it may briefly read
    /// `true` for a UUID a sweep just deleted; callers must treat this as
    /// advisory and fall back to `lookup`/the Key Manager on a subsequent
    /// miss.
    pub fn is_fresh(&self, uuid: Uuid) -> bool {
        self.freshness
            .get(&uuid)
            .map(|expires_at| *expires_at >= now())
            .unwrap_or(false)
    }

    /// Deletes every entry whose `expires_at <= now` from all three
    /// indexes. Returns the number of entries removed.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.writer
            .send(WriteCmd::Sweep { reply })
            .await
            .map_err(|_| Error::Invariant("cache coordinator is not running".into()))?;
        rx.await
            .map_err(|_| Error::Invariant("cache coordinator dropped the reply".into()))?
    }

    /// Current number of entries in the by-UUID index. Exposed for tests
    /// and operational introspection.
    pub fn len(&self) -> usize {
        self.by_uuid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uuid.is_empty()
    }
}

/// Owns the by-recency index and drives all cache writes. The sole writer
/// of all three indexes; reads of by-UUID/freshness may race it freely.
struct Coordinator {
    by_uuid: Arc<DashMap<Uuid, CacheEntry>>,
    freshness: Arc<DashMap<Uuid, i64>>,
    by_recency: BTreeMap<u64, Uuid>,
    next_counter: u64,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::Receiver<WriteCmd>, ready: oneshot::Sender<()>) {
        let _ = ready.send(());

        loop {
            match tokio::time::timeout(COORDINATOR_IDLE_HEARTBEAT, rx.recv()).await {
                Ok(Some(cmd)) => self.handle(cmd),
                Ok(None) => {
                    tracing::debug!("cache coordinator channel closed, shutting down");
                    break;
                }
                Err(_) => {
                    // Idle heartbeat: nothing to do, just loop again so the
                    // task stays observably alive.
                    continue;
                }
            }
        }
    }

    fn handle(&mut self, cmd: WriteCmd) {
        match cmd {
            WriteCmd::Insert {
                uuid,
                db_key,
                reply,
            } => {
                let result = self.insert(uuid, db_key);
                let _ = reply.send(result);
            }
            WriteCmd::Bump { uuid } => self.bump(uuid),
            WriteCmd::Sweep { reply } => {
                let result = self.sweep();
                let _ = reply.send(result);
            }
        }
    }

    fn next_counter(&mut self) -> u64 {
        let c = self.next_counter;
        self.next_counter += 1;
        c
    }

    fn insert(&mut self, uuid: Uuid, db_key: DbKey) -> Result<()> {
        self.delete(uuid);

        let t = now();
        let counter = self.next_counter();
        let entry = CacheEntry {
            uuid,
            db_key,
            counter,
            last_accessed: t,
            expires_at: t + Config::cache_max_age_sec(),
        };

        self.freshness.insert(uuid, entry.expires_at);
        self.by_recency.insert(counter, uuid);
        self.by_uuid.insert(uuid, entry);

        let limit = Config::cache_limit();
        if self.by_uuid.len() > limit {
            self.evict_lru()?;
        }
        Ok(())
    }

    fn evict_lru(&mut self) -> Result<()> {
        let Some((&victim_counter, &victim_uuid)) = self.by_recency.iter().next() else {
            return Err(Error::Invariant(
                "cache over limit but by-recency index is empty".into(),
            ));
        };
        self.by_recency.remove(&victim_counter);
        self.freshness.remove(&victim_uuid);
        self.by_uuid.remove(&victim_uuid);
        tracing::debug!(uuid = %victim_uuid, "evicted LRU cache entry");
        Ok(())
    }

    fn bump(&mut self, uuid: Uuid) {
        // Best-effort: if the entry was concurrently evicted or re-inserted,
        // there is nothing to bump (spec: "losing a bump ... is acceptable").
        let Some(mut entry) = self.by_uuid.get_mut(&uuid) else {
            return;
        };
        self.by_recency.remove(&entry.counter);
        let counter = self.next_counter();
        entry.counter = counter;
        entry.last_accessed = now();
        self.by_recency.insert(counter, uuid);
        // expires_at is untouched by a bump.
    }

    fn delete(&mut self, uuid: Uuid) {
        if let Some((_, entry)) = self.by_uuid.remove(&uuid) {
            self.by_recency.remove(&entry.counter);
            self.freshness.remove(&uuid);
        }
    }

    fn sweep(&mut self) -> Result<usize> {
        let t = now();
        let stale: Vec<(u64, Uuid)> = self
            .by_recency
            .iter()
            .filter(|(_, uuid)| {
                self.by_uuid
                    .get(*uuid)
                    .map(|e| e.expires_at <= t)
                    .unwrap_or(false)
            })
            .map(|(&counter, &uuid)| (counter, uuid))
            .collect();

        let mut by_recency_removed = 0;
        let mut by_uuid_removed = 0;
        let mut freshness_removed = 0;

        for (counter, uuid) in &stale {
            if self.by_recency.remove(counter).is_some() {
                by_recency_removed += 1;
            }
            if self.by_uuid.remove(uuid).is_some() {
                by_uuid_removed += 1;
            }
            if self.freshness.remove(uuid).is_some() {
                freshness_removed += 1;
            }
        }

        if by_recency_removed != by_uuid_removed || by_uuid_removed != freshness_removed {
            let msg = format!(
                "sweep deletion counts diverged: by_recency={by_recency_removed} by_uuid={by_uuid_removed} freshness={freshness_removed}"
            );
            tracing::error!("{msg}");
            return Err(Error::Invariant(msg));
        }

        Ok(by_uuid_removed)
    }
}
