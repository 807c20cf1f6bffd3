//! A single cache entry and its place in the recency ordering.

use uuid::Uuid;

use crate::key::DbKey;

/// One entry in the key cache.
///
/// `counter` totally orders entries by recency (insert or bump time); it is
/// the LRU eviction key, not `last_accessed`, because two entries can share
/// a wall-clock second but never a `counter`.
#[derive(Clone)]
pub struct CacheEntry {
    pub uuid: Uuid,
    pub db_key: DbKey,
    pub counter: u64,
    pub last_accessed: i64,
    pub expires_at: i64,
}

/// Wall-clock seconds since the epoch, used for all cache bookkeeping.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
