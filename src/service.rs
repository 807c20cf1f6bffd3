//! The key service: the single coordinator exposing `init_db`, `open_db`,
//! `encrypt`, and `decrypt` to callers, backed by the key cache and a
//! pluggable Key Manager.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::cache::KeyCache;
use crate::codec::{self, associated_data};
use crate::config::Config;
use crate::crypto::{aead, random_key, wrap};
use crate::error::{Error, Result};
use crate::key::DbKey;

/// Identifies the database a call is for. Implementations may carry
/// arbitrary additional fields of their own; this crate never assumes any
/// field beyond `uuid`.
pub trait DbDescriptor: Send + Sync {
    fn uuid(&self) -> Uuid;
}

/// A bare UUID, useful when callers have no richer descriptor type.
impl DbDescriptor for Uuid {
    fn uuid(&self) -> Uuid {
        *self
    }
}

/// Provider-specific parameters passed to `KeyManager::init_db`. Opaque to
/// this crate.
#[derive(Debug, Clone, Default)]
pub struct InitOptions(pub serde_json::Value);

/// Error returned by a `KeyManager` backend. Opaque; the key service only
/// ever surfaces it as `Error::KeyManagerUnavailable`.
#[derive(Debug, thiserror::Error)]
#[error("key manager error: {0}")]
pub struct KeyManagerError(pub String);

/// The external Key Manager interface this crate consumes. Implementations
/// are typically a thin client over an HTTP/gRPC KMS provider; I/O and
/// retries are entirely the implementation's concern.
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// Called on creation of a new database.
    async fn init_db(
        &self,
        db: &dyn DbDescriptor,
        options: &InitOptions,
    ) -> std::result::Result<DbKey, KeyManagerError>;

    /// Called on cache miss/stale.
    async fn open_db(
        &self,
        db: &dyn DbDescriptor,
    ) -> std::result::Result<DbKey, KeyManagerError>;
}

/// The key service: the sole coordinator mediating DbKey acquisition,
/// caching, and value encryption.
///
/// Cheaply `Clone`-able; every clone shares the same cache coordinator and
/// background sweep task.
#[derive(Clone)]
pub struct KeyService {
    cache: KeyCache,
    key_manager: std::sync::Arc<dyn KeyManager>,
}

impl KeyService {
    /// Starts the cache coordinator and the periodic TTL sweep, and returns
    /// a handle bound to `key_manager`.
    pub async fn new(key_manager: std::sync::Arc<dyn KeyManager>) -> Result<Self> {
        let cache = KeyCache::spawn().await?;

        let sweep_cache = cache.clone();
        tokio::spawn(async move {
            loop {
                let period = Duration::from_secs(Config::cache_expiration_check_sec());
                tokio::time::sleep(period).await;
                match sweep_cache.sweep_expired().await {
                    Ok(removed) if removed > 0 => {
                        tracing::debug!(removed, "TTL sweep evicted expired entries");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(error = %err, "TTL sweep failed; cache coordinator may be dead");
                        break;
                    }
                }
            }
        });

        Ok(Self { cache, key_manager })
    }

    /// Calls `KeyManager::init_db` and installs the resulting DbKey into the
    /// cache. Returns `false` on Key Manager failure.
    pub async fn init_db(&self, db: &dyn DbDescriptor, options: &InitOptions) -> bool {
        match self.key_manager.init_db(db, options).await {
            Ok(db_key) => self.install(db.uuid(), db_key).await,
            Err(err) => {
                tracing::warn!(error = %err, "init_db: key manager unavailable");
                false
            }
        }
    }

    /// Calls `KeyManager::open_db` and installs the resulting DbKey into the
    /// cache. Used to warm the cache without an accompanying
    /// `encrypt`/`decrypt` call. Returns `false` on Key Manager failure.
    pub async fn open_db(&self, db: &dyn DbDescriptor) -> bool {
        match self.key_manager.open_db(db).await {
            Ok(db_key) => self.install(db.uuid(), db_key).await,
            Err(err) => {
                tracing::warn!(error = %err, "open_db: key manager unavailable");
                false
            }
        }
    }

    async fn install(&self, uuid: Uuid, db_key: DbKey) -> bool {
        match self.cache.insert(uuid, db_key).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "failed to install DbKey into cache");
                false
            }
        }
    }

    /// Encrypts `plaintext`, binding the envelope to `(db.uuid(),
    /// logical_key)`. Generates a fresh per-value key for every call.
    pub async fn encrypt(
        &self,
        db: &dyn DbDescriptor,
        logical_key: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let db_key = self.acquire_db_key(db).await?;

        let per_value_key = random_key();
        let wrapped_key = wrap::wrap(db_key.as_bytes(), &per_value_key);
        let aad = associated_data(db.uuid().as_bytes(), logical_key);
        let ciphertext_and_tag = aead::seal(&per_value_key, &aad, plaintext);

        Ok(codec::encode(&wrapped_key, &ciphertext_and_tag))
    }

    /// Decrypts an envelope produced by `encrypt` for the same `(db.uuid(),
    /// logical_key)` and an unchanged DbKey.
    pub async fn decrypt(
        &self,
        db: &dyn DbDescriptor,
        logical_key: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let db_key = self.acquire_db_key(db).await?;

        let envelope = codec::decode(ciphertext)?;
        let per_value_key =
            wrap::unwrap(db_key.as_bytes(), envelope.wrapped_key)?;
        let aad = associated_data(db.uuid().as_bytes(), logical_key);
        aead::open(&per_value_key, &aad, &envelope.ciphertext_and_tag())
    }

    /// Resolves the DbKey for `db`, consulting the cache's fast-path
    /// freshness gate first and falling back to the Key Manager on a
    /// miss/stale read.
    async fn acquire_db_key(&self, db: &dyn DbDescriptor) -> Result<DbKey> {
        let uuid = db.uuid();

        if self.cache.is_fresh(uuid) {
            if let Some(db_key) = self.cache.lookup(uuid) {
                return Ok(db_key);
            }
            // is_fresh raced a sweep that just deleted this UUID (benign,
            // see KeyCache::is_fresh docs); fall through to the Key Manager.
        }

        let db_key = self
            .key_manager
            .open_db(db)
            .await
            .map_err(|e| Error::KeyManagerUnavailable(e.to_string()))?;
        self.cache.insert(uuid, db_key.clone()).await?;
        Ok(db_key)
    }

    /// Checks whether `uuid` currently has a cache entry, reading the
    /// by-UUID index directly (the same fast path `encrypt`/`decrypt` use).
    /// Exposed for operational introspection and tests.
    pub fn is_db_cached(&self, uuid: Uuid) -> bool {
        self.cache.lookup(uuid).is_some()
    }

    /// Number of entries currently in the cache. Exposed for operational
    /// introspection and tests.
    pub fn cached_db_count(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedKeyManager {
        db_key: [u8; 32],
        open_calls: AtomicUsize,
    }

    #[async_trait]
    impl KeyManager for FixedKeyManager {
        async fn init_db(
            &self,
            _db: &dyn DbDescriptor,
            _options: &InitOptions,
        ) -> std::result::Result<DbKey, KeyManagerError> {
            Ok(DbKey::new(self.db_key))
        }

        async fn open_db(
            &self,
            _db: &dyn DbDescriptor,
        ) -> std::result::Result<DbKey, KeyManagerError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            Ok(DbKey::new(self.db_key))
        }
    }

    struct FailingKeyManager;

    #[async_trait]
    impl KeyManager for FailingKeyManager {
        async fn init_db(
            &self,
            _db: &dyn DbDescriptor,
            _options: &InitOptions,
        ) -> std::result::Result<DbKey, KeyManagerError> {
            Err(KeyManagerError("provider down".into()))
        }

        async fn open_db(
            &self,
            _db: &dyn DbDescriptor,
        ) -> std::result::Result<DbKey, KeyManagerError> {
            Err(KeyManagerError("provider down".into()))
        }
    }

    #[tokio::test]
    async fn encrypt_decrypt_round_trip() {
        let km = Arc::new(FixedKeyManager {
            db_key: [7u8; 32],
            open_calls: AtomicUsize::new(0),
        });
        let service = KeyService::new(km).await.unwrap();
        let db = Uuid::new_v4();

        let ct = service.encrypt(&db, b"name", b"hello").await.unwrap();
        assert_eq!(ct[0], 0x01);
        let pt = service.decrypt(&db, b"name", &ct).await.unwrap();
        assert_eq!(pt, b"hello");
    }

    #[tokio::test]
    async fn wrong_uuid_fails_decrypt() {
        let km = Arc::new(FixedKeyManager {
            db_key: [7u8; 32],
            open_calls: AtomicUsize::new(0),
        });
        let service = KeyService::new(km).await.unwrap();
        let db_a = Uuid::new_v4();
        let db_b = Uuid::new_v4();

        let ct = service.encrypt(&db_a, b"name", b"hello").await.unwrap();
        let err = service.decrypt(&db_b, b"name", &ct).await.unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed));
    }

    #[tokio::test]
    async fn wrong_logical_key_fails_decrypt() {
        let km = Arc::new(FixedKeyManager {
            db_key: [7u8; 32],
            open_calls: AtomicUsize::new(0),
        });
        let service = KeyService::new(km).await.unwrap();
        let db = Uuid::new_v4();

        let ct = service.encrypt(&db, b"a", b"hello").await.unwrap();
        let err = service.decrypt(&db, b"b", &ct).await.unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed));
    }

    #[tokio::test]
    async fn two_encryptions_differ() {
        let km = Arc::new(FixedKeyManager {
            db_key: [7u8; 32],
            open_calls: AtomicUsize::new(0),
        });
        let service = KeyService::new(km).await.unwrap();
        let db = Uuid::new_v4();

        let ct1 = service.encrypt(&db, b"k", b"hello").await.unwrap();
        let ct2 = service.encrypt(&db, b"k", b"hello").await.unwrap();
        assert_ne!(ct1, ct2);
    }

    #[tokio::test]
    async fn open_db_warms_cache_so_encrypt_does_not_reopen() {
        let km = Arc::new(FixedKeyManager {
            db_key: [7u8; 32],
            open_calls: AtomicUsize::new(0),
        });
        let service = KeyService::new(km.clone()).await.unwrap();
        let db = Uuid::new_v4();

        assert!(service.open_db(&db).await);
        assert_eq!(km.open_calls.load(Ordering::SeqCst), 1);

        service.encrypt(&db, b"k", b"v").await.unwrap();
        assert_eq!(km.open_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_db_then_open_db_leaves_one_entry() {
        let km = Arc::new(FixedKeyManager {
            db_key: [7u8; 32],
            open_calls: AtomicUsize::new(0),
        });
        let service = KeyService::new(km).await.unwrap();
        let db = Uuid::new_v4();

        assert!(service.init_db(&db, &InitOptions::default()).await);
        assert!(service.open_db(&db).await);
        assert_eq!(service.cache.len(), 1);
    }

    #[tokio::test]
    async fn key_manager_failure_propagates() {
        let service = KeyService::new(Arc::new(FailingKeyManager)).await.unwrap();
        let db = Uuid::new_v4();

        assert!(!service.init_db(&db, &InitOptions::default()).await);
        assert!(!service.open_db(&db).await);
        let err = service.encrypt(&db, b"k", b"v").await.unwrap_err();
        assert!(matches!(err, Error::KeyManagerUnavailable(_)));
    }

    #[tokio::test]
    async fn malformed_envelope_is_not_ciphertext() {
        let km = Arc::new(FixedKeyManager {
            db_key: [7u8; 32],
            open_calls: AtomicUsize::new(0),
        });
        let service = KeyService::new(km).await.unwrap();
        let db = Uuid::new_v4();

        let err = service.decrypt(&db, b"k", &[0u8; 10]).await.unwrap_err();
        assert!(matches!(err, Error::NotCiphertext));
    }
}
