//! The DbKey: a 256-bit symmetric key obtained from the Key Manager.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_LEN;

/// A 256-bit symmetric key associated with one database UUID.
///
/// Opaque to the cache; zeroized on drop since it is long-lived key material
/// sitting in the by-UUID index for up to `cache_max_age_sec`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DbKey([u8; KEY_LEN]);

impl DbKey {
    /// Wraps raw key bytes as a DbKey.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrows the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DbKey").field(&"<redacted>").finish()
    }
}
