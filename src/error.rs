//! Error types surfaced by the key service.

use thiserror::Error;

/// Result type alias for key-service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced from the core.
///
/// `NotCiphertext` and `DecryptionFailed` are kept distinct from each other
/// (malformed envelope vs. a failed crypto check), but the two sub-causes of
/// `DecryptionFailed` (key-wrap integrity failure, AEAD tag mismatch) are
/// never distinguished in this type, to avoid giving a decryption oracle.
#[derive(Debug, Error)]
pub enum Error {
    /// The Key Manager backend returned a failure from `init_db`/`open_db`.
    #[error("key manager unavailable: {0}")]
    KeyManagerUnavailable(String),

    /// The ciphertext envelope is shorter than the minimum frame size or
    /// carries an unsupported version byte.
    #[error("not ciphertext")]
    NotCiphertext,

    /// Key-wrap integrity check failed, or the AEAD tag did not match.
    #[error("decryption failed")]
    DecryptionFailed,

    /// A cache invariant was violated (counter mismatch, index divergence).
    /// Indicates a bug; the coordinator should be restarted.
    #[error("cache invariant violated: {0}")]
    Invariant(String),
}
