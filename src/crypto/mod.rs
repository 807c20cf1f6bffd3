//! Cryptographic primitives: AES key wrap and AES-GCM AEAD.
//!
//! Everything here is CPU-bound and non-blocking; there is no I/O in this
//! module. Correctness of the whole service rests on one contract: the
//! per-value key passed to [`aead::seal`]/[`aead::open`] must be freshly
//! random on every call, since the IV is fixed to all zeros (see
//! [`aead`] docs).

pub mod aead;
pub mod wrap;

/// Width of a DbKey / per-value key, in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Width of an RFC 3394 wrapped 256-bit key, in bytes (320 bits).
pub const WRAPPED_KEY_LEN: usize = 40;

/// Width of an AES-GCM tag, in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Generates a fresh, cryptographically random 256-bit key.
///
/// Must be called exactly once per AEAD operation — see the module-level
/// warning above. Never cache or reuse the result.
pub fn random_key() -> [u8; KEY_LEN] {
    use aes_gcm::aead::{rand_core::RngCore, OsRng};
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}
