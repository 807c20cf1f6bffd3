//! AES-256-GCM AEAD: 96-bit IV fixed to all zeros, 128-bit tag.
//!
//! The fixed IV is only safe because every call is given a key that is used
//! exactly once ([`super::random_key`] freshly generated per value). Reusing
//! a per-value key across two `seal` calls breaks AES-GCM catastrophically —
//! this invariant is a correctness contract of the caller, not something
//! this module can check.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};

use super::KEY_LEN;
use crate::error::{Error, Result};

const ZERO_NONCE: [u8; 12] = [0u8; 12];

/// Encrypts `plaintext` under `key`, authenticating `aad`.
///
/// Returns `ciphertext || tag` as produced by the underlying AEAD
/// implementation (tag last); callers that need a different field order for
/// their wire format must rearrange it themselves.
pub fn seal(key: &[u8; KEY_LEN], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(&ZERO_NONCE);
    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .expect("AES-256-GCM encryption of a well-formed payload cannot fail")
}

/// Decrypts `ciphertext_and_tag` (`ciphertext || tag`) under `key`,
/// verifying `aad`.
///
/// Fails with `DecryptionFailed` on tag mismatch; never distinguishes that
/// failure from a key-wrap integrity failure elsewhere in the call chain.
pub fn open(key: &[u8; KEY_LEN], aad: &[u8], ciphertext_and_tag: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(&ZERO_NONCE);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext_and_tag,
                aad,
            },
        )
        .map_err(|_| Error::DecryptionFailed)
}
