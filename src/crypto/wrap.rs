//! RFC 3394 AES key wrap: wraps a 256-bit key under a 256-bit KEK.

use aes_kw::KekAes256;
use generic_array::GenericArray;

use super::{KEY_LEN, WRAPPED_KEY_LEN};
use crate::error::{Error, Result};

/// Wraps `key` (256 bits) under `kek` (the DbKey, 256 bits), producing 320
/// bits of ciphertext.
pub fn wrap(kek: &[u8; KEY_LEN], key: &[u8; KEY_LEN]) -> [u8; WRAPPED_KEY_LEN] {
    let kek = KekAes256::new(GenericArray::from_slice(kek));
    let mut out = [0u8; WRAPPED_KEY_LEN];
    // Only fails if `key`'s length isn't a multiple of 8 bytes, which it
    // always is here (32 bytes).
    kek.wrap(key, &mut out)
        .expect("wrapping a 256-bit key under a 256-bit KEK cannot fail");
    out
}

/// Unwraps a 320-bit wrapped blob under `kek`, returning the 256-bit key.
///
/// Fails the integrity check (and returns `DecryptionFailed`, not a more
/// specific error, to avoid a decryption oracle) if `wrapped` was not
/// produced by [`wrap`] under the same `kek`.
pub fn unwrap(kek: &[u8; KEY_LEN], wrapped: &[u8; WRAPPED_KEY_LEN]) -> Result<[u8; KEY_LEN]> {
    let kek = KekAes256::new(GenericArray::from_slice(kek));
    let mut out = [0u8; KEY_LEN];
    kek.unwrap(wrapped, &mut out)
        .map_err(|_| Error::DecryptionFailed)?;
    Ok(out)
}
