//! Ciphertext envelope: the bit-exact framing produced by `encrypt` and
//! consumed by `decrypt`.
//!
//! ```text
//! version (1B) | wrapped_key (40B) | tag (16B) | ciphertext (remainder)
//! ```
//!
//! All fields are concatenated with no padding; `version` must be `0x01`.
//! Associated data for the inner AEAD is always `uuid || 0x00 || logical_key`
//! (see [`associated_data`]), binding the envelope to both the database
//! identity and the logical key.

use crate::crypto::{TAG_LEN, WRAPPED_KEY_LEN};
use crate::error::{Error, Result};

const VERSION: u8 = 0x01;

/// Minimum valid envelope size: `1 + 40 + 16`, i.e. a zero-length plaintext.
pub const MIN_LEN: usize = 1 + WRAPPED_KEY_LEN + TAG_LEN;

/// A parsed ciphertext envelope, borrowing from the buffer it was decoded
/// from.
pub struct Envelope<'a> {
    pub wrapped_key: &'a [u8; WRAPPED_KEY_LEN],
    pub tag: &'a [u8; TAG_LEN],
    pub ciphertext: &'a [u8],
}

/// Builds the associated-data input to AES-GCM: `uuid || 0x00 || logical_key`.
pub fn associated_data(uuid: &[u8], logical_key: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(uuid.len() + 1 + logical_key.len());
    aad.extend_from_slice(uuid);
    aad.push(0x00);
    aad.extend_from_slice(logical_key);
    aad
}

/// Serializes an envelope from its parts.
///
/// `ciphertext_and_tag` is the raw AEAD output (`ciphertext || tag`, tag
/// last) as produced by [`crate::crypto::aead::seal`]; this function splits
/// off the trailing tag and reorders it ahead of the ciphertext per the wire
/// layout above.
pub fn encode(wrapped_key: &[u8; WRAPPED_KEY_LEN], ciphertext_and_tag: &[u8]) -> Vec<u8> {
    debug_assert!(ciphertext_and_tag.len() >= TAG_LEN);
    let split = ciphertext_and_tag.len() - TAG_LEN;
    let (ciphertext, tag) = ciphertext_and_tag.split_at(split);

    let mut out = Vec::with_capacity(1 + WRAPPED_KEY_LEN + TAG_LEN + ciphertext.len());
    out.push(VERSION);
    out.extend_from_slice(wrapped_key);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    out
}

/// Parses an envelope from `buf`.
///
/// Fails with `Error::NotCiphertext` if `buf` is shorter than [`MIN_LEN`] or
/// the version byte is not `0x01`. Never panics on malformed input of any
/// length, including an empty buffer.
pub fn decode(buf: &[u8]) -> Result<Envelope<'_>> {
    if buf.len() < MIN_LEN {
        return Err(Error::NotCiphertext);
    }
    if buf[0] != VERSION {
        return Err(Error::NotCiphertext);
    }

    let wrapped_key: &[u8; WRAPPED_KEY_LEN] = buf[1..1 + WRAPPED_KEY_LEN]
        .try_into()
        .expect("slice length matches WRAPPED_KEY_LEN by construction");
    let tag_start = 1 + WRAPPED_KEY_LEN;
    let tag: &[u8; TAG_LEN] = buf[tag_start..tag_start + TAG_LEN]
        .try_into()
        .expect("slice length matches TAG_LEN by construction");
    let ciphertext = &buf[tag_start + TAG_LEN..];

    Ok(Envelope {
        wrapped_key,
        tag,
        ciphertext,
    })
}

impl<'a> Envelope<'a> {
    /// Reassembles `ciphertext || tag` for feeding into
    /// [`crate::crypto::aead::open`].
    pub fn ciphertext_and_tag(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(self.ciphertext);
        out.extend_from_slice(self.tag);
        out
    }
}
