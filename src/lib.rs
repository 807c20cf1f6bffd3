//! aegis: per-database encryption key service.
//!
//! Obtains a per-database wrapping key (the DbKey) from a pluggable
//! [`service::KeyManager`], caches it in-process, and uses it to wrap fresh
//! per-value keys and authenticate-and-encrypt values bound to a
//! `(database uuid, logical key)` identity.
//!
//! Entry point: [`service::KeyService`]. See the crate's `SPEC_FULL.md` for
//! the full design.

pub mod cache;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod key;
pub mod service;

pub use error::{Error, Result};
pub use key::DbKey;
pub use service::{DbDescriptor, InitOptions, KeyManager, KeyManagerError, KeyService};
