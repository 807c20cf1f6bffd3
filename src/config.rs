//! Configuration for the key cache.
//!
//! Three tunables live under the `aegis` namespace as environment variables
//! (`AEGIS_CACHE_LIMIT`, `AEGIS_CACHE_MAX_AGE_SEC`,
//! `AEGIS_CACHE_EXPIRATION_CHECK_SEC`). Each is read fresh on every call —
//! not parsed once and cached — so operators can retune a running process.
//! No other configuration is consumed by the core.

use serde::Deserialize;

/// Max entries in the by-UUID cache index.
pub const DEFAULT_CACHE_LIMIT: usize = 100_000;
/// TTL of a cache entry from insert, in seconds.
pub const DEFAULT_CACHE_MAX_AGE_SEC: i64 = 1_800;
/// Period between TTL sweeps, in seconds.
pub const DEFAULT_CACHE_EXPIRATION_CHECK_SEC: u64 = 10;

/// Compile-time threshold: a `lookup` more than this many seconds after the
/// last recency bump schedules a new one.
pub const LAST_ACCESSED_INACTIVITY_SEC: i64 = 10;

#[derive(Debug, Clone, Deserialize)]
struct Tunables {
    #[serde(default = "default_cache_limit")]
    cache_limit: usize,
    #[serde(default = "default_cache_max_age_sec")]
    cache_max_age_sec: i64,
    #[serde(default = "default_cache_expiration_check_sec")]
    cache_expiration_check_sec: u64,
}

fn default_cache_limit() -> usize {
    DEFAULT_CACHE_LIMIT
}
fn default_cache_max_age_sec() -> i64 {
    DEFAULT_CACHE_MAX_AGE_SEC
}
fn default_cache_expiration_check_sec() -> u64 {
    DEFAULT_CACHE_EXPIRATION_CHECK_SEC
}

fn load() -> Tunables {
    let built = config::Config::builder()
        .set_default("cache_limit", DEFAULT_CACHE_LIMIT as i64)
        .and_then(|b| b.set_default("cache_max_age_sec", DEFAULT_CACHE_MAX_AGE_SEC))
        .and_then(|b| {
            b.set_default(
                "cache_expiration_check_sec",
                DEFAULT_CACHE_EXPIRATION_CHECK_SEC as i64,
            )
        })
        .and_then(|b| {
            b.add_source(
                config::Environment::with_prefix("AEGIS").try_parsing(true),
            )
            .build()
        });

    match built.and_then(|c| c.try_deserialize::<Tunables>()) {
        Ok(tunables) => tunables,
        Err(err) => {
            tracing::warn!(error = %err, "falling back to default cache tunables");
            Tunables {
                cache_limit: DEFAULT_CACHE_LIMIT,
                cache_max_age_sec: DEFAULT_CACHE_MAX_AGE_SEC,
                cache_expiration_check_sec: DEFAULT_CACHE_EXPIRATION_CHECK_SEC,
            }
        }
    }
}

/// Reads the three cache tunables, namespaced under `aegis`.
pub struct Config;

impl Config {
    /// Max entries in the by-UUID cache index.
    pub fn cache_limit() -> usize {
        load().cache_limit
    }

    /// TTL of a cache entry from insert, in seconds.
    pub fn cache_max_age_sec() -> i64 {
        load().cache_max_age_sec
    }

    /// Period between TTL sweeps, in seconds.
    pub fn cache_expiration_check_sec() -> u64 {
        load().cache_expiration_check_sec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial(aegis_env)]
    fn defaults_apply_when_unset() {
        assert_eq!(Config::cache_limit(), DEFAULT_CACHE_LIMIT);
        assert_eq!(Config::cache_max_age_sec(), DEFAULT_CACHE_MAX_AGE_SEC);
        assert_eq!(
            Config::cache_expiration_check_sec(),
            DEFAULT_CACHE_EXPIRATION_CHECK_SEC
        );
    }
}
