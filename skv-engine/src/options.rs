//! # Construction Options
//!
//! All configuration is applied at build time through `CacheBuilder`;
//! there is no environment or file configuration. The defaults follow
//! the cache's operating profile: a 30 second default TTL, full keys
//! bounded at 256 bytes for routing, a 100ms clock (and wheel tick),
//! and a 2^14-bucket wheel.

use std::time::Duration;

use skv_common::{long_hash, short_hash, KeyHashFn, OptionsError};

use crate::cache::{Cache, ExpiredHook};

pub(crate) const DEFAULT_EXPIRATION: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_MAX_KEY_LEN: usize = 256;
pub(crate) const DEFAULT_CLOCK_INTERVAL: Duration = Duration::from_millis(100);

/// Builder for [`Cache`].
pub struct CacheBuilder<V> {
    pub(crate) default_expiration: Duration,
    pub(crate) hook: Option<ExpiredHook<V>>,
    pub(crate) max_key_len: usize,
    pub(crate) clock_interval: Duration,
    pub(crate) wheel_bits: u32,
    pub(crate) short_hasher: KeyHashFn,
    pub(crate) long_hasher: KeyHashFn,
}

impl<V> std::fmt::Debug for CacheBuilder<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("default_expiration", &self.default_expiration)
            .field("max_key_len", &self.max_key_len)
            .field("clock_interval", &self.clock_interval)
            .field("wheel_bits", &self.wheel_bits)
            .finish()
    }
}

impl<V> Default for CacheBuilder<V> {
    fn default() -> Self {
        CacheBuilder {
            default_expiration: DEFAULT_EXPIRATION,
            hook: None,
            max_key_len: DEFAULT_MAX_KEY_LEN,
            clock_interval: DEFAULT_CLOCK_INTERVAL,
            wheel_bits: crate::wheel::DEFAULT_WHEEL_BITS,
            short_hasher: short_hash,
            long_hasher: long_hash,
        }
    }
}

impl<V> CacheBuilder<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default TTL applied by `set`; `Duration::ZERO` disables
    /// default expiration.
    pub fn default_expiration(mut self, ttl: Duration) -> Self {
        self.default_expiration = ttl;
        self
    }

    /// Same as [`default_expiration`](Self::default_expiration) but
    /// parsed from a human-readable string such as `"1h30m"`.
    pub fn default_expiration_str(self, ttl: &str) -> Result<Self, OptionsError> {
        if ttl.is_empty() {
            return Ok(self);
        }
        let parsed = humantime::parse_duration(ttl).map_err(|err| OptionsError::InvalidDuration {
            input: ttl.to_string(),
            reason: err.to_string(),
        })?;
        Ok(self.default_expiration(parsed))
    }

    /// Registers the expiration hook and enables hook mode.
    pub fn expired_hook(mut self, hook: impl Fn(&str, V) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Bound on the key bytes consumed by the shard router; 0 routes
    /// on the full key.
    pub fn max_key_len(mut self, bytes: usize) -> Self {
        self.max_key_len = bytes;
        self
    }

    /// Background clock refresh period; also the timing-wheel tick.
    pub fn clock_interval(mut self, interval: Duration) -> Self {
        self.clock_interval = interval;
        self
    }

    /// log2 of the timing-wheel bucket count; 0 selects the default.
    pub fn timing_wheel_bits(mut self, bits: u32) -> Self {
        self.wheel_bits = bits;
        self
    }

    /// Overrides the short-key hash primitive (keys of 2..=32 bytes).
    pub fn short_hasher(mut self, hasher: KeyHashFn) -> Self {
        self.short_hasher = hasher;
        self
    }

    /// Overrides the long-key hash primitive (keys over 32 bytes).
    pub fn long_hasher(mut self, hasher: KeyHashFn) -> Self {
        self.long_hasher = hasher;
        self
    }

    /// Builds the cache and starts its clock. The reaper is not
    /// started here; see [`Cache::start_expired`].
    pub fn build(self) -> Cache<V> {
        Cache::from_builder(self)
    }
}
