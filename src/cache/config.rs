//! Cache configuration and startup errors.

use serde::Deserialize;
use thiserror::Error;

/// Upper bound for `num_counters`; beyond this the backing map's pre-allocation
/// stops being a sizing hint and becomes a memory hazard.
const MAX_COUNTERS: u64 = 1 << 32;

/// Errors raised while building the cache. These are fatal at startup; no
/// per-request operation returns them.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    #[error("failed to parse cache configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Response cache settings.
///
/// Every field has a default, so a partial document (or `{}`) is valid.
///
/// # Examples
///
/// ```
/// use render_cache::cache::CacheConfig;
///
/// let config = CacheConfig::from_json(r#"{ "expiration": 300 }"#).unwrap();
/// assert!(config.enable);
/// assert_eq!(config.expiration, 300);
/// assert_eq!(config.max_cost, 20_000_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CacheConfig {
    /// When `false` the store never retains anything and the middleware passes
    /// every request straight through.
    pub enable: bool,
    /// Global default expiration in seconds, used for synthesized `Cache-Control`.
    pub expiration: u32,
    /// Maximum total cost (approximate bytes) retained by the store.
    pub max_cost: u64,
    /// Expected number of tracked keys, roughly ten times the number of entries
    /// held when full.
    pub num_counters: u64,
    /// Size of the per-shard access buffers.
    pub buffer_items: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable: true,
            expiration: 600,
            // 4 000 items of ~5 KB
            max_cost: 20 * 1000 * 1000,
            num_counters: 40 * 1000,
            buffer_items: 64,
        }
    }
}

impl CacheConfig {
    /// Parse a configuration from JSON and validate it.
    ///
    /// # Errors
    ///
    /// [`CacheError::Parse`] for malformed JSON, [`CacheError::InvalidConfig`]
    /// for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// A configuration with caching turned off.
    pub fn disabled() -> Self {
        Self {
            enable: false,
            ..Self::default()
        }
    }

    /// Check the sizing parameters.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), CacheError> {
        validate_sizing(self.max_cost, self.num_counters, self.buffer_items)
    }
}

pub(crate) fn validate_sizing(
    max_cost: u64,
    num_counters: u64,
    buffer_items: usize,
) -> Result<(), CacheError> {
    if max_cost == 0 {
        return Err(CacheError::InvalidConfig {
            field: "max_cost",
            reason: "must be greater than zero",
        });
    }
    if num_counters == 0 {
        return Err(CacheError::InvalidConfig {
            field: "num_counters",
            reason: "must be greater than zero",
        });
    }
    if num_counters > MAX_COUNTERS {
        return Err(CacheError::InvalidConfig {
            field: "num_counters",
            reason: "must not exceed 2^32",
        });
    }
    if buffer_items == 0 {
        return Err(CacheError::InvalidConfig {
            field: "buffer_items",
            reason: "must be greater than zero",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CacheConfig::from_json("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn disabled_keeps_sizing_defaults() {
        let config = CacheConfig::from_json(r#"{ "enable": false }"#).unwrap();
        assert!(!config.enable);
        assert_eq!(config.buffer_items, 64);
    }

    #[test]
    fn zero_max_cost_is_rejected() {
        let err = CacheConfig::from_json(r#"{ "max_cost": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            CacheError::InvalidConfig {
                field: "max_cost",
                ..
            }
        ));
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let config = CacheConfig {
            buffer_items: 0,
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = CacheConfig::from_json("{ expiration: ").unwrap_err();
        assert!(matches!(err, CacheError::Parse(_)));
    }
}
