//! Invalidation hook for the external catalogue cache.
//!
//! The surrounding i18n layer caches loaded catalogues under
//! `"<variant>:<culture>"`. This crate never reads that cache; it only drops
//! entries after a catalogue changes.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config;

pub mod memcached;

pub use memcached::MemcachedCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache request timed out after {0} ms")]
    Timeout(u64),
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),
    #[error("unexpected cache reply: {0}")]
    Protocol(String),
    #[error("no cache servers configured")]
    NoServers,
}

#[async_trait]
pub trait CatalogCache: Send + Sync {
    /// Drop `key`. Returns whether an entry was present.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;
}

/// Cache key used for a catalogue variant, e.g. `messages.ru:ru`.
pub fn variant_key(variant: &str, culture: &str) -> String {
    format!("{variant}:{culture}")
}

/// Build the configured cache, or `None` when invalidation is disabled.
pub fn from_config(cfg: &config::Cache) -> Option<Arc<dyn CatalogCache>> {
    if !cfg.enabled {
        return None;
    }
    Some(Arc::new(MemcachedCache::from_config(cfg)))
}
