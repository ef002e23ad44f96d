use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use super::{CacheError, CatalogCache};
use crate::config;

const MAX_KEY_LEN: usize = 250;

/// Memcached text-protocol client that only issues `delete`.
///
/// Each request opens its own connection. Keys are spread over the server
/// list with libmemcached's default distribution (one-at-a-time hash modulo
/// the server count), so a key lands on the same server PHP's Memcached
/// client would pick for the same list.
#[derive(Debug, Clone)]
pub struct MemcachedCache {
    servers: Vec<String>,
    prefix: String,
    timeout: Duration,
}

impl MemcachedCache {
    pub fn new(servers: Vec<String>, prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            servers,
            prefix: prefix.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &config::Cache) -> Self {
        let servers = cfg
            .servers
            .iter()
            .map(|s| format!("{}:{}", s.host, s.port))
            .collect();
        Self::new(servers, cfg.prefix.clone(), Duration::from_millis(cfg.timeout_ms))
    }

    fn full_key(&self, key: &str) -> Result<String, CacheError> {
        let full = format!("{}{}", self.prefix, key);
        let bad_char = full.chars().any(|c| c.is_whitespace() || c.is_control());
        if full.is_empty() || full.len() > MAX_KEY_LEN || bad_char {
            return Err(CacheError::InvalidKey(full));
        }
        Ok(full)
    }

    fn server_for(&self, key: &str) -> Result<&str, CacheError> {
        if self.servers.is_empty() {
            return Err(CacheError::NoServers);
        }
        let idx = one_at_a_time(key.as_bytes()) as usize % self.servers.len();
        Ok(&self.servers[idx])
    }

    async fn delete_on(addr: &str, key: &str) -> Result<bool, CacheError> {
        let stream = TcpStream::connect(addr).await?;
        let mut stream = BufReader::new(stream);
        stream
            .get_mut()
            .write_all(format!("delete {key}\r\n").as_bytes())
            .await?;

        let mut line = String::new();
        stream.read_line(&mut line).await?;
        match line.trim_end() {
            "DELETED" => Ok(true),
            "NOT_FOUND" => Ok(false),
            other => Err(CacheError::Protocol(other.to_string())),
        }
    }
}

/// Jenkins one-at-a-time hash as libmemcached computes it: bytes are
/// sign-extended before mixing.
fn one_at_a_time(key: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    for &b in key {
        hash = hash.wrapping_add(b as i8 as i32 as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash.wrapping_add(hash << 15)
}

#[async_trait]
impl CatalogCache for MemcachedCache {
    #[instrument(skip(self))]
    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let full = self.full_key(key)?;
        let addr = self.server_for(&full)?;
        let removed = tokio::time::timeout(self.timeout, Self::delete_on(addr, &full))
            .await
            .map_err(|_| CacheError::Timeout(self.timeout.as_millis() as u64))??;
        debug!(key = %full, server = addr, removed, "cache entry invalidated");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(prefix: &str) -> MemcachedCache {
        MemcachedCache::new(
            vec!["127.0.0.1:1".into(), "127.0.0.1:2".into()],
            prefix,
            Duration::from_millis(50),
        )
    }

    #[test]
    fn prefix_is_prepended() {
        assert_eq!(client("app_").full_key("messages.ru:ru").unwrap(), "app_messages.ru:ru");
    }

    #[test]
    fn rejects_bad_keys() {
        let c = client("");
        assert!(matches!(c.full_key(""), Err(CacheError::InvalidKey(_))));
        assert!(matches!(c.full_key("two words"), Err(CacheError::InvalidKey(_))));
        assert!(matches!(c.full_key("line\nbreak"), Err(CacheError::InvalidKey(_))));
        let long = "k".repeat(MAX_KEY_LEN + 1);
        assert!(matches!(c.full_key(&long), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn one_at_a_time_matches_libmemcached() {
        assert_eq!(one_at_a_time(b"a"), 0xca2e9442);
        assert_eq!(
            one_at_a_time(b"The quick brown fox jumps over the lazy dog"),
            0x519e91f5
        );
        assert_eq!(one_at_a_time(b"messages.ru:ru"), 0xa664d424);
        assert_eq!(one_at_a_time("сайт.ru:ru".as_bytes()), 0x915b3ec1);
    }

    #[test]
    fn keys_route_to_fixed_servers() {
        let two = client("");
        assert_eq!(two.server_for("messages.ru:ru").unwrap(), "127.0.0.1:1");
        assert_eq!(two.server_for("site.ua:ua").unwrap(), "127.0.0.1:2");

        let three = MemcachedCache::new(
            vec!["a:11211".into(), "b:11211".into(), "c:11211".into()],
            "app:",
            Duration::from_millis(50),
        );
        assert_eq!(three.server_for("messages.ru:ru").unwrap(), "b:11211");
        assert_eq!(three.server_for("site.ua:ua").unwrap(), "a:11211");
        let full = three.full_key("messages.ru:ru").unwrap();
        assert_eq!(three.server_for(&full).unwrap(), "b:11211");
    }

    #[tokio::test]
    async fn no_servers_is_an_error() {
        let c = MemcachedCache::new(Vec::new(), "", Duration::from_millis(50));
        assert!(matches!(c.remove("k").await, Err(CacheError::NoServers)));
    }
}
