use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use i18n_catalog::cache::{CacheError, CatalogCache, MemcachedCache};
use i18n_catalog::db;
use i18n_catalog::{MessageSource, VariantPolicy};

#[derive(Clone, Default)]
struct RecordingCache {
    removed: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingCache {
    async fn removed(&self) -> Vec<String> {
        self.removed.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl CatalogCache for RecordingCache {
    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        self.removed.lock().await.push(key.to_string());
        if self.fail {
            return Err(CacheError::Protocol("SERVER_ERROR".into()));
        }
        Ok(true)
    }
}

async fn setup_source(cache: RecordingCache) -> MessageSource {
    let pool = db::init_pool("sqlite::memory:", 1, Duration::from_secs(5)).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    MessageSource::new(pool, "ru", VariantPolicy::default(), Some(Arc::new(cache)))
}

#[tokio::test]
async fn every_mutation_invalidates_variant_key() {
    let cache = RecordingCache::default();
    let mut source = setup_source(cache.clone()).await;
    source.is_valid_source("messages.ru").await.unwrap();
    assert!(cache.removed().await.is_empty(), "creation does not invalidate");

    source.add("Hello", "Привет", "", "messages", 1).await.unwrap();
    source.update("Hello", "Здравствуйте", "", "messages").await.unwrap();
    source.append("Bye");
    source.save("messages").await.unwrap();
    source.delete("Bye", "messages").await.unwrap();

    assert_eq!(cache.removed().await, vec!["messages.ru:ru"; 4]);
}

#[tokio::test]
async fn failed_mutations_do_not_invalidate() {
    let cache = RecordingCache::default();
    let source = setup_source(cache.clone()).await;
    source.is_valid_source("messages.ru").await.unwrap();

    assert!(source.update("Missing", "x", "", "messages").await.is_err());
    assert!(source.delete("Missing", "messages").await.is_err());
    assert!(source.add("x", "y", "", "absent", 1).await.is_err());
    assert!(cache.removed().await.is_empty());
}

#[tokio::test]
async fn cache_failure_does_not_fail_mutation() {
    let cache = RecordingCache {
        fail: true,
        ..Default::default()
    };
    let source = setup_source(cache.clone()).await;
    source.is_valid_source("site.ua").await.unwrap();

    source.add("Home", "Головна", "", "site.ua", 1).await.unwrap();
    assert_eq!(cache.removed().await, vec!["site.ua:ua"]);
    assert!(!source.invalidate("site.ua").await.unwrap());
}

#[tokio::test]
async fn invalidate_without_cache_reports_nothing_removed() {
    let pool = db::init_pool("sqlite::memory:", 1, Duration::from_secs(5)).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let source = MessageSource::new(pool, "ru", VariantPolicy::default(), None);
    assert!(!source.invalidate("messages").await.unwrap());
    assert!(source.invalidate("bad name").await.is_err());
}

/// Minimal memcached stand-in: answers each `delete` line from `replies`
/// and records the commands it saw.
async fn fake_memcached(replies: Vec<&'static str>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_task = seen.clone();
    let mut replies = VecDeque::from(replies);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let mut stream = BufReader::new(stream);
            let mut line = String::new();
            if stream.read_line(&mut line).await.is_err() {
                continue;
            }
            seen_task.lock().await.push(line.trim_end().to_string());
            let reply = replies.pop_front().unwrap_or("NOT_FOUND\r\n");
            let _ = stream.get_mut().write_all(reply.as_bytes()).await;
        }
    });
    (addr, seen)
}

#[tokio::test]
async fn memcached_delete_round_trip() {
    let (addr, seen) =
        fake_memcached(vec!["DELETED\r\n", "NOT_FOUND\r\n", "SERVER_ERROR oops\r\n"]).await;
    let cache = MemcachedCache::new(vec![addr], "app:", Duration::from_secs(2));

    assert!(cache.remove("messages.ru:ru").await.unwrap());
    assert!(!cache.remove("messages.ru:ru").await.unwrap());
    assert!(matches!(
        cache.remove("messages.ru:ru").await,
        Err(CacheError::Protocol(reply)) if reply == "SERVER_ERROR oops"
    ));

    assert_eq!(
        *seen.lock().await,
        vec!["delete app:messages.ru:ru"; 3]
    );
}

#[tokio::test]
async fn memcached_times_out_on_silent_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let cache = MemcachedCache::new(vec![addr], "", Duration::from_millis(100));
    assert!(matches!(
        cache.remove("messages.ru:ru").await,
        Err(CacheError::Timeout(100))
    ));
}

#[tokio::test]
async fn source_invalidates_through_memcached() {
    let (addr, seen) = fake_memcached(vec!["DELETED\r\n"]).await;
    let pool = db::init_pool("sqlite::memory:", 1, Duration::from_secs(5)).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let cache = MemcachedCache::new(vec![addr], "", Duration::from_secs(2));
    let source = MessageSource::new(pool, "cn", VariantPolicy::default(), Some(Arc::new(cache)));

    source.is_valid_source("messages.cn").await.unwrap();
    source.add("Hi", "你好", "", "messages", 1).await.unwrap();

    assert_eq!(*seen.lock().await, vec!["delete messages.cn:cn"]);
}

#[tokio::test]
async fn memcached_deletes_on_the_hashed_server() {
    let (first, first_seen) = fake_memcached(vec!["DELETED\r\n"]).await;
    let (second, second_seen) = fake_memcached(vec!["DELETED\r\n"]).await;
    let cache = MemcachedCache::new(vec![first, second], "", Duration::from_secs(2));

    assert!(cache.remove("messages.ru:ru").await.unwrap());
    assert!(cache.remove("site.ua:ua").await.unwrap());

    assert_eq!(*first_seen.lock().await, vec!["delete messages.ru:ru"]);
    assert_eq!(*second_seen.lock().await, vec!["delete site.ua:ua"]);
}
