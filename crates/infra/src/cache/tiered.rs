//! The durable cache tiers and the public cache API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use sha3::{Digest, Sha3_256};
use tracing::{debug, error, info, warn};

use tabops_enrich::EnrichmentCache;

use super::memory::TtlCache;
use crate::storage::ObjectStore;

/// In-process tier bounds.
const MEMORY_CAPACITY: usize = 1000;
const MEMORY_TTL: Duration = Duration::from_secs(300);

/// Hash an identifier into a stable cache key (case-folded, trimmed).
pub fn cache_key(identifier: &str) -> String {
    let digest = Sha3_256::digest(identifier.trim().to_lowercase().as_bytes());
    hex::encode(digest)
}

/// Namespaced expiring cache: memory over local JSON collections, optionally
/// mirrored to the object store.
pub struct TieredCache {
    dir: PathBuf,
    memory: TtlCache,
    expiry: ChronoDuration,
    mirror: Option<Arc<dyn ObjectStore>>,
}

impl TieredCache {
    pub fn new(dir: impl Into<PathBuf>, expiry_days: i64) -> Self {
        Self {
            dir: dir.into(),
            memory: TtlCache::new(MEMORY_CAPACITY, MEMORY_TTL),
            expiry: ChronoDuration::days(expiry_days),
            mirror: None,
        }
    }

    /// Mirror every durable write to the object store and consult it on
    /// local misses.
    pub fn with_mirror(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.mirror = Some(store);
        self
    }

    pub fn mirror_enabled(&self) -> bool {
        self.mirror.is_some()
    }

    fn collection_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }

    fn collection_key(namespace: &str) -> String {
        format!("{namespace}.json")
    }

    /// An entry older than the expiry horizon must be treated as absent.
    /// Unparseable timestamps count as expired.
    fn is_expired(&self, timestamp: Option<&str>) -> bool {
        let Some(timestamp) = timestamp else {
            return true;
        };
        match DateTime::parse_from_rfc3339(timestamp) {
            Ok(cached_at) => cached_at.with_timezone(&Utc) < Utc::now() - self.expiry,
            Err(_) => true,
        }
    }

    fn extract(&self, collection: &JsonValue, key: &str) -> Option<JsonValue> {
        let entry = collection.get(key)?;
        let timestamp = entry.get("timestamp").and_then(JsonValue::as_str);
        if self.is_expired(timestamp) {
            return None;
        }
        entry.get("data").cloned()
    }

    async fn read_local(&self, namespace: &str) -> Option<JsonValue> {
        match tokio::fs::read(self.collection_path(namespace)).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(namespace, "failed to parse local cache collection: {e}");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(namespace, "failed to read local cache collection: {e}");
                None
            }
        }
    }

    async fn read_mirror(&self, namespace: &str) -> Option<JsonValue> {
        let mirror = self.mirror.as_ref()?;
        match mirror.get(&Self::collection_key(namespace)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            Err(e) => {
                debug!(namespace, "mirror cache read failed: {e}");
                None
            }
        }
    }

    async fn write_local(&self, namespace: &str, collection: &JsonValue) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            error!(namespace, "failed to create cache directory: {e}");
            return;
        }
        let body = match serde_json::to_vec_pretty(collection) {
            Ok(body) => body,
            Err(e) => {
                error!(namespace, "failed to serialize cache collection: {e}");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(self.collection_path(namespace), body).await {
            error!(namespace, "failed to write local cache collection: {e}");
        }
    }

    async fn write_mirror(&self, namespace: &str, collection: &JsonValue) {
        let Some(mirror) = self.mirror.as_ref() else {
            return;
        };
        let Ok(body) = serde_json::to_vec_pretty(collection) else {
            return;
        };
        if let Err(e) = mirror
            .put(
                &Self::collection_key(namespace),
                Bytes::from(body),
                "application/json",
            )
            .await
        {
            error!(namespace, "failed to mirror cache collection: {e}");
        }
    }

    /// Look up an identifier. A hit in a durable tier backfills the memory
    /// tier. All failures degrade to a miss.
    pub async fn get(&self, namespace: &str, identifier: &str) -> Option<JsonValue> {
        let key = cache_key(identifier);
        let memory_key = format!("{namespace}:{key}");

        if let Some(value) = self.memory.get(&memory_key) {
            return Some(value);
        }

        if let Some(collection) = self.read_local(namespace).await {
            if let Some(data) = self.extract(&collection, &key) {
                self.memory.put(memory_key, data.clone());
                info!(identifier, "cache hit");
                return Some(data);
            }
        }

        if let Some(collection) = self.read_mirror(namespace).await {
            if let Some(data) = self.extract(&collection, &key) {
                self.memory.put(memory_key, data.clone());
                info!(identifier, "mirror cache hit");
                return Some(data);
            }
        }

        None
    }

    /// Store a lookup result: memory first, then a whole-collection rewrite
    /// of the local file, then a best-effort mirror write.
    pub async fn set(&self, namespace: &str, identifier: &str, data: JsonValue) {
        let key = cache_key(identifier);
        let memory_key = format!("{namespace}:{key}");
        self.memory.put(memory_key, data.clone());

        let mut collection = self
            .read_local(namespace)
            .await
            .and_then(|v| match v {
                JsonValue::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_else(JsonMap::new);

        collection.insert(
            key,
            json!({
                "identifier": identifier,
                "data": data,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        );

        let collection = JsonValue::Object(collection);
        self.write_local(namespace, &collection).await;
        self.write_mirror(namespace, &collection).await;
    }

    /// Load a whole namespace collection (for data that is itself a list,
    /// like the run-history log). The mirror wins when available.
    pub async fn load_full(&self, namespace: &str) -> JsonMap<String, JsonValue> {
        let value = match self.read_mirror(namespace).await {
            Some(value) => Some(value),
            None => self.read_local(namespace).await,
        };
        match value {
            Some(JsonValue::Object(map)) => map,
            _ => JsonMap::new(),
        }
    }

    /// Overwrite a whole namespace collection.
    pub async fn save_full(&self, namespace: &str, data: JsonMap<String, JsonValue>) {
        let collection = JsonValue::Object(data);
        self.write_local(namespace, &collection).await;
        self.write_mirror(namespace, &collection).await;
    }
}

#[async_trait]
impl EnrichmentCache for TieredCache {
    async fn get(&self, namespace: &str, identifier: &str) -> Option<JsonValue> {
        TieredCache::get(self, namespace, identifier).await
    }

    async fn set(&self, namespace: &str, identifier: &str, value: JsonValue) {
        TieredCache::set(self, namespace, identifier, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, TieredCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = TieredCache::new(dir.path(), 30);
        (dir, cache)
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let (_dir, cache) = cache();
        cache.set("ns", "Example.com ", json!({"x": 1})).await;
        // Normalized spellings of the identifier hit the same entry.
        assert_eq!(cache.get("ns", "example.com").await, Some(json!({"x": 1})));
    }

    #[tokio::test]
    async fn survives_the_memory_tier_being_cold() {
        let (dir, cache) = cache();
        cache.set("ns", "id", json!("v")).await;

        // A different cache instance over the same directory sees the entry.
        let cold = TieredCache::new(dir.path(), 30);
        assert_eq!(cold.get("ns", "id").await, Some(json!("v")));
    }

    #[tokio::test]
    async fn entries_past_the_horizon_read_as_absent_but_stay_on_disk() {
        let (dir, cache) = cache();
        cache.set("ns", "id", json!("v")).await;

        // Backdate the stored timestamp beyond the 30-day horizon.
        let path = dir.path().join("ns.json");
        let mut collection: JsonValue =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let key = cache_key("id");
        let backdated = (Utc::now() - ChronoDuration::days(31)).to_rfc3339();
        collection[&key]["timestamp"] = json!(backdated);
        std::fs::write(&path, serde_json::to_vec(&collection).unwrap()).unwrap();

        let cold = TieredCache::new(dir.path(), 30);
        assert_eq!(cold.get("ns", "id").await, None);

        // The record itself survives until the next overwrite.
        let raw: JsonValue = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(raw.get(&key).is_some());
    }

    #[tokio::test]
    async fn set_preserves_other_entries_in_the_collection() {
        let (_dir, cache) = cache();
        cache.set("ns", "a", json!(1)).await;
        cache.set("ns", "b", json!(2)).await;
        assert_eq!(cache.get("ns", "a").await, Some(json!(1)));
        assert_eq!(cache.get("ns", "b").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn full_collection_roundtrip() {
        let (_dir, cache) = cache();
        let mut data = JsonMap::new();
        data.insert("runs".to_string(), json!([{"id": "abc"}]));
        cache.save_full("runs_history", data).await;

        let loaded = cache.load_full("runs_history").await;
        assert_eq!(loaded["runs"][0]["id"], "abc");
    }

    #[tokio::test]
    async fn missing_namespace_loads_empty() {
        let (_dir, cache) = cache();
        assert!(cache.load_full("nothing").await.is_empty());
        assert_eq!(cache.get("nothing", "id").await, None);
    }

    #[tokio::test]
    async fn unwritable_directory_degrades_silently() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let cache = TieredCache::new(file.path().join("cache"), 30);
        cache.set("ns", "id", json!(1)).await;
        // Memory tier still serves within this instance.
        assert_eq!(cache.get("ns", "id").await, Some(json!(1)));
    }
}
