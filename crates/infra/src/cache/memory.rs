//! In-process TTL-bounded map (the cache's first tier).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;

/// Capacity/TTL-bounded key/value map behind an explicit lock.
///
/// The lock matters: MX lookups and enrichment batches write from spawned
/// tasks, so scheduler-level exclusivity is not enough.
#[derive(Debug)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, (JsonValue, Instant)>>,
    capacity: usize,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<JsonValue> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, inserted_at)) if inserted_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, value: JsonValue) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let ttl = self.ttl;
            entries.retain(|_, (_, inserted_at)| inserted_at.elapsed() < ttl);
            if entries.len() >= self.capacity {
                return;
            }
        }
        entries.insert(key, (value, Instant::now()));
    }

    #[cfg(test)]
    fn put_at(&self, key: String, value: JsonValue, inserted_at: Instant) {
        self.entries
            .lock()
            .unwrap()
            .insert(key, (value, inserted_at));
    }
}
