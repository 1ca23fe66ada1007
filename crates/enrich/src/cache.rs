//! Cache seam between enrichment clients and the storage layer.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Read/write access to a namespaced enrichment cache.
///
/// Implementations key entries by a normalized form of the identifier and are
/// free to expire entries; a `get` returning `None` simply means "call the
/// network". Both operations are best-effort: storage failures surface as
/// misses / dropped writes, never as errors.
#[async_trait]
pub trait EnrichmentCache: Send + Sync {
    async fn get(&self, namespace: &str, identifier: &str) -> Option<JsonValue>;

    async fn set(&self, namespace: &str, identifier: &str, value: JsonValue);
}

/// Cache namespace for company enrichment results.
pub const COMPANY_NAMESPACE: &str = "company_cache";

/// Cache namespace for contact enrichment results.
pub const CONTACT_NAMESPACE: &str = "contact_cache";
