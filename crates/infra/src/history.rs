//! Capped research run-history log, stored as one cache collection.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use sha3::{Digest, Sha3_256};
use tracing::info;

use crate::cache::TieredCache;

pub const HISTORY_NAMESPACE: &str = "runs_history";

/// Only the most recent runs are kept.
pub const HISTORY_CAP: usize = 100;

/// One logged research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub id: String,
    pub timestamp: String,
    pub research_type: String,
    pub total_records: usize,
    pub results_count: usize,
    pub status: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Prepend-and-cap log of research runs on top of the cache's bulk accessors.
pub struct RunHistory {
    cache: Arc<TieredCache>,
}

impl RunHistory {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self { cache }
    }

    pub async fn load(&self) -> Vec<RunEntry> {
        let collection = self.cache.load_full(HISTORY_NAMESPACE).await;
        collection
            .get("runs")
            .and_then(JsonValue::as_array)
            .map(|runs| {
                runs.iter()
                    .filter_map(|run| serde_json::from_value(run.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn save(&self, runs: &[RunEntry]) {
        let mut collection = JsonMap::new();
        collection.insert("runs".to_string(), json!(runs));
        self.cache.save_full(HISTORY_NAMESPACE, collection).await;
    }

    /// Log a run at the head of the list, dropping anything past the cap.
    pub async fn log_run(
        &self,
        research_type: &str,
        total_records: usize,
        results_count: usize,
        status: &str,
        filename: Option<String>,
    ) {
        let timestamp = Utc::now().to_rfc3339();
        let digest = Sha3_256::digest(format!("{timestamp}{research_type}").as_bytes());
        let entry = RunEntry {
            id: hex::encode(&digest[..4]),
            timestamp,
            research_type: research_type.to_string(),
            total_records,
            results_count,
            status: status.to_string(),
            filename,
        };

        let mut runs = self.load().await;
        runs.insert(0, entry);
        runs.truncate(HISTORY_CAP);
        self.save(&runs).await;

        info!(research_type, results_count, total_records, "logged run");
    }

    /// Delete runs by id. Returns how many entries went away.
    pub async fn delete(&self, ids: &[String]) -> usize {
        let runs = self.load().await;
        let before = runs.len();
        let kept: Vec<RunEntry> = runs
            .into_iter()
            .filter(|run| !ids.contains(&run.id))
            .collect();
        let deleted = before - kept.len();
        self.save(&kept).await;
        info!(deleted, "deleted runs from history");
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> (tempfile::TempDir, RunHistory) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(TieredCache::new(dir.path(), 30));
        (dir, RunHistory::new(cache))
    }

    #[tokio::test]
    async fn logs_prepend_newest_first() {
        let (_dir, history) = history();
        history.log_run("structured", 10, 8, "completed", None).await;
        history
            .log_run("structured", 5, 5, "completed", Some("out.csv".into()))
            .await;

        let runs = history.load().await;
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].total_records, 5);
        assert_eq!(runs[0].filename.as_deref(), Some("out.csv"));
    }

    #[tokio::test]
    async fn history_is_capped() {
        let (_dir, history) = history();
        for i in 0..(HISTORY_CAP + 5) {
            history.log_run("structured", i, i, "completed", None).await;
        }
        assert_eq!(history.load().await.len(), HISTORY_CAP);
    }

    #[tokio::test]
    async fn delete_by_id() {
        let (_dir, history) = history();
        history.log_run("structured", 1, 1, "completed", None).await;
        history.log_run("structured", 2, 2, "partial", None).await;

        let runs = history.load().await;
        let victim = runs[0].id.clone();

        assert_eq!(history.delete(&[victim.clone()]).await, 1);
        let runs = history.load().await;
        assert_eq!(runs.len(), 1);
        assert!(runs.iter().all(|r| r.id != victim));

        // Unknown ids delete nothing.
        assert_eq!(history.delete(&["zzzz".to_string()]).await, 0);
    }
}
