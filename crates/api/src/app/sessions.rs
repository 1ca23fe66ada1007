//! Research session store.
//!
//! Every read is keyed by an explicit session id returned to the caller at
//! upload time; there is no "current session" fallback, so concurrent runs
//! from different clients cannot observe each other.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::sync::RwLock;

use tabops_core::SessionId;

/// Batch-level progress of a research run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResearchProgress {
    pub total: usize,
    pub completed: usize,
    pub batches_total: usize,
    pub batches_completed: usize,
}

/// One uploaded CSV plus the state of its (at most one) active run.
#[derive(Debug, Default)]
pub struct ResearchSession {
    pub rows: Vec<Vec<String>>,
    pub research_type: String,
    pub progress: ResearchProgress,
    pub results: Vec<JsonMap<String, JsonValue>>,
    pub stop_requested: bool,
    pub active: bool,
}

/// In-memory session store shared by handlers and the research worker.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, ResearchSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, rows: Vec<Vec<String>>, research_type: String) -> SessionId {
        let session_id = SessionId::new();
        let session = ResearchSession {
            rows,
            research_type,
            ..ResearchSession::default()
        };
        self.sessions.write().await.insert(session_id, session);
        session_id
    }

    pub async fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&session_id)
    }

    pub async fn rows(&self, session_id: SessionId) -> Option<Vec<Vec<String>>> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|s| s.rows.clone())
    }

    /// Reset run state and mark the session active. Returns false when the
    /// session does not exist.
    pub async fn start_run(&self, session_id: SessionId, total: usize, batches_total: usize) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) => {
                session.progress = ResearchProgress {
                    total,
                    batches_total,
                    ..ResearchProgress::default()
                };
                session.results.clear();
                session.stop_requested = false;
                session.active = true;
                true
            }
            None => false,
        }
    }

    /// Record one completed batch: append its results, advance counters.
    pub async fn record_batch(
        &self,
        session_id: SessionId,
        batch_number: usize,
        results: Vec<JsonMap<String, JsonValue>>,
    ) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&session_id) {
            session.progress.completed += results.len();
            session.progress.batches_completed = batch_number;
            session.results.extend(results);
        }
    }

    pub async fn finish_run(&self, session_id: SessionId) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&session_id) {
            session.active = false;
        }
    }

    pub async fn progress(&self, session_id: SessionId) -> Option<ResearchProgress> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|s| s.progress.clone())
    }

    /// Results from `offset` on, plus the total count so far.
    pub async fn results_from(
        &self,
        session_id: SessionId,
        offset: usize,
    ) -> Option<(Vec<JsonMap<String, JsonValue>>, usize)> {
        self.sessions.read().await.get(&session_id).map(|s| {
            let total = s.results.len();
            (s.results.iter().skip(offset).cloned().collect(), total)
        })
    }

    /// Raise the stop flag. Returns whether a run was active to stop.
    pub async fn request_stop(&self, session_id: SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) => {
                session.stop_requested = true;
                session.active
            }
            None => false,
        }
    }

    pub async fn stop_requested(&self, session_id: SessionId) -> bool {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .is_some_and(|s| s.stop_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(cell: &str) -> Vec<String> {
        vec![cell.to_string()]
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_id() {
        let store = SessionStore::new();
        let a = store.insert(vec![row("acme.com")], "company".into()).await;
        let b = store.insert(vec![row("other.io")], "company".into()).await;

        assert_ne!(a, b);
        assert_eq!(store.rows(a).await.unwrap()[0][0], "acme.com");
        assert_eq!(store.rows(b).await.unwrap()[0][0], "other.io");
    }

    #[tokio::test]
    async fn run_lifecycle_tracks_progress_and_results() {
        let store = SessionStore::new();
        let id = store.insert(vec![row("a"), row("b")], "structured".into()).await;

        assert!(store.start_run(id, 2, 1).await);

        let mut record = JsonMap::new();
        record.insert("name".to_string(), json!("a"));
        store.record_batch(id, 1, vec![record]).await;

        let progress = store.progress(id).await.unwrap();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.batches_completed, 1);

        let (results, total) = store.results_from(id, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(results[0]["name"], "a");

        // Offsets skip already-fetched results.
        let (rest, total) = store.results_from(id, 1).await.unwrap();
        assert_eq!(total, 1);
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn stop_flag_requires_a_known_session() {
        let store = SessionStore::new();
        assert!(!store.request_stop(SessionId::new()).await);

        let id = store.insert(vec![row("a")], "structured".into()).await;
        store.start_run(id, 1, 1).await;
        assert!(store.request_stop(id).await);
        assert!(store.stop_requested(id).await);
    }

    #[tokio::test]
    async fn starting_a_run_on_a_missing_session_fails() {
        let store = SessionStore::new();
        assert!(!store.start_run(SessionId::new(), 1, 1).await);
    }
}
