//! Job record shape and merge-patch semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use tabops_core::job::Checkpoint;
use tabops_core::{JobStatus, JobType};

/// A tracked background job.
///
/// The typed fields are the lifecycle core; `payload` carries whatever the
/// worker attaches on terminal transition (result id/key, stats, columns,
/// preview) and is flattened into the same JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub created: DateTime<Utc>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(flatten)]
    pub payload: JsonMap<String, JsonValue>,
}

impl JobRecord {
    /// A fresh record as the request handler creates it.
    pub fn new(job_type: JobType) -> Self {
        Self {
            status: JobStatus::Processing,
            progress: 0,
            message: "Starting...".to_string(),
            created: Utc::now(),
            job_type,
            payload: JsonMap::new(),
        }
    }

    /// Merge a patch into this record. Fields the patch does not carry are
    /// preserved; payload keys are inserted or overwritten individually.
    pub fn apply(&mut self, patch: JobPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(message) = patch.message {
            self.message = message;
        }
        for (key, value) in patch.payload {
            self.payload.insert(key, value);
        }
    }
}

/// A partial update to a job record.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub payload: JsonMap<String, JsonValue>,
}

impl JobPatch {
    /// Progress-only update.
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Progress update pinned to a named checkpoint.
    pub fn checkpoint(checkpoint: Checkpoint, message: impl Into<String>) -> Self {
        Self::progress(checkpoint.progress, message)
    }

    /// Terminal success. Attach the result payload with [`JobPatch::with_field`].
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Terminal failure carrying the error text.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_records_start_processing_at_zero() {
        let record = JobRecord::new(JobType::Merge);
        assert_eq!(record.status, JobStatus::Processing);
        assert_eq!(record.progress, 0);
        assert_eq!(record.message, "Starting...");
    }

    #[test]
    fn apply_merges_instead_of_replacing() {
        let mut record = JobRecord::new(JobType::Merge);
        record.apply(JobPatch::progress(20, "Reading File A..."));
        assert_eq!(record.progress, 20);

        // A progress-only patch must not clobber the message.
        record.apply(JobPatch {
            progress: Some(35),
            ..JobPatch::default()
        });
        assert_eq!(record.progress, 35);
        assert_eq!(record.message, "Reading File A...");
        assert_eq!(record.status, JobStatus::Processing);
    }

    #[test]
    fn terminal_patch_attaches_payload() {
        let mut record = JobRecord::new(JobType::EmailValidation);
        record.apply(
            JobPatch::completed("Validation complete")
                .with_field("result_key", "results/abc.csv")
                .with_field("stats", json!({"total": 10, "valid": 8})),
        );
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.payload["result_key"], "results/abc.csv");
        assert_eq!(record.payload["stats"]["valid"], 8);
    }

    #[test]
    fn payload_flattens_into_the_document() {
        let mut record = JobRecord::new(JobType::Merge);
        record.apply(JobPatch::completed("done").with_field("resultId", "xyz"));
        let doc = serde_json::to_value(&record).unwrap();
        assert_eq!(doc["resultId"], "xyz");
        assert_eq!(doc["status"], "completed");
        assert_eq!(doc["type"], "merge");

        let back: JobRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(back.payload["resultId"], "xyz");
    }
}
