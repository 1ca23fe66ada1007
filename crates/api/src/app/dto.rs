//! Request DTOs and shared enums.

use serde::{Deserialize, Serialize};

use tabops_enrich::ResearchField;
use tabops_tabular::JoinType;

fn default_join() -> JoinType {
    JoinType::Left
}

fn default_content_type() -> String {
    "text/csv".to_string()
}

// -------------------------
// Merge surface
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMatchRequest {
    pub file_a_id: String,
    pub file_b_id: String,
    pub key_a: String,
    pub key_b: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub file_a_id: String,
    pub file_b_id: String,
    #[serde(default = "default_join")]
    pub join_type: JoinType,
    pub left_key: String,
    pub right_key: String,
    #[serde(default)]
    pub selected_columns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPreviewRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMergeRequest {
    pub keys_a: Vec<String>,
    pub keys_b: Vec<String>,
    #[serde(default = "default_join")]
    pub join_type: JoinType,
    pub left_key: String,
    pub right_key: String,
    #[serde(default)]
    pub selected_columns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlParams {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

// -------------------------
// Email-validation surface
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFileRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationJobRequest {
    pub key: String,
    pub email_column: String,
}

// -------------------------
// Research surface
// -------------------------

/// Which enrichment backend a research run drives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResearchType {
    #[default]
    Structured,
    Company,
    Contact,
}

impl ResearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchType::Structured => "structured",
            ResearchType::Company => "company",
            ResearchType::Contact => "contact",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResearchRequest {
    pub session_id: String,
    #[serde(default)]
    pub research_type: ResearchType,
    #[serde(default)]
    pub fields: Option<Vec<ResearchField>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub session_id: String,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRunsRequest {
    pub ids: Vec<String>,
}
