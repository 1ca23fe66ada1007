//! The research worker (AI structured research, company and contact
//! enrichment over an uploaded entity list).
//!
//! This is the one cooperative job type: the spawning handler registers the
//! task handle for hard cancellation, and the stop flag is checked between
//! batches so an in-flight batch always completes before the run winds down.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::{error, info};

use tabops_core::job::{checkpoint, RESEARCH_CHECKPOINTS};
use tabops_core::{JobId, SessionId};
use tabops_enrich::{EnrichmentCache, ResearchField};
use tabops_infra::JobPatch;
use tabops_tabular::{to_csv_bytes, Dataset};

use crate::app::dto::ResearchType;
use crate::app::AppServices;

/// Entities per concurrently-dispatched batch.
pub const RESEARCH_BATCH_SIZE: usize = 10;

pub struct ResearchJob {
    pub session_id: SessionId,
    pub research_type: ResearchType,
    pub fields: Vec<ResearchField>,
}

pub async fn run_research_job(services: Arc<AppServices>, job_id: JobId, job: ResearchJob) {
    if let Err(e) = execute(&services, job_id, &job).await {
        error!(%job_id, "research job failed: {e:#}");
        services.sessions.finish_run(job.session_id).await;
        services.jobs.update(job_id, JobPatch::failed(e.to_string())).await;
    }
}

async fn execute(services: &AppServices, job_id: JobId, job: &ResearchJob) -> anyhow::Result<()> {
    let jobs = &services.jobs;
    let sessions = &services.sessions;
    let cp = |name: &str| checkpoint(RESEARCH_CHECKPOINTS, name);

    jobs.update(job_id, JobPatch::checkpoint(cp("preparing"), "Preparing entities...")).await;

    let rows = sessions
        .rows(job.session_id)
        .await
        .ok_or_else(|| anyhow::anyhow!("research session not found"))?;
    let entities: Vec<String> = rows
        .iter()
        .filter_map(|row| row.first())
        .map(|cell| cell.trim().to_string())
        .filter(|cell| !cell.is_empty())
        .collect();

    let batches: Vec<&[String]> = entities.chunks(RESEARCH_BATCH_SIZE).collect();
    sessions.start_run(job.session_id, entities.len(), batches.len()).await;

    jobs.update(
        job_id,
        JobPatch::checkpoint(
            cp("dispatching"),
            format!("Researching {} entities...", entities.len()),
        ),
    )
    .await;

    let mut stopped = false;
    for (batch_number, batch) in batches.iter().enumerate() {
        if sessions.stop_requested(job.session_id).await {
            info!(%job_id, batches_done = batch_number, "stop requested; ending run early");
            stopped = true;
            break;
        }

        let results = run_batch(services, job, batch).await;
        sessions
            .record_batch(job.session_id, batch_number + 1, results)
            .await;

        // Interpolate between the dispatch and persist checkpoints.
        let dispatched = cp("dispatching").progress as usize;
        let span = cp("persisting").progress as usize - dispatched;
        let progress = dispatched + span * (batch_number + 1) / batches.len();
        jobs.update(
            job_id,
            JobPatch::progress(
                progress as u8,
                format!("Processed batch {}/{}", batch_number + 1, batches.len()),
            ),
        )
        .await;
    }

    jobs.update(job_id, JobPatch::checkpoint(cp("persisting"), "Saving results...")).await;

    let (results, _) = sessions
        .results_from(job.session_id, 0)
        .await
        .unwrap_or_default();

    let mut filename = None;
    if !results.is_empty() {
        let name = format!("research_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));
        let columns = output_columns(job.research_type, &job.fields);
        let csv = to_csv_bytes(&results_dataset(&columns, &results))?;
        services.files.write_result(&name, &csv).await?;
        filename = Some(name);
    }

    let status = if stopped { "partial" } else { "completed" };
    services
        .history
        .log_run(
            job.research_type.as_str(),
            entities.len(),
            results.len(),
            status,
            filename.clone(),
        )
        .await;

    sessions.finish_run(job.session_id).await;

    jobs.update(
        job_id,
        JobPatch::completed(if stopped { "Research stopped" } else { "Research complete" })
            .with_field("totalProcessed", results.len())
            .with_field("resultFile", json!(filename)),
    )
    .await;

    Ok(())
}

/// Dispatch one batch concurrently and await every member.
async fn run_batch(
    services: &AppServices,
    job: &ResearchJob,
    batch: &[String],
) -> Vec<JsonMap<String, JsonValue>> {
    let cache: Option<&dyn EnrichmentCache> = Some(services.cache.as_ref());

    match job.research_type {
        ResearchType::Structured => {
            let Some(client) = &services.research else {
                return Vec::new();
            };
            let lookups = batch
                .iter()
                .map(|entity| client.research_entity(entity, &job.fields));
            join_all(lookups).await
        }
        ResearchType::Company => {
            let Some(client) = &services.company else {
                return Vec::new();
            };
            client
                .enrich_domains(batch, cache)
                .await
                .into_iter()
                .filter_map(|record| to_object(serde_json::to_value(record)))
                .collect()
        }
        ResearchType::Contact => {
            let Some(client) = &services.contact else {
                return Vec::new();
            };
            let lookups = batch.iter().map(|url| client.enrich_profile(url, cache));
            join_all(lookups)
                .await
                .into_iter()
                .flatten()
                .filter_map(|record| to_object(serde_json::to_value(record)))
                .collect()
        }
    }
}

fn to_object(value: Result<JsonValue, serde_json::Error>) -> Option<JsonMap<String, JsonValue>> {
    match value {
        Ok(JsonValue::Object(map)) => Some(map),
        _ => None,
    }
}

/// Stable output column order per research type.
fn output_columns(research_type: ResearchType, fields: &[ResearchField]) -> Vec<String> {
    match research_type {
        ResearchType::Structured => {
            let mut columns = vec!["name".to_string()];
            columns.extend(fields.iter().map(|f| f.name.clone()));
            columns
        }
        ResearchType::Company => [
            "name",
            "organization_name",
            "domain",
            "website",
            "industry",
            "employees",
            "founded_year",
            "description",
            "city",
            "state",
            "country",
            "phone",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        ResearchType::Contact => [
            "profile_url",
            "full_name",
            "first_name",
            "last_name",
            "title",
            "headline",
            "email",
            "email_type",
            "email_status",
            "organization_name",
            "organization_domain",
            "location",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
}

fn cell_text(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn results_dataset(columns: &[String], results: &[JsonMap<String, JsonValue>]) -> Dataset {
    let rows = results
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|column| cell_text(record.get(column)))
                .collect()
        })
        .collect();
    Dataset::new(columns.to_vec(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_columns_lead_with_the_entity_name() {
        let fields = vec![ResearchField {
            name: "employees".to_string(),
            field_type: Default::default(),
            description: None,
            optional: false,
            enum_values: None,
        }];
        assert_eq!(
            output_columns(ResearchType::Structured, &fields),
            ["name", "employees"]
        );
    }

    #[test]
    fn results_dataset_renders_scalars_as_text() {
        let columns = vec!["name".to_string(), "employees".to_string()];
        let mut record = JsonMap::new();
        record.insert("name".to_string(), json!("Acme"));
        record.insert("employees".to_string(), json!(42));

        let dataset = results_dataset(&columns, &[record]);
        assert_eq!(dataset.rows()[0], ["Acme", "42"]);
    }

    #[test]
    fn missing_fields_render_empty() {
        let columns = vec!["name".to_string(), "website".to_string()];
        let mut record = JsonMap::new();
        record.insert("name".to_string(), json!("Acme"));

        let dataset = results_dataset(&columns, &[record]);
        assert_eq!(dataset.rows()[0], ["Acme", ""]);
    }
}
