//! The tabular merge worker.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use serde_json::json;
use tracing::{error, info};

use tabops_core::job::{checkpoint, MERGE_CHECKPOINTS};
use tabops_core::{JobId, ResultId};
use tabops_infra::JobPatch;
use tabops_tabular::merge::PREVIEW_ROWS;
use tabops_tabular::{merge, read_dataset_bytes, read_dataset_path, to_csv_bytes, Dataset, JoinType};

use crate::app::AppServices;

/// Where the input datasets live; each side may be several files that are
/// concatenated row-wise.
pub enum MergeSource {
    LocalFiles {
        left: Vec<PathBuf>,
        right: Vec<PathBuf>,
    },
    Stored {
        left: Vec<String>,
        right: Vec<String>,
    },
}

pub struct MergeJob {
    pub source: MergeSource,
    pub join: JoinType,
    pub left_key: String,
    pub right_key: String,
    pub selected_columns: Option<Vec<String>>,
}

pub async fn run_merge_job(services: Arc<AppServices>, job_id: JobId, job: MergeJob) {
    if let Err(e) = execute(&services, job_id, job).await {
        error!(%job_id, "merge job failed: {e:#}");
        services.jobs.update(job_id, JobPatch::failed(e.to_string())).await;
    }
}

async fn load_local(paths: Vec<PathBuf>) -> anyhow::Result<Dataset> {
    let mut parts = Vec::with_capacity(paths.len());
    for path in paths {
        let dataset = tokio::task::spawn_blocking(move || read_dataset_path(&path)).await??;
        parts.push(dataset);
    }
    Ok(Dataset::concat(parts)?)
}

async fn load_stored(services: &AppServices, keys: Vec<String>) -> anyhow::Result<Dataset> {
    let store = services
        .object_store
        .as_ref()
        .context("object storage not configured")?;
    let mut parts = Vec::with_capacity(keys.len());
    for key in keys {
        let bytes = store.get(&key).await?;
        let dataset =
            tokio::task::spawn_blocking(move || read_dataset_bytes(&key, &bytes)).await??;
        parts.push(dataset);
    }
    Ok(Dataset::concat(parts)?)
}

async fn execute(services: &AppServices, job_id: JobId, job: MergeJob) -> anyhow::Result<()> {
    let jobs = &services.jobs;
    let cp = |name: &str| checkpoint(MERGE_CHECKPOINTS, name);

    jobs.update(job_id, JobPatch::checkpoint(cp("loading"), "Loading files...")).await;

    let stored = matches!(job.source, MergeSource::Stored { .. });
    let (left, right) = match job.source {
        MergeSource::LocalFiles { left, right } => {
            jobs.update(job_id, JobPatch::checkpoint(cp("reading_left"), "Reading File A...")).await;
            let left = load_local(left).await?;
            jobs.update(job_id, JobPatch::checkpoint(cp("reading_right"), "Reading File B...")).await;
            (left, load_local(right).await?)
        }
        MergeSource::Stored { left, right } => {
            jobs.update(job_id, JobPatch::checkpoint(cp("reading_left"), "Reading File A...")).await;
            let left = load_stored(services, left).await?;
            jobs.update(job_id, JobPatch::checkpoint(cp("reading_right"), "Reading File B...")).await;
            (left, load_stored(services, right).await?)
        }
    };

    jobs.update(job_id, JobPatch::checkpoint(cp("joining"), "Merging datasets...")).await;

    let join = job.join;
    let left_key = job.left_key;
    let right_key = job.right_key;
    let selected = job.selected_columns;
    let (csv, columns, preview, stats) = tokio::task::spawn_blocking(move || {
        let output = merge(&left, &right, join, &left_key, &right_key, selected.as_deref())?;
        let csv = to_csv_bytes(&output.dataset)?;
        let columns = output.dataset.columns().to_vec();
        let preview = output.dataset.preview(PREVIEW_ROWS);
        Ok::<_, tabops_tabular::TabularError>((csv, columns, preview, output.stats))
    })
    .await??;

    jobs.update(
        job_id,
        JobPatch::checkpoint(cp("statistics"), "Calculating statistics..."),
    )
    .await;

    jobs.update(job_id, JobPatch::checkpoint(cp("writing"), "Preparing output...")).await;

    let result_id = ResultId::new();
    let result_field = if stored {
        let store = services
            .object_store
            .as_ref()
            .context("object storage not configured")?;
        let result_key = format!("results/merge-{result_id}.csv");
        store.put(&result_key, Bytes::from(csv), "text/csv").await?;
        ("resultKey", result_key)
    } else {
        services
            .files
            .write_result(&format!("{result_id}.csv"), &csv)
            .await?;
        ("resultId", result_id.to_string())
    };

    jobs.update(job_id, JobPatch::checkpoint(cp("preview"), "Generating preview...")).await;

    info!(%job_id, output_rows = stats.output_rows, "merge complete");

    jobs.update(
        job_id,
        JobPatch::completed("Merge complete")
            .with_field(result_field.0, result_field.1)
            .with_field("stats", serde_json::to_value(&stats)?)
            .with_field("columns", json!(columns))
            .with_field("preview", json!(preview)),
    )
    .await;

    Ok(())
}
