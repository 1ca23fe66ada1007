//! The email-validation worker.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use tracing::{error, info};

use tabops_core::job::{checkpoint, EMAIL_VALIDATION_CHECKPOINTS};
use tabops_core::JobId;
use tabops_enrich::mx::{email_domain, is_valid_email};
use tabops_infra::JobPatch;
use tabops_tabular::{read_dataset_bytes, to_csv_bytes, Dataset};

use crate::app::AppServices;

/// Where the file to validate comes from.
pub enum ValidationSource {
    /// Object-store key (large-file workflow; result goes back to the store).
    Stored { key: String },
    /// Uploaded bytes (direct workflow; result lands in the results dir).
    Inline { filename: String, bytes: Vec<u8> },
}

pub async fn run_validation_job(
    services: Arc<AppServices>,
    job_id: JobId,
    source: ValidationSource,
    email_column: String,
) {
    if let Err(e) = execute(&services, job_id, source, email_column).await {
        error!(%job_id, "email validation job failed: {e:#}");
        services.jobs.update(job_id, JobPatch::failed(e.to_string())).await;
    }
}

/// Per-row verdicts appended to the output.
struct RowVerdict {
    format_valid: bool,
    mx_valid: bool,
}

impl RowVerdict {
    fn status(&self) -> &'static str {
        if !self.format_valid {
            "Invalid Format"
        } else if !self.mx_valid {
            "No MX Record"
        } else {
            "Valid"
        }
    }
}

async fn execute(
    services: &AppServices,
    job_id: JobId,
    source: ValidationSource,
    email_column: String,
) -> anyhow::Result<()> {
    let jobs = &services.jobs;
    let cp = |name: &str| checkpoint(EMAIL_VALIDATION_CHECKPOINTS, name);

    let (filename, bytes, stored) = match source {
        ValidationSource::Stored { key } => {
            jobs.update(job_id, JobPatch::checkpoint(cp("fetching"), "Downloading file...")).await;
            let store = services
                .object_store
                .as_ref()
                .context("object storage not configured")?;
            let bytes = store.get(&key).await?.to_vec();
            (key, bytes, true)
        }
        ValidationSource::Inline { filename, bytes } => (filename, bytes, false),
    };

    jobs.update(job_id, JobPatch::checkpoint(cp("reading"), "Reading file...")).await;
    let dataset =
        tokio::task::spawn_blocking(move || read_dataset_bytes(&filename, &bytes)).await??;

    let email_idx = dataset
        .column_index(&email_column)
        .map_err(|_| anyhow::anyhow!("Column '{email_column}' not found in file"))?;

    let total_rows = dataset.row_count();
    jobs.update(
        job_id,
        JobPatch::checkpoint(cp("extracting"), format!("Processing {total_rows} emails...")),
    )
    .await;

    // Syntactic pass: only well-formed addresses spend a DNS lookup.
    let format_valid: Vec<bool> = dataset
        .rows()
        .iter()
        .map(|row| is_valid_email(row[email_idx].trim()))
        .collect();

    let mut domains: Vec<String> = dataset
        .rows()
        .iter()
        .zip(&format_valid)
        .filter(|(_, valid)| **valid)
        .filter_map(|(row, _)| email_domain(row[email_idx].trim()))
        .collect();
    domains.sort();
    domains.dedup();

    jobs.update(
        job_id,
        JobPatch::checkpoint(
            cp("resolving"),
            format!("Validating {} unique domains...", domains.len()),
        ),
    )
    .await;

    let mx_results = services.mx.validate_domains(&domains).await;

    jobs.update(job_id, JobPatch::checkpoint(cp("applying"), "Generating results...")).await;

    let domains_checked = domains.len();
    let (csv, stats) = tokio::task::spawn_blocking(move || {
        build_output(dataset, email_idx, &format_valid, &mx_results, domains_checked)
    })
    .await??;

    jobs.update(job_id, JobPatch::checkpoint(cp("persisting"), "Preparing download...")).await;

    let result_key = if stored {
        let store = services
            .object_store
            .as_ref()
            .context("object storage not configured")?;
        let result_key = format!("results/email-validation-{job_id}.csv");
        store.put(&result_key, Bytes::from(csv), "text/csv").await?;
        result_key
    } else {
        services
            .files
            .write_result(&format!("{job_id}.csv"), &csv)
            .await?;
        job_id.to_string()
    };

    info!(%job_id, ?stats, "email validation complete");

    jobs.update(
        job_id,
        JobPatch::completed("Validation complete")
            .with_field("result_key", result_key)
            .with_field("stats", serde_json::to_value(&stats)?),
    )
    .await;

    Ok(())
}

#[derive(Debug, serde::Serialize)]
struct ValidationStats {
    total: usize,
    valid: usize,
    invalid_format: usize,
    no_mx: usize,
    domains_checked: usize,
}

fn build_output(
    dataset: Dataset,
    email_idx: usize,
    format_valid: &[bool],
    mx_results: &HashMap<String, bool>,
    domains_checked: usize,
) -> Result<(Vec<u8>, ValidationStats), tabops_tabular::TabularError> {
    let mut columns = dataset.columns().to_vec();
    columns.push("Format Valid".to_string());
    columns.push("MX Valid".to_string());
    columns.push("Status".to_string());

    let mut stats = ValidationStats {
        total: dataset.row_count(),
        valid: 0,
        invalid_format: 0,
        no_mx: 0,
        domains_checked,
    };

    let rows = dataset
        .rows()
        .iter()
        .zip(format_valid)
        .map(|(row, &format_valid)| {
            let mx_valid = format_valid
                && email_domain(row[email_idx].trim())
                    // A domain the resolver never answered for keeps the
                    // benefit of the doubt.
                    .map(|domain| mx_results.get(&domain).copied().unwrap_or(true))
                    .unwrap_or(false);
            let verdict = RowVerdict { format_valid, mx_valid };
            match verdict.status() {
                "Valid" => stats.valid += 1,
                "Invalid Format" => stats.invalid_format += 1,
                _ => stats.no_mx += 1,
            }

            let mut out = row.clone();
            out.push(format_valid.to_string());
            out.push(mx_valid.to_string());
            out.push(verdict.status().to_string());
            out
        })
        .collect();

    let csv = to_csv_bytes(&Dataset::new(columns, rows))?;
    Ok((csv, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_statuses() {
        assert_eq!(RowVerdict { format_valid: false, mx_valid: false }.status(), "Invalid Format");
        assert_eq!(RowVerdict { format_valid: true, mx_valid: false }.status(), "No MX Record");
        assert_eq!(RowVerdict { format_valid: true, mx_valid: true }.status(), "Valid");
    }

    #[test]
    fn output_annotates_rows_and_counts_stats() {
        let dataset = Dataset::new(
            vec!["email".to_string()],
            vec![
                vec!["good@example.com".to_string()],
                vec!["dead@gone.example".to_string()],
                vec!["not-an-email".to_string()],
            ],
        );
        let format_valid = vec![true, true, false];
        let mut mx = HashMap::new();
        mx.insert("example.com".to_string(), true);
        mx.insert("gone.example".to_string(), false);

        let (csv, stats) = build_output(dataset, 0, &format_valid, &mx, 2).unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.valid, 1);
        assert_eq!(stats.no_mx, 1);
        assert_eq!(stats.invalid_format, 1);

        let text = String::from_utf8(csv).unwrap();
        assert!(text.contains("Format Valid,MX Valid,Status"));
        assert!(text.contains("good@example.com,true,true,Valid"));
        assert!(text.contains("dead@gone.example,true,false,No MX Record"));
        assert!(text.contains("not-an-email,false,false,Invalid Format"));
    }

    #[test]
    fn unresolved_domains_keep_the_benefit_of_the_doubt() {
        let dataset = Dataset::new(
            vec!["email".to_string()],
            vec![vec!["maybe@unresolved.example".to_string()]],
        );
        let (_, stats) = build_output(dataset, 0, &[true], &HashMap::new(), 0).unwrap();
        assert_eq!(stats.valid, 1);
    }
}
