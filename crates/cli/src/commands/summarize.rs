//! Trial summary command

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;
use tuner_lib::aggregation::{ExperimentSummary, TrialResult};
use tuner_lib::TuningEngine;

use super::load_documents;
use crate::output::{print_json, print_table, print_warning, OutputFormat};

/// Row for the summary table
#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Total")]
    total: usize,
    #[tabled(rename = "Completed")]
    completed: usize,
    #[tabled(rename = "Passed")]
    passed: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Best Trial")]
    best_trial: String,
    #[tabled(rename = "Best Result")]
    best_result: String,
}

pub async fn summarize(
    engine: Arc<TuningEngine>,
    trials_path: &Path,
    profile: &str,
    format: OutputFormat,
) -> Result<ExperimentSummary> {
    let trials: Vec<TrialResult> = load_documents(trials_path).await?;
    let summary = engine.summarize(&trials, profile)?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_table(&[summary_row(&summary)], "No trials found");
            if summary.best_trial < 0 {
                print_warning("No trial passed");
            }
        }
    }
    Ok(summary)
}

fn summary_row(summary: &ExperimentSummary) -> SummaryRow {
    SummaryRow {
        total: summary.total_trials,
        completed: summary.trials_completed,
        passed: summary.trials_passed,
        failed: summary.trials_failed,
        direction: summary.direction.to_string(),
        best_trial: if summary.best_trial < 0 {
            "-".to_string()
        } else {
            summary.best_trial.to_string()
        },
        best_result: summary
            .best_result
            .map(|v| format!("{:.3}", v))
            .unwrap_or_else(|| "-".to_string()),
    }
}
