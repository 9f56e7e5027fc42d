//! Experiment registration and result ingestion commands

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::Tabled;
use tracing::info;
use tuner_lib::experiment::TermRecommendation;
use tuner_lib::{BatchReport, Experiment, ExperimentResultData, TuningEngine};

use super::load_documents;
use crate::output::{
    color_status, print_info, print_json, print_success, print_table, print_warning, OutputFormat,
};

/// Row for validation outcome tables
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Experiment")]
    experiment: String,
    #[tabled(rename = "Interval End")]
    interval_end: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Row for recommendation tables
#[derive(Tabled)]
struct RecommendationRow {
    #[tabled(rename = "Experiment")]
    experiment: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Term")]
    term: String,
    #[tabled(rename = "Intervals")]
    intervals: usize,
    #[tabled(rename = "Layers")]
    layers: String,
    #[tabled(rename = "Config")]
    config: String,
}

/// Latest recommendation of one container, for JSON output
#[derive(Serialize)]
struct ContainerRecommendation<'a> {
    experiment_name: &'a str,
    container_name: &'a str,
    interval_end_time: String,
    terms: &'a std::collections::BTreeMap<String, TermRecommendation>,
}

#[derive(Serialize)]
struct UpdateOutput<'a> {
    experiments: &'a BatchReport,
    results: &'a BatchReport,
    recommendations: Vec<ContainerRecommendation<'a>>,
}

/// Register every experiment in `path`
pub async fn validate(
    engine: Arc<TuningEngine>,
    path: &Path,
    format: OutputFormat,
) -> Result<BatchReport> {
    let report = register(engine, path).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_table(&outcome_rows(&report), "No experiments found");
            summarize_batch(&report, "experiments");
        }
    }
    Ok(report)
}

/// Register experiments, then ingest result windows and show the latest recommendations
pub async fn update_results(
    engine: Arc<TuningEngine>,
    experiments_path: &Path,
    results_paths: &[PathBuf],
    format: OutputFormat,
) -> Result<(BatchReport, BatchReport)> {
    let registered = register(engine.clone(), experiments_path).await?;

    let mut results: Vec<ExperimentResultData> = Vec::new();
    for path in results_paths {
        results.extend(load_documents(path).await?);
    }
    info!(results = results.len(), "Loaded result windows");

    let runner = engine.clone();
    let ingested = tokio::task::spawn_blocking(move || runner.update_results(results))
        .await
        .context("Result ingestion task failed")?;

    let experiments: Vec<Experiment> = registered
        .items
        .iter()
        .filter_map(|item| engine.experiment(&item.experiment_name))
        .collect();
    let recommendations = latest_recommendations(&experiments);

    match format {
        OutputFormat::Json => print_json(&UpdateOutput {
            experiments: &registered,
            results: &ingested,
            recommendations,
        })?,
        OutputFormat::Table => {
            print_table(&outcome_rows(&registered), "No experiments found");
            summarize_batch(&registered, "experiments");
            print_table(&outcome_rows(&ingested), "No result windows found");
            summarize_batch(&ingested, "result windows");
            print_table(&recommendation_rows(&recommendations), "No recommendations yet");
        }
    }
    Ok((registered, ingested))
}

async fn register(engine: Arc<TuningEngine>, path: &Path) -> Result<BatchReport> {
    let experiments: Vec<Experiment> = load_documents(path).await?;
    info!(experiments = experiments.len(), path = %path.display(), "Loaded experiments");

    tokio::task::spawn_blocking(move || engine.create_experiments(experiments))
        .await
        .context("Experiment registration task failed")
}

fn outcome_rows(report: &BatchReport) -> Vec<OutcomeRow> {
    report
        .items
        .iter()
        .map(|item| OutcomeRow {
            experiment: item.experiment_name.clone(),
            interval_end: item.interval_end_time.clone().unwrap_or_else(|| "-".to_string()),
            status: color_status(item.validation_data.http_status_code),
            message: item
                .validation_data
                .message
                .clone()
                .unwrap_or_else(|| "accepted".to_string()),
        })
        .collect()
}

fn summarize_batch(report: &BatchReport, what: &str) {
    if report.failed() == 0 && !report.halted() {
        print_success(&format!("{} {} accepted", report.succeeded(), what));
        return;
    }
    print_warning(&format!(
        "{} of {} {} rejected",
        report.failed(),
        report.items.len(),
        what
    ));
    if report.halted() {
        print_info(&format!(
            "{} {} not processed after the first failure",
            report.skipped, what
        ));
    }
}

fn latest_recommendations(experiments: &[Experiment]) -> Vec<ContainerRecommendation<'_>> {
    experiments
        .iter()
        .flat_map(|experiment| {
            experiment.containers().filter_map(move |container| {
                container
                    .latest_recommendation()
                    .map(|(end, terms)| ContainerRecommendation {
                        experiment_name: experiment.name(),
                        container_name: &container.container_name,
                        interval_end_time: end.to_rfc3339(),
                        terms,
                    })
            })
        })
        .collect()
}

fn recommendation_rows(recommendations: &[ContainerRecommendation<'_>]) -> Vec<RecommendationRow> {
    recommendations
        .iter()
        .flat_map(|rec| {
            rec.terms.iter().map(move |(term, terms)| RecommendationRow {
                experiment: rec.experiment_name.to_string(),
                container: rec.container_name.to_string(),
                term: term.clone(),
                intervals: terms.intervals,
                layers: terms.detected_layers.join(","),
                config: terms
                    .config
                    .iter()
                    .map(|env| env.to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            })
        })
        .collect()
}
