//! One-shot recommendation from seeded container resources

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tabled::Tabled;
use tuner_lib::generator::{DependencyValues, JVM_INFO};
use tuner_lib::interval::{IntervalMap, IntervalResults, MetricResults};
use tuner_lib::quantity::{parse_cpu_cores, parse_memory_bytes};
use tuner_lib::tunable::{layers, names, TunableSpec};
use tuner_lib::{ResolutionReport, TuningEngine};

use crate::output::{
    color_severity, format_bytes, print_json, print_table, print_warning, OutputFormat,
};

/// Seeded inputs for a static recommendation
#[derive(Debug, Clone)]
pub struct RecommendArgs {
    pub cpu: String,
    pub memory: String,
    pub jdk_version: Option<String>,
    pub layers: Vec<String>,
}

/// Row for tunable tables
#[derive(Tabled)]
struct TunableRow {
    #[tabled(rename = "Layer")]
    layer: String,
    #[tabled(rename = "Tunable")]
    tunable: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
}

/// Row for notification tables
#[derive(Tabled)]
struct NotificationRow {
    #[tabled(rename = "Code")]
    code: u32,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Tunable")]
    tunable: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn recommend(
    engine: Arc<TuningEngine>,
    args: RecommendArgs,
    format: OutputFormat,
) -> Result<ResolutionReport> {
    let seed = seed_values(&args.cpu, &args.memory)?;
    let intervals = jvm_intervals(args.jdk_version.as_deref())?;

    let layer_names = args.layers.clone();
    let report = tokio::task::spawn_blocking(move || engine.recommend(&layer_names, seed, &intervals))
        .await
        .context("Recommendation task failed")??;

    match format {
        OutputFormat::Json => print_json(&RecommendOutput {
            recommendations: &report,
            jvm_options: report.jvm_options().map(|env| env.value),
        })?,
        OutputFormat::Table => print_report(&report),
    }
    Ok(report)
}

#[derive(serde::Serialize)]
struct RecommendOutput<'a> {
    #[serde(flatten)]
    recommendations: &'a ResolutionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    jvm_options: Option<String>,
}

fn seed_values(cpu: &str, memory: &str) -> Result<DependencyValues> {
    let cores = parse_cpu_cores(cpu).with_context(|| format!("Invalid --cpu {}", cpu))?;
    let bytes = parse_memory_bytes(memory).with_context(|| format!("Invalid --memory {}", memory))?;
    anyhow::ensure!(cores > 0.0, "--cpu must be positive");
    anyhow::ensure!(bytes > 0.0, "--memory must be positive");

    let mut seed = DependencyValues::new();
    seed.insert(TunableSpec::new(layers::CONTAINER, names::CPU_LIMIT), cores);
    seed.insert(TunableSpec::new(layers::CONTAINER, names::MEMORY_LIMIT), bytes);
    Ok(seed)
}

/// A single synthetic interval carrying the JVM version label
fn jvm_intervals(jdk_version: Option<&str>) -> Result<IntervalMap> {
    let Some(version) = jdk_version else {
        return Ok(IntervalMap::new());
    };
    let end = Utc::now();
    let start = end - Duration::minutes(15);

    let mut jvm = MetricResults::default();
    jvm.metadata.insert("version".to_string(), version.to_string());
    let interval =
        IntervalResults::with_metrics(start, end, BTreeMap::from([(JVM_INFO.to_string(), jvm)]))?;
    Ok(IntervalMap::from([(end, interval)]))
}

fn print_report(report: &ResolutionReport) {
    let rows: Vec<TunableRow> = report
        .recommendations
        .iter()
        .map(|rec| TunableRow {
            layer: rec.spec.layer_name.clone(),
            tunable: rec.spec.tunable_name.clone(),
            value: match (rec.spec.tunable_name.as_str(), rec.value) {
                (names::MEMORY_LIMIT, Some(bytes)) => format_bytes(bytes),
                _ => rec.env.value.clone(),
            },
            source: if rec.seeded { "seeded" } else { "generated" }.to_string(),
        })
        .collect();
    print_table(&rows, "No tunables resolved");

    if let Some(options) = report.jvm_options() {
        println!("{}", options);
    }

    if !report.notifications.is_empty() {
        print_warning(&format!("{} tunable(s) skipped", report.notifications.len()));
        let rows: Vec<NotificationRow> = report
            .notifications
            .iter()
            .map(|n| NotificationRow {
                code: n.code,
                severity: color_severity(&format!("{:?}", n.severity).to_lowercase()),
                tunable: n.tunable.to_string(),
                message: n.message.clone(),
            })
            .collect();
        print_table(&rows, "");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_values() {
        let seed = seed_values("1500m", "2Gi").unwrap();
        assert_eq!(
            seed.get(&TunableSpec::new(layers::CONTAINER, names::CPU_LIMIT)),
            Some(&1.5)
        );
        assert_eq!(
            seed.get(&TunableSpec::new(layers::CONTAINER, names::MEMORY_LIMIT)),
            Some(&(2048.0 * 1024.0 * 1024.0))
        );
        assert!(seed_values("0", "2Gi").is_err());
        assert!(seed_values("1", "lots").is_err());
    }

    #[test]
    fn test_jvm_intervals() {
        assert!(jvm_intervals(None).unwrap().is_empty());
        let intervals = jvm_intervals(Some("11.0.20")).unwrap();
        let interval = intervals.values().next().unwrap();
        assert_eq!(
            interval.metric(JVM_INFO).unwrap().metadata.get("version").map(String::as_str),
            Some("11.0.20")
        );
    }
}
