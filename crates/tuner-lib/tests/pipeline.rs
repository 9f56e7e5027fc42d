//! End-to-end pipeline: register experiments, submit result windows, read recommendations

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tuner_lib::experiment::SHORT_TERM;
use tuner_lib::generator::JVM_OPTIONS_ENV;
use tuner_lib::{BatchPolicy, EngineConfig, Experiment, ExperimentResultData, TuningEngine};

const EXP: &str = "tfb-qrh-hotspot";

fn experiment_doc() -> serde_json::Value {
    json!({
        "version": "v2.0",
        "experiment_name": EXP,
        "cluster_name": "cluster-one-division-bell",
        "mode": "monitor",
        "target_cluster": "remote",
        "kubernetes_objects": [{
            "type": "deployment",
            "name": "tfb-qrh-deployment",
            "namespace": "default",
            "containers": [{
                "container_image_name": "kruize/tfb-qrh:1.13.2.F_et17",
                "container_name": "tfb-server"
            }]
        }],
        "trial_settings": { "measurement_duration": "15min" },
        "recommendation_settings": { "threshold": "0.1" }
    })
}

fn aggregate(min: f64, max: f64, avg: f64, sum: f64) -> serde_json::Value {
    json!({ "aggregation_info": { "min": min, "max": max, "avg": avg, "sum": sum } })
}

fn result_doc(start: DateTime<Utc>, end: DateTime<Utc>) -> serde_json::Value {
    let memory_limit = 2048.0 * 1024.0 * 1024.0;
    json!({
        "version": "v2.0",
        "experiment_name": EXP,
        "interval_start_time": start.to_rfc3339(),
        "interval_end_time": end.to_rfc3339(),
        "kubernetes_objects": [{
            "type": "deployment",
            "name": "tfb-qrh-deployment",
            "namespace": "default",
            "containers": [{
                "container_image_name": "kruize/tfb-qrh:1.13.2.F_et17",
                "container_name": "tfb-server",
                "metrics": [
                    { "name": "cpuRequest", "results": aggregate(1.0, 1.0, 1.0, 4.0) },
                    { "name": "cpuLimit", "results": aggregate(1.5, 1.5, 1.5, 6.0) },
                    { "name": "cpuUsage", "results": aggregate(0.2, 1.1, 0.6, 2.4) },
                    { "name": "cpuThrottle", "results": aggregate(0.0, 0.1, 0.05, 0.2) },
                    { "name": "memoryRequest", "results": aggregate(1.0e9, 1.0e9, 1.0e9, 4.0e9) },
                    { "name": "memoryLimit", "results": aggregate(memory_limit, memory_limit, memory_limit, memory_limit * 4.0) },
                    { "name": "memoryUsage", "results": aggregate(4.0e8, 9.0e8, 6.0e8, 2.4e9) },
                    { "name": "memoryRSS", "results": aggregate(3.0e8, 8.0e8, 5.0e8, 2.0e9) },
                    {
                        "name": "jvmInfo",
                        "results": {
                            "aggregation_info": { "sum": 1.0 },
                            "metadata": {
                                "version": "17.0.2",
                                "vendor": "Eclipse Adoptium",
                                "runtime": "OpenJDK Runtime Environment"
                            }
                        }
                    }
                ]
            }]
        }]
    })
}

fn parse<T: serde::de::DeserializeOwned>(doc: serde_json::Value) -> T {
    serde_json::from_value(doc).expect("fixture should deserialize")
}

fn window(i: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let base: DateTime<Utc> = "2024-03-01T00:00:00Z".parse().unwrap();
    let start = base + Duration::minutes(15 * i);
    (start, start + Duration::minutes(15))
}

#[test]
fn test_experiment_to_recommendation() {
    let engine = TuningEngine::new(EngineConfig::default());

    let created = engine.create_experiments(vec![parse::<Experiment>(experiment_doc())]);
    assert!(created.is_success(), "{:?}", created);

    let results: Vec<ExperimentResultData> = (0..3)
        .map(|i| {
            let (start, end) = window(i);
            parse(result_doc(start, end))
        })
        .collect();
    let report = engine.update_results(results);
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.items.len(), 3);

    let stored = engine.experiment(EXP).unwrap();
    assert_eq!(stored.result_windows.len(), 3);

    let container = stored.containers().next().unwrap();
    assert_eq!(container.results.len(), 3);
    assert_eq!(container.recommendations.len(), 3);

    let (latest_end, terms) = container.latest_recommendation().unwrap();
    assert_eq!(*latest_end, window(2).1);
    let short = &terms[SHORT_TERM];
    assert_eq!(short.intervals, 3);
    assert_eq!(short.detected_layers, vec!["container", "hotspot"]);

    let value_of = |name: &str| {
        short
            .config
            .iter()
            .find(|env| env.name == name)
            .map(|env| env.value.clone())
    };
    assert_eq!(value_of("cpuLimit").as_deref(), Some("1.5"));
    assert_eq!(value_of("memoryLimit").as_deref(), Some("2147483648"));

    let options = value_of(JVM_OPTIONS_ENV).unwrap();
    assert!(options.contains("-XX:MaxRAMPercentage="), "{}", options);
    assert!(options.ends_with("-XX:+UseParallelGC"), "{}", options);
    assert!(!options.contains("-server"));
}

#[test]
fn test_result_batch_halts_and_continues() {
    let halting = TuningEngine::new(EngineConfig::default());
    halting.create_experiment(parse(experiment_doc()));

    let (start, end) = window(0);
    let good: ExperimentResultData = parse(result_doc(start, end));
    let mut inverted = good.clone();
    inverted.interval_start_time = Some(end);
    inverted.interval_end_time = Some(start);
    let (start2, end2) = window(1);
    let later: ExperimentResultData = parse(result_doc(start2, end2));

    let report = halting.update_results(vec![good.clone(), inverted.clone(), later.clone()]);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.items[1].validation_data.http_status_code, 400);
    assert_eq!(report.skipped, 1);
    assert_eq!(halting.experiment(EXP).unwrap().result_windows.len(), 1);

    let continuing = TuningEngine::new(EngineConfig {
        batch_policy: BatchPolicy::Continue,
        ..Default::default()
    });
    continuing.create_experiment(parse(experiment_doc()));
    let report = continuing.update_results(vec![good.clone(), inverted, later, good]);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.items[3].validation_data.http_status_code, 409);
    assert_eq!(continuing.experiment(EXP).unwrap().result_windows.len(), 2);
}

#[test]
fn test_metrics_exposition_after_pipeline() {
    let engine = TuningEngine::new(EngineConfig::default());
    engine.create_experiment(parse(experiment_doc()));
    let (start, end) = window(0);
    engine.update_results(vec![parse(result_doc(start, end))]);

    let text = engine.metrics().encode_text().unwrap();
    assert!(text.contains("runtime_tuner_results_accepted_total"));
    assert!(text.contains("runtime_tuner_experiments_in_store"));
    assert!(text.contains("runtime_tuner_result_processing_seconds_count"));
    assert!(text.contains("runtime_tuner_recommendation_latency_seconds_count"));
}
