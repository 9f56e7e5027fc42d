//! CLI integration tests

use serde_json::{json, Value};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn tuner(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tuner"))
        .args(args)
        .env("XDG_CONFIG_HOME", home)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute tuner")
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, stdout))
}

fn write_json(dir: &TempDir, name: &str, value: &Value) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

fn experiment(name: &str) -> Value {
    json!({
        "version": "v2.0",
        "experiment_name": name,
        "mode": "monitor",
        "target_cluster": "remote",
        "kubernetes_objects": [{
            "type": "deployment",
            "name": "tfb-qrh-deployment",
            "namespace": "default",
            "containers": [{ "container_name": "tfb-server" }]
        }],
        "trial_settings": { "measurement_duration": "15min" },
        "recommendation_settings": { "threshold": 0.1 }
    })
}

fn result(name: &str, start: &str, end: &str) -> Value {
    let metric = |metric: &str, value: f64| {
        json!({
            "name": metric,
            "results": {
                "aggregation_info": { "min": value, "max": value, "avg": value, "sum": value }
            }
        })
    };
    let memory = 2048.0 * 1024.0 * 1024.0;
    json!({
        "experiment_name": name,
        "interval_start_time": start,
        "interval_end_time": end,
        "kubernetes_objects": [{
            "type": "deployment",
            "name": "tfb-qrh-deployment",
            "namespace": "default",
            "containers": [{
                "container_name": "tfb-server",
                "metrics": [
                    metric("cpuRequest", 1.0),
                    metric("cpuLimit", 1.5),
                    metric("cpuUsage", 0.8),
                    metric("cpuThrottle", 0.0),
                    metric("memoryRequest", memory / 2.0),
                    metric("memoryLimit", memory),
                    metric("memoryUsage", memory / 3.0),
                    metric("memoryRSS", memory / 4.0)
                ]
            }]
        }]
    })
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    let output = tuner(home.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("validate"), "Should show validate command");
    assert!(stdout.contains("update-results"), "Should show update-results command");
    assert!(stdout.contains("recommend"), "Should show recommend command");
    assert!(stdout.contains("summarize"), "Should show summarize command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    let output = tuner(home.path(), &["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("tuner"), "Should show binary name");
}

#[test]
fn test_validate_reports_duplicate() {
    let dir = TempDir::new().unwrap();
    let path = write_json(&dir, "experiments.json", &json!([experiment("a"), experiment("a")]));

    let output = tuner(dir.path(), &["--format", "json", "validate", &path]);
    assert!(!output.status.success(), "duplicate should fail the command");

    let report = stdout_json(&output);
    let items = report["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["validation_data"]["http_status_code"], 201);
    assert_eq!(items[1]["validation_data"]["http_status_code"], 409);
}

#[test]
fn test_update_results_produces_recommendations() {
    let dir = TempDir::new().unwrap();
    let experiments = write_json(&dir, "experiments.json", &experiment("tfb"));
    let results = write_json(
        &dir,
        "results.json",
        &json!([
            result("tfb", "2024-03-01T00:00:00Z", "2024-03-01T00:15:00Z"),
            result("tfb", "2024-03-01T00:15:00Z", "2024-03-01T00:30:00Z")
        ]),
    );
    let metrics_path = dir.path().join("tuner.prom");

    let output = tuner(
        dir.path(),
        &[
            "--format",
            "json",
            "--metrics-out",
            &metrics_path.to_string_lossy(),
            "update-results",
            "--experiments",
            &experiments,
            &results,
        ],
    );
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let body = stdout_json(&output);
    assert_eq!(body["results"]["items"].as_array().unwrap().len(), 2);
    let recommendation = &body["recommendations"][0];
    assert_eq!(recommendation["container_name"], "tfb-server");
    let config = recommendation["terms"]["short_term"]["config"].as_array().unwrap();
    assert!(config
        .iter()
        .any(|env| env["name"] == "cpuLimit" && env["value"] == "1.5"));

    let metrics = std::fs::read_to_string(metrics_path).unwrap();
    assert!(metrics.contains("runtime_tuner_results_accepted_total 2"));
}

#[test]
fn test_recommend_static_hotspot() {
    let home = TempDir::new().unwrap();
    let output = tuner(
        home.path(),
        &[
            "-f", "json", "recommend", "--cpu", "1.5", "--memory", "2Gi", "--jdk", "17.0.2",
        ],
    );
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let body = stdout_json(&output);
    assert_eq!(
        body["jvm_options"],
        "-XX:MaxRAMPercentage=70.0 -XX:+UseParallelGC"
    );
}

#[test]
fn test_recommend_rejects_bad_quantity() {
    let home = TempDir::new().unwrap();
    let output = tuner(home.path(), &["recommend", "--cpu", "lots", "--memory", "2Gi"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--cpu"));
}

#[test]
fn test_summarize_trials() {
    let dir = TempDir::new().unwrap();
    let trials = write_json(
        &dir,
        "trials.json",
        &json!([
            { "trial_number": 0, "result": "120.5" },
            { "trial_number": 1, "result": "ERROR: OOMKilled" },
            { "trial_number": 2, "result": "98.2" }
        ]),
    );

    let output = tuner(dir.path(), &["--format", "json", "summarize", &trials]);
    assert!(output.status.success());

    let summary = stdout_json(&output);
    assert_eq!(summary["best_trial"], 2);
    assert_eq!(summary["trials_failed"], 1);
    assert_eq!(summary["direction"], "minimize");
}

#[test]
fn test_engine_config_from_environment() {
    let dir = TempDir::new().unwrap();
    let experiments = write_json(&dir, "experiments.json", &experiment("tfb"));
    // 20 minutes against a 15min window: rejected at the default tolerance, accepted at 600s
    let results = write_json(
        &dir,
        "results.json",
        &result("tfb", "2024-03-01T00:00:00Z", "2024-03-01T00:20:00Z"),
    );

    let strict = tuner(
        dir.path(),
        &["-f", "json", "update-results", "-e", &experiments, &results],
    );
    assert!(!strict.status.success());

    let relaxed = Command::new(env!("CARGO_BIN_EXE_tuner"))
        .args(["-f", "json", "update-results", "-e", &experiments, &results])
        .env("XDG_CONFIG_HOME", dir.path())
        .env("TUNER_MEASUREMENT_TOLERANCE_SECS", "600")
        .output()
        .unwrap();
    assert!(
        relaxed.status.success(),
        "{}",
        String::from_utf8_lossy(&relaxed.stderr)
    );
}
