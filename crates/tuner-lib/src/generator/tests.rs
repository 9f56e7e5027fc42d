//! Generator behavior across layers

use super::*;
use crate::interval::{AggregationInfo, IntervalResults, MetricResults};
use crate::quantity::mb_to_bytes;
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;

fn container_deps(cpu_cores: f64, memory_mb: f64) -> DependencyValues {
    let mut deps = DependencyValues::new();
    deps.insert(TunableSpec::new(layers::CONTAINER, names::CPU_LIMIT), cpu_cores);
    deps.insert(
        TunableSpec::new(layers::CONTAINER, names::MEMORY_LIMIT),
        mb_to_bytes(memory_mb),
    );
    deps
}

fn jvm_intervals(version: &str) -> IntervalMap {
    let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let end = Utc.timestamp_opt(1_700_000_900, 0).unwrap();
    let mut info = MetricResults::default();
    info.metadata.insert("version".into(), version.into());
    let mut metrics = BTreeMap::new();
    metrics.insert(jvm::JVM_INFO.to_string(), info);
    let mut map = IntervalMap::new();
    map.insert(end, IntervalResults::with_metrics(start, end, metrics).unwrap());
    map
}

fn limits_intervals(cpu: Option<f64>, memory: Option<f64>) -> IntervalMap {
    let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let end = Utc.timestamp_opt(1_700_000_900, 0).unwrap();
    let mut metrics = BTreeMap::new();
    let agg = |avg| {
        MetricResults::from_aggregation(AggregationInfo {
            avg: Some(avg),
            ..Default::default()
        })
    };
    if let Some(c) = cpu {
        metrics.insert(names::CPU_LIMIT.to_string(), agg(c));
    }
    if let Some(m) = memory {
        metrics.insert(names::MEMORY_LIMIT.to_string(), agg(m));
    }
    let mut map = IntervalMap::new();
    map.insert(end, IntervalResults::with_metrics(start, end, metrics).unwrap());
    map
}

fn hotspot() -> JvmGenerator {
    JvmGenerator::new(JvmFlavor::Hotspot, MemorySizing::default())
}

#[test]
fn test_numeric_value_parsing() {
    let env = RecommendationConfigEnv::new("MaxRAMPercentage", "-XX:MaxRAMPercentage=75.0");
    assert_eq!(env.numeric_value(), Some(75.0));
    assert_eq!(env.prepend("-server").numeric_value(), Some(75.0));
    assert_eq!(RecommendationConfigEnv::new("cpuLimit", "1.5").numeric_value(), Some(1.5));
    assert_eq!(
        RecommendationConfigEnv::new("GCPolicy", "-XX:+UseG1GC").numeric_value(),
        None
    );
}

#[test]
fn test_combine_keeps_order() {
    let parts = vec![
        RecommendationConfigEnv::new("a", "-server -XX:MaxRAMPercentage=70.0"),
        RecommendationConfigEnv::new("b", "-XX:+UseParallelGC"),
    ];
    let combined = RecommendationConfigEnv::combine(JVM_OPTIONS_ENV, &parts).unwrap();
    assert_eq!(combined.name, JVM_OPTIONS_ENV);
    assert_eq!(
        combined.value,
        "-server -XX:MaxRAMPercentage=70.0 -XX:+UseParallelGC"
    );
    assert!(RecommendationConfigEnv::combine(JVM_OPTIONS_ENV, &[]).is_none());
}

#[test]
fn test_server_flag_claimed_once() {
    let mut ctx = GenerationContext::new();
    assert!(ctx.claim_server_flag());
    assert!(!ctx.claim_server_flag());
    assert!(ctx.server_flag_added());
}

#[test]
fn test_static_max_ram_percentage() {
    let generator = hotspot();
    let mut ctx = GenerationContext::new();
    let env = generator
        .generate(
            names::MAX_RAM_PERCENTAGE,
            &container_deps(1.5, 2048.0),
            &IntervalMap::new(),
            &mut ctx,
        )
        .unwrap();
    assert_eq!(env.value, "-XX:MaxRAMPercentage=70.0");
}

#[test]
fn test_gc_policy_uses_effective_heap() {
    let generator = hotspot();
    let mut deps = container_deps(1.5, 2048.0);
    deps.insert(TunableSpec::new(layers::HOTSPOT, names::MAX_RAM_PERCENTAGE), 70.0);
    let mut ctx = GenerationContext::new();

    // 2048MB * 70% = 1433.6MB heap, ceil(1.5) = 2 cores: below the ZGC threshold
    let env = generator
        .generate(names::GC_POLICY, &deps, &jvm_intervals("17.0.2"), &mut ctx)
        .unwrap();
    assert_ne!(env.value, "-XX:+UseZGC");
    assert_eq!(env.value, "-XX:+UseParallelGC");

    let mut big = container_deps(4.0, 16384.0);
    big.insert(TunableSpec::new(layers::HOTSPOT, names::MAX_RAM_PERCENTAGE), 85.0);
    let env = generator
        .generate(names::GC_POLICY, &big, &jvm_intervals("17.0.2"), &mut ctx)
        .unwrap();
    assert_eq!(env.value, "-XX:+UseZGC");
}

#[test]
fn test_semeru_gc_flags() {
    let generator = JvmGenerator::new(JvmFlavor::Semeru, MemorySizing::default());
    let mut deps = container_deps(8.0, 2048.0);
    deps.insert(TunableSpec::new(layers::SEMERU, names::MAX_RAM_PERCENTAGE), 75.0);
    let mut ctx = GenerationContext::new();
    let env = generator
        .generate(names::GC_POLICY, &deps, &jvm_intervals("11.0.20"), &mut ctx)
        .unwrap();
    assert_eq!(env.value, "-Xgcpolicy:gencon");
}

#[test]
fn test_missing_dependencies_skip() {
    let generator = hotspot();
    let mut ctx = GenerationContext::new();
    let intervals = IntervalMap::new();

    assert!(generator
        .generate(names::MAX_RAM_PERCENTAGE, &DependencyValues::new(), &intervals, &mut ctx)
        .is_none());

    // CPU and memory present but heap percentage missing
    assert!(generator
        .generate(names::GC_POLICY, &container_deps(2.0, 4096.0), &intervals, &mut ctx)
        .is_none());

    assert!(generator
        .generate(names::MAX_RAM_PERCENTAGE, &container_deps(0.0, 4096.0), &intervals, &mut ctx)
        .is_none());

    assert!(generator
        .generate("Xss", &container_deps(2.0, 4096.0), &intervals, &mut ctx)
        .is_none());
}

#[test]
fn test_server_flag_prepended_once_for_legacy_jdk() {
    let generator = hotspot();
    let mut deps = container_deps(2.0, 2048.0);
    deps.insert(TunableSpec::new(layers::HOTSPOT, names::MAX_RAM_PERCENTAGE), 75.0);
    let intervals = jvm_intervals("1.8.0_292");
    let mut ctx = GenerationContext::new();

    let first = generator
        .generate(names::MAX_RAM_PERCENTAGE, &deps, &intervals, &mut ctx)
        .unwrap();
    let second = generator
        .generate(names::GC_POLICY, &deps, &intervals, &mut ctx)
        .unwrap();
    assert!(first.value.starts_with("-server "));
    assert!(!second.value.contains("-server"));

    // A fresh run gets its own latch
    let mut next_run = GenerationContext::new();
    let again = generator
        .generate(names::GC_POLICY, &deps, &intervals, &mut next_run)
        .unwrap();
    assert!(again.value.starts_with("-server "));
}

#[test]
fn test_modern_jdk_has_no_server_flag() {
    let generator = hotspot();
    let mut ctx = GenerationContext::new();
    let env = generator
        .generate(
            names::MAX_RAM_PERCENTAGE,
            &container_deps(2.0, 2048.0),
            &jvm_intervals("17"),
            &mut ctx,
        )
        .unwrap();
    assert!(!env.value.contains("-server"));
    assert!(!ctx.server_flag_added());
}

#[test]
fn test_quarkus_threads() {
    let generator = QuarkusGenerator::default();
    let mut ctx = GenerationContext::new();
    let intervals = IntervalMap::new();

    let env = generator
        .generate(names::CORE_THREADS, &container_deps(0.3, 512.0), &intervals, &mut ctx)
        .unwrap();
    assert_eq!(env.value, "-Dquarkus.thread-pool.core-threads=1");
    assert_eq!(env.numeric_value(), Some(1.0));

    assert!(generator
        .generate(names::CORE_THREADS, &DependencyValues::new(), &intervals, &mut ctx)
        .is_none());
}

#[test]
fn test_container_limits_from_intervals() {
    let generator = ContainerGenerator::new();
    let mut ctx = GenerationContext::new();
    let intervals = limits_intervals(Some(1.5), Some(mb_to_bytes(2048.0)));
    let deps = DependencyValues::new();

    let cpu = generator
        .generate(names::CPU_LIMIT, &deps, &intervals, &mut ctx)
        .unwrap();
    assert_eq!(cpu.numeric_value(), Some(1.5));

    let memory = generator
        .generate(names::MEMORY_LIMIT, &deps, &intervals, &mut ctx)
        .unwrap();
    assert_eq!(memory.numeric_value(), Some(mb_to_bytes(2048.0)));

    let missing = limits_intervals(None, Some(0.0));
    assert!(generator
        .generate(names::CPU_LIMIT, &deps, &missing, &mut ctx)
        .is_none());
    assert!(generator
        .generate(names::MEMORY_LIMIT, &deps, &missing, &mut ctx)
        .is_none());
}

#[test]
fn test_default_registry() {
    let registry = GeneratorRegistry::with_defaults(&EngineConfig::default());
    assert_eq!(
        registry.layer_names(),
        vec!["container", "hotspot", "quarkus", "semeru"]
    );
    let quarkus = registry.get(layers::QUARKUS).unwrap();
    assert!(quarkus.supports(names::CORE_THREADS));
    assert!(!quarkus.supports(names::GC_POLICY));
    assert!(registry.get("liberty").is_none());
}
