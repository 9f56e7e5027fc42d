//! Tunable dependency resolution
//!
//! Orders the requested tunables so every prerequisite is generated before
//! its dependents (container before runtime before framework), then runs
//! each layer's generator and feeds numeric outputs back into the
//! dependency map. A tunable whose prerequisites are missing is skipped and
//! reported as a [`Notification`]; nothing is guessed.

use crate::generator::{
    DependencyValues, GenerationContext, GeneratorRegistry, RecommendationConfigEnv,
    JVM_OPTIONS_ENV,
};
use crate::interval::IntervalMap;
use crate::tunable::{layers, LayerCatalog, TunableSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Why a tunable produced no recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCode {
    MissingDependency,
    NoGenerator,
    UnknownTunable,
    InsufficientData,
    DependencyCycle,
    LayerOrderViolation,
}

impl NotificationCode {
    /// Stable numeric code
    pub fn code(&self) -> u32 {
        match self {
            NotificationCode::MissingDependency => 1001,
            NotificationCode::NoGenerator => 1002,
            NotificationCode::UnknownTunable => 1003,
            NotificationCode::InsufficientData => 1004,
            NotificationCode::DependencyCycle => 1005,
            NotificationCode::LayerOrderViolation => 1006,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCode::MissingDependency => "missing_dependency",
            NotificationCode::NoGenerator => "no_generator",
            NotificationCode::UnknownTunable => "unknown_tunable",
            NotificationCode::InsufficientData => "insufficient_data",
            NotificationCode::DependencyCycle => "dependency_cycle",
            NotificationCode::LayerOrderViolation => "layer_order_violation",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            NotificationCode::InsufficientData => Severity::Info,
            NotificationCode::MissingDependency => Severity::Warning,
            NotificationCode::NoGenerator
            | NotificationCode::UnknownTunable
            | NotificationCode::DependencyCycle
            | NotificationCode::LayerOrderViolation => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub code: u32,
    pub kind: NotificationCode,
    pub severity: Severity,
    pub tunable: TunableSpec,
    pub message: String,
}

impl Notification {
    pub fn new(kind: NotificationCode, tunable: TunableSpec, message: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            kind,
            severity: kind.severity(),
            tunable,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTunable {
    pub spec: TunableSpec,
    pub env: RecommendationConfigEnv,
    /// Scalar written back into the dependency map, if numeric
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Supplied by the caller rather than generated
    #[serde(default)]
    pub seeded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub recommendations: Vec<ResolvedTunable>,
    pub notifications: Vec<Notification>,
    #[serde(skip)]
    pub values: DependencyValues,
}

impl ResolutionReport {
    pub fn get(&self, spec: &TunableSpec) -> Option<&ResolvedTunable> {
        self.recommendations.iter().find(|r| &r.spec == spec)
    }

    /// Generated runtime and framework flags joined into one JVM options entry
    pub fn jvm_options(&self) -> Option<RecommendationConfigEnv> {
        let parts: Vec<_> = self
            .recommendations
            .iter()
            .filter(|r| !r.seeded && r.spec.layer_name != layers::CONTAINER)
            .map(|r| r.env.clone())
            .collect();
        RecommendationConfigEnv::combine(JVM_OPTIONS_ENV, &parts)
    }

    /// Every surfaced env entry: per-tunable outputs plus the combined JVM options
    pub fn envs(&self) -> Vec<RecommendationConfigEnv> {
        let mut envs: Vec<_> = self.recommendations.iter().map(|r| r.env.clone()).collect();
        envs.extend(self.jvm_options());
        envs
    }
}

pub struct DependencyResolver<'a> {
    catalog: &'a LayerCatalog,
    generators: &'a GeneratorRegistry,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(catalog: &'a LayerCatalog, generators: &'a GeneratorRegistry) -> Self {
        Self {
            catalog,
            generators,
        }
    }

    /// Topological order of `requested`; ties break by layer level, then request order
    pub fn order(&self, requested: &[TunableSpec]) -> (Vec<TunableSpec>, Vec<Notification>) {
        let mut notifications = Vec::new();

        let mut nodes: Vec<(TunableSpec, u32)> = Vec::new();
        for spec in requested {
            if nodes.iter().any(|(s, _)| s == spec) {
                continue;
            }
            let (Some(tunable), Some(level)) = (
                self.catalog.tunable(spec),
                self.catalog.level(&spec.layer_name),
            ) else {
                notifications.push(Notification::new(
                    NotificationCode::UnknownTunable,
                    spec.clone(),
                    format!("Tunable {} is not defined in any known layer", spec),
                ));
                continue;
            };

            let violation = tunable.depends_on.iter().find(|dep| {
                self.catalog
                    .level(&dep.layer_name)
                    .map(|dep_level| dep_level > level)
                    .unwrap_or(false)
            });
            if let Some(dep) = violation {
                notifications.push(Notification::new(
                    NotificationCode::LayerOrderViolation,
                    spec.clone(),
                    format!(
                        "Tunable {} depends on {} from a higher layer level",
                        spec, dep
                    ),
                ));
                continue;
            }
            nodes.push((spec.clone(), level));
        }

        let index: HashMap<&TunableSpec, usize> =
            nodes.iter().enumerate().map(|(i, (s, _))| (s, i)).collect();
        let mut indegree = vec![0usize; nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, (spec, _)) in nodes.iter().enumerate() {
            let deps = self
                .catalog
                .tunable(spec)
                .map(|t| t.depends_on.as_slice())
                .unwrap_or(&[]);
            for dep in deps {
                if let Some(&j) = index.get(dep) {
                    if j != i {
                        indegree[i] += 1;
                        dependents[j].push(i);
                    }
                }
            }
        }

        let mut ready: BTreeSet<(u32, usize)> = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] == 0)
            .map(|(i, (_, level))| (*level, i))
            .collect();
        let mut ordered = Vec::with_capacity(nodes.len());
        let mut placed = vec![false; nodes.len()];

        while let Some((_, i)) = ready.pop_first() {
            placed[i] = true;
            ordered.push(nodes[i].0.clone());
            for &d in &dependents[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    ready.insert((nodes[d].1, d));
                }
            }
        }

        for (i, (spec, _)) in nodes.iter().enumerate() {
            if !placed[i] {
                notifications.push(Notification::new(
                    NotificationCode::DependencyCycle,
                    spec.clone(),
                    format!("Tunable {} is part of a dependency cycle", spec),
                ));
            }
        }

        (ordered, notifications)
    }

    /// Generate every requested tunable in dependency order
    ///
    /// `seed` holds values already known to the caller; a requested tunable
    /// present in the seed is surfaced as-is rather than regenerated.
    pub fn resolve(
        &self,
        requested: &[TunableSpec],
        seed: DependencyValues,
        intervals: &IntervalMap,
    ) -> ResolutionReport {
        let (ordered, mut notifications) = self.order(requested);
        let mut values = seed;
        let mut recommendations = Vec::new();
        let mut ctx = GenerationContext::new();

        for spec in ordered {
            if let Some(value) = values.get(&spec).copied() {
                debug!(tunable = %spec, value = value, "Using caller-supplied value");
                recommendations.push(ResolvedTunable {
                    env: RecommendationConfigEnv::new(spec.tunable_name.clone(), format!("{}", value)),
                    spec,
                    value: Some(value),
                    seeded: true,
                });
                continue;
            }

            let Some(tunable) = self.catalog.tunable(&spec) else {
                continue;
            };

            let missing: Vec<&TunableSpec> = tunable
                .depends_on
                .iter()
                .filter(|d| !values.contains_key(*d))
                .collect();
            if !missing.is_empty() {
                let missing_list = missing
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                warn!(tunable = %spec, missing = %missing_list, "Prerequisite not resolved, skipping tunable");
                notifications.push(Notification::new(
                    NotificationCode::MissingDependency,
                    spec.clone(),
                    format!("Tunable {} skipped: missing prerequisite(s) {}", spec, missing_list),
                ));
                continue;
            }

            let Some(generator) = self.generators.get(&spec.layer_name) else {
                warn!(tunable = %spec, "No generator registered for layer");
                notifications.push(Notification::new(
                    NotificationCode::NoGenerator,
                    spec.clone(),
                    format!("No recommendation generator for layer {}", spec.layer_name),
                ));
                continue;
            };

            if !generator.supports(&spec.tunable_name) {
                warn!(tunable = %spec, "Generator does not support tunable");
                notifications.push(Notification::new(
                    NotificationCode::UnknownTunable,
                    spec.clone(),
                    format!(
                        "Layer {} cannot recommend tunable {}",
                        spec.layer_name, spec.tunable_name
                    ),
                ));
                continue;
            }

            match generator.generate(&spec.tunable_name, &values, intervals, &mut ctx) {
                Some(env) => {
                    let value = if tunable.value_type.is_numeric() {
                        env.numeric_value()
                    } else {
                        None
                    };
                    if let Some(v) = value {
                        values.insert(spec.clone(), v);
                    }
                    debug!(tunable = %spec, env = %env, "Generated recommendation");
                    recommendations.push(ResolvedTunable {
                        spec,
                        env,
                        value,
                        seeded: false,
                    });
                }
                None => {
                    notifications.push(Notification::new(
                        NotificationCode::InsufficientData,
                        spec.clone(),
                        format!("Insufficient data to recommend {}", spec),
                    ));
                }
            }
        }

        ResolutionReport {
            recommendations,
            notifications,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::quantity::mb_to_bytes;
    use crate::tunable::{names, LayerDefinition, LayerPresence, Tunable, ValueType};

    fn spec(layer: &str, name: &str) -> TunableSpec {
        TunableSpec::new(layer, name)
    }

    fn container_seed(cpu: f64, memory_mb: f64) -> DependencyValues {
        let mut seed = DependencyValues::new();
        seed.insert(spec(layers::CONTAINER, names::CPU_LIMIT), cpu);
        seed.insert(spec(layers::CONTAINER, names::MEMORY_LIMIT), mb_to_bytes(memory_mb));
        seed
    }

    fn all_hotspot_quarkus() -> Vec<TunableSpec> {
        // Deliberately reversed
        vec![
            spec(layers::QUARKUS, names::CORE_THREADS),
            spec(layers::HOTSPOT, names::GC_POLICY),
            spec(layers::HOTSPOT, names::MAX_RAM_PERCENTAGE),
            spec(layers::CONTAINER, names::MEMORY_LIMIT),
            spec(layers::CONTAINER, names::CPU_LIMIT),
        ]
    }

    #[test]
    fn test_order_is_topological_and_layered() {
        let catalog = LayerCatalog::with_builtin_layers();
        let generators = GeneratorRegistry::with_defaults(&EngineConfig::default());
        let resolver = DependencyResolver::new(&catalog, &generators);

        let (ordered, notifications) = resolver.order(&all_hotspot_quarkus());
        assert!(notifications.is_empty());

        let pos = |s: &TunableSpec| ordered.iter().position(|o| o == s).unwrap();
        let cpu = pos(&spec(layers::CONTAINER, names::CPU_LIMIT));
        let mem = pos(&spec(layers::CONTAINER, names::MEMORY_LIMIT));
        let pct = pos(&spec(layers::HOTSPOT, names::MAX_RAM_PERCENTAGE));
        let gc = pos(&spec(layers::HOTSPOT, names::GC_POLICY));
        let threads = pos(&spec(layers::QUARKUS, names::CORE_THREADS));
        assert!(cpu < pct && mem < pct);
        assert!(pct < gc);
        assert!(gc < threads);
    }

    #[test]
    fn test_resolve_with_seeded_container() {
        let catalog = LayerCatalog::with_builtin_layers();
        let generators = GeneratorRegistry::with_defaults(&EngineConfig::default());
        let resolver = DependencyResolver::new(&catalog, &generators);

        let report = resolver.resolve(
            &all_hotspot_quarkus(),
            container_seed(1.5, 2048.0),
            &IntervalMap::new(),
        );
        assert!(report.notifications.is_empty(), "{:?}", report.notifications);

        let pct = report
            .get(&spec(layers::HOTSPOT, names::MAX_RAM_PERCENTAGE))
            .unwrap();
        assert_eq!(pct.value, Some(70.0));
        assert_eq!(
            report.values.get(&spec(layers::HOTSPOT, names::MAX_RAM_PERCENTAGE)),
            Some(&70.0)
        );

        let gc = report.get(&spec(layers::HOTSPOT, names::GC_POLICY)).unwrap();
        assert_eq!(gc.env.value, "-XX:+UseParallelGC");
        assert_eq!(gc.value, None);

        let threads = report
            .get(&spec(layers::QUARKUS, names::CORE_THREADS))
            .unwrap();
        assert_eq!(threads.value, Some(2.0));

        let options = report.jvm_options().unwrap();
        assert_eq!(
            options.value,
            "-XX:MaxRAMPercentage=70.0 -XX:+UseParallelGC -Dquarkus.thread-pool.core-threads=2"
        );
        assert!(report.get(&spec(layers::CONTAINER, names::CPU_LIMIT)).unwrap().seeded);
    }

    #[test]
    fn test_missing_container_values_are_reported() {
        let catalog = LayerCatalog::with_builtin_layers();
        let generators = GeneratorRegistry::with_defaults(&EngineConfig::default());
        let resolver = DependencyResolver::new(&catalog, &generators);

        let requested = vec![
            spec(layers::HOTSPOT, names::MAX_RAM_PERCENTAGE),
            spec(layers::HOTSPOT, names::GC_POLICY),
        ];
        let report = resolver.resolve(&requested, DependencyValues::new(), &IntervalMap::new());
        assert!(report.recommendations.is_empty());
        assert_eq!(report.notifications.len(), 2);
        assert!(report
            .notifications
            .iter()
            .all(|n| n.kind == NotificationCode::MissingDependency));
        assert!(report.jvm_options().is_none());
    }

    #[test]
    fn test_insufficient_data_is_reported() {
        let catalog = LayerCatalog::with_builtin_layers();
        let generators = GeneratorRegistry::with_defaults(&EngineConfig::default());
        let resolver = DependencyResolver::new(&catalog, &generators);

        // Container layer requested but no interval carries limits
        let requested = vec![
            spec(layers::CONTAINER, names::CPU_LIMIT),
            spec(layers::QUARKUS, names::CORE_THREADS),
        ];
        let report = resolver.resolve(&requested, DependencyValues::new(), &IntervalMap::new());
        let kinds: Vec<_> = report.notifications.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotificationCode::InsufficientData,
                NotificationCode::MissingDependency
            ]
        );
    }

    #[test]
    fn test_unknown_and_unsupported_tunables() {
        let mut catalog = LayerCatalog::with_builtin_layers();
        catalog.insert(LayerDefinition {
            layer_name: "liberty".into(),
            layer_level: 2,
            details: None,
            layer_presence: LayerPresence::always(),
            tunables: vec![Tunable::numeric("maxThreads", ValueType::Integer, 1.0, 50.0, 1.0).unwrap()],
        });
        let generators = GeneratorRegistry::with_defaults(&EngineConfig::default());
        let resolver = DependencyResolver::new(&catalog, &generators);

        let report = resolver.resolve(
            &[spec("liberty", "maxThreads"), spec("hotspot", "Xss")],
            DependencyValues::new(),
            &IntervalMap::new(),
        );
        let kinds: Vec<_> = report.notifications.iter().map(|n| n.kind).collect();
        assert!(kinds.contains(&NotificationCode::UnknownTunable));
        assert!(kinds.contains(&NotificationCode::NoGenerator));
    }

    #[test]
    fn test_cycle_and_layer_violation_detected() {
        let mut catalog = LayerCatalog::new();
        let a = Tunable::numeric("a", ValueType::Double, 0.0, 1.0, 0.1)
            .unwrap()
            .depends_on("custom", "b");
        let b = Tunable::numeric("b", ValueType::Double, 0.0, 1.0, 0.1)
            .unwrap()
            .depends_on("custom", "a");
        let low = Tunable::numeric("low", ValueType::Double, 0.0, 1.0, 0.1)
            .unwrap()
            .depends_on("upper", "high");
        let high = Tunable::numeric("high", ValueType::Double, 0.0, 1.0, 0.1).unwrap();
        catalog.insert(LayerDefinition {
            layer_name: "custom".into(),
            layer_level: 1,
            details: None,
            layer_presence: LayerPresence::always(),
            tunables: vec![a, b, low],
        });
        catalog.insert(LayerDefinition {
            layer_name: "upper".into(),
            layer_level: 2,
            details: None,
            layer_presence: LayerPresence::always(),
            tunables: vec![high],
        });
        let generators = GeneratorRegistry::new();
        let resolver = DependencyResolver::new(&catalog, &generators);

        let (ordered, notifications) = resolver.order(&[
            spec("custom", "a"),
            spec("custom", "b"),
            spec("custom", "low"),
            spec("upper", "high"),
        ]);
        assert_eq!(ordered, vec![spec("upper", "high")]);
        let kinds: Vec<_> = notifications.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotificationCode::LayerOrderViolation,
                NotificationCode::DependencyCycle,
                NotificationCode::DependencyCycle
            ]
        );
    }
}
