//! Profile-specific result validation and recommendation
//!
//! Handlers are looked up by profile name in a [`HandlerRegistry`]; a
//! registry may carry a fallback used for profiles without a dedicated
//! handler. `validate` failures are input errors, `recommend` failures are
//! internal errors.

use super::{names, PerformanceProfile};
use crate::config::EngineConfig;
use crate::experiment::{Experiment, ExperimentResultData, TermRecommendation, SHORT_TERM};
use crate::generator::{DependencyValues, GeneratorRegistry};
use crate::interval::{within_window, IntervalMap};
use crate::resolver::DependencyResolver;
use crate::tunable::{LayerCatalog, TunableSpec};
use anyhow::ensure;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Counts produced by one `recommend` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecommendationSummary {
    pub containers: usize,
    pub recommendations: usize,
    pub notifications: usize,
}

pub trait MetricProfileHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Per-metric validity of a submitted result; `Err` carries the reason
    fn validate(
        &self,
        profile: &PerformanceProfile,
        result: &ExperimentResultData,
    ) -> Result<(), String>;

    /// Compute recommendations for every container as of `interval_end`
    fn recommend(
        &self,
        profile: &PerformanceProfile,
        experiment: &mut Experiment,
        interval_end: DateTime<Utc>,
    ) -> anyhow::Result<RecommendationSummary>;
}

/// Validates container metrics against the profile and runs the layer
/// generators over each recommendation term
pub struct ResourceOptimizationHandler {
    catalog: Arc<LayerCatalog>,
    generators: Arc<GeneratorRegistry>,
    default_term_days: f64,
}

impl ResourceOptimizationHandler {
    pub fn new(
        catalog: Arc<LayerCatalog>,
        generators: Arc<GeneratorRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            catalog,
            generators,
            default_term_days: config.default_term_days,
        }
    }

    fn recommend_term(&self, intervals: &IntervalMap, days: f64) -> TermRecommendation {
        let in_term = match Duration::try_milliseconds((days * MILLIS_PER_DAY) as i64) {
            Some(window) => within_window(intervals, window),
            None => intervals.clone(),
        };

        let detected = self.catalog.detect_layers(&in_term);
        let requested: Vec<TunableSpec> = detected
            .iter()
            .flat_map(|layer| layer.tunables.iter().map(|t| t.spec()))
            .collect();

        let resolver = DependencyResolver::new(&self.catalog, &self.generators);
        let report = resolver.resolve(&requested, DependencyValues::new(), &in_term);

        TermRecommendation {
            duration_in_days: days,
            intervals: in_term.len(),
            detected_layers: detected.iter().map(|l| l.layer_name.clone()).collect(),
            config: report.envs(),
            notifications: report.notifications,
        }
    }
}

impl MetricProfileHandler for ResourceOptimizationHandler {
    fn name(&self) -> &str {
        "resource_optimization"
    }

    fn validate(
        &self,
        profile: &PerformanceProfile,
        result: &ExperimentResultData,
    ) -> Result<(), String> {
        let mut problems = Vec::new();
        let mut containers = 0;

        for container in result.containers() {
            containers += 1;
            for metric in profile.slo.container_metrics() {
                let Some(submitted) = container.metric(&metric.name) else {
                    problems.push(format!(
                        "container {}: missing metric {}",
                        container.container_name, metric.name
                    ));
                    continue;
                };
                for function in &metric.aggregation_functions {
                    if submitted.aggregation_info.get(&function.function).is_none() {
                        problems.push(format!(
                            "container {}: metric {} missing aggregation {}",
                            container.container_name, metric.name, function.function
                        ));
                    }
                }
            }
        }

        if containers == 0 {
            return Err("result carries no container metrics".to_string());
        }
        if !problems.is_empty() {
            return Err(format!(
                "Metrics do not match profile {}: {}",
                profile.name,
                problems.join("; ")
            ));
        }
        Ok(())
    }

    fn recommend(
        &self,
        profile: &PerformanceProfile,
        experiment: &mut Experiment,
        interval_end: DateTime<Utc>,
    ) -> anyhow::Result<RecommendationSummary> {
        let terms = experiment
            .recommendation_settings
            .as_ref()
            .map(|s| s.terms_or_default(self.default_term_days))
            .unwrap_or_else(|| BTreeMap::from([(SHORT_TERM.to_string(), self.default_term_days)]));
        for (term, days) in &terms {
            ensure!(
                *days > 0.0,
                "term {} has non-positive duration_in_days {}",
                term,
                days
            );
        }

        let experiment_name = experiment.name().to_string();
        let mut summary = RecommendationSummary::default();

        for container in experiment.containers_mut() {
            let history: IntervalMap = container
                .results
                .range(..=interval_end)
                .map(|(end, interval)| (*end, interval.clone()))
                .collect();
            if history.is_empty() {
                debug!(
                    experiment_name = %experiment_name,
                    container = %container.container_name,
                    "No intervals yet, skipping container"
                );
                continue;
            }

            let per_term: BTreeMap<String, TermRecommendation> = terms
                .iter()
                .map(|(term, days)| (term.clone(), self.recommend_term(&history, *days)))
                .collect();

            summary.containers += 1;
            for rec in per_term.values() {
                summary.recommendations += rec.config.len();
                summary.notifications += rec.notifications.len();
            }
            container.recommendations.insert(interval_end, per_term);
        }

        info!(
            experiment_name = %experiment_name,
            profile = %profile.name,
            interval_end = %interval_end,
            containers = summary.containers,
            recommendations = summary.recommendations,
            notifications = summary.notifications,
            "Recommendations updated"
        );
        Ok(summary)
    }
}

/// Profile name -> handler, replacing lookup by class name
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MetricProfileHandler>>,
    fallback: Option<Arc<dyn MetricProfileHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in profiles mapped to the resource-optimization handler, which
    /// also serves as the fallback
    pub fn with_defaults(
        catalog: Arc<LayerCatalog>,
        generators: Arc<GeneratorRegistry>,
        config: &EngineConfig,
    ) -> Self {
        let handler: Arc<dyn MetricProfileHandler> =
            Arc::new(ResourceOptimizationHandler::new(catalog, generators, config));
        let mut registry = Self::new();
        for name in [
            names::RESOURCE_OPTIMIZATION_OPENSHIFT,
            names::RESOURCE_OPTIMIZATION_LOCAL_MONITORING,
            names::DEFAULT,
        ] {
            registry.register(name, handler.clone());
        }
        registry.set_fallback(handler);
        registry
    }

    pub fn register(&mut self, profile_name: &str, handler: Arc<dyn MetricProfileHandler>) {
        self.handlers.insert(profile_name.to_string(), handler);
    }

    pub fn set_fallback(&mut self, handler: Arc<dyn MetricProfileHandler>) {
        self.fallback = Some(handler);
    }

    pub fn resolve(&self, profile_name: &str) -> Option<Arc<dyn MetricProfileHandler>> {
        self.handlers
            .get(profile_name)
            .cloned()
            .or_else(|| self.fallback.clone())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut profiles: Vec<_> = self.handlers.keys().collect();
        profiles.sort();
        f.debug_struct("HandlerRegistry")
            .field("profiles", &profiles)
            .field("fallback", &self.fallback.as_ref().map(|h| h.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{ContainerData, K8sObject, ResultContainer, ResultK8sObject, ResultMetric};
    use crate::interval::{AggregationInfo, IntervalResults, MetricResults};
    use crate::profile::builtin_profiles;
    use crate::quantity::mb_to_bytes;
    use chrono::TimeZone;

    fn handler() -> ResourceOptimizationHandler {
        let config = EngineConfig::default();
        ResourceOptimizationHandler::new(
            Arc::new(LayerCatalog::with_builtin_layers()),
            Arc::new(GeneratorRegistry::with_defaults(&config)),
            &config,
        )
    }

    fn profile(name: &str) -> PerformanceProfile {
        builtin_profiles().into_iter().find(|p| p.name == name).unwrap()
    }

    fn full_metric(name: &str) -> ResultMetric {
        ResultMetric {
            name: name.to_string(),
            results: MetricResults::from_aggregation(AggregationInfo {
                min: Some(1.0),
                max: Some(2.0),
                avg: Some(1.5),
                sum: Some(3.0),
                format: None,
            }),
        }
    }

    fn result_with(metrics: Vec<ResultMetric>) -> ExperimentResultData {
        ExperimentResultData {
            experiment_name: Some("exp".into()),
            kubernetes_objects: vec![ResultK8sObject {
                name: "tfb".into(),
                namespace: "default".into(),
                containers: vec![ResultContainer {
                    container_name: "server".into(),
                    metrics,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_requires_profile_metrics() {
        let profile = profile(names::RESOURCE_OPTIMIZATION_OPENSHIFT);
        let all: Vec<_> = profile
            .slo
            .container_metrics()
            .map(|m| full_metric(&m.name))
            .collect();
        assert!(handler().validate(&profile, &result_with(all.clone())).is_ok());

        let missing: Vec<_> = all.iter().filter(|m| m.name != "cpuUsage").cloned().collect();
        let err = handler().validate(&profile, &result_with(missing)).unwrap_err();
        assert!(err.contains("missing metric cpuUsage"), "{err}");

        let mut partial = all.clone();
        partial[0].results.aggregation_info.sum = None;
        let err = handler().validate(&profile, &result_with(partial)).unwrap_err();
        assert!(err.contains("missing aggregation sum"), "{err}");

        assert!(handler().validate(&profile, &ExperimentResultData::default()).is_err());
    }

    #[test]
    fn test_recommend_per_term() {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut container = ContainerData::new("server");
        for i in 0..3 {
            let start = base + Duration::minutes(15 * i);
            let end = start + Duration::minutes(15);
            let mut metrics = BTreeMap::new();
            let agg = |avg| {
                MetricResults::from_aggregation(AggregationInfo {
                    avg: Some(avg),
                    ..Default::default()
                })
            };
            metrics.insert("cpuLimit".to_string(), agg(1.5));
            metrics.insert("memoryLimit".to_string(), agg(mb_to_bytes(2048.0)));
            let mut info = MetricResults::default();
            info.metadata.insert("version".into(), "17.0.2".into());
            metrics.insert("jvmInfo".to_string(), info);
            container
                .results
                .insert(end, IntervalResults::with_metrics(start, end, metrics).unwrap());
        }
        let last_end = *container.results.keys().next_back().unwrap();

        let mut experiment = Experiment {
            experiment_name: Some("exp".into()),
            kubernetes_objects: vec![K8sObject {
                name: "tfb".into(),
                namespace: "default".into(),
                containers: vec![container, ContainerData::new("sidecar")],
                ..Default::default()
            }],
            ..Default::default()
        };

        let summary = handler()
            .recommend(&profile(names::RESOURCE_OPTIMIZATION_OPENSHIFT), &mut experiment, last_end)
            .unwrap();
        assert_eq!(summary.containers, 1);
        assert_eq!(summary.notifications, 0);

        let server = &experiment.kubernetes_objects[0].containers[0];
        let (end, terms) = server.latest_recommendation().unwrap();
        assert_eq!(*end, last_end);
        let short = &terms[SHORT_TERM];
        assert_eq!(short.intervals, 3);
        assert_eq!(short.detected_layers, vec!["container", "hotspot"]);
        let options = short
            .config
            .iter()
            .find(|e| e.name == crate::generator::JVM_OPTIONS_ENV)
            .unwrap();
        assert_eq!(options.value, "-XX:MaxRAMPercentage=70.0 -XX:+UseParallelGC");
        assert!(experiment.kubernetes_objects[0].containers[1].recommendations.is_empty());
    }

    #[test]
    fn test_registry_fallback() {
        let config = EngineConfig::default();
        let registry = HandlerRegistry::with_defaults(
            Arc::new(LayerCatalog::with_builtin_layers()),
            Arc::new(GeneratorRegistry::with_defaults(&config)),
            &config,
        );
        assert!(registry.resolve(names::DEFAULT).is_some());
        assert!(registry.resolve("custom-profile").is_some());
        assert!(HandlerRegistry::new().resolve(names::DEFAULT).is_none());
    }
}
