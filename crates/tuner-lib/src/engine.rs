//! Tuning engine facade
//!
//! Owns the injected experiment store, profile cache, handler registry and
//! layer catalog, and runs batches of experiment registrations and result
//! submissions through validation. Each item is an independent unit of work;
//! only the store's per-key lock is shared between them.

use crate::aggregation::{ExperimentSummary, TrialResult};
use crate::config::{BatchPolicy, EngineConfig};
use crate::experiment::{status, Experiment, ExperimentResultData, ValidationOutputData};
use crate::generator::{DependencyValues, GeneratorRegistry};
use crate::interval::IntervalMap;
use crate::observability::{StructuredLogger, TunerMetrics};
use crate::profile::{HandlerRegistry, ProfileStore, RecommendationSummary};
use crate::resolver::{DependencyResolver, ResolutionReport};
use crate::store::{ExperimentRepository, InMemoryExperimentStore};
use crate::tunable::{layers, LayerCatalog, TunableSpec};
use crate::validation::{messages, ExperimentValidator, ResultValidator};
use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of one batch item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub experiment_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_end_time: Option<String>,
    pub validation_data: ValidationOutputData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<RecommendationSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    /// Items left unprocessed after a halt
    pub skipped: usize,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.validation_data.success).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn halted(&self) -> bool {
        self.skipped > 0
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !self.halted()
    }
}

pub struct TuningEngine {
    config: EngineConfig,
    store: Arc<dyn ExperimentRepository>,
    profiles: Arc<ProfileStore>,
    handlers: HandlerRegistry,
    catalog: Arc<LayerCatalog>,
    generators: Arc<GeneratorRegistry>,
    metrics: TunerMetrics,
    logger: StructuredLogger,
}

impl TuningEngine {
    /// Engine with an in-memory store, built-in profiles and built-in layers
    pub fn new(config: EngineConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(InMemoryExperimentStore::new()),
            Arc::new(ProfileStore::default()),
        )
    }

    pub fn with_parts(
        config: EngineConfig,
        store: Arc<dyn ExperimentRepository>,
        profiles: Arc<ProfileStore>,
    ) -> Self {
        let catalog = Arc::new(LayerCatalog::with_builtin_layers());
        let generators = Arc::new(GeneratorRegistry::with_defaults(&config));
        let handlers = HandlerRegistry::with_defaults(catalog.clone(), generators.clone(), &config);
        Self {
            config,
            store,
            profiles,
            handlers,
            catalog,
            generators,
            metrics: TunerMetrics::new(),
            logger: StructuredLogger::new("tuner"),
        }
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ExperimentRepository> {
        &self.store
    }

    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    pub fn metrics(&self) -> &TunerMetrics {
        &self.metrics
    }

    /// Startup bulk load of previously stored experiments
    pub fn load_all(&self, experiments: Vec<Experiment>) -> usize {
        let loaded = self.store.load_all(experiments);
        self.metrics.set_experiments_in_store(self.store.len());
        info!(loaded = loaded, "Loaded experiments into store");
        loaded
    }

    pub fn experiment(&self, name: &str) -> Option<Experiment> {
        self.store.get(name)
    }

    /// Validate and store one experiment
    pub fn create_experiment(&self, mut experiment: Experiment) -> ValidationOutputData {
        let validator = ExperimentValidator::new(self.store.as_ref(), &self.profiles, &self.config);
        let mut output = validator.validate(&mut experiment);
        let name = experiment.name().to_string();
        let profile = experiment.performance_profile.clone();

        if output.success {
            experiment.validation_data = Some(output.clone());
            // Lost a race against a concurrent registration of the same name
            if !self.store.insert(&name, experiment) {
                output = ValidationOutputData::failure(
                    format!("{}: {}", messages::DUPLICATE_EXPERIMENT, name),
                    status::CONFLICT,
                );
            }
        }

        if output.success {
            self.metrics.inc_experiments_registered();
            self.logger.log_experiment_registered(&name, profile.as_deref());
        } else {
            self.metrics.inc_experiments_rejected(output.http_status_code);
            self.logger.log_experiment_rejected(
                &name,
                output.http_status_code,
                output.message.as_deref().unwrap_or_default(),
            );
        }
        output
    }

    /// Validate and store experiments in order, honoring the batch policy
    pub fn create_experiments(&self, experiments: Vec<Experiment>) -> BatchReport {
        let total = experiments.len();
        let mut report = BatchReport::default();

        for experiment in experiments {
            let name = experiment.name().to_string();
            let output = self.create_experiment(experiment);
            let failed = !output.success;
            report.items.push(BatchItem {
                experiment_name: name,
                interval_end_time: None,
                validation_data: output,
                recommendations: None,
            });
            if failed && self.config.batch_policy == BatchPolicy::HaltOnFirstFailure {
                report.skipped = total - report.items.len();
                if report.skipped > 0 {
                    self.logger
                        .log_batch_halted("experiments", report.items.len(), report.skipped);
                }
                break;
            }
        }

        self.metrics.set_experiments_in_store(self.store.len());
        report
    }

    /// Validate, merge and recommend for each result window in order
    pub fn update_results(&self, results: Vec<ExperimentResultData>) -> BatchReport {
        let total = results.len();
        let mut report = BatchReport::default();
        let validator =
            ResultValidator::new(self.store.as_ref(), &self.profiles, &self.handlers, &self.config);

        for result in results {
            let started = Instant::now();
            let validated = validator.process(&result);
            self.metrics
                .observe_result_processing(started.elapsed().as_secs_f64());
            if let Some(secs) = validated.recommend_secs {
                self.metrics.observe_recommendation_latency(secs);
            }

            let name = result.name().to_string();
            let end = result.interval_end_time.map(|t| t.to_rfc3339());
            let end_label = end.as_deref().unwrap_or("-");
            let output = validated.output;
            if output.success {
                let recommendations = validated.summary.map(|s| s.recommendations).unwrap_or(0);
                self.metrics.inc_results_accepted();
                self.metrics.add_recommendations(recommendations);
                self.logger.log_result_accepted(&name, end_label, recommendations);
            } else {
                self.metrics.inc_results_rejected(output.http_status_code);
                self.logger.log_result_rejected(
                    &name,
                    end_label,
                    output.http_status_code,
                    output.message.as_deref().unwrap_or_default(),
                );
            }

            let failed = !output.success;
            report.items.push(BatchItem {
                experiment_name: name,
                interval_end_time: end,
                validation_data: output,
                recommendations: validated.summary,
            });
            if failed && self.config.batch_policy == BatchPolicy::HaltOnFirstFailure {
                report.skipped = total - report.items.len();
                if report.skipped > 0 {
                    self.logger
                        .log_batch_halted("results", report.items.len(), report.skipped);
                }
                break;
            }
        }
        report
    }

    /// One-shot recommendation for the container layer plus `runtime_layers`
    ///
    /// `seed` values take precedence over generated ones; JVM labels are read
    /// from `intervals` like in a regular run.
    pub fn recommend(
        &self,
        runtime_layers: &[String],
        seed: DependencyValues,
        intervals: &IntervalMap,
    ) -> Result<ResolutionReport> {
        let mut requested: Vec<TunableSpec> = Vec::new();
        let mut layer_names = vec![layers::CONTAINER.to_string()];
        layer_names.extend(runtime_layers.iter().filter(|l| *l != layers::CONTAINER).cloned());

        for layer_name in &layer_names {
            let Some(layer) = self.catalog.get(layer_name) else {
                bail!("unknown layer {}", layer_name);
            };
            requested.extend(layer.tunables.iter().map(|t| t.spec()));
        }

        let started = Instant::now();
        let report =
            DependencyResolver::new(&self.catalog, &self.generators).resolve(&requested, seed, intervals);
        self.metrics
            .observe_recommendation_latency(started.elapsed().as_secs_f64());
        self.metrics.add_recommendations(report.recommendations.len());
        self.metrics.record_notifications(&report.notifications);

        let scope = layer_names.join("+");
        for notification in &report.notifications {
            self.logger.log_tunable_skipped(&scope, notification);
        }
        self.logger
            .log_recommendation(&scope, report.recommendations.len(), report.notifications.len());
        Ok(report)
    }

    /// Trial summary using the direction of the experiment's profile
    pub fn summarize(&self, trials: &[TrialResult], profile_name: &str) -> Result<ExperimentSummary> {
        let Some(profile) = self.profiles.get(profile_name)? else {
            bail!("performance profile {} not found", profile_name);
        };
        debug!(profile = %profile_name, trials = trials.len(), "Summarizing trials");
        Ok(ExperimentSummary::from_trials(trials, profile.direction()))
    }
}
