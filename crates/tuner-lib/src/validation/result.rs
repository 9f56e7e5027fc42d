use super::{lookup_profile, messages, MissingFields, Rejection};
use crate::aggregation::merge_result;
use crate::config::EngineConfig;
use crate::experiment::{status, Experiment, ExperimentResultData, ValidationOutputData};
use crate::profile::{
    default_profile_name, HandlerRegistry, PerformanceProfile, ProfileStore, RecommendationSummary,
};
use crate::quantity::parse_duration_secs;
use crate::store::ExperimentRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Outcome of one result submission
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedResult {
    pub output: ValidationOutputData,
    /// Set when the window was accepted and recommendations ran
    pub summary: Option<RecommendationSummary>,
    /// Wall time of the recommendation step, when it ran
    pub recommend_secs: Option<f64>,
}

/// Validates a result window, merges it into its experiment and triggers
/// the profile's recommendation
///
/// Everything after the experiment lookup runs under that experiment's
/// key lock, so concurrent submissions for one experiment are serialized
/// while unrelated experiments proceed independently.
pub struct ResultValidator<'a> {
    store: &'a dyn ExperimentRepository,
    profiles: &'a ProfileStore,
    handlers: &'a HandlerRegistry,
    config: &'a EngineConfig,
}

impl<'a> ResultValidator<'a> {
    pub fn new(
        store: &'a dyn ExperimentRepository,
        profiles: &'a ProfileStore,
        handlers: &'a HandlerRegistry,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            profiles,
            handlers,
            config,
        }
    }

    pub fn process(&self, result: &ExperimentResultData) -> ValidatedResult {
        match self.run(result) {
            Ok((summary, elapsed)) => ValidatedResult {
                output: ValidationOutputData::ok(status::CREATED),
                summary: Some(summary),
                recommend_secs: Some(elapsed),
            },
            Err(rejection) => {
                debug!(
                    experiment_name = %result.name(),
                    interval_end = ?result.interval_end_time,
                    reason = %rejection,
                    "Result rejected"
                );
                ValidatedResult {
                    output: rejection.into(),
                    summary: None,
                    recommend_secs: None,
                }
            }
        }
    }

    fn run(&self, result: &ExperimentResultData) -> Result<(RecommendationSummary, f64), Rejection> {
        let (name, start, end) = check_mandatory(result)?;

        let mut outcome = None;
        let found = self.store.update(name, &mut |experiment: &mut Experiment| {
            outcome = Some(self.apply(experiment, result, start, end));
        });
        if !found {
            return Err(Rejection::invalid(format!(
                "{}: {}",
                messages::EXPERIMENT_NOT_FOUND,
                name
            )));
        }
        outcome.unwrap_or_else(|| Err(Rejection::internal("experiment update did not run")))
    }

    fn apply(
        &self,
        experiment: &mut Experiment,
        result: &ExperimentResultData,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(RecommendationSummary, f64), Rejection> {
        self.check_duration(experiment, start, end)?;

        if experiment.has_result_ending_at(&end) {
            return Err(Rejection::conflict(format!(
                "{}: {} ending at {}",
                messages::DUPLICATE_RESULT,
                experiment.name(),
                end.to_rfc3339()
            )));
        }

        check_objects(experiment, result)?;

        let profile = self.resolve_profile(experiment)?;
        let handler = self.handlers.resolve(&profile.name).ok_or_else(|| {
            Rejection::internal(format!("{}: {}", messages::NO_PROFILE_HANDLER, profile.name))
        })?;

        handler.validate(&profile, result).map_err(Rejection::Invalid)?;

        // Nothing is stored unless recommendation succeeds
        let mut staged = experiment.clone();
        merge_result(&mut staged, result, start, end).map_err(|e| Rejection::invalid(e.to_string()))?;

        let started = Instant::now();
        let summary = handler
            .recommend(&profile, &mut staged, end)
            .map_err(|e| Rejection::internal(format!("{:#}", e)))?;
        let elapsed = started.elapsed().as_secs_f64();
        *experiment = staged;
        Ok((summary, elapsed))
    }

    fn check_duration(
        &self,
        experiment: &Experiment,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), Rejection> {
        let millis = (end - start).num_milliseconds();
        if millis <= 0 {
            return Err(Rejection::invalid(messages::WRONG_TIMESTAMP));
        }

        let declared = experiment
            .trial_settings
            .as_ref()
            .map(|t| t.measurement_duration.as_str())
            .unwrap_or(self.config.default_measurement_duration.as_str());
        let expected_secs = parse_duration_secs(declared).map_err(|e| {
            Rejection::invalid(format!("{}: {}", messages::INVALID_MEASUREMENT_DURATION, e))
        })?;

        let actual_secs = millis as f64 / 1000.0;
        let tolerance = self.config.measurement_tolerance_secs as f64;
        if (actual_secs - expected_secs as f64).abs() > tolerance {
            return Err(Rejection::invalid(format!(
                "{} by more than {} seconds (measurement_duration {}, interval {}s)",
                messages::MEASUREMENT_DURATION_MISMATCH,
                self.config.measurement_tolerance_secs,
                declared,
                actual_secs
            )));
        }
        Ok(())
    }

    fn resolve_profile(&self, experiment: &Experiment) -> Result<Arc<PerformanceProfile>, Rejection> {
        if let Some(slo) = &experiment.slo {
            return Ok(Arc::new(PerformanceProfile::inline(experiment.name(), slo.clone())));
        }
        let name = match experiment.performance_profile.as_deref() {
            Some(name) => name,
            None => experiment
                .use_case()
                .map(default_profile_name)
                .ok_or_else(|| Rejection::invalid(messages::UNSUPPORTED_MODE))?,
        };
        lookup_profile(self.profiles, name)
    }
}

fn check_mandatory(
    result: &ExperimentResultData,
) -> Result<(&str, DateTime<Utc>, DateTime<Utc>), Rejection> {
    let mut missing = MissingFields::default();
    missing
        .check(super::has_text(&result.experiment_name), "experiment_name")
        .check(result.interval_start_time.is_some(), "interval_start_time")
        .check(result.interval_end_time.is_some(), "interval_end_time");
    missing.into_result()?;

    match (
        result.experiment_name.as_deref(),
        result.interval_start_time,
        result.interval_end_time,
    ) {
        (Some(name), Some(start), Some(end)) => Ok((name, start, end)),
        _ => Err(Rejection::MissingFields(vec!["experiment_name"])),
    }
}

/// Every reported object and container must be declared by the experiment,
/// unless the experiment declares none (selector-based experiments)
fn check_objects(experiment: &Experiment, result: &ExperimentResultData) -> Result<(), Rejection> {
    if experiment.kubernetes_objects.is_empty() {
        return Ok(());
    }

    let mut problems = Vec::new();
    for object in &result.kubernetes_objects {
        let Some(declared) = experiment.object(&object.name, &object.namespace) else {
            problems.push(format!("unknown object {}/{}", object.namespace, object.name));
            continue;
        };
        if let (Some(declared_type), Some(reported)) = (&declared.object_type, &object.object_type) {
            if !declared_type.eq_ignore_ascii_case(reported) {
                problems.push(format!(
                    "object {}/{} has type {}, expected {}",
                    object.namespace, object.name, reported, declared_type
                ));
            }
        }
        for container in &object.containers {
            if declared.container(&container.container_name).is_none() {
                problems.push(format!(
                    "unknown container {} in {}/{}",
                    container.container_name, object.namespace, object.name
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Rejection::invalid(format!(
            "{}: {}",
            messages::KUBERNETES_OBJECT_MISMATCH,
            problems.join("; ")
        )))
    }
}
