use super::{has_text, lookup_profile, messages, MissingFields, Rejection};
use crate::config::EngineConfig;
use crate::experiment::{status, Experiment, UseCase, ValidationOutputData};
use crate::profile::{default_profile_name, PerformanceProfile, ProfileStore};
use crate::quantity::parse_duration_secs;
use crate::store::ExperimentRepository;
use std::sync::Arc;
use tracing::debug;

/// Longest accepted recommendation term
pub const MAX_TERM_DAYS: f64 = 3650.0;

fn valid_term_days(days: f64) -> bool {
    days > 0.0 && days <= MAX_TERM_DAYS
}

/// Checks a new experiment definition against the live store and profiles
pub struct ExperimentValidator<'a> {
    store: &'a dyn ExperimentRepository,
    profiles: &'a ProfileStore,
    config: &'a EngineConfig,
}

impl<'a> ExperimentValidator<'a> {
    pub fn new(
        store: &'a dyn ExperimentRepository,
        profiles: &'a ProfileStore,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            profiles,
            config,
        }
    }

    /// On success the experiment carries its resolved profile name and each
    /// container carries the profile's container-level metrics
    pub fn validate(&self, experiment: &mut Experiment) -> ValidationOutputData {
        match self.run(experiment) {
            Ok(()) => ValidationOutputData::ok(status::CREATED),
            Err(rejection) => {
                debug!(
                    experiment_name = %experiment.name(),
                    reason = %rejection,
                    "Experiment rejected"
                );
                rejection.into()
            }
        }
    }

    fn run(&self, experiment: &mut Experiment) -> Result<(), Rejection> {
        let use_case = check_mandatory(experiment)?;
        self.check_duplicate(experiment)?;
        self.check_settings(experiment)?;
        let profile = self.resolve_profile(experiment, use_case)?;
        annotate_containers(experiment, &profile);
        Ok(())
    }

    fn check_duplicate(&self, experiment: &Experiment) -> Result<(), Rejection> {
        if self.store.contains(experiment.name()) {
            return Err(Rejection::conflict(format!(
                "{}: {}",
                messages::DUPLICATE_EXPERIMENT,
                experiment.name()
            )));
        }
        Ok(())
    }

    fn check_settings(&self, experiment: &Experiment) -> Result<(), Rejection> {
        let duration = experiment
            .trial_settings
            .as_ref()
            .map(|t| t.measurement_duration.as_str())
            .unwrap_or(self.config.default_measurement_duration.as_str());
        match parse_duration_secs(duration) {
            Ok(secs) if secs > 0 => {}
            Ok(_) => {
                return Err(Rejection::invalid(format!(
                    "{}: {}",
                    messages::INVALID_MEASUREMENT_DURATION,
                    duration
                )))
            }
            Err(e) => {
                return Err(Rejection::invalid(format!(
                    "{}: {}",
                    messages::INVALID_MEASUREMENT_DURATION,
                    e
                )))
            }
        }

        if let Some(settings) = &experiment.recommendation_settings {
            if let Some((term, _)) = settings
                .terms
                .iter()
                .find(|(_, t)| !valid_term_days(t.duration_in_days))
            {
                return Err(Rejection::invalid(format!(
                    "{}: {}",
                    messages::INVALID_TERM,
                    term
                )));
            }
        }
        Ok(())
    }

    fn resolve_profile(
        &self,
        experiment: &mut Experiment,
        use_case: UseCase,
    ) -> Result<Arc<PerformanceProfile>, Rejection> {
        if let Some(slo) = &experiment.slo {
            if has_text(&experiment.performance_profile) {
                return Err(Rejection::invalid(messages::SLO_AND_PROFILE));
            }
            return Ok(Arc::new(PerformanceProfile::inline(experiment.name(), slo.clone())));
        }

        let explicit = experiment
            .performance_profile
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let name = match explicit {
            Some(name) => name,
            None => {
                let name = default_profile_name(use_case).to_string();
                debug!(experiment_name = %experiment.name(), profile = %name, "Using default profile");
                experiment.performance_profile = Some(name.clone());
                name
            }
        };

        lookup_profile(self.profiles, &name)
    }
}

fn check_mandatory(experiment: &Experiment) -> Result<UseCase, Rejection> {
    let mut missing = MissingFields::default();
    missing
        .check(has_text(&experiment.experiment_name), "experiment_name")
        .check(has_text(&experiment.mode), "mode")
        .check(has_text(&experiment.target_cluster), "target_cluster");

    let use_case = experiment.use_case();
    if let Some(use_case) = use_case {
        if use_case.is_monitoring() {
            missing.check(
                experiment.recommendation_settings.is_some(),
                "recommendation_settings",
            );
        }
        match use_case {
            UseCase::RemoteMonitoring => {
                missing.check(!experiment.kubernetes_objects.is_empty(), "kubernetes_objects");
                missing.check(
                    experiment
                        .kubernetes_objects
                        .iter()
                        .all(|o| !o.name.trim().is_empty()),
                    "kubernetes_objects.name",
                );
                missing.check(
                    experiment
                        .kubernetes_objects
                        .iter()
                        .all(|o| !o.containers.is_empty()),
                    "kubernetes_objects.containers",
                );
            }
            UseCase::LocalMonitoring | UseCase::LocalExperiment => {
                missing.check(
                    experiment.selector.is_some() || !experiment.kubernetes_objects.is_empty(),
                    "selector",
                );
            }
        }
    }
    missing.into_result()?;

    use_case.ok_or_else(|| {
        Rejection::invalid(format!(
            "{}: mode={}, target_cluster={}",
            messages::UNSUPPORTED_MODE,
            experiment.mode.as_deref().unwrap_or_default(),
            experiment.target_cluster.as_deref().unwrap_or_default()
        ))
    })
}

fn annotate_containers(experiment: &mut Experiment, profile: &PerformanceProfile) {
    let metrics: Vec<_> = profile.slo.container_metrics().cloned().collect();
    for container in experiment.containers_mut() {
        container.metrics = metrics.clone();
    }
}
