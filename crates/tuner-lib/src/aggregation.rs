//! Result merging and trial summaries

use crate::error::IntervalError;
use crate::experiment::{Experiment, ExperimentResultData, K8sObject};
use crate::interval::{IntervalResults, MetricResults};
use crate::profile::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Marker a failed trial carries in its textual result
pub const ERROR_MARKER: &str = "ERROR";

/// Attach one validated result window to every container it reports on
///
/// Object and container records are created when missing. An interval with
/// an end timestamp already present replaces the previous one. Returns the
/// number of container intervals written.
pub fn merge_result(
    experiment: &mut Experiment,
    result: &ExperimentResultData,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<usize, IntervalError> {
    let mut written = 0;

    for object in &result.kubernetes_objects {
        let idx = match experiment
            .kubernetes_objects
            .iter()
            .position(|o| o.name == object.name && o.namespace == object.namespace)
        {
            Some(idx) => idx,
            None => {
                experiment.kubernetes_objects.push(K8sObject {
                    object_type: object.object_type.clone(),
                    name: object.name.clone(),
                    namespace: object.namespace.clone(),
                    containers: Vec::new(),
                });
                experiment.kubernetes_objects.len() - 1
            }
        };
        let target = &mut experiment.kubernetes_objects[idx];

        for container in &object.containers {
            let metrics: BTreeMap<String, MetricResults> = container
                .metrics
                .iter()
                .map(|m| (m.name.clone(), m.results.clone()))
                .collect();
            let interval = IntervalResults::with_metrics(start, end, metrics)?;

            let record = target.container_mut_or_insert(&container.container_name);
            if record.container_image_name.is_none() {
                record.container_image_name = container.container_image_name.clone();
            }
            if record.results.insert(end, interval).is_some() {
                debug!(
                    container = %container.container_name,
                    interval_end = %end,
                    "Replaced interval with same end time"
                );
            }
            written += 1;
        }
    }

    experiment.result_windows.insert(end, start);
    Ok(written)
}

/// One finished trial as reported by the trial runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_number: usize,
    /// Objective value, or text containing `ERROR`
    pub result: String,
}

/// What recording a trial did to the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    NewBest,
    Passed,
    Failed,
}

/// Running counters over the trials of one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub total_trials: usize,
    pub trials_completed: usize,
    pub trials_ongoing: usize,
    pub trials_passed: usize,
    pub trials_failed: usize,
    /// `-1` until a passing trial is recorded
    pub best_trial: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_result: Option<f64>,
    pub direction: Direction,
}

impl ExperimentSummary {
    pub fn new(total_trials: usize, direction: Direction) -> Self {
        Self {
            total_trials,
            trials_completed: 0,
            trials_ongoing: 0,
            trials_passed: 0,
            trials_failed: 0,
            best_trial: -1,
            best_result: None,
            direction,
        }
    }

    /// Summarize a finished list of trials in order
    pub fn from_trials(trials: &[TrialResult], direction: Direction) -> Self {
        let mut summary = Self::new(trials.len(), direction);
        for trial in trials {
            summary.start_trial();
            summary.record_trial(trial.trial_number, &trial.result);
        }
        summary
    }

    pub fn start_trial(&mut self) {
        self.trials_ongoing += 1;
    }

    pub fn record_trial(&mut self, trial_number: usize, result: &str) -> TrialOutcome {
        self.trials_ongoing = self.trials_ongoing.saturating_sub(1);
        self.trials_completed += 1;

        if result.contains(ERROR_MARKER) {
            self.trials_failed += 1;
            return TrialOutcome::Failed;
        }
        let Some(value) = result
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
        else {
            warn!(trial = trial_number, result = %result, "Trial result is not a finite number, counting as failed");
            self.trials_failed += 1;
            return TrialOutcome::Failed;
        };

        self.trials_passed += 1;
        let better = self
            .best_result
            .map(|best| self.direction.improves(value, best))
            .unwrap_or(true);
        if better {
            self.best_trial = trial_number as i64;
            self.best_result = Some(value);
            return TrialOutcome::NewBest;
        }
        TrialOutcome::Passed
    }

    pub fn trials_pending(&self) -> usize {
        self.total_trials.saturating_sub(self.trials_completed)
    }
}
