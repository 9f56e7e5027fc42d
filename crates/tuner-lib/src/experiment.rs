//! Experiment and result records
//!
//! JSON field names are stable and shared with existing experiment and
//! result documents (`experiment_name`, `measurement_duration`,
//! `duration_in_days`, `threshold`, ...). Mandatory fields are optional at
//! the type level so a missing field becomes a validation outcome rather
//! than a parse failure.

use crate::interval::{IntervalMap, MetricResults};
use crate::profile::{Metric, Slo};
use crate::resolver::Notification;
use crate::generator::RecommendationConfigEnv;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// HTTP-style status codes chosen by the core
pub mod status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const BAD_REQUEST: u16 = 400;
    pub const CONFLICT: u16 = 409;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

/// Experiment modes
pub mod modes {
    pub const MONITOR: &str = "monitor";
    pub const EXPERIMENT: &str = "experiment";
}

/// Target clusters
pub mod targets {
    pub const LOCAL: &str = "local";
    pub const REMOTE: &str = "remote";
}

/// Default recommendation term
pub const SHORT_TERM: &str = "short_term";

/// Outcome of a validation step, attached to the record it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutputData {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub http_status_code: u16,
}

impl ValidationOutputData {
    pub fn ok(http_status_code: u16) -> Self {
        Self {
            success: true,
            message: None,
            http_status_code,
        }
    }

    pub fn failure(message: impl Into<String>, http_status_code: u16) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            http_status_code,
        }
    }
}

/// Deployment scenario derived from `(mode, target_cluster)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    RemoteMonitoring,
    LocalMonitoring,
    LocalExperiment,
}

impl UseCase {
    /// `None` for unknown or unsupported combinations
    pub fn from_mode(mode: &str, target_cluster: &str) -> Option<Self> {
        match (
            mode.to_ascii_lowercase().as_str(),
            target_cluster.to_ascii_lowercase().as_str(),
        ) {
            (modes::MONITOR, targets::REMOTE) => Some(UseCase::RemoteMonitoring),
            (modes::MONITOR, targets::LOCAL) => Some(UseCase::LocalMonitoring),
            (modes::EXPERIMENT, targets::LOCAL) => Some(UseCase::LocalExperiment),
            _ => None,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        matches!(self, UseCase::RemoteMonitoring | UseCase::LocalMonitoring)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_label_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSettings {
    pub measurement_duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermSettings {
    pub duration_in_days: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSettings {
    /// Accepts `0.1` or `"0.1"`
    #[serde(
        default,
        deserialize_with = "number_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub terms: BTreeMap<String, TermSettings>,
}

impl RecommendationSettings {
    /// Declared terms, or a single short term of `default_days`
    pub fn terms_or_default(&self, default_days: f64) -> BTreeMap<String, f64> {
        if self.terms.is_empty() {
            return BTreeMap::from([(SHORT_TERM.to_string(), default_days)]);
        }
        self.terms
            .iter()
            .map(|(name, t)| (name.clone(), t.duration_in_days))
            .collect()
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid threshold {:?}", s))),
    }
}

/// Recommendation of one container for one term, at one interval end
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermRecommendation {
    pub duration_in_days: f64,
    /// Intervals that fell inside the term window
    pub intervals: usize,
    pub detected_layers: Vec<String>,
    pub config: Vec<RecommendationConfigEnv>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image_name: Option<String>,
    pub container_name: String,
    /// Container-level metrics of the resolved profile
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Metric>,
    #[serde(default, skip_deserializing, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: IntervalMap,
    /// interval end -> term -> recommendation
    #[serde(default, skip_deserializing, skip_serializing_if = "BTreeMap::is_empty")]
    pub recommendations: BTreeMap<DateTime<Utc>, BTreeMap<String, TermRecommendation>>,
}

impl ContainerData {
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            ..Default::default()
        }
    }

    pub fn latest_recommendation(&self) -> Option<(&DateTime<Utc>, &BTreeMap<String, TermRecommendation>)> {
        self.recommendations.iter().next_back()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct K8sObject {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub containers: Vec<ContainerData>,
}

impl K8sObject {
    pub fn container(&self, name: &str) -> Option<&ContainerData> {
        self.containers.iter().find(|c| c.container_name == name)
    }

    /// Existing container record, or a new one appended
    pub fn container_mut_or_insert(&mut self, name: &str) -> &mut ContainerData {
        let idx = match self.containers.iter().position(|c| c.container_name == name) {
            Some(idx) => idx,
            None => {
                self.containers.push(ContainerData::new(name));
                self.containers.len() - 1
            }
        };
        &mut self.containers[idx]
    }
}

/// An experiment definition plus everything merged into it since registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slo: Option<Slo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    #[serde(default)]
    pub kubernetes_objects: Vec<K8sObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_settings: Option<TrialSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation_settings: Option<RecommendationSettings>,
    /// interval end -> interval start of every accepted result window
    #[serde(default, skip_deserializing, skip_serializing_if = "BTreeMap::is_empty")]
    pub result_windows: BTreeMap<DateTime<Utc>, DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_data: Option<ValidationOutputData>,
}

impl Experiment {
    pub fn name(&self) -> &str {
        self.experiment_name.as_deref().unwrap_or_default()
    }

    pub fn use_case(&self) -> Option<UseCase> {
        UseCase::from_mode(self.mode.as_deref()?, self.target_cluster.as_deref()?)
    }

    pub fn object(&self, name: &str, namespace: &str) -> Option<&K8sObject> {
        self.kubernetes_objects
            .iter()
            .find(|o| o.name == name && o.namespace == namespace)
    }

    pub fn containers(&self) -> impl Iterator<Item = &ContainerData> {
        self.kubernetes_objects.iter().flat_map(|o| o.containers.iter())
    }

    pub fn containers_mut(&mut self) -> impl Iterator<Item = &mut ContainerData> {
        self.kubernetes_objects
            .iter_mut()
            .flat_map(|o| o.containers.iter_mut())
    }

    pub fn has_result_ending_at(&self, end: &DateTime<Utc>) -> bool {
        self.result_windows.contains_key(end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetric {
    pub name: String,
    #[serde(default)]
    pub results: MetricResults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultContainer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image_name: Option<String>,
    pub container_name: String,
    #[serde(default)]
    pub metrics: Vec<ResultMetric>,
}

impl ResultContainer {
    pub fn metric(&self, name: &str) -> Option<&MetricResults> {
        self.metrics.iter().find(|m| m.name == name).map(|m| &m.results)
    }

    pub fn metric_names(&self) -> BTreeSet<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultK8sObject {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub containers: Vec<ResultContainer>,
}

/// One submitted measurement window for one experiment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResultData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub kubernetes_objects: Vec<ResultK8sObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_data: Option<ValidationOutputData>,
}

impl ExperimentResultData {
    pub fn name(&self) -> &str {
        self.experiment_name.as_deref().unwrap_or_default()
    }

    pub fn containers(&self) -> impl Iterator<Item = &ResultContainer> {
        self.kubernetes_objects.iter().flat_map(|o| o.containers.iter())
    }
}
