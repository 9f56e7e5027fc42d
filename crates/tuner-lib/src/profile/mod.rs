//! Performance / metric profiles
//!
//! A profile names the SLO an experiment optimizes for and the metrics a
//! result submission must carry. Profiles are served from a [`ProfileStore`]
//! and dispatched to a [`MetricProfileHandler`] by name.

mod handler;
mod store;

pub use handler::{HandlerRegistry, MetricProfileHandler, RecommendationSummary, ResourceOptimizationHandler};
pub use store::{load_profiles_from_dir, BuiltinProfiles, DirectoryLoader, ProfileLoader, ProfileStore};

use crate::experiment::UseCase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Built-in profile names
pub mod names {
    pub const RESOURCE_OPTIMIZATION_OPENSHIFT: &str = "resource-optimization-openshift";
    pub const RESOURCE_OPTIMIZATION_LOCAL_MONITORING: &str = "resource-optimization-local-monitoring";
    pub const DEFAULT: &str = "default";
}

/// `kubernetes_object` value of metrics reported per container
pub const CONTAINER_OBJECT: &str = "container";

/// Optimization direction of an objective
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Minimize,
    Maximize,
}

impl Direction {
    /// Whether `candidate` strictly beats `current`
    pub fn improves(&self, candidate: f64, current: f64) -> bool {
        match self {
            Direction::Minimize => candidate < current,
            Direction::Maximize => candidate > current,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Minimize => write!(f, "minimize"),
            Direction::Maximize => write!(f, "maximize"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationFunction {
    /// `min`, `max`, `avg` or `sum`
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl AggregationFunction {
    pub fn new(function: &str) -> Self {
        Self {
            function: function.to_string(),
            query: None,
            version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub datasource: String,
    #[serde(default)]
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregation_functions: Vec<AggregationFunction>,
}

impl Metric {
    pub fn is_container_level(&self) -> bool {
        self.kubernetes_object.as_deref() == Some(CONTAINER_OBJECT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveFunction {
    pub function_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slo_class: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_function: Option<ObjectiveFunction>,
    #[serde(default)]
    pub function_variables: Vec<Metric>,
}

impl Slo {
    pub fn container_metrics(&self) -> impl Iterator<Item = &Metric> {
        self.function_variables.iter().filter(|m| m.is_container_level())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceProfile {
    pub name: String,
    #[serde(default = "default_profile_version")]
    pub profile_version: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s_type: Option<String>,
    pub slo: Slo,
}

fn default_profile_version() -> f64 {
    1.0
}

impl PerformanceProfile {
    /// Profile standing in for an experiment that declares its SLO inline
    pub fn inline(experiment_name: &str, slo: Slo) -> Self {
        Self {
            name: format!("{}-slo", experiment_name),
            profile_version: default_profile_version(),
            k8s_type: None,
            slo,
        }
    }

    pub fn direction(&self) -> Direction {
        self.slo.direction
    }
}

/// Profile assigned to an experiment that names neither a profile nor an SLO
pub fn default_profile_name(use_case: UseCase) -> &'static str {
    match use_case {
        UseCase::RemoteMonitoring => names::RESOURCE_OPTIMIZATION_OPENSHIFT,
        UseCase::LocalMonitoring => names::RESOURCE_OPTIMIZATION_LOCAL_MONITORING,
        UseCase::LocalExperiment => names::DEFAULT,
    }
}

fn container_metric(name: &str, value_type: &str, functions: &[&str]) -> Metric {
    Metric {
        name: name.to_string(),
        datasource: "prometheus".to_string(),
        value_type: value_type.to_string(),
        kubernetes_object: Some(CONTAINER_OBJECT.to_string()),
        query: None,
        aggregation_functions: functions.iter().map(|f| AggregationFunction::new(f)).collect(),
    }
}

fn resource_optimization_metrics() -> Vec<Metric> {
    vec![
        container_metric("cpuRequest", "double", &["avg", "sum"]),
        container_metric("cpuLimit", "double", &["avg", "sum"]),
        container_metric("cpuUsage", "double", &["avg", "max", "min", "sum"]),
        container_metric("cpuThrottle", "double", &["avg", "max", "sum"]),
        container_metric("memoryRequest", "double", &["avg", "sum"]),
        container_metric("memoryLimit", "double", &["avg", "sum"]),
        container_metric("memoryUsage", "double", &["avg", "max", "min", "sum"]),
        container_metric("memoryRSS", "double", &["avg", "max", "min", "sum"]),
    ]
}

/// The three system-default profiles
pub fn builtin_profiles() -> Vec<PerformanceProfile> {
    let resource_slo = Slo {
        slo_class: Some("resource_usage".to_string()),
        direction: Direction::Minimize,
        objective_function: Some(ObjectiveFunction {
            function_type: "source".to_string(),
            expression: None,
        }),
        function_variables: resource_optimization_metrics(),
    };

    let request_metric = |name: &str| Metric {
        name: name.to_string(),
        datasource: "prometheus".to_string(),
        value_type: "double".to_string(),
        kubernetes_object: None,
        query: None,
        aggregation_functions: Vec::new(),
    };

    vec![
        PerformanceProfile {
            name: names::RESOURCE_OPTIMIZATION_OPENSHIFT.to_string(),
            profile_version: 1.0,
            k8s_type: Some("openshift".to_string()),
            slo: resource_slo.clone(),
        },
        PerformanceProfile {
            name: names::RESOURCE_OPTIMIZATION_LOCAL_MONITORING.to_string(),
            profile_version: 1.0,
            k8s_type: Some("minikube".to_string()),
            slo: resource_slo,
        },
        PerformanceProfile {
            name: names::DEFAULT.to_string(),
            profile_version: 1.0,
            k8s_type: None,
            slo: Slo {
                slo_class: Some("response_time".to_string()),
                direction: Direction::Minimize,
                objective_function: Some(ObjectiveFunction {
                    function_type: "expression".to_string(),
                    expression: Some("request_sum/request_count".to_string()),
                }),
                function_variables: vec![request_metric("request_sum"), request_metric("request_count")],
            },
        },
    ]
}
