//! Tunables, layers and the layer catalog
//!
//! A layer groups the tunables of one tier (container, JVM runtime,
//! application framework). Templates live in a [`LayerCatalog`]; attaching a
//! layer to an application hands out an owned copy.

use crate::error::TunableError;
use crate::interval::IntervalMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Built-in layer names
pub mod layers {
    pub const CONTAINER: &str = "container";
    pub const HOTSPOT: &str = "hotspot";
    pub const SEMERU: &str = "semeru";
    pub const QUARKUS: &str = "quarkus";
}

/// Built-in tunable names
pub mod names {
    pub const CPU_LIMIT: &str = "cpuLimit";
    pub const MEMORY_LIMIT: &str = "memoryLimit";
    pub const MAX_RAM_PERCENTAGE: &str = "MaxRAMPercentage";
    pub const GC_POLICY: &str = "GCPolicy";
    pub const CORE_THREADS: &str = "quarkus.thread-pool.core-threads";
}

/// Composite `(layer, tunable)` key used for dependency lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TunableSpec {
    pub layer_name: String,
    pub tunable_name: String,
}

impl TunableSpec {
    pub fn new(layer_name: impl Into<String>, tunable_name: impl Into<String>) -> Self {
        Self {
            layer_name: layer_name.into(),
            tunable_name: tunable_name.into(),
        }
    }
}

impl fmt::Display for TunableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.layer_name, self.tunable_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Double,
    Categorical,
}

impl ValueType {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ValueType::Categorical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::Categorical => "categorical",
        }
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "integer" | "int" | "long" => Ok(ValueType::Integer),
            "double" | "float" | "numeric" => Ok(ValueType::Double),
            "categorical" => Ok(ValueType::Categorical),
            other => Err(other.to_string()),
        }
    }
}

/// Value domain of a tunable
#[derive(Debug, Clone, PartialEq)]
pub enum TunableDomain {
    Numeric { lower: f64, upper: f64, step: f64 },
    Categorical { choices: Vec<String> },
}

/// A single configurable knob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTunable", into = "RawTunable")]
pub struct Tunable {
    pub name: String,
    pub value_type: ValueType,
    pub domain: TunableDomain,
    pub slo_class: Vec<String>,
    pub layer_name: String,
    pub description: Option<String>,
    /// datasource name -> query text
    pub queries: BTreeMap<String, String>,
    pub depends_on: Vec<TunableSpec>,
}

impl Tunable {
    pub fn numeric(
        name: impl Into<String>,
        value_type: ValueType,
        lower: f64,
        upper: f64,
        step: f64,
    ) -> Result<Self, TunableError> {
        let name = name.into();
        if step == 0.0 {
            return Err(TunableError::ZeroStep { name });
        }
        if lower > upper {
            return Err(TunableError::InvertedBounds { name, lower, upper });
        }
        Ok(Self::bare(
            name,
            value_type,
            TunableDomain::Numeric { lower, upper, step },
        ))
    }

    pub fn categorical(
        name: impl Into<String>,
        choices: Vec<String>,
    ) -> Result<Self, TunableError> {
        let name = name.into();
        if choices.is_empty() {
            return Err(TunableError::EmptyChoices { name });
        }
        Ok(Self::bare(
            name,
            ValueType::Categorical,
            TunableDomain::Categorical { choices },
        ))
    }

    fn bare(name: String, value_type: ValueType, domain: TunableDomain) -> Self {
        Self {
            name,
            value_type,
            domain,
            slo_class: Vec::new(),
            layer_name: String::new(),
            description: None,
            queries: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn in_layer(mut self, layer_name: impl Into<String>) -> Self {
        self.layer_name = layer_name.into();
        self
    }

    pub fn with_slo_classes(mut self, classes: &[&str]) -> Self {
        self.slo_class = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn depends_on(mut self, layer_name: &str, tunable_name: &str) -> Self {
        self.depends_on.push(TunableSpec::new(layer_name, tunable_name));
        self
    }

    pub fn spec(&self) -> TunableSpec {
        TunableSpec::new(self.layer_name.clone(), self.name.clone())
    }

    /// Whether `value` lies inside the numeric bounds (always true for categorical)
    pub fn contains(&self, value: f64) -> bool {
        match &self.domain {
            TunableDomain::Numeric { lower, upper, .. } => value >= *lower && value <= *upper,
            TunableDomain::Categorical { .. } => true,
        }
    }
}

/// Wire shape of a tunable, validated on conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTunable {
    name: String,
    value_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    upper_bound: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lower_bound: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    step: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    choices: Vec<String>,
    #[serde(default)]
    slo_class: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    layer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    queries: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<TunableSpec>,
}

impl TryFrom<RawTunable> for Tunable {
    type Error = TunableError;

    fn try_from(raw: RawTunable) -> Result<Self, Self::Error> {
        let value_type =
            raw.value_type
                .parse::<ValueType>()
                .map_err(|value_type| TunableError::UnknownValueType {
                    name: raw.name.clone(),
                    value_type,
                })?;

        let mut tunable = if value_type.is_numeric() {
            let lower = raw.lower_bound.ok_or(TunableError::MissingBound {
                name: raw.name.clone(),
                field: "lower_bound",
            })?;
            let upper = raw.upper_bound.ok_or(TunableError::MissingBound {
                name: raw.name.clone(),
                field: "upper_bound",
            })?;
            let step = raw.step.ok_or(TunableError::MissingBound {
                name: raw.name.clone(),
                field: "step",
            })?;
            Tunable::numeric(raw.name, value_type, lower, upper, step)?
        } else {
            Tunable::categorical(raw.name, raw.choices)?
        };

        tunable.slo_class = raw.slo_class;
        tunable.layer_name = raw.layer_name;
        tunable.description = raw.description;
        tunable.queries = raw.queries;
        tunable.depends_on = raw.depends_on;
        Ok(tunable)
    }
}

impl From<Tunable> for RawTunable {
    fn from(t: Tunable) -> Self {
        let (lower_bound, upper_bound, step, choices) = match t.domain {
            TunableDomain::Numeric { lower, upper, step } => {
                (Some(lower), Some(upper), Some(step), Vec::new())
            }
            TunableDomain::Categorical { choices } => (None, None, None, choices),
        };
        Self {
            name: t.name,
            value_type: t.value_type.as_str().to_string(),
            upper_bound,
            lower_bound,
            step,
            choices,
            slo_class: t.slo_class,
            layer_name: t.layer_name,
            description: t.description,
            queries: t.queries,
            depends_on: t.depends_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerQuery {
    #[serde(default)]
    pub datasource: String,
    #[serde(default)]
    pub query: String,
    /// Metric name the query result is reported under
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerLabel {
    pub name: String,
    pub value: String,
}

/// Rule deciding whether a layer applies to a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerPresence {
    Always { presence: String },
    Queries { queries: Vec<LayerQuery> },
    Label { label: Vec<LayerLabel> },
}

impl LayerPresence {
    pub fn always() -> Self {
        LayerPresence::Always {
            presence: "always".to_string(),
        }
    }
}

/// Parsed layer definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDefinition {
    pub layer_name: String,
    pub layer_level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub layer_presence: LayerPresence,
    pub tunables: Vec<Tunable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PresenceMatch {
    Always,
    Query,
    Label,
}

impl LayerDefinition {
    fn presence_match(&self, intervals: &IntervalMap) -> Option<PresenceMatch> {
        match &self.layer_presence {
            LayerPresence::Always { .. } => Some(PresenceMatch::Always),
            LayerPresence::Queries { queries } => intervals
                .values()
                .any(|i| queries.iter().any(|q| i.metric(&q.key).is_some()))
                .then_some(PresenceMatch::Query),
            LayerPresence::Label { label } => intervals
                .values()
                .filter_map(|i| i.metrics())
                .flat_map(|m| m.values())
                .any(|metric| {
                    label.iter().any(|l| {
                        metric
                            .metadata
                            .get(&l.name)
                            .map(|v| v.to_ascii_lowercase().contains(&l.value.to_ascii_lowercase()))
                            .unwrap_or(false)
                    })
                })
                .then_some(PresenceMatch::Label),
        }
    }
}

/// Template store of layer definitions
#[derive(Debug, Clone, Default)]
pub struct LayerCatalog {
    layers: HashMap<String, LayerDefinition>,
}

impl LayerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the container, hotspot, semeru and quarkus layers
    pub fn with_builtin_layers() -> Self {
        let mut catalog = Self::new();
        for layer in builtin_layers() {
            catalog.insert(layer);
        }
        catalog
    }

    /// Insert a template; tunables without a layer are assigned to this one
    pub fn insert(&mut self, mut layer: LayerDefinition) {
        for tunable in &mut layer.tunables {
            if tunable.layer_name.is_empty() {
                tunable.layer_name = layer.layer_name.clone();
            }
        }
        self.layers.insert(layer.layer_name.clone(), layer);
    }

    pub fn get(&self, layer_name: &str) -> Option<&LayerDefinition> {
        self.layers.get(layer_name)
    }

    /// Owned copy of a template for attachment to one application
    pub fn attach(&self, layer_name: &str) -> Option<LayerDefinition> {
        self.layers.get(layer_name).cloned()
    }

    pub fn level(&self, layer_name: &str) -> Option<u32> {
        self.layers.get(layer_name).map(|l| l.layer_level)
    }

    pub fn tunable(&self, spec: &TunableSpec) -> Option<&Tunable> {
        self.layers
            .get(&spec.layer_name)?
            .tunables
            .iter()
            .find(|t| t.name == spec.tunable_name)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers applying to a container, ordered by level then name
    ///
    /// When several layers of one level match, label matches shadow
    /// query matches (a vendor label is more specific than a metric's presence).
    pub fn detect_layers(&self, intervals: &IntervalMap) -> Vec<&LayerDefinition> {
        let mut by_level: BTreeMap<u32, Vec<(&LayerDefinition, PresenceMatch)>> = BTreeMap::new();
        for layer in self.layers.values() {
            if let Some(m) = layer.presence_match(intervals) {
                by_level.entry(layer.layer_level).or_default().push((layer, m));
            }
        }

        let mut detected = Vec::new();
        for (_, mut matched) in by_level {
            if matched.iter().any(|(_, m)| *m == PresenceMatch::Label) {
                matched.retain(|(_, m)| *m != PresenceMatch::Query);
            }
            matched.sort_by(|a, b| a.0.layer_name.cmp(&b.0.layer_name));
            detected.extend(matched.into_iter().map(|(layer, _)| layer));
        }
        detected
    }
}

fn builtin_layers() -> Vec<LayerDefinition> {
    use layers::*;
    use names::*;

    const MB: f64 = 1024.0 * 1024.0;

    let container = LayerDefinition {
        layer_name: CONTAINER.to_string(),
        layer_level: 0,
        details: Some("container resource limits".to_string()),
        layer_presence: LayerPresence::always(),
        tunables: vec![
            numeric_const(CPU_LIMIT, ValueType::Double, 0.1, 64.0, 0.1)
                .with_slo_classes(&["throughput", "response_time", "resource_usage"])
                .with_description("container CPU limit in cores"),
            numeric_const(
                MEMORY_LIMIT,
                ValueType::Double,
                128.0 * MB,
                256.0 * 1024.0 * MB,
                MB,
            )
            .with_slo_classes(&["throughput", "response_time", "resource_usage"])
            .with_description("container memory limit in bytes"),
        ],
    };

    let jvm_layer = |layer_name: &str, presence: LayerPresence, gc_choices: &[&str]| {
        LayerDefinition {
            layer_name: layer_name.to_string(),
            layer_level: 1,
            details: Some(format!("{} JVM runtime", layer_name)),
            layer_presence: presence,
            tunables: vec![
                numeric_const(MAX_RAM_PERCENTAGE, ValueType::Double, 25.0, 90.0, 1.0)
                    .with_slo_classes(&["throughput", "response_time"])
                    .depends_on(CONTAINER, CPU_LIMIT)
                    .depends_on(CONTAINER, MEMORY_LIMIT),
                categorical_const(GC_POLICY, gc_choices)
                    .with_slo_classes(&["throughput", "response_time"])
                    .depends_on(CONTAINER, CPU_LIMIT)
                    .depends_on(CONTAINER, MEMORY_LIMIT)
                    .depends_on(layer_name, MAX_RAM_PERCENTAGE),
            ],
        }
    };

    let hotspot = jvm_layer(
        HOTSPOT,
        LayerPresence::Queries {
            queries: vec![LayerQuery {
                datasource: "prometheus".to_string(),
                query: "jvm_info".to_string(),
                key: "jvmInfo".to_string(),
            }],
        },
        &crate::generator::gc::HOTSPOT_FLAGS[..],
    );

    let semeru = jvm_layer(
        SEMERU,
        LayerPresence::Label {
            label: vec![
                LayerLabel {
                    name: "runtime".to_string(),
                    value: "semeru".to_string(),
                },
                LayerLabel {
                    name: "vendor".to_string(),
                    value: "openj9".to_string(),
                },
                LayerLabel {
                    name: "vendor".to_string(),
                    value: "ibm".to_string(),
                },
            ],
        },
        &crate::generator::gc::SEMERU_FLAGS[..],
    );

    let quarkus = LayerDefinition {
        layer_name: QUARKUS.to_string(),
        layer_level: 2,
        details: Some("quarkus application framework".to_string()),
        layer_presence: LayerPresence::Queries {
            queries: vec![LayerQuery {
                datasource: "prometheus".to_string(),
                query: "quarkus_thread_pool_active_count".to_string(),
                key: "quarkusThreadPoolActive".to_string(),
            }],
        },
        tunables: vec![
            numeric_const(CORE_THREADS, ValueType::Integer, 1.0, 100.0, 1.0)
                .with_slo_classes(&["throughput", "response_time"])
                .depends_on(CONTAINER, CPU_LIMIT),
        ],
    };

    vec![container, hotspot, semeru, quarkus]
}

// Built-in definitions skip validation; `test_builtin_tunables_valid` covers them.
fn numeric_const(name: &str, value_type: ValueType, lower: f64, upper: f64, step: f64) -> Tunable {
    Tunable::bare(
        name.to_string(),
        value_type,
        TunableDomain::Numeric { lower, upper, step },
    )
}

fn categorical_const(name: &str, choices: &[&str]) -> Tunable {
    Tunable::bare(
        name.to_string(),
        ValueType::Categorical,
        TunableDomain::Categorical {
            choices: choices.iter().map(|c| c.to_string()).collect(),
        },
    )
}
