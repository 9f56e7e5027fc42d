//! Layer recommendation generators
//!
//! One generator per layer turns resolved dependency values plus the
//! container's interval history into a [`RecommendationConfigEnv`]:
//! - `container`: CPU and memory limits observed on the container
//! - `hotspot` / `semeru`: heap percentage and GC policy
//! - `quarkus`: worker thread-pool size
//!
//! Generators hold no per-run state. The one-shot `-server` latch lives in a
//! [`GenerationContext`] created for each recommendation run.

mod container;
pub mod gc;
mod jvm;
pub mod memory;
mod quarkus;

#[cfg(test)]
mod tests;

pub use container::ContainerGenerator;
pub use gc::{select_gc_policy, GcPolicyClass, MID_HEAP_THRESHOLD_MB};
pub use jvm::{JvmFlavor, JvmGenerator, JvmMetadata, JVM_INFO};
pub use memory::{MemorySizing, SizingMode};
pub use quarkus::QuarkusGenerator;

use crate::config::EngineConfig;
use crate::interval::IntervalMap;
use crate::quantity::bytes_to_mb;
use crate::tunable::{layers, names, TunableSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

/// Resolved scalar per tunable: bytes for memory, cores for CPU, percent for heap ratio
pub type DependencyValues = HashMap<TunableSpec, f64>;

/// Name of the combined JVM options entry
pub const JVM_OPTIONS_ENV: &str = "JDK_JAVA_OPTIONS";

/// A tunable paired with its resolved value, e.g. `-XX:MaxRAMPercentage=75.0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationConfigEnv {
    pub name: String,
    pub value: String,
}

impl RecommendationConfigEnv {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Scalar carried by the value: the text after the last `=`, or the whole value
    pub fn numeric_value(&self) -> Option<f64> {
        let raw = match self.value.rfind('=') {
            Some(idx) => &self.value[idx + 1..],
            None => self.value.as_str(),
        };
        raw.trim().parse().ok()
    }

    /// Copy with `flag` placed in front of the value
    pub fn prepend(&self, flag: &str) -> Self {
        Self::new(self.name.clone(), format!("{} {}", flag, self.value))
    }

    /// Join several outputs into one entry, keeping emission order
    pub fn combine(name: impl Into<String>, parts: &[RecommendationConfigEnv]) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        let value = parts
            .iter()
            .map(|p| p.value.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Some(Self::new(name, value))
    }
}

impl fmt::Display for RecommendationConfigEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Per-run state shared by the generators of one recommendation run
#[derive(Debug, Default)]
pub struct GenerationContext {
    server_flag_added: bool,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true exactly once per run
    pub fn claim_server_flag(&mut self) -> bool {
        if self.server_flag_added {
            return false;
        }
        self.server_flag_added = true;
        true
    }

    pub fn server_flag_added(&self) -> bool {
        self.server_flag_added
    }
}

/// Tunable-recommendation contract implemented by each layer
pub trait LayerGenerator: Send + Sync {
    fn layer_name(&self) -> &str;

    /// Tunable names this generator knows how to produce
    fn tunables(&self) -> &[&'static str];

    /// Produce a recommendation, or `None` when data is insufficient
    fn generate(
        &self,
        tunable: &str,
        dependencies: &DependencyValues,
        intervals: &IntervalMap,
        ctx: &mut GenerationContext,
    ) -> Option<RecommendationConfigEnv>;

    fn supports(&self, tunable: &str) -> bool {
        self.tunables().contains(&tunable)
    }
}

/// Layer name -> generator
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Arc<dyn LayerGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the container, hotspot, semeru and quarkus generators
    pub fn with_defaults(config: &EngineConfig) -> Self {
        let sizing = MemorySizing::from_config(config);
        let mut registry = Self::new();
        registry.register(Arc::new(ContainerGenerator::new()));
        registry.register(Arc::new(JvmGenerator::new(JvmFlavor::Hotspot, sizing.clone())));
        registry.register(Arc::new(JvmGenerator::new(JvmFlavor::Semeru, sizing)));
        registry.register(Arc::new(QuarkusGenerator::from_config(config)));
        registry
    }

    pub fn register(&mut self, generator: Arc<dyn LayerGenerator>) {
        self.generators
            .insert(generator.layer_name().to_string(), generator);
    }

    pub fn get(&self, layer_name: &str) -> Option<Arc<dyn LayerGenerator>> {
        self.generators.get(layer_name).cloned()
    }

    pub fn layer_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.generators.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("layers", &self.layer_names())
            .finish()
    }
}

/// Container CPU (cores) and memory (MB) resolved by the container layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ContainerResources {
    pub cpu_cores: f64,
    pub memory_mb: f64,
}

/// Read the container-level prerequisites; logs and returns `None` when absent or non-positive
pub(crate) fn container_resources(
    dependencies: &DependencyValues,
    layer: &str,
    tunable: &str,
) -> Option<ContainerResources> {
    let cpu_spec = TunableSpec::new(layers::CONTAINER, names::CPU_LIMIT);
    let memory_spec = TunableSpec::new(layers::CONTAINER, names::MEMORY_LIMIT);

    let (Some(cpu), Some(memory)) = (dependencies.get(&cpu_spec), dependencies.get(&memory_spec))
    else {
        error!(
            layer = %layer,
            tunable = %tunable,
            cpu_present = dependencies.contains_key(&cpu_spec),
            memory_present = dependencies.contains_key(&memory_spec),
            "Container CPU/memory not resolved, skipping recommendation"
        );
        return None;
    };

    if *cpu <= 0.0 || *memory <= 0.0 {
        warn!(
            layer = %layer,
            tunable = %tunable,
            cpu_cores = *cpu,
            memory_bytes = *memory,
            "Non-positive container resources, skipping recommendation"
        );
        return None;
    }

    Some(ContainerResources {
        cpu_cores: *cpu,
        memory_mb: bytes_to_mb(*memory),
    })
}
