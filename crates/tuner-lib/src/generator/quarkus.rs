//! Quarkus framework layer: worker thread-pool sizing

use super::{DependencyValues, GenerationContext, LayerGenerator, RecommendationConfigEnv};
use crate::config::EngineConfig;
use crate::interval::IntervalMap;
use crate::tunable::{layers, names, TunableSpec};
use tracing::{error, warn};

const TUNABLES: &[&str] = &[names::CORE_THREADS];

/// Sizes the pool as `ceil(cores * multiplier)` within `[min_threads, max_threads]`
#[derive(Debug, Clone)]
pub struct QuarkusGenerator {
    multiplier: f64,
    min_threads: u32,
    max_threads: u32,
}

impl QuarkusGenerator {
    pub fn new(multiplier: f64, min_threads: u32, max_threads: u32) -> Self {
        Self {
            multiplier,
            min_threads,
            max_threads: max_threads.max(min_threads),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.thread_pool_multiplier,
            config.min_threads,
            config.max_threads,
        )
    }

    pub fn thread_count(&self, cpu_cores: f64) -> u32 {
        let raw = (cpu_cores * self.multiplier).ceil();
        (raw.max(0.0) as u32).clamp(self.min_threads, self.max_threads)
    }
}

impl Default for QuarkusGenerator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl LayerGenerator for QuarkusGenerator {
    fn layer_name(&self) -> &str {
        layers::QUARKUS
    }

    fn tunables(&self) -> &[&'static str] {
        TUNABLES
    }

    fn generate(
        &self,
        tunable: &str,
        dependencies: &DependencyValues,
        _intervals: &IntervalMap,
        _ctx: &mut GenerationContext,
    ) -> Option<RecommendationConfigEnv> {
        if tunable != names::CORE_THREADS {
            warn!(layer = layers::QUARKUS, tunable = %tunable, "Unknown tunable");
            return None;
        }

        let cpu_spec = TunableSpec::new(layers::CONTAINER, names::CPU_LIMIT);
        let Some(cpu) = dependencies.get(&cpu_spec).copied() else {
            error!(
                layer = layers::QUARKUS,
                tunable = %tunable,
                missing = %cpu_spec,
                "CPU limit not resolved, skipping thread pool sizing"
            );
            return None;
        };
        if cpu <= 0.0 {
            warn!(layer = layers::QUARKUS, cpu_cores = cpu, "Non-positive CPU limit");
            return None;
        }

        let threads = self.thread_count(cpu);
        Some(RecommendationConfigEnv::new(
            names::CORE_THREADS,
            format!("-D{}={}", names::CORE_THREADS, threads),
        ))
    }
}
