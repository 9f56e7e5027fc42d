//! Container layer: CPU and memory limits observed on the container

use super::{DependencyValues, GenerationContext, LayerGenerator, RecommendationConfigEnv};
use crate::interval::{latest_peak, IntervalMap};
use crate::tunable::{layers, names};
use tracing::warn;

const TUNABLES: &[&str] = &[names::CPU_LIMIT, names::MEMORY_LIMIT];

/// Reads `cpuLimit` (cores) and `memoryLimit` (bytes) from the latest interval reporting them
#[derive(Debug, Clone, Default)]
pub struct ContainerGenerator;

impl ContainerGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl LayerGenerator for ContainerGenerator {
    fn layer_name(&self) -> &str {
        layers::CONTAINER
    }

    fn tunables(&self) -> &[&'static str] {
        TUNABLES
    }

    fn generate(
        &self,
        tunable: &str,
        _dependencies: &DependencyValues,
        intervals: &IntervalMap,
        _ctx: &mut GenerationContext,
    ) -> Option<RecommendationConfigEnv> {
        if !self.supports(tunable) {
            warn!(layer = layers::CONTAINER, tunable = %tunable, "Unknown tunable");
            return None;
        }

        let value = match latest_peak(intervals, tunable) {
            Some(v) if v > 0.0 => v,
            Some(v) => {
                warn!(tunable = %tunable, value = v, "Non-positive container limit observed");
                return None;
            }
            None => {
                warn!(tunable = %tunable, "No container limit observed in intervals");
                return None;
            }
        };

        let rendered = if tunable == names::CPU_LIMIT {
            format!("{}", (value * 1000.0).round() / 1000.0)
        } else {
            format!("{:.0}", value)
        };
        Some(RecommendationConfigEnv::new(tunable, rendered))
    }
}
