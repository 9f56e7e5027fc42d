//! JVM runtime layers (Hotspot and Semeru/OpenJ9)

use super::gc::{ceil_cores, select_gc_policy, HOTSPOT_FLAGS, SEMERU_FLAGS};
use super::memory::MemorySizing;
use super::{
    container_resources, DependencyValues, GenerationContext, LayerGenerator,
    RecommendationConfigEnv,
};
use crate::interval::{latest_metadata, IntervalMap};
use crate::tunable::{layers, names, TunableSpec};
use tracing::{debug, error, warn};

/// Metric carrying JVM labels (`version`, `vendor`, `runtime`) as metadata
pub const JVM_INFO: &str = "jvmInfo";

/// JVMs at or below this major version get `-server`
const SERVER_FLAG_MAX_MAJOR: u32 = 8;

const SERVER_FLAG: &str = "-server";

const TUNABLES: &[&str] = &[names::MAX_RAM_PERCENTAGE, names::GC_POLICY];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JvmFlavor {
    Hotspot,
    Semeru,
}

impl JvmFlavor {
    pub fn layer_name(&self) -> &'static str {
        match self {
            JvmFlavor::Hotspot => layers::HOTSPOT,
            JvmFlavor::Semeru => layers::SEMERU,
        }
    }

    fn gc_flags(&self) -> &'static [&'static str; 5] {
        match self {
            JvmFlavor::Hotspot => &HOTSPOT_FLAGS,
            JvmFlavor::Semeru => &SEMERU_FLAGS,
        }
    }
}

/// JVM labels reported through the `jvmInfo` metric
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JvmMetadata {
    pub version: Option<String>,
    pub vendor: Option<String>,
    pub runtime: Option<String>,
}

impl JvmMetadata {
    pub fn from_intervals(intervals: &IntervalMap) -> Self {
        let label = |key: &str| latest_metadata(intervals, JVM_INFO, key).map(str::to_string);
        Self {
            version: label("version"),
            vendor: label("vendor"),
            runtime: label("runtime"),
        }
    }

    pub fn major_version(&self) -> Option<u32> {
        self.version.as_deref().and_then(parse_jdk_major)
    }
}

/// `"1.8.0_292"` -> 8, `"17.0.2+8"` -> 17, `"21-ea"` -> 21
pub fn parse_jdk_major(version: &str) -> Option<u32> {
    let mut parts = version
        .trim()
        .split(|c: char| !c.is_ascii_digit())
        .filter(|p| !p.is_empty());
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        return parts.next()?.parse().ok();
    }
    Some(first)
}

pub struct JvmGenerator {
    flavor: JvmFlavor,
    sizing: MemorySizing,
}

impl JvmGenerator {
    pub fn new(flavor: JvmFlavor, sizing: MemorySizing) -> Self {
        Self { flavor, sizing }
    }

    fn max_ram_percentage(
        &self,
        dependencies: &DependencyValues,
        intervals: &IntervalMap,
    ) -> Option<RecommendationConfigEnv> {
        let layer = self.flavor.layer_name();
        let resources = container_resources(dependencies, layer, names::MAX_RAM_PERCENTAGE)?;
        let (percent, mode) =
            self.sizing
                .percentage(resources.memory_mb, resources.cpu_cores, intervals);

        debug!(
            layer = %layer,
            memory_mb = resources.memory_mb,
            cpu_cores = resources.cpu_cores,
            percent = percent,
            mode = mode.as_str(),
            "Computed MaxRAMPercentage"
        );

        Some(RecommendationConfigEnv::new(
            names::MAX_RAM_PERCENTAGE,
            format!("-XX:MaxRAMPercentage={:.1}", percent),
        ))
    }

    fn gc_policy(
        &self,
        dependencies: &DependencyValues,
        metadata: &JvmMetadata,
    ) -> Option<RecommendationConfigEnv> {
        let layer = self.flavor.layer_name();
        let resources = container_resources(dependencies, layer, names::GC_POLICY)?;

        let percent_spec = TunableSpec::new(layer, names::MAX_RAM_PERCENTAGE);
        let Some(percent) = dependencies.get(&percent_spec) else {
            error!(
                layer = %layer,
                tunable = names::GC_POLICY,
                missing = %percent_spec,
                "Heap percentage not resolved, skipping GC policy"
            );
            return None;
        };

        let heap_mb = resources.memory_mb * percent / 100.0;
        let cores = ceil_cores(resources.cpu_cores);
        let class = select_gc_policy(cores, heap_mb, metadata.major_version());

        debug!(
            layer = %layer,
            cores = cores,
            heap_mb = heap_mb,
            jdk_major = ?metadata.major_version(),
            policy = ?class,
            "Selected GC policy"
        );

        Some(RecommendationConfigEnv::new(
            names::GC_POLICY,
            self.flavor.gc_flags()[class.index()],
        ))
    }
}

impl LayerGenerator for JvmGenerator {
    fn layer_name(&self) -> &str {
        self.flavor.layer_name()
    }

    fn tunables(&self) -> &[&'static str] {
        TUNABLES
    }

    fn generate(
        &self,
        tunable: &str,
        dependencies: &DependencyValues,
        intervals: &IntervalMap,
        ctx: &mut GenerationContext,
    ) -> Option<RecommendationConfigEnv> {
        let metadata = JvmMetadata::from_intervals(intervals);

        let env = match tunable {
            names::MAX_RAM_PERCENTAGE => self.max_ram_percentage(dependencies, intervals),
            names::GC_POLICY => self.gc_policy(dependencies, &metadata),
            other => {
                warn!(layer = %self.layer_name(), tunable = %other, "Unknown tunable");
                None
            }
        }?;

        let legacy = metadata
            .major_version()
            .map(|v| v <= SERVER_FLAG_MAX_MAJOR)
            .unwrap_or(false);
        if legacy && ctx.claim_server_flag() {
            return Some(env.prepend(SERVER_FLAG));
        }
        Some(env)
    }
}
