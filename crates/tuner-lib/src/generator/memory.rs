//! Heap percentage sizing
//!
//! Static mode buckets the container memory and deducts for small CPU
//! counts. Dynamic mode subtracts the observed native footprint and a
//! safety buffer from the container memory, bounded above by static mode.

use crate::config::EngineConfig;
use crate::interval::{max_peak, IntervalMap};
use crate::quantity::bytes_to_mb;

/// Observed non-heap usage, bytes
pub const JVM_NON_HEAP_USED: &str = "jvmMemoryNonHeapUsed";
/// Live thread count
pub const JVM_THREADS_LIVE: &str = "jvmThreadsLive";
/// Direct buffer usage, bytes
pub const JVM_DIRECT_BUFFER_USED: &str = "jvmBufferDirectUsed";

/// Footprints below this are treated as missing data
pub const NEGLIGIBLE_FOOTPRINT_MB: f64 = 10.0;

/// Fixed part of the safety buffer
pub const SAFETY_BUFFER_BASE_MB: f64 = 50.0;

/// (container memory upper bound MB, bucket percentage)
const STATIC_BUCKETS: [(f64, f64); 4] = [(256.0, 50.0), (512.0, 60.0), (4096.0, 75.0), (8192.0, 80.0)];
const STATIC_TOP_BUCKET: f64 = 85.0;

/// (container memory upper bound MB, buffer fraction of container memory)
const BUFFER_TIERS: [(f64, f64); 3] = [(1024.0, 0.10), (4096.0, 0.07), (8192.0, 0.05)];
const BUFFER_TOP_TIER: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingMode {
    Static,
    Dynamic,
}

impl SizingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizingMode::Static => "static",
            SizingMode::Dynamic => "dynamic",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemorySizing {
    pub min_heap_percent: f64,
    pub max_heap_percent: f64,
    pub per_thread_memory_mb: f64,
}

impl Default for MemorySizing {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl MemorySizing {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_heap_percent: config.min_heap_percent,
            max_heap_percent: config.max_heap_percent,
            per_thread_memory_mb: config.per_thread_memory_mb,
        }
    }

    /// Percentage from container size alone
    pub fn static_percentage(&self, memory_mb: f64, cpu_cores: f64) -> f64 {
        let bucket = STATIC_BUCKETS
            .iter()
            .find(|(limit, _)| memory_mb <= *limit)
            .map(|(_, pct)| *pct)
            .unwrap_or(STATIC_TOP_BUCKET);

        let deduction = if cpu_cores < 1.0 {
            10.0
        } else if cpu_cores < 2.0 {
            5.0
        } else {
            0.0
        };

        (bucket - deduction).max(self.min_heap_percent)
    }

    /// Base constant plus a share of container memory that shrinks as memory grows
    pub fn safety_buffer_mb(&self, memory_mb: f64) -> f64 {
        let fraction = BUFFER_TIERS
            .iter()
            .find(|(limit, _)| memory_mb <= *limit)
            .map(|(_, f)| *f)
            .unwrap_or(BUFFER_TOP_TIER);
        SAFETY_BUFFER_BASE_MB + memory_mb * fraction
    }

    /// Native footprint in MB; `None` when no interval reports any component
    pub fn native_footprint_mb(&self, intervals: &IntervalMap) -> Option<f64> {
        if !intervals.values().any(|i| i.has_metrics()) {
            return None;
        }

        let non_heap = max_peak(intervals, JVM_NON_HEAP_USED);
        let threads = max_peak(intervals, JVM_THREADS_LIVE);
        let direct = max_peak(intervals, JVM_DIRECT_BUFFER_USED);
        if non_heap.is_none() && threads.is_none() && direct.is_none() {
            return None;
        }

        Some(
            bytes_to_mb(non_heap.unwrap_or(0.0))
                + threads.unwrap_or(0.0) * self.per_thread_memory_mb
                + bytes_to_mb(direct.unwrap_or(0.0)),
        )
    }

    /// Percentage from observed runtime metrics, falling back to static mode
    pub fn percentage(
        &self,
        memory_mb: f64,
        cpu_cores: f64,
        intervals: &IntervalMap,
    ) -> (f64, SizingMode) {
        let ceiling = self.static_percentage(memory_mb, cpu_cores);

        let footprint = match self.native_footprint_mb(intervals) {
            Some(f) if f >= NEGLIGIBLE_FOOTPRINT_MB => f,
            _ => return (ceiling, SizingMode::Static),
        };

        let heap_mb = memory_mb - footprint - self.safety_buffer_mb(memory_mb);
        let raw = heap_mb / memory_mb * 100.0;
        let bounded = raw
            .max(self.min_heap_percent)
            .min(ceiling)
            .min(self.max_heap_percent);

        (round_tenth(bounded), SizingMode::Dynamic)
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
