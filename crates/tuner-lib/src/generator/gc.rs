//! Garbage collector policy selection
//!
//! The decision depends only on (ceil(cores), effective heap MB, JDK major
//! version); each JVM flavor maps the chosen class to its own flag.

use serde::{Deserialize, Serialize};

/// Heap size separating small-heap from large-heap policies
pub const MID_HEAP_THRESHOLD_MB: f64 = 4096.0;

/// Hotspot flags in [`GcPolicyClass`] declaration order
pub const HOTSPOT_FLAGS: [&str; 5] = [
    "-XX:+UseSerialGC",
    "-XX:+UseParallelGC",
    "-XX:+UseZGC",
    "-XX:+UseShenandoahGC",
    "-XX:+UseG1GC",
];

/// OpenJ9 flags in [`GcPolicyClass`] declaration order
pub const SEMERU_FLAGS: [&str; 5] = [
    "-Xgcpolicy:optthruput -Xgcthreads1",
    "-Xgcpolicy:optthruput",
    "-Xgcpolicy:metronome",
    "-Xgcpolicy:optavgpause",
    "-Xgcpolicy:gencon",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcPolicyClass {
    Serial,
    Parallel,
    LowestLatency,
    LowLatency,
    Balanced,
}

impl GcPolicyClass {
    pub fn index(&self) -> usize {
        match self {
            GcPolicyClass::Serial => 0,
            GcPolicyClass::Parallel => 1,
            GcPolicyClass::LowestLatency => 2,
            GcPolicyClass::LowLatency => 3,
            GcPolicyClass::Balanced => 4,
        }
    }
}

pub fn select_gc_policy(cores: u32, heap_mb: f64, jdk_major: Option<u32>) -> GcPolicyClass {
    if cores <= 1 {
        return GcPolicyClass::Serial;
    }
    if cores <= 2 && heap_mb <= MID_HEAP_THRESHOLD_MB {
        return GcPolicyClass::Parallel;
    }
    if heap_mb >= MID_HEAP_THRESHOLD_MB {
        match jdk_major {
            Some(v) if v >= 17 => return GcPolicyClass::LowestLatency,
            Some(v) if v >= 11 => return GcPolicyClass::LowLatency,
            _ => {}
        }
    }
    GcPolicyClass::Balanced
}

/// Ceiling of a fractional core count, at least 1
pub fn ceil_cores(cpu_cores: f64) -> u32 {
    cpu_cores.ceil().max(1.0) as u32
}
