//! Engine configuration
//!
//! Every field has a default so an empty document (or no document at all)
//! yields a working engine. Binaries layer files and environment on top.

use serde::{Deserialize, Serialize};

/// How a batch reacts to a failing item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Stop at the first failing item; later items stay unprocessed
    #[default]
    HaltOnFirstFailure,
    /// Validate every item and report each outcome
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Allowed deviation between an interval and `measurement_duration`
    #[serde(default = "default_measurement_tolerance_secs")]
    pub measurement_tolerance_secs: i64,

    /// Used when an experiment has no `trial_settings`
    #[serde(default = "default_measurement_duration")]
    pub default_measurement_duration: String,

    /// Recommendation window when an experiment declares no terms
    #[serde(default = "default_term_days")]
    pub default_term_days: f64,

    #[serde(default = "default_thread_pool_multiplier")]
    pub thread_pool_multiplier: f64,

    #[serde(default = "default_min_threads")]
    pub min_threads: u32,

    #[serde(default = "default_max_threads")]
    pub max_threads: u32,

    #[serde(default = "default_min_heap_percent")]
    pub min_heap_percent: f64,

    #[serde(default = "default_max_heap_percent")]
    pub max_heap_percent: f64,

    /// Native memory estimate per live thread
    #[serde(default = "default_per_thread_memory_mb")]
    pub per_thread_memory_mb: f64,

    #[serde(default)]
    pub batch_policy: BatchPolicy,
}

fn default_measurement_tolerance_secs() -> i64 {
    5
}

fn default_measurement_duration() -> String {
    "15min".to_string()
}

fn default_term_days() -> f64 {
    1.0
}

fn default_thread_pool_multiplier() -> f64 {
    1.0
}

fn default_min_threads() -> u32 {
    1
}

fn default_max_threads() -> u32 {
    100
}

fn default_min_heap_percent() -> f64 {
    25.0
}

fn default_max_heap_percent() -> f64 {
    90.0
}

fn default_per_thread_memory_mb() -> f64 {
    1.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            measurement_tolerance_secs: default_measurement_tolerance_secs(),
            default_measurement_duration: default_measurement_duration(),
            default_term_days: default_term_days(),
            thread_pool_multiplier: default_thread_pool_multiplier(),
            min_threads: default_min_threads(),
            max_threads: default_max_threads(),
            min_heap_percent: default_min_heap_percent(),
            max_heap_percent: default_max_heap_percent(),
            per_thread_memory_mb: default_per_thread_memory_mb(),
            batch_policy: BatchPolicy::default(),
        }
    }
}
