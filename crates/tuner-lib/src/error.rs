//! Typed failures for the recommendation core
//!
//! Validation outcomes are never errors (see [`crate::experiment::ValidationOutputData`]);
//! these types cover construction invariants and parsing.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures while building an [`IntervalResults`](crate::interval::IntervalResults)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("interval end {end} must be after start {start}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("metrics already attached to interval ending at {end}")]
    MetricsAlreadySet { end: DateTime<Utc> },
}

/// Invariant violations in a tunable definition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TunableError {
    #[error("tunable {name}: step must be non-zero")]
    ZeroStep { name: String },

    #[error("tunable {name}: lower bound {lower} exceeds upper bound {upper}")]
    InvertedBounds { name: String, lower: f64, upper: f64 },

    #[error("tunable {name}: categorical tunable requires at least one choice")]
    EmptyChoices { name: String },

    #[error("tunable {name}: numeric tunable requires {field}")]
    MissingBound { name: String, field: &'static str },

    #[error("tunable {name}: unknown value_type {value_type}")]
    UnknownValueType { name: String, value_type: String },
}

/// Unparseable duration or resource quantity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("unknown unit {unit:?} in {input:?}")]
    UnknownUnit { input: String, unit: String },
}

/// Profile loading failures
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("profile loader failed: {0}")]
    Loader(String),
}
