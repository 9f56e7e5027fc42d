//! Runtime tuning recommendation core
//!
//! This crate provides the core functionality for:
//! - Metric intervals and per-container result history
//! - Layer and tunable definitions with runtime layer detection
//! - Dependency-ordered recommendation generators (container, JVM, Quarkus)
//! - Experiment and result validation against performance profiles
//! - Trial summaries and observability

pub mod aggregation;
pub mod config;
pub mod engine;
pub mod error;
pub mod experiment;
pub mod generator;
pub mod interval;
pub mod observability;
pub mod profile;
pub mod quantity;
pub mod resolver;
pub mod store;
pub mod tunable;
pub mod validation;

pub use config::{BatchPolicy, EngineConfig};
pub use engine::{BatchItem, BatchReport, TuningEngine};
pub use error::{IntervalError, ProfileError, QuantityError, TunableError};
pub use experiment::{Experiment, ExperimentResultData, ValidationOutputData};
pub use observability::{StructuredLogger, TunerMetrics};
pub use resolver::{Notification, NotificationCode, ResolutionReport};
