//! Experiment and result validation
//!
//! Each pipeline step returns `Result<_, Rejection>`; the first rejection
//! ends the pipeline and is converted into the [`ValidationOutputData`]
//! attached to the record. Nothing here returns an error to the caller.

mod experiment;
mod result;


pub use experiment::{ExperimentValidator, MAX_TERM_DAYS};
pub use result::{ResultValidator, ValidatedResult};

use crate::experiment::{status, ValidationOutputData};
use crate::profile::{PerformanceProfile, ProfileStore};
use std::fmt;
use std::sync::Arc;

/// Stable rejection messages
pub mod messages {
    pub const MISSING_PARAMETERS: &str = "Missing mandatory parameters";
    pub const DUPLICATE_EXPERIMENT: &str = "Experiment name already exists";
    pub const SLO_AND_PROFILE: &str = "Either performance_profile or slo may be set, not both";
    pub const PROFILE_NOT_FOUND: &str = "Performance profile not found";
    pub const UNSUPPORTED_MODE: &str = "Unsupported mode / target_cluster combination";
    pub const INVALID_MEASUREMENT_DURATION: &str = "Invalid measurement_duration";
    pub const INVALID_TERM: &str = "duration_in_days must be positive and at most 3650";
    pub const EXPERIMENT_NOT_FOUND: &str = "Experiment not found";
    pub const WRONG_TIMESTAMP: &str = "The Start time should precede the End time!";
    pub const MEASUREMENT_DURATION_MISMATCH: &str =
        "Interval duration cannot be less than or greater than measurement_duration";
    pub const DUPLICATE_RESULT: &str = "An entry for this record already exists";
    pub const KUBERNETES_OBJECT_MISMATCH: &str = "kubernetes_objects do not match the experiment";
    pub const NO_PROFILE_HANDLER: &str = "No handler registered for performance profile";
    pub const PROFILE_STORE_UNAVAILABLE: &str = "Performance profiles unavailable";
}

/// Why a record was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Every absent mandatory field, in declaration order
    MissingFields(Vec<&'static str>),
    Invalid(String),
    Conflict(String),
    Internal(String),
}

impl Rejection {
    pub fn invalid(message: impl Into<String>) -> Self {
        Rejection::Invalid(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Rejection::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Rejection::Internal(message.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Rejection::MissingFields(_) | Rejection::Invalid(_) => status::BAD_REQUEST,
            Rejection::Conflict(_) => status::CONFLICT,
            Rejection::Internal(_) => status::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingFields(fields) => {
                write!(f, "{}: {}", messages::MISSING_PARAMETERS, fields.join(", "))
            }
            Rejection::Invalid(msg) | Rejection::Conflict(msg) | Rejection::Internal(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl From<Rejection> for ValidationOutputData {
    fn from(rejection: Rejection) -> Self {
        ValidationOutputData::failure(rejection.to_string(), rejection.status_code())
    }
}

/// Collects absent mandatory fields
#[derive(Debug, Default)]
pub(crate) struct MissingFields(Vec<&'static str>);

impl MissingFields {
    pub fn check(&mut self, present: bool, field: &'static str) -> &mut Self {
        if !present {
            self.0.push(field);
        }
        self
    }

    pub fn into_result(self) -> Result<(), Rejection> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Rejection::MissingFields(self.0))
        }
    }
}

/// Present and not blank
pub(crate) fn has_text(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Named profile from the store; unknown names are input errors
pub(crate) fn lookup_profile(
    profiles: &ProfileStore,
    name: &str,
) -> Result<Arc<PerformanceProfile>, Rejection> {
    match profiles.get(name) {
        Ok(Some(profile)) => Ok(profile),
        Ok(None) => Err(Rejection::invalid(format!(
            "{}: {}",
            messages::PROFILE_NOT_FOUND,
            name
        ))),
        Err(e) => Err(Rejection::internal(format!(
            "{}: {}",
            messages::PROFILE_STORE_UNAVAILABLE,
            e
        ))),
    }
}
