pub mod app_config;
pub mod config;
pub mod duration;
pub mod metrics;
pub mod profile;
pub mod scope;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use duration::{resolve, DurationDefinition, DurationKey, TimeRange, CHART_POINTS};
pub use metrics::{Aggregator, FieldAggregation, LabelField, MetricField};
pub use profile::{
    fuse, EntityProfile, MetricComparison, MetricStats, PopulationProfile, ProfileComparison,
};
pub use scope::{Scope, ScopeKind};

use thiserror::Error;

/// Request-level validation failures. Each variant names the request
/// parameter it came from so the HTTP layer can point the caller at it.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown duration: {0}")]
    UnknownDuration(String),

    #[error("unknown scope: {0}")]
    UnknownScope(String),

    #[error("unsupported field: {0}")]
    UnsupportedField(String),

    #[error("field `{0}` cannot be accumulated")]
    NonCumulativeField(String),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl CoreError {
    /// The request parameter that carried the bad value.
    #[must_use]
    pub fn parameter(&self) -> &'static str {
        match self {
            CoreError::UnknownDuration(_) => "duration",
            CoreError::UnknownScope(_) => "scope",
            CoreError::UnsupportedField(_) | CoreError::NonCumulativeField(_) => "fields",
            CoreError::InvalidParameter { name, .. } => name,
        }
    }

    /// The offending value, when the error carries one.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            CoreError::UnknownDuration(v)
            | CoreError::UnknownScope(v)
            | CoreError::UnsupportedField(v)
            | CoreError::NonCumulativeField(v) => Some(v),
            CoreError::InvalidParameter { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_field_names_the_fields_parameter() {
        let err = "nope".parse::<MetricField>().unwrap_err();
        assert_eq!(err.parameter(), "fields");
        assert_eq!(err.value(), Some("nope"));
        assert_eq!(err.to_string(), "unsupported field: nope");
    }

    #[test]
    fn unknown_duration_names_the_duration_parameter() {
        let err = resolve("decade").unwrap_err();
        assert_eq!(err.parameter(), "duration");
        assert_eq!(err.value(), Some("decade"));
    }

    #[test]
    fn invalid_parameter_keeps_its_own_name() {
        let err = Scope::parse("author", None).unwrap_err();
        assert_eq!(err.parameter(), "id");
        assert_eq!(err.value(), None);
    }
}
