//! Error types for the dashboard inference pipeline

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, DashboardError>;

/// Which on-disk input a load failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Dataset,
    DelayModel,
    DemandModel,
    Scaler,
    DelaySchema,
    DemandSchema,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Dataset => "dataset",
            ArtifactKind::DelayModel => "delay model",
            ArtifactKind::DemandModel => "demand model",
            ArtifactKind::Scaler => "scaler",
            ArtifactKind::DelaySchema => "delay feature schema",
            ArtifactKind::DemandSchema => "demand feature schema",
        };
        f.write_str(name)
    }
}

/// Errors raised while loading artifacts or running predictions
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Dataset or artifact missing, corrupt or unreadable
    #[error("failed to load {kind} from {}: {reason}", path.display())]
    Load {
        kind: ArtifactKind,
        path: PathBuf,
        reason: String,
    },

    /// A vector or parameter set does not have the width its consumer expects
    #[error("schema mismatch in {context}: expected {expected} features, got {actual}")]
    SchemaMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Feature names disagree even though widths match
    #[error("feature order mismatch in {context}: position {position} is '{found}', expected '{expected}'")]
    FeatureOrder {
        context: String,
        position: usize,
        expected: String,
        found: String,
    },

    #[error("record is missing required field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' is not numeric: '{value}'")]
    NonNumericField { field: String, value: String },

    /// The model runtime rejected or failed the call
    #[error("{model} invocation failed: {reason}")]
    Invocation { model: String, reason: String },

    /// The model returned something the pipeline cannot interpret
    #[error("{model} returned malformed output: {reason}")]
    MalformedOutput { model: String, reason: String },
}

impl DashboardError {
    pub(crate) fn load(kind: ArtifactKind, path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        DashboardError::Load {
            kind,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        DashboardError::SchemaMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Short machine-readable category for report banners
    pub fn category(&self) -> &'static str {
        match self {
            DashboardError::Load { .. } => "load_failure",
            DashboardError::SchemaMismatch { .. } | DashboardError::FeatureOrder { .. } => {
                "schema_mismatch"
            }
            DashboardError::MissingField { .. } | DashboardError::NonNumericField { .. } => {
                "invalid_record"
            }
            DashboardError::Invocation { .. } | DashboardError::MalformedOutput { .. } => {
                "prediction_failure"
            }
        }
    }

    pub fn is_load_failure(&self) -> bool {
        matches!(self, DashboardError::Load { .. })
    }
}
