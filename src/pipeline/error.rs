use thiserror::Error;

use crate::pipeline::engine::EngineError;
use crate::pipeline::OperationFamily;

/// Failure taxonomy surfaced by a pipeline run. Step indices are 0-based.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(
        "step {step}: operation type '{type_name}' is a retired umbrella type; use a prefixed form such as 'effects-grayscale' or 'filter-blur'"
    )]
    InvalidOperationType { step: usize, type_name: String },
    #[error("step {step}: unsupported operation type '{family}'")]
    UnsupportedOperationType { step: usize, family: String },
    #[error("step {step} ({family}): missing required parameter '{parameter}'")]
    MissingRequiredParameter {
        step: usize,
        family: OperationFamily,
        parameter: &'static str,
    },
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },
    #[error("storing source failed: {0}")]
    StorageFailed(String),
    #[error("step {step} ({family}) failed: {source}")]
    EngineInvocationFailed {
        step: usize,
        family: OperationFamily,
        #[source]
        source: EngineError,
    },
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidOperationType { .. } => "invalid_operation_type",
            Self::UnsupportedOperationType { .. } => "unsupported_operation_type",
            Self::MissingRequiredParameter { .. } => "missing_required_parameter",
            Self::FileNotFound(_) => "file_not_found",
            Self::DownloadFailed { .. } => "download_failed",
            Self::StorageFailed(_) => "storage_failed",
            Self::EngineInvocationFailed { .. } => "engine_invocation_failed",
        }
    }

    pub fn step(&self) -> Option<usize> {
        match self {
            Self::InvalidOperationType { step, .. }
            | Self::UnsupportedOperationType { step, .. }
            | Self::MissingRequiredParameter { step, .. }
            | Self::EngineInvocationFailed { step, .. } => Some(*step),
            Self::InvalidRequest(_)
            | Self::FileNotFound(_)
            | Self::DownloadFailed { .. }
            | Self::StorageFailed(_) => None,
        }
    }
}
