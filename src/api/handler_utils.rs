use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::api::error::ErrorKind;
use crate::pipeline::error::PipelineError;

pub type ApiObject<T> = (StatusCode, Json<T>);

#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    ok: bool,
    success: bool,
    error: String,
    error_kind: ErrorKind,
    error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_step: Option<usize>,
}

pub fn error_response(
    status: StatusCode,
    kind: ErrorKind,
    code: impl Into<String>,
    message: impl Into<String>,
) -> ApiObject<Value> {
    error_body(status, kind, code.into(), message.into(), None)
}

pub fn map_pipeline_error(err: PipelineError) -> ApiObject<Value> {
    let (status, kind) = match &err {
        PipelineError::InvalidRequest(_)
        | PipelineError::InvalidOperationType { .. }
        | PipelineError::UnsupportedOperationType { .. }
        | PipelineError::MissingRequiredParameter { .. } => {
            (StatusCode::BAD_REQUEST, ErrorKind::Validation)
        }
        PipelineError::FileNotFound(_) => (StatusCode::NOT_FOUND, ErrorKind::Validation),
        PipelineError::DownloadFailed { .. } => (StatusCode::BAD_GATEWAY, ErrorKind::Provider),
        PipelineError::StorageFailed(_) => {
            error!(error = %err, "storing source failed");
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Infra)
        }
        PipelineError::EngineInvocationFailed { .. } => {
            error!(error = %err, "engine invocation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Infra)
        }
    };
    error_body(status, kind, err.code().to_string(), err.to_string(), err.step())
}

pub fn internal_error(message: impl Into<String>) -> ApiObject<Value> {
    let detail = message.into();
    error!(detail = %detail, "internal api error");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Infra,
        "internal_error",
        "Internal server error",
    )
}

pub fn into_json(payload: impl Serialize) -> Json<Value> {
    Json(serde_json::to_value(payload).unwrap_or(Value::Null))
}

fn error_body(
    status: StatusCode,
    kind: ErrorKind,
    code: String,
    message: String,
    step: Option<usize>,
) -> ApiObject<Value> {
    (
        status,
        into_json(ErrorResponse {
            ok: false,
            success: false,
            error: message,
            error_kind: kind,
            error_code: code,
            error_step: step,
        }),
    )
}
