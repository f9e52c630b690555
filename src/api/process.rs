use std::fs;
use std::path::Path;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use image::ImageReader;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ErrorKind;
use crate::api::handler_utils::{
    error_response, internal_error, into_json, map_pipeline_error, ApiObject,
};
use crate::api::server::AppState;
use crate::pipeline::acquire::Provenance;
use crate::pipeline::engine::FILTER_VARIANTS;
use crate::pipeline::service::ProcessRequest;
use crate::pipeline::OperationFamily;
use crate::storage::StorageLayout;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessResponse {
    success: bool,
    output_file: String,
    path: String,
    commands: Vec<String>,
    source: Provenance,
    original_filename: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoRequest {
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ImageInfo {
    filename: String,
    width: u32,
    height: u32,
    format: String,
    size: u64,
}

#[derive(Debug, Clone, Serialize)]
struct InfoResponse {
    success: bool,
    info: ImageInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct OperationsCatalog {
    success: bool,
    base_operations: Vec<&'static str>,
    effect_types: Vec<String>,
    filter_types: Vec<String>,
    aliases: Vec<String>,
    rejected_types: Vec<&'static str>,
}

pub async fn process_handler(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> ApiObject<Value> {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_body(rejection),
    };

    match state.service.process(request).await {
        Ok(outcome) => (
            StatusCode::OK,
            into_json(ProcessResponse {
                success: true,
                path: StorageLayout::output_url(&outcome.output_file),
                output_file: outcome.output_file,
                commands: outcome.commands,
                source: outcome.source,
                original_filename: outcome.original_filename,
            }),
        ),
        Err(err) => map_pipeline_error(err),
    }
}

pub async fn info_handler(
    State(state): State<AppState>,
    payload: Result<Json<InfoRequest>, JsonRejection>,
) -> ApiObject<Value> {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_body(rejection),
    };
    let Some(filename) = request
        .filename
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "invalid_request",
            "filename is required",
        );
    };

    let path = match state.service.resolver().local(&filename) {
        Ok(path) => path,
        Err(err) => return map_pipeline_error(err),
    };

    let probe = tokio::task::spawn_blocking(move || probe_image(&path, filename)).await;
    match probe {
        Ok(Ok(info)) => (
            StatusCode::OK,
            into_json(InfoResponse {
                success: true,
                info,
            }),
        ),
        Ok(Err(message)) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Validation,
            "unreadable_image",
            message,
        ),
        Err(join_error) => internal_error(format!("image probe task failed: {join_error}")),
    }
}

pub async fn operations_handler(State(state): State<AppState>) -> ApiObject<Value> {
    let aliases = state.service.aliases();
    let effect_types = aliases
        .iter()
        .filter(|(_, entry)| entry.family == OperationFamily::Effect)
        .map(|(name, _)| format!("effects-{name}"))
        .collect();
    (
        StatusCode::OK,
        into_json(OperationsCatalog {
            success: true,
            base_operations: OperationFamily::BASE.iter().map(|f| f.as_str()).collect(),
            effect_types,
            filter_types: FILTER_VARIANTS.iter().map(|v| format!("filter-{v}")).collect(),
            aliases: aliases.names().map(str::to_string).collect(),
            rejected_types: vec!["filter", "effects"],
        }),
    )
}

fn probe_image(path: &Path, filename: String) -> Result<ImageInfo, String> {
    let size = fs::metadata(path).map_err(|e| e.to_string())?.len();
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| e.to_string())?;
    let format = reader
        .format()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("unknown")
        .to_string();
    let (width, height) = reader.into_dimensions().map_err(|e| e.to_string())?;
    Ok(ImageInfo {
        filename,
        width,
        height,
        format,
        size,
    })
}

fn invalid_body(rejection: JsonRejection) -> ApiObject<Value> {
    error_response(
        StatusCode::BAD_REQUEST,
        ErrorKind::Validation,
        "invalid_request",
        format!("invalid request body: {}", rejection.body_text()),
    )
}
