use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ErrorKind;
use crate::api::handler_utils::{
    error_response, internal_error, into_json, map_pipeline_error, ApiObject,
};
use crate::api::server::AppState;
use crate::pipeline::acquire::{Provenance, StoredSource};
use crate::storage::StorageLayout;

/// Multipart field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "image";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadUrlRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    filename: String,
    original_name: String,
    path: String,
    size: u64,
    source: Provenance,
}

/// Accepts either a multipart `image` file or a JSON `{url}` to download.
/// Both land in the uploads area under a generated name.
pub async fn upload_handler(State(state): State<AppState>, request: Request) -> ApiObject<Value> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        match Multipart::from_request(request, &state).await {
            Ok(multipart) => upload_file(&state, multipart).await,
            Err(rejection) => invalid_upload(rejection.body_text()),
        }
    } else {
        let payload: Result<Json<UploadUrlRequest>, JsonRejection> =
            Json::from_request(request, &state).await;
        match payload {
            Ok(Json(body)) => upload_url(&state, body).await,
            Err(rejection) => invalid_upload(format!(
                "invalid request body: {}",
                rejection.body_text()
            )),
        }
    }
}

async fn upload_url(state: &AppState, body: UploadUrlRequest) -> ApiObject<Value> {
    let Some(url) = body
        .url
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    else {
        return invalid_upload(format!(
            "send a multipart '{UPLOAD_FIELD}' file or a JSON body with 'url'"
        ));
    };
    match state.service.resolver().import_remote(&url).await {
        Ok(stored) => stored_response(stored),
        Err(err) => map_pipeline_error(err),
    }
}

async fn upload_file(state: &AppState, mut multipart: Multipart) -> ApiObject<Value> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return invalid_upload(err.body_text()),
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return invalid_upload(err.body_text()),
        };

        let resolver = state.service.resolver().clone();
        let stored =
            tokio::task::spawn_blocking(move || resolver.store_upload(&original_name, &bytes))
                .await;
        return match stored {
            Ok(Ok(stored)) => stored_response(stored),
            Ok(Err(err)) => map_pipeline_error(err),
            Err(join_error) => internal_error(format!("upload task failed: {join_error}")),
        };
    }
    invalid_upload(format!("no file uploaded in the '{UPLOAD_FIELD}' field"))
}

fn stored_response(stored: StoredSource) -> ApiObject<Value> {
    (
        StatusCode::OK,
        into_json(UploadResponse {
            success: true,
            path: StorageLayout::upload_url(&stored.filename),
            filename: stored.filename,
            original_name: stored.original_name,
            size: stored.size,
            source: stored.provenance,
        }),
    )
}

fn invalid_upload(message: impl Into<String>) -> ApiObject<Value> {
    error_response(
        StatusCode::BAD_REQUEST,
        ErrorKind::Validation,
        "invalid_request",
        message,
    )
}
