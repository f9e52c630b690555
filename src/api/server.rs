use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handler_utils::{internal_error, into_json};
use crate::api::process::{info_handler, operations_handler, process_handler};
use crate::api::upload::upload_handler;
use crate::config::ServiceConfig;
use crate::pipeline::acquire::{HttpRemoteFetcher, ResourceResolver, MAX_SOURCE_BYTES};
use crate::pipeline::aliases::AliasTable;
use crate::pipeline::engine::{default_magick_engine, EngineStatus};
use crate::pipeline::service::ImageProcessService;
use crate::storage::StorageLayout;

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub started_unix_ms: u128,
    pub service: ImageProcessService,
}

impl AppState {
    pub fn new(service: ImageProcessService) -> Self {
        Self {
            service_name: "image-chain-backend",
            service_version: env!("CARGO_PKG_VERSION"),
            started_unix_ms: now_unix_ms(),
            service,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EngineStatusResponse {
    success: bool,
    #[serde(flatten)]
    status: EngineStatus,
}

/// Production wiring: ImageMagick engine plus HTTP fetcher.
pub fn build_service(config: &ServiceConfig) -> ImageProcessService {
    let layout = StorageLayout::from_config(config);
    let resolver = ResourceResolver::new(
        layout.uploads_dir.clone(),
        Arc::new(HttpRemoteFetcher::new(config.fetch_timeout)),
    );
    ImageProcessService::new(
        resolver,
        Arc::new(default_magick_engine(&config.magick_binary)),
        Arc::new(AliasTable::builtin()),
        layout.output_dir.clone(),
        config.output_prefix.clone(),
    )
}

pub fn build_router(config: &ServiceConfig) -> Router {
    build_router_with_service(build_service(config), StorageLayout::from_config(config))
}

pub fn build_router_with_service(service: ImageProcessService, layout: StorageLayout) -> Router {
    let upload_limit = usize::try_from(MAX_SOURCE_BYTES).unwrap_or(usize::MAX);
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/imagemagick-status", get(engine_status_handler))
        .route("/api/operations", get(operations_handler))
        .route(
            "/api/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/process", post(process_handler))
        .route("/api/info", post(info_handler))
        .nest_service("/uploads", ServeDir::new(layout.uploads_dir))
        .nest_service("/output", ServeDir::new(layout.output_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(service))
}

pub async fn serve(config: ServiceConfig) -> std::io::Result<()> {
    let layout = StorageLayout::from_config(&config);
    layout.ensure_dirs()?;
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let app = build_router(&config);
    info!(
        bind = %config.bind,
        uploads = %layout.uploads_dir.display(),
        output = %layout.output_dir.display(),
        "starting image-chain-backend HTTP surface"
    );
    axum::serve(listener, app).await
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let service = state.service.clone();
    let engine = match tokio::task::spawn_blocking(move || service.engine_status()).await {
        Ok(status) => status,
        Err(join_error) => return internal_error(format!("health probe failed: {join_error}")),
    };
    let status = if engine.installed {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(json!({
            "ok": engine.installed,
            "status": if engine.installed { "healthy" } else { "unhealthy" },
            "service": state.service_name,
            "version": state.service_version,
            "started_unix_ms": state.started_unix_ms,
            "imagemagick": engine,
        })),
    )
}

async fn engine_status_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let service = state.service.clone();
    match tokio::task::spawn_blocking(move || service.engine_status()).await {
        Ok(status) => (
            StatusCode::OK,
            into_json(EngineStatusResponse {
                success: true,
                status,
            }),
        ),
        Err(join_error) => internal_error(format!("engine probe failed: {join_error}")),
    }
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}
