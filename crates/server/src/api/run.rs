//! Run control API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::sync::Arc;

use atelier_core::{ConcurrencyMode, EngineError, RunSnapshot, StartRequest};

use super::handlers::{ErrorResponse, MessageResponse};
use crate::state::AppState;

/// Start request body. Unset knobs fall back to the configured defaults.
#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub prompts: Vec<String>,
    #[serde(default)]
    pub mode: Option<ConcurrencyMode>,
    #[serde(default)]
    pub cap: Option<usize>,
    #[serde(default)]
    pub output_folder: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StopRunRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

fn engine_error_response(error: EngineError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match error {
        EngineError::AlreadyRunning | EngineError::NotRunning => StatusCode::CONFLICT,
        EngineError::EmptyInput | EngineError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        EngineError::Closed => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRunRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let defaults = &state.config().engine;
    let request = StartRequest {
        prompts: request.prompts,
        mode: request.mode.unwrap_or(ConcurrencyMode::Capped),
        cap: request.cap.unwrap_or(defaults.default_cap),
        output_folder: request
            .output_folder
            .unwrap_or_else(|| defaults.default_output_folder.clone()),
    };
    let total = request.prompts.len();

    state
        .engine()
        .start(request)
        .await
        .map_err(engine_error_response)?;

    Ok(Json(MessageResponse {
        message: format!("Run started with {} items", total),
    }))
}

pub async fn pause_run(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    state.engine().pause().await.map_err(engine_error_response)?;
    Ok(Json(MessageResponse {
        message: "Run paused".to_string(),
    }))
}

pub async fn resume_run(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine()
        .resume()
        .await
        .map_err(engine_error_response)?;
    Ok(Json(MessageResponse {
        message: "Run resumed".to_string(),
    }))
}

pub async fn stop_run(
    State(state): State<Arc<AppState>>,
    request: Option<Json<StopRunRequest>>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let reason = request
        .and_then(|Json(body)| body.reason)
        .unwrap_or_else(|| "operator request".to_string());

    state
        .engine()
        .stop(reason)
        .await
        .map_err(engine_error_response)?;

    Ok(Json(MessageResponse {
        message: "Run stopped".to_string(),
    }))
}

pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RunSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine()
        .snapshot()
        .await
        .map(Json)
        .map_err(engine_error_response)
}
