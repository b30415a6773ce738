//! Prompt options API handlers.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use atelier_core::{OptionsError, PromptOptions};

use super::handlers::ErrorResponse;
use crate::state::AppState;

fn options_error_response(error: OptionsError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

pub async fn get_options(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PromptOptions>, (StatusCode, Json<ErrorResponse>)> {
    state
        .options_store()
        .load()
        .map(Json)
        .map_err(options_error_response)
}

/// Persist new options. They take effect at the next run start.
pub async fn put_options(
    State(state): State<Arc<AppState>>,
    Json(options): Json<PromptOptions>,
) -> Result<Json<PromptOptions>, (StatusCode, Json<ErrorResponse>)> {
    state
        .options_store()
        .save(&options)
        .map_err(options_error_response)?;
    Ok(Json(options))
}
