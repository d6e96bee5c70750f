//! HTTP endpoint handlers. These are thin wrappers that forward to the generation logic.
//! Failures come back as 500 with an `{error}` body; title suggestions never fail.

use std::sync::Arc;
use axum::{extract::State, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument, warn};

use crate::generation::{generate_worksheet, regenerate_problem, suggest_titles};
use crate::protocol::*;
use crate::state::AppState;

fn error_response(message: String) -> (StatusCode, Json<ErrorOut>) {
  (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorOut { error: message }))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(%body.subject, theme_len = body.theme.len()))]
pub async fn http_suggest_title(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SuggestTitleIn>,
) -> impl IntoResponse {
  let out = suggest_titles(&state, &body).await;
  info!(target: "generation", titles = out.titles.len(), "HTTP suggest-title served");
  Json(out)
}

#[instrument(level = "info", skip(state, body), fields(%body.subject, count = body.count))]
pub async fn http_generate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Result<Json<GeneratedWorksheet>, (StatusCode, Json<ErrorOut>)> {
  match generate_worksheet(&state, &body).await {
    Ok(sheet) => Ok(Json(sheet)),
    Err(e) => {
      warn!(target: "generation", error = %e, "HTTP generate failed");
      Err(error_response(e.generate_message()))
    }
  }
}

#[instrument(level = "info", skip(state, body), fields(problem_number = body.problem_number))]
pub async fn http_regenerate_one(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RegenerateOneIn>,
) -> Result<Json<crate::domain::Problem>, (StatusCode, Json<ErrorOut>)> {
  regenerate_problem(&state, &body).await.map(Json).map_err(|e| {
    warn!(target: "generation", error = %e, "HTTP regenerate-one failed");
    error_response(e.regenerate_message())
  })
}
