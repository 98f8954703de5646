//! Annotation run endpoints
//!
//! POST /annotate starts a background run; GET polls it; DELETE cancels it.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::annotate::{AnnotationAggregate, PipelineError, RunState, RunStatus};
use crate::cache::CorpusQuery;
use crate::error::{ApiError, ApiResult};
use crate::models::CorpusFilter;
use crate::AppState;

/// POST /annotate request
///
/// Words come either from `words` or from the vocabulary of a cached corpus.
#[derive(Debug, Default, Deserialize)]
pub struct StartAnnotationRequest {
    #[serde(default)]
    pub words: Option<Vec<String>>,
    #[serde(default)]
    pub corpus_type: Option<String>,
    #[serde(default)]
    pub filter: CorpusFilter,
    /// Free-text hint forwarded to the classification service
    #[serde(default)]
    pub context: Option<String>,
}

async fn resolve_words(state: &AppState, request: &StartAnnotationRequest) -> ApiResult<Vec<String>> {
    match (&request.words, &request.corpus_type) {
        (Some(words), None) => Ok(words
            .iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect()),
        (None, Some(corpus_type)) => {
            let query = CorpusQuery::new(corpus_type.clone(), request.filter.clone());
            let entry = state.cache.get(&query).await?;
            Ok(entry.corpus.vocabulary())
        }
        (Some(_), Some(_)) => Err(ApiError::BadRequest(
            "Provide either words or corpus_type, not both".to_string(),
        )),
        (None, None) => Err(ApiError::BadRequest(
            "Missing words or corpus_type".to_string(),
        )),
    }
}

/// POST /annotate
///
/// Returns 202 Accepted with the new run's status.
pub async fn start_annotation(
    State(state): State<AppState>,
    Json(request): Json<StartAnnotationRequest>,
) -> ApiResult<(StatusCode, Json<RunStatus>)> {
    let pipeline = state.pipeline(request.context.clone()).ok_or_else(|| {
        ApiError::ServiceUnavailable("Annotation service endpoint not configured".to_string())
    })?;

    let words = resolve_words(&state, &request).await?;
    if words.is_empty() {
        return Err(PipelineError::EmptyInput.into());
    }

    let status = state.runs.start(pipeline, words, state.event_bus.clone());
    tracing::info!(run_id = %status.run_id, words = status.total_words, "Annotation run accepted");

    Ok((StatusCode::ACCEPTED, Json(status)))
}

/// GET /annotate
pub async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunStatus>> {
    Json(state.runs.list())
}

/// GET /annotate/{run_id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunStatus>> {
    state
        .runs
        .status(run_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Annotation run not found: {}", run_id)))
}

/// GET /annotate/{run_id}/results
///
/// Full aggregate; 409 while the run is still going.
pub async fn get_run_results(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<AnnotationAggregate>> {
    let status = state
        .runs
        .status(run_id)
        .ok_or_else(|| ApiError::NotFound(format!("Annotation run not found: {}", run_id)))?;

    state
        .runs
        .aggregate(run_id)
        .map(|aggregate| Json(AnnotationAggregate::clone(&aggregate)))
        .ok_or_else(|| ApiError::Conflict(format!("Annotation run is {:?}", status.state)))
}

/// DELETE /annotate/{run_id}
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<RunStatus>)> {
    match state.runs.cancel(run_id) {
        None => Err(ApiError::NotFound(format!("Annotation run not found: {}", run_id))),
        Some(RunState::Running) => {
            let status = state
                .runs
                .status(run_id)
                .ok_or_else(|| ApiError::Internal(format!("Annotation run vanished: {}", run_id)))?;
            Ok((StatusCode::ACCEPTED, Json(status)))
        }
        Some(terminal) => Err(ApiError::Conflict(format!(
            "Annotation run already finished: {:?}",
            terminal
        ))),
    }
}

pub fn annotation_routes() -> Router<AppState> {
    Router::new()
        .route("/annotate", get(list_runs).post(start_annotation))
        .route("/annotate/:run_id", get(get_run).delete(cancel_run))
        .route("/annotate/:run_id/results", get(get_run_results))
}
