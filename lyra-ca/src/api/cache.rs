//! Cache control endpoints
//!
//! POST /cache/invalidate, POST /cache/clear, POST /cache/purge,
//! GET /cache/stats

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::cache::{CacheKey, CacheStats, CorpusQuery};
use crate::error::{ApiError, ApiResult};
use crate::models::CorpusFilter;
use crate::AppState;

/// POST /cache/invalidate request
///
/// Either a literal `key` or a `corpus_type` with an optional `filter`.
#[derive(Debug, Default, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub corpus_type: Option<String>,
    #[serde(default)]
    pub filter: CorpusFilter,
}

impl InvalidateRequest {
    pub fn cache_key(&self) -> ApiResult<CacheKey> {
        match (&self.key, &self.corpus_type) {
            (Some(key), None) => Ok(CacheKey::from_str(key)?),
            (None, Some(corpus_type)) => {
                Ok(CorpusQuery::new(corpus_type.clone(), self.filter.clone()).key())
            }
            (Some(_), Some(_)) => Err(ApiError::BadRequest(
                "Provide either key or corpus_type, not both".to_string(),
            )),
            (None, None) => Err(ApiError::BadRequest(
                "Missing key or corpus_type".to_string(),
            )),
        }
    }
}

/// POST /cache/invalidate response
#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub key: String,
}

/// POST /cache/purge response
#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub durable_rows_deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
}

/// POST /cache/invalidate
pub async fn invalidate(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> ApiResult<Json<InvalidateResponse>> {
    let key = request.cache_key()?;
    state.cache.invalidate(&key).await;
    Ok(Json(InvalidateResponse {
        key: key.to_string(),
    }))
}

/// POST /cache/clear
pub async fn clear(State(state): State<AppState>) -> Json<ClearResponse> {
    state.cache.clear().await;
    Json(ClearResponse { cleared: true })
}

/// POST /cache/purge
pub async fn purge(State(state): State<AppState>) -> ApiResult<Json<PurgeResponse>> {
    let durable_rows_deleted = state.cache.purge_expired().await?;
    Ok(Json(PurgeResponse {
        durable_rows_deleted,
    }))
}

/// GET /cache/stats
pub async fn stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats().await)
}

pub fn cache_routes() -> Router<AppState> {
    Router::new()
        .route("/cache/invalidate", post(invalidate))
        .route("/cache/clear", post(clear))
        .route("/cache/purge", post(purge))
        .route("/cache/stats", get(stats))
}
