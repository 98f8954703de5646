//! Corpus retrieval
//!
//! GET /corpus/{corpus_type} serves a corpus through the tiered cache.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheSource, CorpusQuery};
use crate::error::{ApiError, ApiResult};
use crate::models::{CorpusFilter, Document};
use crate::AppState;

/// GET /corpus/{corpus_type} query parameters
///
/// List parameters are comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct CorpusParams {
    #[serde(default)]
    pub artists: Option<String>,
    #[serde(default)]
    pub genres: Option<String>,
    #[serde(default)]
    pub year_from: Option<i32>,
    #[serde(default)]
    pub year_to: Option<i32>,
    /// Include full documents in the response
    #[serde(default)]
    pub include_documents: bool,
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl CorpusParams {
    pub fn filter(&self) -> ApiResult<CorpusFilter> {
        if let (Some(from), Some(to)) = (self.year_from, self.year_to) {
            if from > to {
                return Err(ApiError::BadRequest(format!(
                    "year_from ({}) is after year_to ({})",
                    from, to
                )));
            }
        }
        Ok(CorpusFilter {
            artists: split_list(self.artists.as_deref()),
            genres: split_list(self.genres.as_deref()),
            year_from: self.year_from,
            year_to: self.year_to,
        })
    }
}

/// GET /corpus/{corpus_type} response
#[derive(Debug, Serialize)]
pub struct CorpusResponse {
    pub key: String,
    pub source: CacheSource,
    pub loaded_at: DateTime<Utc>,
    pub corpus_type: String,
    pub total_documents: usize,
    pub total_words: usize,
    pub vocabulary_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Document>>,
}

/// GET /corpus/{corpus_type}
pub async fn get_corpus(
    State(state): State<AppState>,
    Path(corpus_type): Path<String>,
    Query(params): Query<CorpusParams>,
) -> ApiResult<Json<CorpusResponse>> {
    let query = CorpusQuery::new(corpus_type, params.filter()?);

    let entry = match state.cache.get(&query).await {
        Ok(entry) => entry,
        Err(e) => {
            state.record_error(e.to_string()).await;
            return Err(e.into());
        }
    };

    tracing::debug!(key = %entry.key, source = %entry.source, "Corpus request served");

    let corpus = &entry.corpus;
    Ok(Json(CorpusResponse {
        key: entry.key.to_string(),
        source: entry.source,
        loaded_at: entry.loaded_at,
        corpus_type: corpus.corpus_type.clone(),
        total_documents: corpus.total_documents,
        total_words: corpus.total_words,
        vocabulary_size: corpus.vocabulary().len(),
        documents: params.include_documents.then(|| corpus.documents.clone()),
    }))
}

pub fn corpus_routes() -> Router<AppState> {
    Router::new().route("/corpus/:corpus_type", get(get_corpus))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_split_comma_lists() {
        let params = CorpusParams {
            artists: Some("Cafrune, Larralde,,".to_string()),
            year_from: Some(1960),
            ..Default::default()
        };
        let filter = params.filter().unwrap();
        assert_eq!(filter.artists, vec!["Cafrune", "Larralde"]);
        assert!(filter.genres.is_empty());
        assert_eq!(filter.year_from, Some(1960));
    }

    #[test]
    fn test_inverted_year_range_rejected() {
        let params = CorpusParams {
            year_from: Some(1990),
            year_to: Some(1980),
            ..Default::default()
        };
        assert!(matches!(params.filter(), Err(ApiError::BadRequest(_))));
    }
}
