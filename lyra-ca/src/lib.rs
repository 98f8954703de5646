//! lyra-ca library interface
//!
//! Corpus acquisition (tiered cache over remote corpus sources) and
//! annotation (chunked calls to a semantic classification service).

pub mod annotate;
pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use crate::error::{ApiError, ApiResult};

use annotate::{
    AnnotationPipeline, AnnotationPipelineConfig, ClassificationService, RemoteAnnotator,
    RunRegistry,
};
use axum::Router;
use cache::TieredCache;
use chrono::{DateTime, Utc};
use lyra_common::config::PipelineConfig;
use lyra_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Corpus cache
    pub cache: Arc<TieredCache>,
    /// Classification service; `None` when no endpoint is configured
    pub classifier: Option<Arc<dyn ClassificationService>>,
    /// Tuning for runs started through the API
    pub pipeline_config: PipelineConfig,
    /// Annotation runs started by this process
    pub runs: Arc<RunRegistry>,
    /// Event bus for SSE broadcasting and cache invalidation
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, cache: Arc<TieredCache>, event_bus: EventBus) -> Self {
        Self {
            db,
            cache,
            classifier: None,
            pipeline_config: PipelineConfig::default(),
            runs: Arc::new(RunRegistry::new()),
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_classifier(
        mut self,
        classifier: Arc<dyn ClassificationService>,
        pipeline_config: PipelineConfig,
    ) -> Self {
        self.classifier = Some(classifier);
        self.runs = Arc::new(RunRegistry::with_retention(pipeline_config.retained_runs));
        self.pipeline_config = pipeline_config;
        self
    }

    /// Pipeline for one run, or `None` without a classifier
    pub fn pipeline(&self, context: Option<String>) -> Option<AnnotationPipeline> {
        let classifier = self.classifier.clone()?;
        let annotator = RemoteAnnotator::new(classifier)
            .with_context(context)
            .with_malformed_warn_ratio(self.pipeline_config.malformed_warn_ratio);
        Some(AnnotationPipeline::new(
            annotator,
            AnnotationPipelineConfig::from(&self.pipeline_config),
        ))
    }

    /// Remember `message` for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::corpus_routes())
        .merge(api::cache_routes())
        .merge(api::annotation_routes())
        .merge(api::event_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
        .with_state(state)
}
