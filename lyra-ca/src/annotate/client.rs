//! Semantic classification service client
//!
//! Wire format:
//! - request `{"words": [...], "context": "..."}`
//! - response `{"success": bool?, "annotations": [{word, domainCode,
//!   domainLabel, confidence, color?}], "error": string?}`
//!
//! Responses are decoded through typed structs. A bad envelope fails the
//! whole call; a bad entry is dropped and counted.

use super::AnnotateError;
use crate::models::{color_for_domain, AnnotationChunk, AnnotationResult};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Request body for one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRequest {
    pub words: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Transport to the classification service
///
/// Returns the raw JSON payload, `None` when the service answered with no body.
#[async_trait]
pub trait ClassificationService: Send + Sync {
    async fn classify(&self, request: &AnnotationRequest) -> Result<Option<Value>, AnnotateError>;
}

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP classification service with a client-side request budget
pub struct HttpClassificationService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    rate_limiter: DirectRateLimiter,
}

impl HttpClassificationService {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, AnnotateError> {
        let client = reqwest::Client::builder()
            .user_agent(lyra_common::config::get_user_agent())
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AnnotateError::Transport(e.to_string()))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            rate_limiter,
        })
    }
}

#[async_trait]
impl ClassificationService for HttpClassificationService {
    async fn classify(&self, request: &AnnotationRequest) -> Result<Option<Value>, AnnotateError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(endpoint = %self.endpoint, words = request.words.len(), "Calling classification service");

        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AnnotateError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(AnnotateError::RateLimited(body));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AnnotateError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnnotateError::Status(status.as_u16(), body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnnotateError::Transport(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| AnnotateError::MalformedResults(format!("invalid JSON: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    annotations: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAnnotation {
    #[serde(default)]
    word: Option<String>,
    #[serde(default)]
    domain_code: Option<String>,
    #[serde(default)]
    domain_label: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    color: Option<String>,
}

fn is_hex_color(value: &str) -> bool {
    let Some(hex) = value.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

impl WireAnnotation {
    /// Accepted only with a non-empty word and domain code
    fn into_result(self) -> Option<AnnotationResult> {
        let word = self.word?.trim().to_lowercase();
        let domain_code = self.domain_code?.trim().to_string();
        if word.is_empty() || domain_code.is_empty() {
            return None;
        }

        let label = self
            .domain_label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| domain_code.clone());
        let confidence = self
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.0);
        let color_hint = self
            .color
            .filter(|c| is_hex_color(c))
            .unwrap_or_else(|| color_for_domain(&domain_code).to_string());

        Some(AnnotationResult {
            word,
            domain_code,
            label,
            confidence,
            color_hint,
        })
    }
}

/// Accepted results of one call plus the count of dropped entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedBatch {
    pub accepted: Vec<AnnotationResult>,
    pub discarded: usize,
}

/// Decode and validate a response payload
pub fn validate_response(payload: Value) -> Result<ValidatedBatch, AnnotateError> {
    if payload.is_null() {
        return Err(AnnotateError::EmptyResponse);
    }

    let response: WireResponse = serde_json::from_value(payload)
        .map_err(|e| AnnotateError::MalformedResults(format!("unexpected response shape: {}", e)))?;

    if response.success == Some(false) {
        return Err(AnnotateError::ServiceFailure(
            response
                .error
                .unwrap_or_else(|| "service reported failure".to_string()),
        ));
    }

    let entries = match response.annotations {
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(AnnotateError::MalformedResults(
                "annotations is not a list".to_string(),
            ))
        }
        None => {
            return Err(AnnotateError::MalformedResults(
                "missing annotations".to_string(),
            ))
        }
    };

    let mut batch = ValidatedBatch::default();
    for entry in entries {
        match serde_json::from_value::<WireAnnotation>(entry)
            .ok()
            .and_then(WireAnnotation::into_result)
        {
            Some(result) => batch.accepted.push(result),
            None => batch.discarded += 1,
        }
    }
    Ok(batch)
}

/// Validating wrapper around a [`ClassificationService`]
#[derive(Clone)]
pub struct RemoteAnnotator {
    service: Arc<dyn ClassificationService>,
    context: Option<String>,
    malformed_warn_ratio: f64,
}

impl RemoteAnnotator {
    pub fn new(service: Arc<dyn ClassificationService>) -> Self {
        Self {
            service,
            context: None,
            malformed_warn_ratio: 0.1,
        }
    }

    /// Free-text context sent with every chunk
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_malformed_warn_ratio(mut self, ratio: f64) -> Self {
        self.malformed_warn_ratio = ratio;
        self
    }

    /// Annotate one chunk
    pub async fn call(&self, chunk: &AnnotationChunk) -> Result<ValidatedBatch, AnnotateError> {
        let request = AnnotationRequest {
            words: chunk.words.clone(),
            context: self.context.clone(),
        };

        let payload = self
            .service
            .classify(&request)
            .await?
            .ok_or(AnnotateError::EmptyResponse)?;
        let batch = validate_response(payload)?;

        let total = batch.accepted.len() + batch.discarded;
        if total > 0 {
            let ratio = batch.discarded as f64 / total as f64;
            if ratio > self.malformed_warn_ratio {
                tracing::warn!(
                    chunk = chunk.index,
                    discarded = batch.discarded,
                    total,
                    "Annotation response contained malformed entries"
                );
            } else if batch.discarded > 0 {
                tracing::debug!(chunk = chunk.index, discarded = batch.discarded, "Dropped malformed annotation entries");
            }
        }

        Ok(batch)
    }
}
