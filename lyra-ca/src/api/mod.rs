//! HTTP API handlers for lyra-ca
//!
//! REST endpoints for corpus retrieval, cache control and annotation runs,
//! plus an SSE stream of service events.

pub mod annotation;
pub mod cache;
pub mod corpus;
pub mod health;
pub mod sse;

pub use annotation::annotation_routes;
pub use cache::cache_routes;
pub use corpus::corpus_routes;
pub use health::health_routes;
pub use sse::event_routes;
