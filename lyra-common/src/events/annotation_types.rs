//! Annotation run payloads carried by events

use serde::{Deserialize, Serialize};

/// Chunk that exhausted its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFailureInfo {
    /// 0-based chunk index
    pub chunk_index: usize,
    /// Words in the chunk
    pub chunk_size: usize,
    /// Attempts made before giving up
    pub attempts: u32,
    /// Last error message
    pub error: String,
}

/// Final (or partial) aggregate summary for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummaryInfo {
    /// Words submitted to the run
    pub total_words: usize,
    /// Words handed to the service (including failed chunks)
    pub processed_words: usize,
    /// Well-formed annotations kept
    pub accepted_annotations: usize,
    /// Malformed entries filtered out
    pub discarded_entries: usize,
    /// Chunks that exhausted retries
    pub failed_chunks: usize,
    /// Chunks in the run
    pub total_chunks: usize,
    /// Distinct domain codes among accepted annotations
    pub distinct_domains: usize,
    /// Share of words inside successful chunks (0.0-100.0)
    pub completeness_percentage: f64,
}
