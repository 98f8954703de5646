//! Run aggregate
//!
//! Accepted results from every chunk in scheduling order, plus one outcome
//! record per chunk so callers can see what was covered and re-run the gaps.

use super::client::ValidatedBatch;
use super::AnnotateError;
use crate::models::{AnnotationChunk, AnnotationResult};
use lyra_common::events::RunSummaryInfo;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Succeeded,
    /// Attempts exhausted or permanent error; contributes no results
    Failed,
    /// Run cancelled while this chunk was backing off
    Cancelled,
}

/// Per-chunk log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOutcome {
    pub index: usize,
    /// Words in the chunk
    pub size: usize,
    pub attempts: u32,
    pub status: ChunkStatus,
    pub accepted: usize,
    pub discarded: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationAggregate {
    pub total_words: usize,
    pub total_chunks: usize,
    pub results: Vec<AnnotationResult>,
    pub chunks: Vec<ChunkOutcome>,
    /// Words of chunks that produced no results
    pub uncovered: Vec<String>,
    pub cancelled: bool,
}

impl AnnotationAggregate {
    pub fn new(total_words: usize, total_chunks: usize) -> Self {
        Self {
            total_words,
            total_chunks,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, chunk: &AnnotationChunk, attempts: u32, batch: ValidatedBatch) {
        self.chunks.push(ChunkOutcome {
            index: chunk.index,
            size: chunk.len(),
            attempts,
            status: ChunkStatus::Succeeded,
            accepted: batch.accepted.len(),
            discarded: batch.discarded,
            error: None,
        });
        self.results.extend(batch.accepted);
    }

    pub fn record_failure(&mut self, chunk: &AnnotationChunk, attempts: u32, error: &AnnotateError, cancelled: bool) -> &ChunkOutcome {
        self.uncovered.extend(chunk.words.iter().cloned());
        self.chunks.push(ChunkOutcome {
            index: chunk.index,
            size: chunk.len(),
            attempts,
            status: if cancelled {
                ChunkStatus::Cancelled
            } else {
                ChunkStatus::Failed
            },
            accepted: 0,
            discarded: 0,
            error: Some(error.to_string()),
        });
        &self.chunks[self.chunks.len() - 1]
    }

    /// Words handed to the service by chunks that ran to an outcome
    ///
    /// Equals `total_words` for any run that was not cancelled, failed
    /// chunks included.
    pub fn processed_words(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.status != ChunkStatus::Cancelled)
            .map(|c| c.size)
            .sum()
    }

    pub fn accepted_count(&self) -> usize {
        self.results.len()
    }

    pub fn discarded_count(&self) -> usize {
        self.chunks.iter().map(|c| c.discarded).sum()
    }

    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.chunks
            .iter()
            .filter(|c| c.status != ChunkStatus::Succeeded)
    }

    /// Outcome for chunk `index`
    pub fn chunk(&self, index: usize) -> Option<&ChunkOutcome> {
        self.chunks.iter().find(|c| c.index == index)
    }

    /// Accepted annotations per domain code
    pub fn domain_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.domain_code.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn distinct_domains(&self) -> usize {
        self.results
            .iter()
            .map(|r| r.domain_code.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Share of input words inside succeeded chunks (0.0-100.0)
    pub fn completeness_percentage(&self) -> f64 {
        if self.total_words == 0 {
            return 0.0;
        }
        let covered: usize = self
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Succeeded)
            .map(|c| c.size)
            .sum();
        covered as f64 / self.total_words as f64 * 100.0
    }

    /// Share of distinct annotated words among input words (0.0-100.0)
    pub fn coverage_percentage(&self) -> f64 {
        if self.total_words == 0 {
            return 0.0;
        }
        let annotated: HashSet<&str> = self.results.iter().map(|r| r.word.as_str()).collect();
        (annotated.len() as f64 / self.total_words as f64 * 100.0).min(100.0)
    }

    /// Words to resubmit: everything in failed or cancelled chunks
    pub fn uncovered_words(&self) -> &[String] {
        &self.uncovered
    }

    pub fn summary(&self) -> RunSummaryInfo {
        RunSummaryInfo {
            total_words: self.total_words,
            processed_words: self.processed_words(),
            accepted_annotations: self.accepted_count(),
            discarded_entries: self.discarded_count(),
            failed_chunks: self.failed_chunks().count(),
            total_chunks: self.total_chunks,
            distinct_domains: self.distinct_domains(),
            completeness_percentage: self.completeness_percentage(),
        }
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}/{} words in completed chunks ({:.1}%), {} annotations across {} domains, {} failed chunks",
            self.processed_words(),
            self.total_words,
            self.completeness_percentage(),
            self.accepted_count(),
            self.distinct_domains(),
            self.failed_chunks().count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, words: &[&str]) -> AnnotationChunk {
        AnnotationChunk {
            index,
            words: words.iter().map(|w| w.to_string()).collect(),
        }
    }

    fn result(word: &str, code: &str) -> AnnotationResult {
        AnnotationResult {
            word: word.to_string(),
            domain_code: code.to_string(),
            label: code.to_string(),
            confidence: 0.5,
            color_hint: "#000000".to_string(),
        }
    }

    fn sample() -> AnnotationAggregate {
        let mut aggregate = AnnotationAggregate::new(4, 2);
        aggregate.record_success(
            &chunk(0, &["pampa", "rancho"]),
            1,
            ValidatedBatch {
                accepted: vec![result("pampa", "W3"), result("rancho", "H1"), result("pampa", "M7")],
                discarded: 1,
            },
        );
        aggregate.record_failure(
            &chunk(1, &["noche", "luna"]),
            3,
            &AnnotateError::ServiceFailure("quota exceeded".to_string()),
            false,
        );
        aggregate
    }

    #[test]
    fn test_failed_chunk_still_counts_as_processed() {
        let aggregate = sample();
        assert_eq!(aggregate.processed_words(), 4);
        assert_eq!(aggregate.accepted_count(), 3);
        assert_eq!(aggregate.discarded_count(), 1);
        assert_eq!(aggregate.completeness_percentage(), 50.0);
        assert_eq!(aggregate.coverage_percentage(), 50.0);
    }

    #[test]
    fn test_uncovered_words_come_from_failed_chunks() {
        let aggregate = sample();
        assert_eq!(aggregate.uncovered_words(), ["noche", "luna"]);
        assert_eq!(aggregate.chunk(1).unwrap().attempts, 3);
        assert_eq!(aggregate.chunk(1).unwrap().status, ChunkStatus::Failed);
    }

    #[test]
    fn test_domain_statistics() {
        let aggregate = sample();
        assert_eq!(aggregate.distinct_domains(), 3);
        assert_eq!(aggregate.domain_counts().get("W3"), Some(&1));

        let summary = aggregate.summary();
        assert_eq!(summary.failed_chunks, 1);
        assert_eq!(summary.distinct_domains, 3);
        assert_eq!(summary.processed_words, 4);
    }

    #[test]
    fn test_cancelled_chunk_not_processed() {
        let mut aggregate = AnnotationAggregate::new(2, 1);
        aggregate.record_failure(
            &chunk(0, &["a", "b"]),
            1,
            &AnnotateError::Transport("reset".to_string()),
            true,
        );
        assert_eq!(aggregate.processed_words(), 0);
        assert_eq!(aggregate.chunks[0].status, ChunkStatus::Cancelled);
    }
}
