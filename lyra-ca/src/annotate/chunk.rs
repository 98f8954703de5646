//! Chunk scheduling

use super::PipelineError;
use crate::models::AnnotationChunk;

/// Number of chunks `word_count` words split into
pub fn chunk_count(word_count: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    word_count.div_ceil(chunk_size)
}

/// Split `words` into order-preserving chunks of at most `chunk_size`
pub fn schedule_chunks(words: &[String], chunk_size: usize) -> Result<Vec<AnnotationChunk>, PipelineError> {
    if chunk_size == 0 {
        return Err(PipelineError::InvalidChunkSize(chunk_size));
    }
    if words.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    Ok(words
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, slice)| AnnotationChunk {
            index,
            words: slice.to_vec(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{}", i)).collect()
    }

    #[test]
    fn test_250_words_make_three_chunks() {
        let chunks = schedule_chunks(&words(250), 100).unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_concatenation_reproduces_input() {
        for (n, c) in [(1, 1), (7, 3), (99, 100), (100, 100), (101, 100), (1000, 7)] {
            let input = words(n);
            let chunks = schedule_chunks(&input, c).unwrap();

            assert_eq!(chunks.len(), chunk_count(n, c));
            assert!(chunks.iter().all(|chunk| chunk.len() <= c && !chunk.is_empty()));
            let joined: Vec<String> = chunks.into_iter().flat_map(|chunk| chunk.words).collect();
            assert_eq!(joined, input);
        }
    }

    #[test]
    fn test_duplicate_words_are_kept() {
        let input: Vec<String> = ["la", "la", "pampa"].iter().map(|s| s.to_string()).collect();
        let chunks = schedule_chunks(&input, 2).unwrap();
        assert_eq!(chunks[0].words, vec!["la", "la"]);
    }

    #[test]
    fn test_scheduling_errors() {
        assert_eq!(schedule_chunks(&[], 100), Err(PipelineError::EmptyInput));
        assert_eq!(schedule_chunks(&words(3), 0), Err(PipelineError::InvalidChunkSize(0)));
        assert_eq!(chunk_count(10, 0), 0);
    }
}
