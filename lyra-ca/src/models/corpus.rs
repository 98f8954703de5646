//! Parsed corpus representation
//!
//! A corpus is a collection of song-lyric documents. Each document keeps its
//! raw text alongside the derived lines and word tokens so downstream
//! consumers never re-tokenize.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Song metadata attached to a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub artist: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

/// One song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub metadata: DocumentMetadata,
    pub raw_text: String,
    /// Trimmed, non-empty lyric lines
    pub lines: Vec<String>,
    /// Lowercase word tokens in text order
    pub words: Vec<String>,
}

impl Document {
    /// Build a document, deriving lines and words from `raw_text`
    pub fn from_lyrics(metadata: DocumentMetadata, raw_text: String) -> Self {
        let lines = raw_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        let words = tokenize(&raw_text);

        Self {
            metadata,
            raw_text,
            lines,
            words,
        }
    }
}

/// Parsed corpus
///
/// Invariant: `total_words == sum(document.words.len())` and
/// `total_documents == documents.len()`. Only [`Corpus::new`] builds values,
/// so the totals are always derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    pub corpus_type: String,
    pub total_documents: usize,
    pub total_words: usize,
    pub documents: Vec<Document>,
}

impl Corpus {
    pub fn new(corpus_type: impl Into<String>, documents: Vec<Document>) -> Self {
        let total_words = documents.iter().map(|d| d.words.len()).sum();
        Self {
            corpus_type: corpus_type.into(),
            total_documents: documents.len(),
            total_words,
            documents,
        }
    }

    /// True when the stored totals match the documents
    ///
    /// Deserialized payloads are checked with this before being trusted.
    pub fn is_consistent(&self) -> bool {
        self.total_documents == self.documents.len()
            && self.total_words == self.documents.iter().map(|d| d.words.len()).sum::<usize>()
    }

    /// Every token in document order
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.documents
            .iter()
            .flat_map(|d| d.words.iter().map(String::as_str))
    }

    /// Distinct words in first-occurrence order
    ///
    /// This is the word list fed to the annotation pipeline.
    pub fn vocabulary(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.words()
            .filter(|w| seen.insert(*w))
            .map(str::to_string)
            .collect()
    }
}

fn is_joiner(c: char) -> bool {
    matches!(c, '\'' | '\u{2019}' | '-')
}

/// Split text into lowercase alphabetic tokens
///
/// Apostrophes and hyphens are kept only between two letters
/// ("pa'l", "mate-amargo"); typographic apostrophes normalize to `'`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_alphabetic() {
            current.extend(c.to_lowercase());
        } else if is_joiner(c)
            && !current.is_empty()
            && chars.peek().is_some_and(|next| next.is_alphabetic())
        {
            current.push(if c == '-' { '-' } else { '\'' });
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(artist: &str, title: &str) -> DocumentMetadata {
        DocumentMetadata {
            artist: artist.to_string(),
            title: title.to_string(),
            year: None,
            genre: None,
            album: None,
        }
    }

    #[test]
    fn test_tokenize_lowercases_and_strips_punctuation() {
        assert_eq!(
            tokenize("Mi caballo, ¡MI PAMPA!"),
            vec!["mi", "caballo", "mi", "pampa"]
        );
    }

    #[test]
    fn test_tokenize_keeps_internal_joiners() {
        assert_eq!(tokenize("pa'l rancho"), vec!["pa'l", "rancho"]);
        assert_eq!(tokenize("pa\u{2019}l"), vec!["pa'l"]);
        assert_eq!(tokenize("mate-amargo"), vec!["mate-amargo"]);
    }

    #[test]
    fn test_tokenize_drops_dangling_joiners_and_digits() {
        assert_eq!(tokenize("'hola- 1980 chau'"), vec!["hola", "chau"]);
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_tokenize_keeps_accented_letters() {
        assert_eq!(tokenize("Canción del Ñandú"), vec!["canción", "del", "ñandú"]);
    }

    #[test]
    fn test_document_lines_skip_blank() {
        let doc = Document::from_lyrics(meta("A", "T"), "  Verso uno \n\n verso dos\n".to_string());
        assert_eq!(doc.lines, vec!["Verso uno", "verso dos"]);
        assert_eq!(doc.words, vec!["verso", "uno", "verso", "dos"]);
    }

    #[test]
    fn test_corpus_totals_match_documents() {
        let corpus = Corpus::new(
            "gaucho",
            vec![
                Document::from_lyrics(meta("A", "One"), "la pampa verde".to_string()),
                Document::from_lyrics(meta("B", "Two"), "el gaucho".to_string()),
            ],
        );

        assert_eq!(corpus.total_documents, 2);
        assert_eq!(corpus.total_words, 5);
        assert!(corpus.is_consistent());
    }

    #[test]
    fn test_tampered_totals_are_detected() {
        let mut corpus = Corpus::new(
            "gaucho",
            vec![Document::from_lyrics(meta("A", "One"), "la pampa".to_string())],
        );
        corpus.total_words = 7;
        assert!(!corpus.is_consistent());
    }

    #[test]
    fn test_vocabulary_is_distinct_in_first_occurrence_order() {
        let corpus = Corpus::new(
            "gaucho",
            vec![
                Document::from_lyrics(meta("A", "One"), "la pampa la noche".to_string()),
                Document::from_lyrics(meta("B", "Two"), "noche de pampa".to_string()),
            ],
        );

        assert_eq!(corpus.vocabulary(), vec!["la", "pampa", "noche", "de"]);
    }
}
