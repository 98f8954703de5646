//! Cache key codec
//!
//! Keys render as `{corpusType}:{kind}:{digest}`. The digest is `{}` for an
//! unfiltered corpus and otherwise the first 32 hex characters of SHA-256 over
//! the filter's canonical JSON, so identical logical queries always collide.

use super::CacheError;
use crate::models::CorpusFilter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

const EMPTY_DIGEST: &str = "{}";
const DIGEST_HEX_LEN: usize = 32;

/// Whether a key addresses the whole corpus or a filtered view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Full,
    Filtered,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Full => "full",
            KeyKind::Filtered => "filtered",
        }
    }
}

/// Immutable cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey {
    corpus_type: String,
    kind: KeyKind,
    digest: String,
}

fn normalize_corpus_type(corpus_type: &str) -> String {
    corpus_type.trim().to_lowercase()
}

fn filter_digest(filter: &CorpusFilter) -> String {
    let hash = Sha256::digest(filter.canonical_json().as_bytes());
    let mut hex: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
    hex.truncate(DIGEST_HEX_LEN);
    hex
}

impl CacheKey {
    /// Derive the key for a corpus type and filter
    pub fn new(corpus_type: &str, filter: &CorpusFilter) -> Self {
        if filter.is_empty() {
            return Self::full(corpus_type);
        }
        Self {
            corpus_type: normalize_corpus_type(corpus_type),
            kind: KeyKind::Filtered,
            digest: filter_digest(filter),
        }
    }

    /// Key for the unfiltered corpus
    pub fn full(corpus_type: &str) -> Self {
        Self {
            corpus_type: normalize_corpus_type(corpus_type),
            kind: KeyKind::Full,
            digest: EMPTY_DIGEST.to_string(),
        }
    }

    pub fn corpus_type(&self) -> &str {
        &self.corpus_type
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.corpus_type, self.kind.as_str(), self.digest)
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Split from the right: kind and digest never contain ':'
        let mut parts = s.rsplitn(3, ':');
        let (Some(digest), Some(kind), Some(corpus_type)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CacheError::InvalidKey(s.to_string()));
        };

        let kind = match kind {
            "full" => KeyKind::Full,
            "filtered" => KeyKind::Filtered,
            _ => return Err(CacheError::InvalidKey(s.to_string())),
        };

        let digest_ok = match kind {
            KeyKind::Full => digest == EMPTY_DIGEST,
            KeyKind::Filtered => {
                digest.len() == DIGEST_HEX_LEN && digest.chars().all(|c| c.is_ascii_hexdigit())
            }
        };
        if corpus_type.is_empty() || !digest_ok {
            return Err(CacheError::InvalidKey(s.to_string()));
        }

        Ok(Self {
            corpus_type: corpus_type.to_string(),
            kind,
            digest: digest.to_string(),
        })
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

/// Corpus request: a corpus type plus an optional filter
///
/// The key is lossy (digest), so loads need the query itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusQuery {
    pub corpus_type: String,
    #[serde(default)]
    pub filter: CorpusFilter,
}

impl CorpusQuery {
    pub fn new(corpus_type: impl Into<String>, filter: CorpusFilter) -> Self {
        Self {
            corpus_type: corpus_type.into(),
            filter,
        }
    }

    /// Unfiltered query
    pub fn full(corpus_type: impl Into<String>) -> Self {
        Self::new(corpus_type, CorpusFilter::default())
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.corpus_type, &self.filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_key_format() {
        let key = CorpusQuery::full("gaucho").key();
        assert_eq!(key.to_string(), "gaucho:full:{}");
        assert_eq!(key.kind(), KeyKind::Full);
    }

    #[test]
    fn test_corpus_type_is_normalized() {
        assert_eq!(CacheKey::full(" Gaucho "), CacheKey::full("gaucho"));
    }

    #[test]
    fn test_empty_filter_fields_produce_full_key() {
        let filter = CorpusFilter {
            artists: vec![],
            genres: vec![" ".to_string()],
            ..Default::default()
        };
        assert_eq!(CacheKey::new("gaucho", &filter), CacheKey::full("gaucho"));
    }

    #[test]
    fn test_equivalent_filters_share_key() {
        let a = CorpusFilter {
            artists: vec!["B".to_string(), "a".to_string()],
            year_to: Some(1970),
            ..Default::default()
        };
        let b = CorpusFilter {
            artists: vec!["A".to_string(), "b".to_string(), "a".to_string()],
            year_to: Some(1970),
            genres: vec![],
            year_from: None,
        };

        let key_a = CacheKey::new("gaucho", &a);
        let key_b = CacheKey::new("gaucho", &b);
        assert_eq!(key_a, key_b);
        assert_eq!(key_a.kind(), KeyKind::Filtered);
        assert_eq!(key_a.digest().len(), 32);
    }

    #[test]
    fn test_different_filters_differ() {
        let a = CorpusFilter {
            year_from: Some(1960),
            ..Default::default()
        };
        let b = CorpusFilter {
            year_to: Some(1960),
            ..Default::default()
        };
        assert_ne!(CacheKey::new("gaucho", &a), CacheKey::new("gaucho", &b));
    }

    #[test]
    fn test_key_parses_back() {
        let filter = CorpusFilter {
            genres: vec!["milonga".to_string()],
            ..Default::default()
        };
        for key in [CacheKey::full("gaucho"), CacheKey::new("tango", &filter)] {
            let parsed: CacheKey = key.to_string().parse().unwrap();
            assert_eq!(parsed, key);
        }
    }

    #[test]
    fn test_malformed_keys_rejected() {
        for bad in ["", "gaucho", "gaucho:full", "gaucho:partial:{}", ":full:{}", "gaucho:filtered:xyz"] {
            assert!(bad.parse::<CacheKey>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_key_serde_uses_string_form() {
        let key = CacheKey::full("gaucho");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"gaucho:full:{}\"");
        let back: CacheKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
