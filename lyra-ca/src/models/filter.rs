//! Corpus query filters
//!
//! Two filters that describe the same logical query must produce the same
//! canonical JSON, since the cache key digest is derived from it.

use crate::models::DocumentMetadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Optional restriction applied when a corpus is parsed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusFilter {
    /// Artist names (case-insensitive); empty = any artist
    #[serde(default)]
    pub artists: Vec<String>,
    /// Genres (case-insensitive); empty = any genre
    #[serde(default)]
    pub genres: Vec<String>,
    /// Inclusive lower year bound
    #[serde(default)]
    pub year_from: Option<i32>,
    /// Inclusive upper year bound
    #[serde(default)]
    pub year_to: Option<i32>,
}

fn normalize_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

impl CorpusFilter {
    /// Normalized copy: trimmed lowercase, sorted, deduplicated lists
    pub fn canonicalize(&self) -> Self {
        Self {
            artists: normalize_list(&self.artists),
            genres: normalize_list(&self.genres),
            year_from: self.year_from,
            year_to: self.year_to,
        }
    }

    /// True when the filter restricts nothing
    pub fn is_empty(&self) -> bool {
        let canonical = self.canonicalize();
        canonical.artists.is_empty()
            && canonical.genres.is_empty()
            && canonical.year_from.is_none()
            && canonical.year_to.is_none()
    }

    /// Canonical JSON with sorted keys; absent and empty fields are omitted
    ///
    /// An empty filter renders as `{}`.
    pub fn canonical_json(&self) -> String {
        let canonical = self.canonicalize();
        let mut fields: BTreeMap<&str, Value> = BTreeMap::new();

        if !canonical.artists.is_empty() {
            fields.insert("artists", Value::from(canonical.artists));
        }
        if !canonical.genres.is_empty() {
            fields.insert("genres", Value::from(canonical.genres));
        }
        if let Some(year) = canonical.year_from {
            fields.insert("year_from", Value::from(year));
        }
        if let Some(year) = canonical.year_to {
            fields.insert("year_to", Value::from(year));
        }

        // BTreeMap serialization keeps keys sorted
        serde_json::to_string(&fields).unwrap_or_else(|_| "{}".to_string())
    }

    /// Does a document pass this filter
    ///
    /// Documents without a year never pass a year-bounded filter.
    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        let canonical = self.canonicalize();

        if !canonical.artists.is_empty()
            && !canonical
                .artists
                .contains(&metadata.artist.trim().to_lowercase())
        {
            return false;
        }

        if !canonical.genres.is_empty() {
            let genre = metadata
                .genre
                .as_deref()
                .map(|g| g.trim().to_lowercase())
                .unwrap_or_default();
            if !canonical.genres.contains(&genre) {
                return false;
            }
        }

        if canonical.year_from.is_some() || canonical.year_to.is_some() {
            let Some(year) = metadata.year else {
                return false;
            };
            if canonical.year_from.is_some_and(|from| year < from) {
                return false;
            }
            if canonical.year_to.is_some_and(|to| year > to) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(artist: &str, year: Option<i32>, genre: Option<&str>) -> DocumentMetadata {
        DocumentMetadata {
            artist: artist.to_string(),
            title: "t".to_string(),
            year,
            genre: genre.map(str::to_string),
            album: None,
        }
    }

    #[test]
    fn test_default_filter_is_empty_json() {
        assert_eq!(CorpusFilter::default().canonical_json(), "{}");
        assert!(CorpusFilter::default().is_empty());
    }

    #[test]
    fn test_blank_entries_count_as_absent() {
        let filter = CorpusFilter {
            artists: vec!["  ".to_string()],
            ..Default::default()
        };
        assert!(filter.is_empty());
        assert_eq!(filter.canonical_json(), "{}");
    }

    #[test]
    fn test_order_and_case_do_not_change_canonical_form() {
        let a = CorpusFilter {
            artists: vec!["Atahualpa Yupanqui".to_string(), "José Larralde".to_string()],
            year_from: Some(1960),
            ..Default::default()
        };
        let b = CorpusFilter {
            artists: vec![
                "josé larralde ".to_string(),
                "ATAHUALPA YUPANQUI".to_string(),
                "José Larralde".to_string(),
            ],
            year_from: Some(1960),
            ..Default::default()
        };

        assert_eq!(a.canonical_json(), b.canonical_json());
        assert_eq!(
            a.canonical_json(),
            r#"{"artists":["atahualpa yupanqui","josé larralde"],"year_from":1960}"#
        );
    }

    #[test]
    fn test_matches_artist_case_insensitive() {
        let filter = CorpusFilter {
            artists: vec!["Los Chalchaleros".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&meta("los chalchaleros", None, None)));
        assert!(!filter.matches(&meta("Los Fronterizos", None, None)));
    }

    #[test]
    fn test_matches_year_range_inclusive() {
        let filter = CorpusFilter {
            year_from: Some(1950),
            year_to: Some(1960),
            ..Default::default()
        };
        assert!(filter.matches(&meta("a", Some(1950), None)));
        assert!(filter.matches(&meta("a", Some(1960), None)));
        assert!(!filter.matches(&meta("a", Some(1961), None)));
        assert!(!filter.matches(&meta("a", None, None)));
    }

    #[test]
    fn test_matches_genre() {
        let filter = CorpusFilter {
            genres: vec!["Milonga".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&meta("a", None, Some("milonga"))));
        assert!(!filter.matches(&meta("a", None, Some("zamba"))));
        assert!(!filter.matches(&meta("a", None, None)));
    }
}
