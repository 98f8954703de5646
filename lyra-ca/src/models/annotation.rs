//! Annotation pipeline value types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounded slice of the input word list sent in one remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationChunk {
    /// 0-based position in scheduling order
    pub index: usize,
    pub words: Vec<String>,
}

impl AnnotationChunk {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// One well-formed label for a word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationResult {
    pub word: String,
    /// Semantic domain code (e.g. `E4.1`)
    pub domain_code: String,
    /// Human-readable domain label
    pub label: String,
    /// Classifier confidence clamped to 0.0-1.0
    pub confidence: f64,
    /// Display colour (`#rrggbb`)
    pub color_hint: String,
}

/// Progress snapshot for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationProgress {
    /// Words handed to the service so far
    pub processed: usize,
    pub total: usize,
    /// 1-based chunk about to run; 0 while scheduling
    pub current_chunk: usize,
    pub total_chunks: usize,
    /// 0.0-100.0
    pub percentage: f64,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: u64,
    pub estimated_remaining_seconds: Option<u64>,
}

const DEFAULT_DOMAIN_COLOR: &str = "#9e9e9e";

/// Palette keyed by the major category letter of a domain code
const DOMAIN_PALETTE: &[(char, &str)] = &[
    ('A', "#5c6bc0"), // general and abstract terms
    ('B', "#ef5350"), // body and the individual
    ('C', "#ab47bc"), // arts and crafts
    ('E', "#ec407a"), // emotion
    ('F', "#ffa726"), // food and farming
    ('G', "#8d6e63"), // government and the public
    ('H', "#78909c"), // architecture, housing, home
    ('I', "#26a69a"), // money and commerce
    ('K', "#ffca28"), // entertainment, sports, games
    ('L', "#66bb6a"), // life and living things
    ('M', "#29b6f6"), // movement, location, travel
    ('N', "#bdbdbd"), // numbers and measurement
    ('O', "#a1887f"), // substances, objects, equipment
    ('P', "#7e57c2"), // education
    ('Q', "#42a5f5"), // language and communication
    ('S', "#ff7043"), // social actions and states
    ('T', "#26c6da"), // time
    ('W', "#9ccc65"), // world and environment
    ('X', "#d4e157"), // psychological actions and states
    ('Y', "#8c9eff"), // science and technology
    ('Z', "#e0e0e0"), // names and grammar
];

/// Display colour for a domain code
pub fn color_for_domain(domain_code: &str) -> &'static str {
    let Some(letter) = domain_code.trim().chars().next() else {
        return DEFAULT_DOMAIN_COLOR;
    };
    let letter = letter.to_ascii_uppercase();
    DOMAIN_PALETTE
        .iter()
        .find(|(key, _)| *key == letter)
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_DOMAIN_COLOR)
}
