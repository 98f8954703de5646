//! Network tier: fetch a raw corpus and parse it into documents
//!
//! Raw corpora are JSON, either a bare array of songs or `{"songs": [...]}`.
//! Each song carries `artist`, `title`, `lyrics` and optional `year`,
//! `genre`, `album`. The query filter is applied while parsing.

use super::{CacheError, CacheKey, CacheResult, CorpusQuery};
use crate::models::{Corpus, CorpusFilter, Document, DocumentMetadata};
use async_trait::async_trait;
use lyra_common::config::CorpusSourceConfig;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Where raw corpora come from
#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// Whether this source knows the corpus type
    fn supports(&self, corpus_type: &str) -> bool;

    /// Raw corpus text
    async fn fetch(&self, corpus_type: &str) -> CacheResult<String>;
}

/// Corpus source backed by configured URLs (`http(s)://` or `file://`)
pub struct HttpCorpusSource {
    http_client: reqwest::Client,
    sources: HashMap<String, String>,
}

impl HttpCorpusSource {
    pub fn new(corpora: &BTreeMap<String, CorpusSourceConfig>, timeout: Duration) -> CacheResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(lyra_common::config::get_user_agent())
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        let sources = corpora
            .iter()
            .map(|(name, cfg)| (name.trim().to_lowercase(), cfg.url.clone()))
            .collect();

        Ok(Self {
            http_client,
            sources,
        })
    }

    /// Configured corpus type names
    pub fn corpus_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl CorpusSource for HttpCorpusSource {
    fn supports(&self, corpus_type: &str) -> bool {
        self.sources.contains_key(&corpus_type.trim().to_lowercase())
    }

    async fn fetch(&self, corpus_type: &str) -> CacheResult<String> {
        let name = corpus_type.trim().to_lowercase();
        let url = self
            .sources
            .get(&name)
            .ok_or_else(|| CacheError::UnsupportedCorpus(corpus_type.to_string()))?;

        if let Some(path) = url.strip_prefix("file://") {
            tracing::debug!(corpus_type = %name, path = %path, "Reading corpus file");
            return tokio::fs::read_to_string(path)
                .await
                .map_err(|e| CacheError::Transport(format!("{}: {}", path, e)));
        }

        tracing::debug!(corpus_type = %name, url = %url, "Fetching corpus");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Transport(format!(
                "corpus source returned HTTP {}",
                status.as_u16()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))
    }
}

fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct RawSong {
    artist: String,
    title: String,
    #[serde(default, deserialize_with = "lenient_year")]
    year: Option<i32>,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    album: Option<String>,
    lyrics: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCorpus {
    Songs(Vec<RawSong>),
    Wrapped { songs: Vec<RawSong> },
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse raw corpus JSON, keeping only documents that pass `filter`
pub fn parse_corpus(corpus_type: &str, raw: &str, filter: &CorpusFilter) -> CacheResult<Corpus> {
    let songs = match serde_json::from_str::<RawCorpus>(raw) {
        Ok(RawCorpus::Songs(songs)) | Ok(RawCorpus::Wrapped { songs }) => songs,
        Err(e) => return Err(CacheError::Parse(e.to_string())),
    };
    let song_count = songs.len();

    let documents: Vec<Document> = songs
        .into_iter()
        .map(|song| {
            let metadata = DocumentMetadata {
                artist: song.artist.trim().to_string(),
                title: song.title.trim().to_string(),
                year: song.year,
                genre: non_blank(song.genre),
                album: non_blank(song.album),
            };
            (metadata, song.lyrics)
        })
        .filter(|(metadata, _)| filter.matches(metadata))
        .map(|(metadata, lyrics)| Document::from_lyrics(metadata, lyrics))
        .collect();

    tracing::debug!(
        corpus_type = %corpus_type,
        songs = song_count,
        kept = documents.len(),
        "Parsed corpus"
    );

    Ok(Corpus::new(corpus_type.trim().to_lowercase(), documents))
}

/// Fetch + parse for the network tier
#[derive(Clone)]
pub struct NetworkLoader {
    source: Arc<dyn CorpusSource>,
}

impl NetworkLoader {
    pub fn new(source: Arc<dyn CorpusSource>) -> Self {
        Self { source }
    }

    pub fn supports(&self, corpus_type: &str) -> bool {
        self.source.supports(corpus_type)
    }

    /// Fetch and parse the corpus for `query`
    pub async fn load(&self, key: &CacheKey, query: &CorpusQuery) -> CacheResult<Corpus> {
        if !self.supports(&query.corpus_type) {
            return Err(CacheError::UnsupportedCorpus(query.corpus_type.clone()));
        }

        let raw = self.source.fetch(key.corpus_type()).await?;
        let corpus_type = key.corpus_type().to_string();
        let filter = query.filter.clone();

        // Large corpora: keep JSON parsing and tokenizing off the async workers
        tokio::task::spawn_blocking(move || parse_corpus(&corpus_type, &raw, &filter))
            .await
            .map_err(|e| CacheError::Internal(format!("parse task failed: {}", e)))?
    }
}
