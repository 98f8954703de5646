//! Counting corpus source
//!
//! Serves canned JSON per corpus type and records how many fetches ran and
//! how many overlapped.

use async_trait::async_trait;
use lyra_ca::cache::{CacheError, CacheResult, CorpusSource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Three songs by two artists
pub const GAUCHO_SONGS: &str = r#"[
    {"artist": "Atahualpa Yupanqui", "title": "Camino del indio", "year": 1936,
     "genre": "Zamba", "lyrics": "Camino del indio\nque junta el valle con las estrellas"},
    {"artist": "Atahualpa Yupanqui", "title": "Los ejes de mi carreta", "year": "1959",
     "genre": "Milonga", "lyrics": "Porque no engraso los ejes\nme llaman abandonao"},
    {"artist": "Jorge Cafrune", "title": "Zamba de mi esperanza", "year": 1964,
     "genre": "Zamba", "lyrics": "Zamba de mi esperanza\namanecida como un querer"}
]"#;

/// One song object as JSON text
pub fn song_json(artist: &str, title: &str, lyrics: &str) -> String {
    serde_json::json!({"artist": artist, "title": title, "lyrics": lyrics}).to_string()
}

pub struct MockCorpusSource {
    corpora: Mutex<HashMap<String, Result<String, CacheError>>>,
    delay: Duration,
    fetches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockCorpusSource {
    pub fn new() -> Self {
        Self {
            corpora: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Source serving `GAUCHO_SONGS` as `gaucho`
    pub fn gaucho() -> Self {
        let source = Self::new();
        source.set("gaucho", GAUCHO_SONGS);
        source
    }

    /// Hold every fetch open for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set(&self, corpus_type: &str, raw: &str) {
        self.corpora
            .lock()
            .unwrap()
            .insert(corpus_type.to_string(), Ok(raw.to_string()));
    }

    pub fn fail(&self, corpus_type: &str, error: CacheError) {
        self.corpora
            .lock()
            .unwrap()
            .insert(corpus_type.to_string(), Err(error));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that were running at the same time
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CorpusSource for MockCorpusSource {
    fn supports(&self, corpus_type: &str) -> bool {
        self.corpora.lock().unwrap().contains_key(corpus_type)
    }

    async fn fetch(&self, corpus_type: &str) -> CacheResult<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = self
            .corpora
            .lock()
            .unwrap()
            .get(corpus_type)
            .cloned()
            .unwrap_or_else(|| Err(CacheError::UnsupportedCorpus(corpus_type.to_string())));

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
