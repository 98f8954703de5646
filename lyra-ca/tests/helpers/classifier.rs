//! Scripted classification service
//!
//! Replies per chunk (keyed by the chunk's first word) from a queue of
//! scripted results; chunks without a script are echoed back as `A1` labels.

use async_trait::async_trait;
use lyra_ca::annotate::{AnnotateError, AnnotationRequest, ClassificationService};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Valid payload labelling every word with `domain`
pub fn echo_payload(words: &[String], domain: &str) -> Value {
    let annotations: Vec<Value> = words
        .iter()
        .map(|w| json!({"word": w, "domainCode": domain, "domainLabel": "Label", "confidence": 0.8}))
        .collect();
    json!({"success": true, "annotations": annotations})
}

type Reply = Result<Option<Value>, AnnotateError>;

#[derive(Default)]
pub struct ScriptedService {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<AnnotationRequest>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `replies` for the chunk starting with `first_word`
    pub fn script(&self, first_word: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(first_word.to_string(), replies.into());
    }

    pub fn calls(&self) -> Vec<AnnotationRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made for the chunk starting with `first_word`
    pub fn calls_for(&self, first_word: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.words.first().map(String::as_str) == Some(first_word))
            .count()
    }
}

#[async_trait]
impl ClassificationService for ScriptedService {
    async fn classify(&self, request: &AnnotationRequest) -> Result<Option<Value>, AnnotateError> {
        self.calls.lock().unwrap().push(request.clone());

        let first = request.words.first().cloned().unwrap_or_default();
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&first)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(reply) => reply,
            None => Ok(Some(echo_payload(&request.words, "A1"))),
        }
    }
}
