//! Test Helper Utilities
//!
//! Shared utilities for testing lyra-ca

#![allow(dead_code)]

pub mod classifier;
pub mod corpus_source;
pub mod log_capture;

pub use classifier::{echo_payload, ScriptedService};
pub use corpus_source::{song_json, MockCorpusSource, GAUCHO_SONGS};
pub use log_capture::{capture_logs, LogCapture};
