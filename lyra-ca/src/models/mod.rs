//! Data models for lyra-ca

pub mod annotation;
pub mod corpus;
pub mod filter;

pub use annotation::{color_for_domain, AnnotationChunk, AnnotationProgress, AnnotationResult};
pub use corpus::{tokenize, Corpus, Document, DocumentMetadata};
pub use filter::CorpusFilter;
