//! Core data models used throughout film-rag.
//!
//! These types represent the stored chunks and the request-scoped results
//! that flow through the retrieval and generation pipeline.

use serde::{Deserialize, Serialize};

/// One retrievable passage of the corpus, as persisted in the JSONL store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    #[serde(default)]
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Embedding model that produced `embedding`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// SHA-256 of `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Opaque to retrieval.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// Character span of a chunk inside its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
}

/// A retrieved passage as shown to users and fed to the generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourcePassage {
    pub id: String,
    pub text: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// The user-facing response to a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourcePassage>,
}
