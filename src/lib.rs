//! # film-rag
//!
//! A small retrieval-augmented question-answering tool over a film-analysis
//! corpus.
//!
//! The corpus is prepared offline: split into overlapping passages, embedded,
//! and written to a line-delimited JSON file. At query time the whole file
//! sits in memory; a question is embedded with the same model, compared
//! against every passage by cosine similarity, and the best passages are
//! handed to a hosted language model (Gemini) together with the question.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ corpus.txt │──▶│   prepare    │──▶│ chunks.jsonl │
//! └────────────┘   │ split+embed  │   └──────┬───────┘
//!                  └──────────────┘          │ load
//!                                            ▼
//!     question ──▶ embed ──▶ retrieve (linear scan) ──▶ generate ──▶ answer
//!                                            │
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!                 ┌──────────┐         ┌──────────┐
//!                 │   CLI    │         │   HTTP   │
//!                 │(filmrag) │         │  (JSON)  │
//!                 └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! filmrag prepare                         # build ./data/chunks.jsonl
//! filmrag search "What does the blue key open?"
//! GOOGLE_API_KEY=... filmrag ask "Who is Diane Selwyn?" --sources
//! GOOGLE_API_KEY=... filmrag serve        # JSON API on 127.0.0.1:8501
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Request-path error taxonomy |
//! | [`chunk`] | Recursive text splitting |
//! | [`store`] | JSONL chunk store |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`search`] | Cosine-similarity retrieval |
//! | [`generation`] | Answer generation |
//! | [`pipeline`] | Explicit request context (`RagContext`) |
//! | [`prepare`] | Offline corpus preparation |
//! | [`progress`] | Preparation progress reporting |
//! | [`stats`] | Store statistics |
//! | [`server`] | JSON HTTP server |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod pipeline;
pub mod prepare;
pub mod progress;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
