//! Similarity retrieval over the in-memory chunk store.
//!
//! A full linear scan: cosine similarity against every stored embedding,
//! stable sort by descending score, truncate to `k`. The corpus is a few
//! hundred chunks, so no index structure is built.

use anyhow::Result as AnyResult;

use crate::config::Config;
use crate::embedding;
use crate::error::{RagError, Result};
use crate::models::{Chunk, SourcePassage};
use crate::store::ChunkStore;

/// A stored chunk paired with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

impl ScoredChunk<'_> {
    pub fn to_passage(&self) -> SourcePassage {
        SourcePassage {
            id: self.chunk.id.clone(),
            text: self.chunk.text.clone(),
            score: self.score,
            metadata: self.chunk.metadata.clone(),
        }
    }
}

/// Return the `k` chunks most similar to `query`, best first.
///
/// Ties keep insertion order. Fails with [`RagError::EmptyCorpus`] on an
/// empty store (whatever `k` is), and with [`RagError::InvalidInput`] when
/// `k == 0` or the query dimensionality differs from the corpus.
pub fn retrieve<'a>(store: &'a ChunkStore, query: &[f32], k: usize) -> Result<Vec<ScoredChunk<'a>>> {
    if store.is_empty() {
        return Err(RagError::EmptyCorpus);
    }
    if k == 0 {
        return Err(RagError::InvalidInput("k must be a positive integer".to_string()));
    }
    if query.len() != store.dims() {
        return Err(RagError::InvalidInput(format!(
            "query embedding has {} dimensions, corpus has {}",
            query.len(),
            store.dims()
        )));
    }
    if query.iter().any(|v| !v.is_finite()) {
        return Err(RagError::InvalidInput(
            "query embedding contains non-finite values".to_string(),
        ));
    }

    let mut scored: Vec<ScoredChunk<'a>> = store
        .chunks()
        .iter()
        .map(|chunk| ScoredChunk {
            chunk,
            score: cosine_similarity(query, &chunk.embedding),
        })
        .collect();

    // `sort_by` is stable, so equal scores stay in insertion order.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    Ok(scored)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or when
/// either vector has zero magnitude.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    let sim = dot / denom;
    if !sim.is_finite() {
        return 0.0;
    }
    // Rounding can push identical directions a hair past 1.0.
    sim.clamp(-1.0, 1.0)
}

/// `filmrag search`: embed the question and print the top-k passages.
pub async fn run_search(config: &Config, question: &str, top_k: Option<usize>) -> AnyResult<()> {
    if question.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = ChunkStore::load(&config.store.path)?;
    let provider = embedding::create_provider(&config.embedding)?;
    store.check_provider(provider.as_ref())?;

    let query = embedding::embed_query(provider.as_ref(), question).await?;
    let k = top_k.unwrap_or(config.retrieval.top_k);
    let results = retrieve(&store, &query, k)?;

    for (i, r) in results.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, r.score, r.chunk.id);
        println!("   {}", snippet(&r.chunk.text, 240));
        println!();
    }
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
