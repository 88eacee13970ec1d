//! The question-answering pipeline.
//!
//! [`RagContext`] bundles everything a request needs: the loaded chunk
//! store, the embedding provider, the answer generator, and the default
//! result count. It is built once at startup and passed explicitly to the
//! CLI and HTTP frontends; nothing lives in global state.
//!
//! ```text
//! question ──▶ embed ──▶ retrieve (linear scan) ──▶ generate ──▶ Answer
//! ```

use anyhow::Context as _;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{self, AnswerGenerator};
use crate::models::{Answer, SourcePassage};
use crate::search;
use crate::store::ChunkStore;

/// Explicitly constructed request context shared by all frontends.
///
/// Cheap to clone; the store and providers sit behind `Arc`s and are only
/// ever read.
#[derive(Clone)]
pub struct RagContext {
    store: Arc<ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    default_top_k: usize,
}

impl RagContext {
    /// Assemble a context, refusing an embedder whose model or
    /// dimensionality disagrees with the store.
    pub fn new(
        store: ChunkStore,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
        default_top_k: usize,
    ) -> anyhow::Result<Self> {
        store.check_provider(embedder.as_ref())?;
        if default_top_k == 0 {
            anyhow::bail!("default top_k must be >= 1");
        }
        Ok(Self {
            store: Arc::new(store),
            embedder,
            generator,
            default_top_k,
        })
    }

    /// Load the store and build both providers from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = ChunkStore::load(&config.store.path)?;
        let embedder = embedding::create_provider(&config.embedding)
            .context("Failed to initialize embedding provider")?;
        let generator = generation::create_generator(&config.generation)
            .context("Failed to initialize generation provider")?;

        info!(
            chunks = store.len(),
            embedder = embedder.model_name(),
            generator = generator.model_name(),
            "pipeline ready"
        );
        Self::new(
            store,
            Arc::from(embedder),
            Arc::from(generator),
            config.retrieval.top_k,
        )
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn generator(&self) -> &dyn AnswerGenerator {
        self.generator.as_ref()
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Embed `question` and return the best-matching passages.
    pub async fn retrieve(&self, question: &str, top_k: Option<usize>) -> Result<Vec<SourcePassage>> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".to_string()));
        }
        let k = top_k.unwrap_or(self.default_top_k);
        if self.store.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        if k == 0 {
            return Err(RagError::InvalidInput("top_k must be a positive integer".to_string()));
        }

        let query = embedding::embed_query(self.embedder.as_ref(), question).await?;
        let scored = search::retrieve(&self.store, &query, k)?;
        debug!(
            k,
            returned = scored.len(),
            best = scored.first().map(|s| s.score).unwrap_or(0.0),
            "retrieved passages"
        );
        Ok(scored.iter().map(|s| s.to_passage()).collect())
    }

    /// Answer `question` from the retrieved passages.
    pub async fn ask(&self, question: &str, top_k: Option<usize>) -> Result<Answer> {
        let sources = self.retrieve(question, top_k).await?;
        let answer = self.generator.generate(question, &sources).await?;
        Ok(Answer { answer, sources })
    }
}

/// `filmrag ask`: answer one question and print it.
pub async fn run_ask(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    show_sources: bool,
) -> anyhow::Result<()> {
    let ctx = RagContext::from_config(config)?;
    let answer = ctx.ask(question, top_k).await?;

    println!("{}", answer.answer.trim());

    if show_sources {
        println!();
        println!("Sources:");
        for (i, s) in answer.sources.iter().enumerate() {
            println!("  {}. [{:.4}] {}", i + 1, s.score, s.id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;
    use crate::generation::DisabledGenerator;
    use crate::models::Chunk;
    use async_trait::async_trait;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.0.len()
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl AnswerGenerator for EchoGenerator {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, question: &str, context: &[SourcePassage]) -> Result<String> {
            Ok(format!("{} <- {}", question, context[0].id))
        }
    }

    fn store(model: Option<&str>) -> ChunkStore {
        let chunk = |id: &str, v: Vec<f32>| Chunk {
            id: id.to_string(),
            text: format!("passage {}", id),
            embedding: v,
            model: model.map(str::to_string),
            hash: None,
            metadata: serde_json::Value::Null,
        };
        ChunkStore::from_chunks(vec![
            chunk("key", vec![1.0, 0.0]),
            chunk("dream", vec![0.0, 1.0]),
        ])
        .unwrap()
    }

    fn ctx(embedding: Vec<f32>) -> RagContext {
        RagContext::new(
            store(Some("fixed")),
            Arc::new(FixedEmbedder(embedding)),
            Arc::new(EchoGenerator),
            1,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ask_uses_best_passage() {
        let answer = ctx(vec![0.1, 0.9]).ask("Who dreams?", None).await.unwrap();
        assert_eq!(answer.answer, "Who dreams? <- dream");
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_top_k_override() {
        let sources = ctx(vec![0.9, 0.1]).retrieve("keys", Some(5)).await.unwrap();
        let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["key", "dream"]);
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let err = ctx(vec![1.0, 0.0]).ask("   ", None).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let err = ctx(vec![1.0, 0.0]).retrieve("q", Some(0)).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_store() {
        let ctx = RagContext::new(
            ChunkStore::from_chunks(Vec::new()).unwrap(),
            Arc::new(FixedEmbedder(vec![1.0])),
            Arc::new(EchoGenerator),
            3,
        )
        .unwrap();
        let err = ctx.ask("anything", Some(0)).await.unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus));
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_taxonomy() {
        let ctx = RagContext::new(
            store(None),
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            Arc::new(DisabledGenerator),
            2,
        )
        .unwrap();
        let err = ctx.ask("q", None).await.unwrap_err();
        assert!(matches!(err, RagError::ProviderUnavailable { .. }));
    }

    #[test]
    fn test_model_mismatch_rejected() {
        let result = RagContext::new(
            store(Some("all-minilm-l6-v2")),
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            Arc::new(EchoGenerator),
            1,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let result = RagContext::new(
            store(None),
            Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])),
            Arc::new(EchoGenerator),
            1,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_disabled_embedder_is_unavailable() {
        let ctx = RagContext::new(
            store(None),
            Arc::new(DisabledProvider),
            Arc::new(EchoGenerator),
            1,
        )
        .unwrap();
        let err = ctx.retrieve("q", None).await.unwrap_err();
        assert!(matches!(err, RagError::ProviderUnavailable { .. }));
    }
}
