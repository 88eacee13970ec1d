//! Offline corpus preparation: split, embed, and write the chunk store.
//!
//! ```text
//! corpus.txt ──▶ split_text ──▶ reuse unchanged vectors ──▶ embed batches ──▶ chunks.jsonl
//! ```
//!
//! Preparation is incremental by default. When the output file already
//! exists, any chunk whose text hash and embedding model match a stored
//! record keeps that record's vector, so re-running after a small edit to the
//! corpus only embeds the passages that changed. `--full` ignores the
//! previous output.
//!
//! Every batch must succeed. A failed batch aborts the run before anything
//! is written, so the previous store stays intact.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::chunk::{split_text, text_hash};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::Chunk;
use crate::progress::{PrepareProgressEvent, PrepareProgressReporter, ProgressMode};
use crate::store::{self, ChunkStore};

/// Inputs to one preparation run.
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    /// Re-embed every chunk instead of reusing stored vectors.
    pub full: bool,
}

impl PrepareOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            input: config.corpus.path.clone(),
            output: config.store.path.clone(),
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            batch_size: config.embedding.batch_size,
            full: false,
        }
    }

    /// Checks the numeric options again after command-line overrides.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.batch_size == 0 {
            bail!("batch_size must be > 0");
        }
        Ok(())
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareSummary {
    pub chunks: usize,
    pub reused: usize,
    pub embedded: usize,
}

/// Read the corpus and split it into records without vectors.
///
/// Each record carries its id, text hash, and span metadata; `embedding` is
/// left empty.
pub fn plan_chunks(options: &PrepareOptions) -> Result<Vec<Chunk>> {
    let text = std::fs::read_to_string(&options.input)
        .with_context(|| format!("Failed to read corpus: {}", options.input.display()))?;

    let spans = split_text(&text, options.chunk_size, options.chunk_overlap);
    if spans.is_empty() {
        bail!("No text to prepare in {}", options.input.display());
    }

    let file_name = options
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "corpus".to_string());
    let source = std::fs::canonicalize(&options.input)
        .unwrap_or_else(|_| options.input.clone())
        .display()
        .to_string();

    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(i, span)| Chunk {
            id: format!("{}::chunk_{}", file_name, i),
            hash: Some(text_hash(&span.text)),
            metadata: serde_json::json!({
                "source": source,
                "chunk_index": i,
                "start_char": span.start_char,
                "end_char": span.end_char,
            }),
            text: span.text,
            embedding: Vec::new(),
            model: None,
        })
        .collect())
}

/// Vectors from a previous run, keyed by text hash, for records embedded
/// with `model`.
fn previous_vectors(output: &Path, model: &str) -> HashMap<String, Vec<f32>> {
    if !output.exists() {
        return HashMap::new();
    }
    match ChunkStore::load(output) {
        Ok(previous) => previous
            .chunks()
            .iter()
            .filter(|c| c.model.as_deref() == Some(model))
            .filter_map(|c| c.hash.clone().map(|h| (h, c.embedding.clone())))
            .collect(),
        Err(e) => {
            warn!(path = %output.display(), error = %format!("{:#}", e), "ignoring unreadable previous output");
            HashMap::new()
        }
    }
}

/// Split, embed, and write the chunk store described by `options`.
pub async fn prepare(
    options: &PrepareOptions,
    provider: &dyn EmbeddingProvider,
    reporter: &dyn PrepareProgressReporter,
) -> Result<PrepareSummary> {
    options.validate()?;
    let mut chunks = plan_chunks(options)?;
    let model = provider.model_name().to_string();

    reporter.report(PrepareProgressEvent::Chunked {
        source: options.input.display().to_string(),
        chunks: chunks.len() as u64,
    });

    let previous = if options.full {
        HashMap::new()
    } else {
        previous_vectors(&options.output, &model)
    };

    let mut pending = Vec::new();
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.model = Some(model.clone());
        match chunk.hash.as_ref().and_then(|h| previous.get(h)) {
            Some(vector) => chunk.embedding = vector.clone(),
            None => pending.push(i),
        }
    }
    let reused = chunks.len() - pending.len();

    reporter.report(PrepareProgressEvent::Planned {
        reused: reused as u64,
        pending: pending.len() as u64,
    });

    let mut done = 0usize;
    for batch in pending.chunks(options.batch_size) {
        let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
        let vectors = provider
            .embed_texts(&texts)
            .await
            .with_context(|| format!("Embedding batch starting at {} failed", chunks[batch[0]].id))?;

        if vectors.len() != batch.len() {
            bail!(
                "Embedding provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            );
        }
        for (&i, vector) in batch.iter().zip(vectors) {
            chunks[i].embedding = vector;
        }

        done += batch.len();
        reporter.report(PrepareProgressEvent::Embedding {
            n: done as u64,
            total: pending.len() as u64,
        });
    }

    // Verifies one dimensionality and one model before anything is written.
    ChunkStore::from_chunks(chunks.clone()).context("Prepared chunks are inconsistent")?;
    store::write_jsonl(&options.output, &chunks)?;

    info!(
        output = %options.output.display(),
        chunks = chunks.len(),
        reused,
        embedded = pending.len(),
        model = %model,
        "chunk store written"
    );

    Ok(PrepareSummary {
        chunks: chunks.len(),
        reused,
        embedded: pending.len(),
    })
}

/// `filmrag prepare`.
pub async fn run_prepare(
    config: &Config,
    options: PrepareOptions,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    options.validate()?;

    if dry_run {
        let chunks = plan_chunks(&options)?;
        let chars: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
        println!("prepare (dry-run)");
        println!("  input:      {}", options.input.display());
        println!("  chunks:     {}", chunks.len());
        println!("  characters: {}", chars);
        println!(
            "  chunk_size: {}  overlap: {}",
            options.chunk_size, options.chunk_overlap
        );
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    let provider = embedding::create_provider(&config.embedding)?;
    let reporter = progress.reporter();

    let summary = prepare(&options, provider.as_ref(), reporter.as_ref()).await?;

    println!("prepare");
    println!("  input:    {}", options.input.display());
    println!("  output:   {}", options.output.display());
    println!("  model:    {}", provider.model_name());
    println!("  chunks:   {}", summary.chunks);
    println!("  reused:   {}", summary.reused);
    println!("  embedded: {}", summary.embedded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Embeds text as (length, vowel count) and counts embedded texts.
    struct CountingProvider {
        embedded: AtomicUsize,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                embedded: AtomicUsize::new(0),
            }
        }
        fn embedded(&self) -> usize {
            self.embedded.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_texts(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let vowels = t.chars().filter(|c| "aeiou".contains(*c)).count();
                    vec![t.len() as f32, vowels as f32]
                })
                .collect())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_texts(&self, _texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            Err(RagError::unavailable("failing", "quota exceeded"))
        }
    }

    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<PrepareProgressEvent>>);

    impl PrepareProgressReporter for RecordingProgress {
        fn report(&self, event: PrepareProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    const CORPUS: &str = "Betty arrives in Los Angeles.\n\n\
        Rita has lost her memory.\n\n\
        The blue key opens the blue box.\n\n\
        Diane wakes up alone.";

    fn options(dir: &TempDir) -> PrepareOptions {
        let input = dir.path().join("corpus.txt");
        std::fs::write(&input, CORPUS).unwrap();
        PrepareOptions {
            input,
            output: dir.path().join("data").join("chunks.jsonl"),
            chunk_size: 40,
            chunk_overlap: 0,
            batch_size: 3,
            full: false,
        }
    }

    #[tokio::test]
    async fn test_prepare_writes_loadable_store() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        let provider = CountingProvider::new();
        let progress = RecordingProgress::default();

        let summary = prepare(&opts, &provider, &progress).await.unwrap();
        assert_eq!(summary.chunks, 4);
        assert_eq!(summary.embedded, 4);
        assert_eq!(summary.reused, 0);

        let store = ChunkStore::load(&opts.output).unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(store.dims(), 2);
        assert_eq!(store.model(), Some("counting"));

        let first = &store.chunks()[0];
        assert_eq!(first.id, "corpus.txt::chunk_0");
        assert_eq!(first.text, "Betty arrives in Los Angeles.");
        assert_eq!(first.metadata["chunk_index"], 0);
        assert_eq!(first.metadata["start_char"], 0);
        assert_eq!(first.metadata["end_char"], 29);
        assert_eq!(first.hash.as_deref(), Some(text_hash(&first.text).as_str()));

        let events = progress.0.lock().unwrap();
        assert!(matches!(events[0], PrepareProgressEvent::Chunked { chunks: 4, .. }));
        assert_eq!(
            events.last(),
            Some(&PrepareProgressEvent::Embedding { n: 4, total: 4 })
        );
    }

    #[tokio::test]
    async fn test_second_run_reuses_vectors() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        prepare(&opts, &CountingProvider::new(), &NoProgress)
            .await
            .unwrap();

        let provider = CountingProvider::new();
        let summary = prepare(&opts, &provider, &NoProgress).await.unwrap();
        assert_eq!(summary.reused, 4);
        assert_eq!(provider.embedded(), 0);
    }

    #[tokio::test]
    async fn test_changed_passage_is_reembedded() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        prepare(&opts, &CountingProvider::new(), &NoProgress)
            .await
            .unwrap();

        std::fs::write(
            &opts.input,
            CORPUS.replace("Diane wakes up alone.", "Diane wakes up in Hollywood."),
        )
        .unwrap();
        let provider = CountingProvider::new();
        let summary = prepare(&opts, &provider, &NoProgress).await.unwrap();
        assert_eq!(summary.reused, 3);
        assert_eq!(provider.embedded(), 1);
    }

    #[tokio::test]
    async fn test_full_reembeds_everything() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir);
        prepare(&opts, &CountingProvider::new(), &NoProgress)
            .await
            .unwrap();

        opts.full = true;
        let provider = CountingProvider::new();
        let summary = prepare(&opts, &provider, &NoProgress).await.unwrap();
        assert_eq!(summary.reused, 0);
        assert_eq!(provider.embedded(), 4);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_previous_store() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        prepare(&opts, &CountingProvider::new(), &NoProgress)
            .await
            .unwrap();
        let before = std::fs::read_to_string(&opts.output).unwrap();

        let err = prepare(&opts, &FailingProvider, &NoProgress)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("quota exceeded"));
        assert_eq!(std::fs::read_to_string(&opts.output).unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_input_names_path() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir);
        opts.input = dir.path().join("missing.txt");
        let err = prepare(&opts, &CountingProvider::new(), &NoProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }

    #[test]
    fn test_blank_input_rejected() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir);
        std::fs::write(&opts.input, "\n\n   \n").unwrap();
        opts.full = true;
        assert!(plan_chunks(&opts).is_err());
    }

    #[test]
    fn test_validate_overrides() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir);
        opts.chunk_overlap = opts.chunk_size;
        assert!(opts.validate().is_err());
        opts.chunk_overlap = 0;
        opts.batch_size = 0;
        assert!(opts.validate().is_err());
    }
}
