//! The chunk store: a line-delimited JSON file loaded whole into memory.
//!
//! Each line holds one [`Chunk`] record:
//!
//! ```json
//! {"id":"corpus.txt::chunk_0","text":"...","embedding":[0.01,...],"model":"all-minilm-l6-v2","hash":"…","metadata":{"chunk_index":0}}
//! ```
//!
//! Loading is lenient about individual bad lines, including vectors with
//! non-finite values (they are skipped with a warning), but strict about the
//! corpus as a whole: every chunk must share one dimensionality and one
//! embedding model, and at least one chunk must survive. Once loaded, the store is never mutated.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::embedding::EmbeddingProvider;
use crate::models::Chunk;

/// Read-only collection of embedded chunks.
#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
    dims: usize,
    model: Option<String>,
    path: Option<PathBuf>,
}

impl ChunkStore {
    /// Build a store from chunks already in memory.
    ///
    /// An empty vector is accepted; retrieval against it fails with
    /// `EmptyCorpus`.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Result<Self> {
        let mut store = ChunkStore::default();
        for (i, chunk) in chunks.into_iter().enumerate() {
            store
                .push(chunk)
                .with_context(|| format!("chunk #{} is inconsistent with the corpus", i))?;
        }
        Ok(store)
    }

    /// Load a JSONL chunk file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, when a record disagrees with the
    /// corpus dimensionality or model, or when no valid chunk is found.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open chunk store: {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut store = ChunkStore {
            path: Some(path.to_path_buf()),
            ..Default::default()
        };
        let mut skipped = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line
                .with_context(|| format!("Failed to read {} line {}", path.display(), line_no))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let mut chunk: Chunk = match serde_json::from_str(trimmed) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), line = line_no, error = %e, "skipping malformed record");
                    skipped += 1;
                    continue;
                }
            };
            if chunk.text.trim().is_empty() {
                warn!(path = %path.display(), line = line_no, "skipping record with empty text");
                skipped += 1;
                continue;
            }
            if chunk.embedding.iter().any(|v| !v.is_finite()) {
                warn!(path = %path.display(), line = line_no, "skipping record with non-finite embedding");
                skipped += 1;
                continue;
            }
            if chunk.id.is_empty() {
                chunk.id = format!("line_{}", line_no);
            }

            store
                .push(chunk)
                .with_context(|| format!("{} line {}", path.display(), line_no))?;
        }

        if store.is_empty() {
            bail!("No valid chunks found in {}", path.display());
        }

        info!(
            path = %path.display(),
            chunks = store.len(),
            dims = store.dims,
            model = store.model.as_deref().unwrap_or("unknown"),
            skipped,
            "chunk store loaded"
        );
        Ok(store)
    }

    fn push(&mut self, chunk: Chunk) -> Result<()> {
        if chunk.embedding.is_empty() {
            bail!("embedding must not be empty");
        }
        if chunk.embedding.iter().any(|v| !v.is_finite()) {
            bail!("embedding contains non-finite values");
        }
        if self.chunks.is_empty() {
            self.dims = chunk.embedding.len();
        } else if chunk.embedding.len() != self.dims {
            bail!(
                "embedding has {} dimensions, expected {}",
                chunk.embedding.len(),
                self.dims
            );
        }

        if let Some(model) = &chunk.model {
            match &self.model {
                None => self.model = Some(model.clone()),
                Some(existing) if existing != model => bail!(
                    "embedding model '{}' differs from corpus model '{}'",
                    model,
                    existing
                ),
                Some(_) => {}
            }
        }

        self.chunks.push(chunk);
        Ok(())
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embedding dimensionality shared by every chunk (0 when empty).
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embedding model recorded in the store, if any record carried one.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Verify that `provider` embeds into the same space as this store.
    ///
    /// A mismatched model silently produces meaningless scores, so a
    /// recorded model must equal the provider's, and a provider reporting a
    /// dimensionality must match the corpus.
    pub fn check_provider(&self, provider: &dyn EmbeddingProvider) -> Result<()> {
        match self.model() {
            Some(model) if model != provider.model_name() => bail!(
                "Chunk store was embedded with '{}' but the configured provider uses '{}'. \
                 Re-run `filmrag prepare` or change [embedding] model.",
                model,
                provider.model_name()
            ),
            Some(_) => {}
            None => warn!(
                provider_model = provider.model_name(),
                "chunk store records no embedding model; cannot verify embedding space"
            ),
        }

        if provider.dims() > 0 && !self.is_empty() && provider.dims() != self.dims {
            bail!(
                "Chunk store has {}-dimensional embeddings but the provider produces {}",
                self.dims,
                provider.dims()
            );
        }
        Ok(())
    }
}

/// Write chunks as JSONL, replacing `path` atomically.
///
/// Records go to a sibling `*.tmp` file first, which is renamed over `path`
/// once fully flushed.
pub fn write_jsonl(path: &Path, chunks: &[Chunk]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = std::fs::File::create(&tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    let mut writer = BufWriter::new(file);
    for chunk in chunks {
        serde_json::to_writer(&mut writer, chunk)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    drop(writer);

    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}
