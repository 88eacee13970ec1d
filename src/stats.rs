//! Chunk store statistics.
//!
//! Gives a quick summary of what `prepare` produced: chunk count, embedding
//! dimensionality and model, and passage sizes. Used by `filmrag stats` to
//! check a store before serving it.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::store::ChunkStore;

/// Summary figures for a loaded store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub chunks: usize,
    pub dims: usize,
    pub model: Option<String>,
    pub total_chars: usize,
    pub min_chars: usize,
    pub max_chars: usize,
    pub hashed: usize,
    /// Chunk counts per `metadata.source`.
    pub by_source: BTreeMap<String, usize>,
}

impl StoreStats {
    pub fn collect(store: &ChunkStore) -> Self {
        let lengths: Vec<usize> = store
            .chunks()
            .iter()
            .map(|c| c.text.chars().count())
            .collect();

        let mut by_source = BTreeMap::new();
        for chunk in store.chunks() {
            let source = chunk
                .metadata
                .get("source")
                .and_then(|s| s.as_str())
                .unwrap_or("(unknown)")
                .to_string();
            *by_source.entry(source).or_insert(0) += 1;
        }

        Self {
            chunks: store.len(),
            dims: store.dims(),
            model: store.model().map(str::to_string),
            total_chars: lengths.iter().sum(),
            min_chars: lengths.iter().copied().min().unwrap_or(0),
            max_chars: lengths.iter().copied().max().unwrap_or(0),
            hashed: store.chunks().iter().filter(|c| c.hash.is_some()).count(),
            by_source,
        }
    }

    pub fn avg_chars(&self) -> usize {
        if self.chunks == 0 {
            0
        } else {
            self.total_chars / self.chunks
        }
    }
}

/// Run the stats command: load the store and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let store = ChunkStore::load(&config.store.path)?;
    let stats = StoreStats::collect(&store);
    let file_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("film-rag chunk store");
    println!("====================");
    println!();
    println!("  Store:       {}", config.store.path.display());
    println!("  Size:        {}", format_bytes(file_size));
    println!();
    println!("  Chunks:      {}", stats.chunks);
    println!("  Dimensions:  {}", stats.dims);
    println!(
        "  Model:       {}",
        stats.model.as_deref().unwrap_or("(not recorded)")
    );
    println!(
        "  Characters:  {} total, avg {}, min {}, max {}",
        stats.total_chars,
        stats.avg_chars(),
        stats.min_chars,
        stats.max_chars
    );
    println!("  Hashed:      {} / {}", stats.hashed, stats.chunks);

    if !stats.by_source.is_empty() {
        println!();
        println!("  By source:");
        for (source, count) in &stats.by_source {
            println!("  {:>8}  {}", count, source);
        }
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn chunk(text: &str, source: Option<&str>) -> Chunk {
        Chunk {
            id: text.to_string(),
            text: text.to_string(),
            embedding: vec![1.0, 0.0, 0.0],
            model: Some("all-minilm-l6-v2".to_string()),
            hash: source.map(|_| "h".to_string()),
            metadata: match source {
                Some(s) => serde_json::json!({ "source": s }),
                None => serde_json::Value::Null,
            },
        }
    }

    #[test]
    fn test_collect() {
        let store = ChunkStore::from_chunks(vec![
            chunk("Silencio", Some("/corpus/a.txt")),
            chunk("No hay banda", Some("/corpus/a.txt")),
            chunk("Cowboy", None),
        ])
        .unwrap();
        let stats = StoreStats::collect(&store);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.dims, 3);
        assert_eq!(stats.model.as_deref(), Some("all-minilm-l6-v2"));
        assert_eq!(stats.total_chars, 26);
        assert_eq!(stats.min_chars, 6);
        assert_eq!(stats.max_chars, 12);
        assert_eq!(stats.avg_chars(), 8);
        assert_eq!(stats.hashed, 2);
        assert_eq!(stats.by_source["/corpus/a.txt"], 2);
        assert_eq!(stats.by_source["(unknown)"], 1);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
