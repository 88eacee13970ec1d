//! Preparation progress reporting.
//!
//! Reports observable progress during `filmrag prepare` so users see how many
//! chunks were produced, how many vectors were reused, and how far embedding
//! has got. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;

/// A single progress event for corpus preparation.
#[derive(Clone, Debug, PartialEq)]
pub enum PrepareProgressEvent {
    /// The source text was split into `chunks` passages.
    Chunked { source: String, chunks: u64 },
    /// `reused` chunks kept their stored vector; `pending` need embedding.
    Planned { reused: u64, pending: u64 },
    /// `n` of `total` pending chunks have been embedded.
    Embedding { n: u64, total: u64 },
}

/// Reports preparation progress. Implementations write to stderr.
pub trait PrepareProgressReporter: Send + Sync {
    fn report(&self, event: PrepareProgressEvent);
}

/// Human-friendly progress on stderr: "prepare  embedding  64 / 1,024 chunks".
pub struct StderrProgress;

impl PrepareProgressReporter for StderrProgress {
    fn report(&self, event: PrepareProgressEvent) {
        let line = human_line(&event);
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

fn human_line(event: &PrepareProgressEvent) -> String {
    match event {
        PrepareProgressEvent::Chunked { source, chunks } => {
            format!("prepare  {}  {} chunks\n", source, format_number(*chunks))
        }
        PrepareProgressEvent::Planned { reused, pending } => format!(
            "prepare  reusing {}  embedding {}\n",
            format_number(*reused),
            format_number(*pending)
        ),
        PrepareProgressEvent::Embedding { n, total } => format!(
            "prepare  embedding  {} / {} chunks\n",
            format_number(*n),
            format_number(*total)
        ),
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl PrepareProgressReporter for JsonProgress {
    fn report(&self, event: PrepareProgressEvent) {
        if let Ok(line) = serde_json::to_string(&json_event(&event)) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

fn json_event(event: &PrepareProgressEvent) -> serde_json::Value {
    match event {
        PrepareProgressEvent::Chunked { source, chunks } => serde_json::json!({
            "event": "progress",
            "phase": "chunked",
            "source": source,
            "chunks": chunks
        }),
        PrepareProgressEvent::Planned { reused, pending } => serde_json::json!({
            "event": "progress",
            "phase": "planned",
            "reused": reused,
            "pending": pending
        }),
        PrepareProgressEvent::Embedding { n, total } => serde_json::json!({
            "event": "progress",
            "phase": "embedding",
            "n": n,
            "total": total
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl PrepareProgressReporter for NoProgress {
    fn report(&self, _event: PrepareProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn PrepareProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn human_embedding_line() {
        let line = human_line(&PrepareProgressEvent::Embedding { n: 64, total: 1024 });
        assert_eq!(line, "prepare  embedding  64 / 1,024 chunks\n");
    }

    #[test]
    fn json_event_shape() {
        let value = json_event(&PrepareProgressEvent::Planned {
            reused: 3,
            pending: 2,
        });
        assert_eq!(value["phase"], "planned");
        assert_eq!(value["reused"], 3);
        assert_eq!(value["pending"], 2);
    }
}
