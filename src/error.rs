//! Request-path error taxonomy.
//!
//! Every failure that can happen while answering a single question maps to
//! one [`RagError`] variant. Callers recover at the request boundary: the CLI
//! prints the message and exits non-zero, the HTTP server turns it into a JSON
//! error body. Startup failures (bad config, unreadable store) stay on
//! `anyhow` and abort the process instead.

use thiserror::Error;

/// Errors raised while retrieving context or generating an answer.
#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed request: blank question, `k == 0`, or a query embedding
    /// whose dimensionality does not match the corpus.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The chunk store holds no chunks.
    #[error("the chunk store is empty")]
    EmptyCorpus,

    /// An embedding or generation backend could not be reached or rejected
    /// the call (timeouts and quota exhaustion included).
    #[error("{provider} unavailable: {message}")]
    ProviderUnavailable {
        /// Provider label, e.g. `"openai embeddings"` or `"gemini"`.
        provider: String,
        /// What went wrong.
        message: String,
    },

    /// The generation backend answered, but the response carried no usable text.
    #[error("{provider} returned an unusable response: {message}")]
    Generation {
        /// Provider label.
        provider: String,
        /// What went wrong.
        message: String,
    },
}

impl RagError {
    pub(crate) fn unavailable(provider: impl Into<String>, message: impl ToString) -> Self {
        RagError::ProviderUnavailable {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn generation(provider: impl Into<String>, message: impl ToString) -> Self {
        RagError::Generation {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}

/// Result alias for request-path operations.
pub type Result<T> = std::result::Result<T, RagError>;
