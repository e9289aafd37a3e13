// ── Edge Atoms: Error Types ────────────────────────────────────────────────
// Single canonical error enum for the edge engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Network, Remote…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Errors stay INSIDE the engine. Public component operations (enqueue,
//     drain, get, put, infer, record, flush) swallow them into log lines and
//     best-effort results; only constructors return `EdgeResult`.
//   • No variant carries payload content or credentials in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EdgeError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Config file could not be parsed.
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Remote collaborator answered with a non-success status.
    #[error("Remote error: {endpoint}: HTTP {status}")]
    Remote { endpoint: String, status: u16 },

    /// A bounded call ran past its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Circuit breaker is open; the call was not attempted.
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    /// Engine configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EdgeError {
    /// Create a remote error for an endpoint and HTTP status.
    pub fn remote(endpoint: impl Into<String>, status: u16) -> Self {
        Self::Remote { endpoint: endpoint.into(), status }
    }

    /// True for failures expected to clear on their own: transport errors,
    /// timeouts, an open circuit, 5xx, 408 and 429. The sync queue and the
    /// analytics buffer retry either way; a non-transient failure is logged
    /// as an error because retrying alone will not fix it.
    pub fn is_transient(&self) -> bool {
        match self {
            EdgeError::Network(_) | EdgeError::Timeout(_) | EdgeError::CircuitOpen(_) => true,
            EdgeError::Remote { status, .. } => *status >= 500 || matches!(status, 408 | 429),
            _ => false,
        }
    }
}

impl From<String> for EdgeError {
    fn from(s: String) -> Self {
        EdgeError::Other(s)
    }
}

impl From<&str> for EdgeError {
    fn from(s: &str) -> Self {
        EdgeError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

pub type EdgeResult<T> = Result<T, EdgeError>;
