use thiserror::Error;

/// Unified error type for the entire stonkgaze-core library.
/// Every public function returns `Result<T, CoreError>`.
///
/// `Display` output is the human-readable message shown in the panel.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Analysis ────────────────────────────────────────────────────
    #[error("Webpage text too short: need at least {minimum} characters of content, got {length}")]
    InsufficientContent { length: usize, minimum: usize },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Analysis service error ({status}): {detail}")]
    Service { status: u16, detail: String },

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),

    // ── Ledger ──────────────────────────────────────────────────────
    #[error("Invalid trade: {0}")]
    InvalidInput(String),

    #[error("Insufficient cash: trade needs ${required:.2}, only ${available:.2} available")]
    InsufficientCash { required: f64, available: f64 },

    #[error("Insufficient shares: cannot sell {requested} {ticker}, only {held} held")]
    InsufficientShares {
        ticker: String,
        requested: f64,
        held: f64,
    },

    // ── Storage ─────────────────────────────────────────────────────
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),

    // ── Configuration ───────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    /// True for ledger validation failures. A rejected command leaves the
    /// portfolio untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidInput(_)
                | CoreError::InsufficientCash { .. }
                | CoreError::InsufficientShares { .. }
        )
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors often embed the full URL; keep the query string out of
        // anything that may be shown to the user or logged.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
