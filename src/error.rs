use thiserror::Error;

/// Main error type for the trading engine
#[derive(Error, Debug)]
pub enum HelixError {
    // Configuration errors (fatal, abort startup)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors (cycle-scoped, degrade to hold)
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Snapshot alignment failed: {0}")]
    Alignment(String),

    #[error("Stale data: {0}")]
    StaleData(String),

    // Predictor errors (degrade to rule fallback)
    #[error("Predictor error: {0}")]
    Predictor(String),

    // Risk / execution errors
    #[error("Risk blocked: {0}")]
    RiskBlock(String),

    #[error("Order execution failed: {0}")]
    Exec(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl HelixError {
    /// Errors that abort a single symbol's cycle (the orchestrator degrades
    /// the decision to `hold`) without touching other symbols.
    pub fn is_cycle_scoped(&self) -> bool {
        matches!(
            self,
            HelixError::Fetch(_)
                | HelixError::InsufficientData(_)
                | HelixError::Alignment(_)
                | HelixError::StaleData(_)
                | HelixError::Timeout(_)
                | HelixError::RateLimited(_)
                | HelixError::Http(_)
        )
    }
}

/// Result type alias for HelixError
pub type Result<T> = std::result::Result<T, HelixError>;
