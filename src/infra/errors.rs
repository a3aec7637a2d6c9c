// src/infra/errors.rs — Error types for chatrelay

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    // Boundary errors (returned to the caller, never panicked across)
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    // Verification / reset codes: "expired" and "wrong" are different
    // user-facing outcomes and must stay distinct.
    #[error("Code has expired")]
    CodeExpired,

    #[error("Code is incorrect")]
    CodeIncorrect,

    #[error("Daily question limit reached ({limit})")]
    QuotaExceeded { limit: u32 },

    // Upstream agent stream failed mid-turn; recovered locally by the
    // reconciler, surfaced here only if the call never started.
    #[error("Agent stream error: {message}")]
    Upstream { message: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    // Infra
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RelayError::Validation(msg.into())
    }

    /// True for failures of the backing store rather than of the request.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            RelayError::StoreUnavailable(_) | RelayError::Database(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
