//! Error types for the metering engine

use thiserror::Error;

pub type MeteringResult<T> = Result<T, MeteringError>;

#[derive(Debug, Error)]
pub enum MeteringError {
    /// Unknown tier id is a configuration error: fatal for the calling
    /// request, surfaced verbatim, never retried.
    #[error("Unknown plan tier: {0}")]
    UnknownTier(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Ledger store error: {0}")]
    Store(String),

    #[error("Billing backend '{backend}' error: {message}")]
    Backend { backend: String, message: String },

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for MeteringError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<stripe::StripeError> for MeteringError {
    fn from(e: stripe::StripeError) -> Self {
        Self::StripeApi(e.to_string())
    }
}

impl From<reqwest::Error> for MeteringError {
    fn from(e: reqwest::Error) -> Self {
        Self::Backend {
            backend: "http".to_string(),
            message: e.to_string(),
        }
    }
}
