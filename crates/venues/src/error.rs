//! Per-venue error type, convertible into the core error taxonomy (spec §7).

use arb_engine_core::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VenueAdapterError {
    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("API error: {status_code} - {message}")]
    Api { status_code: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout: {0}")]
    Timeout(String),

    #[error("symbol unknown: {0}")]
    SymbolUnknown(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VenueAdapterError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
            || matches!(self, Self::Api { status_code, .. } if *status_code >= 500)
    }
}

impl From<reqwest::Error> for VenueAdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for VenueAdapterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Converts a venue-specific failure into the engine's taxonomy, tagging it
/// with the originating venue name so it can be recorded into
/// `ExchangeAccount.last_error` (spec §7 Venue/Transport).
pub fn to_engine_error(venue: &str, err: VenueAdapterError) -> EngineError {
    match &err {
        VenueAdapterError::SymbolUnknown(symbol) => {
            EngineError::not_found(format!("{venue}: symbol unknown: {symbol}"))
        }
        _ => {
            let retryable = err.is_retryable();
            EngineError::venue(venue, err.to_string(), retryable)
        }
    }
}

pub type Result<T> = std::result::Result<T, VenueAdapterError>;
