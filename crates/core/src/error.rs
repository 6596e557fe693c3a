//! Error taxonomy for the engine (spec §7).
//!
//! Kinds, not type names: each variant below corresponds to one of the kinds
//! spec.md enumerates, carrying the context each propagation rule needs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Input violates a stated invariant. Surfaced to the caller, never persisted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Stateful precondition violated (already-connected, already-active, duplicate, non-paused delete).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Entity absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP/WebSocket failure or venue-returned error.
    #[error("venue/transport error [{venue}]: {message}")]
    Venue {
        venue: String,
        message: String,
        /// Whether this failure is safe to retry (idempotent reads only).
        retryable: bool,
    },

    /// Distinguished venue/transport failure during the two-leg open;
    /// always triggers compensation (spec §4.8).
    #[error("second-leg failure on {venue}: {message}")]
    SecondLegFail { venue: String, message: String },

    /// Preflight margin rejection; aborts the current transition without side effects.
    #[error("margin preflight failed: required {required}, available {available}")]
    Margin {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    /// Instrument-limit rejection (qty/notional/step).
    #[error("limit violation: {0}")]
    Limit(String),

    /// Invariant violation (e.g. a leg present with zero size). Surfaced as
    /// ERROR; the owning pair transitions to `PairState::Error`.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl EngineError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    #[must_use]
    pub fn venue(venue: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Venue {
            venue: venue.into(),
            message: message.into(),
            retryable,
        }
    }

    #[must_use]
    pub fn second_leg_fail(venue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SecondLegFail {
            venue: venue.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn margin(
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    ) -> Self {
        Self::Margin {
            required,
            available,
        }
    }

    #[must_use]
    pub fn limit(message: impl Into<String>) -> Self {
        Self::Limit(message.into())
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Venue/Transport errors on idempotent reads are retryable; order
    /// placement never is (spec §7: non-idempotent without a client-order-id).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Venue { retryable: true, .. })
    }

    /// Whether this error, on an active-trading path, should be emitted as
    /// an ERROR-severity notification (spec §7).
    #[must_use]
    pub const fn is_notifiable(&self) -> bool {
        matches!(
            self,
            Self::Venue { .. } | Self::SecondLegFail { .. } | Self::Internal(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // ==================== Construction Tests ====================

    #[test]
    fn test_validation_error_construction() {
        let err = EngineError::validation("exit must be less than entry");
        assert!(err.to_string().contains("exit must be less than entry"));
    }

    #[test]
    fn test_venue_error_retryability() {
        let retryable = EngineError::venue("bybit", "timeout", true);
        let not_retryable = EngineError::venue("bybit", "order rejected", false);
        assert!(retryable.is_retryable());
        assert!(!not_retryable.is_retryable());
    }

    #[test]
    fn test_second_leg_fail_is_notifiable() {
        let err = EngineError::second_leg_fail("okx", "connection reset");
        assert!(err.is_notifiable());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_margin_error_display() {
        let err = EngineError::margin(dec!(100), dec!(50));
        let display = err.to_string();
        assert!(display.contains("100"));
        assert!(display.contains("50"));
    }

    #[test]
    fn test_internal_error_is_notifiable() {
        let err = EngineError::internal("leg present with zero size");
        assert!(err.is_notifiable());
    }

    #[test]
    fn test_validation_is_not_notifiable() {
        let err = EngineError::validation("bad input");
        assert!(!err.is_notifiable());
    }
}
