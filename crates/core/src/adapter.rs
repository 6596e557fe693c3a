//! The venue adapter contract (spec §4.1).
//!
//! Every concrete venue (bybit, bitget, okx, gate, htx, bingx) implements
//! this trait; the rest of the engine depends only on it, never on a
//! concrete venue type, so adapters are stored as `Arc<dyn ExchangeAdapter>`.

use crate::error::Result;
use crate::model::LegSide;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Filled,
    Partial,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub id: String,
    pub filled_qty: Decimal,
    pub avg_fill_price: Decimal,
    pub status: OrderStatus,
}

impl OrderResult {
    #[must_use]
    pub fn is_filled_at_all(&self) -> bool {
        matches!(self.status, OrderStatus::Filled | OrderStatus::Partial) && self.filled_qty > Decimal::ZERO
    }
}

#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub symbol: String,
    pub side: LegSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub leverage: Decimal,
    pub unrealized_pnl: Decimal,
    pub liquidation_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct PriceLevel {
    pub price: Decimal,
    pub qty: Decimal,
}

#[derive(Debug, Clone)]
pub struct OrderBook {
    /// Descending by price.
    pub bids: Vec<PriceLevel>,
    /// Ascending by price.
    pub asks: Vec<PriceLevel>,
}

/// Instrument trading limits (spec §4.1 `GetLimits`).
#[derive(Debug, Clone, Copy)]
pub struct VenueLimits {
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub qty_step: Decimal,
    pub min_notional: Decimal,
    pub price_step: Decimal,
    pub max_leverage: Decimal,
}

impl VenueLimits {
    /// Generous defaults, suitable when a venue's public instrument endpoint
    /// is unavailable in a test double.
    #[must_use]
    pub fn default_perp() -> Self {
        Self {
            min_qty: Decimal::new(1, 3),
            max_qty: Decimal::new(1_000_000, 0),
            qty_step: Decimal::new(1, 3),
            min_notional: Decimal::new(5, 0),
            price_step: Decimal::new(1, 2),
            max_leverage: Decimal::new(20, 0),
        }
    }

    /// Rounds `qty` down to the nearest `qty_step`.
    #[must_use]
    pub fn round_down_to_step(&self, qty: Decimal) -> Decimal {
        if self.qty_step <= Decimal::ZERO {
            return qty;
        }
        (qty / self.qty_step).trunc() * self.qty_step
    }
}

pub type TickerCallback = Box<dyn Fn(Ticker) + Send + Sync>;
pub type PositionCallback = Box<dyn Fn(OpenPosition) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    pub symbol_index: u32,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
}

/// Uniform capability set every venue adapter implements (spec §4.1).
#[async_trait]
pub trait ExchangeAdapter: Send + Sync + fmt::Debug {
    /// Stable venue identifier, e.g. `"bybit"`.
    fn name(&self) -> &str;

    /// Validates credentials via a balance probe; returns failure without
    /// partial state (no socket/task left dangling on error).
    async fn connect(&self, api_key: &str, secret: &str, passphrase: Option<&str>) -> Result<()>;

    /// Equity in quote currency (USDT).
    async fn get_balance(&self) -> Result<Decimal>;

    /// Fails with a `NotFound`-style error when the instrument is absent.
    async fn get_ticker(&self, symbol: &str) -> Result<crate::model::Ticker>;

    async fn get_order_book(&self, symbol: &str, depth: u32) -> Result<OrderBook>;

    /// Immediate-or-cancel market order.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: LegSide,
        qty: Decimal,
    ) -> Result<OrderResult>;

    async fn get_open_positions(&self) -> Result<Vec<OpenPosition>>;

    /// Reduce-only market order on the opposite side.
    async fn close_position(&self, symbol: &str, side: LegSide, qty: Decimal) -> Result<OrderResult>;

    /// Registers a ticker callback; delivery happens under a read lock on
    /// the adapter's callback table and must never block on the caller.
    fn subscribe_ticker(&self, symbol: &str, callback: TickerCallback);

    fn subscribe_positions(&self, callback: PositionCallback);

    async fn get_trading_fee(&self, symbol: &str) -> Result<Decimal>;

    async fn get_limits(&self, symbol: &str) -> Result<VenueLimits>;

    /// Idempotent release of sockets and tasks.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_result_is_filled_at_all() {
        let filled = OrderResult {
            id: "1".to_string(),
            filled_qty: dec!(0.01),
            avg_fill_price: dec!(100),
            status: OrderStatus::Filled,
        };
        assert!(filled.is_filled_at_all());

        let rejected = OrderResult {
            id: "2".to_string(),
            filled_qty: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            status: OrderStatus::Rejected,
        };
        assert!(!rejected.is_filled_at_all());
    }

    #[test]
    fn test_round_down_to_step() {
        let limits = VenueLimits::default_perp();
        let rounded = limits.round_down_to_step(dec!(0.0127));
        assert_eq!(rounded, dec!(0.012));
    }

    #[test]
    fn test_round_down_to_step_exact_multiple() {
        let limits = VenueLimits {
            qty_step: dec!(0.01),
            ..VenueLimits::default_perp()
        };
        assert_eq!(limits.round_down_to_step(dec!(0.05)), dec!(0.05));
    }
}
