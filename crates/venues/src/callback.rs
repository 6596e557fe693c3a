//! Adapter-internal callback table (spec §4.1, §9 Callback re-entrancy).
//!
//! Callbacks are invoked under a read lock and must not block or call back
//! into the adapter; the Price Tracker write is the only synchronous action
//! permitted on this hot path.

use arb_engine_core::adapter::{OpenPosition, PositionCallback, Ticker, TickerCallback};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct CallbackTable {
    ticker_callbacks: RwLock<HashMap<String, TickerCallback>>,
    position_callbacks: RwLock<Vec<PositionCallback>>,
}

impl CallbackTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_ticker(&self, symbol: &str, callback: TickerCallback) {
        self.ticker_callbacks
            .write()
            .insert(symbol.to_string(), callback);
    }

    pub fn register_position(&self, callback: PositionCallback) {
        self.position_callbacks.write().push(callback);
    }

    /// Invoked from the reader task on every decoded ticker message.
    pub fn dispatch_ticker(&self, symbol: &str, ticker: Ticker) {
        let table = self.ticker_callbacks.read();
        if let Some(cb) = table.get(symbol) {
            cb(ticker);
        }
    }

    /// Invoked from the reader task on every decoded position message.
    pub fn dispatch_position(&self, position: OpenPosition) {
        let table = self.position_callbacks.read();
        for cb in table.iter() {
            cb(position.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_dispatch_ticker_invokes_registered_callback() {
        let table = CallbackTable::new();
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = Arc::clone(&seen);
        table.register_ticker(
            "BTCUSDT",
            Box::new(move |_ticker| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        table.dispatch_ticker(
            "BTCUSDT",
            Ticker {
                symbol_index: 0,
                bid: dec!(100),
                ask: dec!(100.1),
                last: dec!(100.05),
            },
        );
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_ticker_for_unregistered_symbol_is_noop() {
        let table = CallbackTable::new();
        table.dispatch_ticker(
            "ETHUSDT",
            Ticker {
                symbol_index: 0,
                bid: dec!(10),
                ask: dec!(10.1),
                last: dec!(10.05),
            },
        );
    }

    #[test]
    fn test_dispatch_position_invokes_all_registered_callbacks() {
        let table = CallbackTable::new();
        let seen = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let seen_clone = Arc::clone(&seen);
            table.register_position(Box::new(move |_position| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }));
        }
        table.dispatch_position(OpenPosition {
            symbol: "BTCUSDT".to_string(),
            side: arb_engine_core::LegSide::Long,
            size: dec!(0.01),
            entry_price: dec!(100),
            mark_price: dec!(101),
            leverage: dec!(5),
            unrealized_pnl: dec!(0.01),
            liquidation_price: dec!(80),
            updated_at: chrono::Utc::now(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
