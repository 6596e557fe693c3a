//! Domain types shared across the engine (spec §3 DATA MODEL).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User-defined arbitrage contract for a single symbol.
///
/// `symbol`, `base`, and `quote` are immutable after creation. The invariant
/// `exit_spread_pct < entry_spread_pct` is enforced at construction and on
/// every update (see `arb-engine-pairs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub id: Uuid,
    /// Venue-neutral upper-case symbol, e.g. `BTCUSDT`.
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub entry_spread_pct: Decimal,
    pub exit_spread_pct: Decimal,
    /// Volume per leg, in base-asset units.
    pub volume_asset: Decimal,
    /// Number of parts the open/close sequence is split into.
    pub n_orders: u32,
    /// Stop-loss in quote currency; 0 disables it.
    pub stop_loss_usdt: Decimal,
    pub status: PairStatus,
    pub trades_count: u64,
    pub total_pnl: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairStatus {
    Active,
    Paused,
}

impl PairConfig {
    /// Validates the invariants from spec §3 / §7 Validation kind.
    ///
    /// # Errors
    /// Returns `crate::error::EngineError::Validation` describing the first
    /// violated invariant.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::EngineError;

        if self.symbol.trim().is_empty() {
            return Err(EngineError::validation("symbol must not be empty"));
        }
        if self.symbol != self.symbol.to_uppercase() {
            return Err(EngineError::validation("symbol must be upper-case"));
        }
        if self.entry_spread_pct <= Decimal::ZERO {
            return Err(EngineError::validation("entry_spread_pct must be > 0"));
        }
        if self.exit_spread_pct <= Decimal::ZERO {
            return Err(EngineError::validation("exit_spread_pct must be > 0"));
        }
        if self.exit_spread_pct >= self.entry_spread_pct {
            return Err(EngineError::validation(
                "exit_spread_pct must be strictly less than entry_spread_pct",
            ));
        }
        if self.volume_asset <= Decimal::ZERO {
            return Err(EngineError::validation("volume_asset must be > 0"));
        }
        if self.n_orders < 1 {
            return Err(EngineError::validation("n_orders must be >= 1"));
        }
        if self.stop_loss_usdt < Decimal::ZERO {
            return Err(EngineError::validation("stop_loss_usdt must be >= 0"));
        }
        Ok(())
    }
}

/// Transient per-pair runtime state, owned by the pair's cooperative task.
/// Readable under a read guard by the runtime-snapshot API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairRuntime {
    pub pair_id: Uuid,
    pub state: PairState,
    pub legs: Vec<Leg>,
    pub filled_parts: u32,
    pub current_spread: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub last_update: DateTime<Utc>,
    /// When the current HOLDING position was opened; `None` outside HOLDING/EXITING.
    pub entry_ts: Option<DateTime<Utc>>,
}

impl PairRuntime {
    #[must_use]
    pub fn new(pair_id: Uuid) -> Self {
        Self {
            pair_id,
            state: PairState::Paused,
            legs: Vec::new(),
            filled_parts: 0,
            current_spread: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            last_update: Utc::now(),
            entry_ts: None,
        }
    }

    /// Invariant 1 (spec §8): in HOLDING, exactly two legs on distinct venues
    /// with opposite sides.
    #[must_use]
    pub fn holding_invariant_holds(&self) -> bool {
        if self.state != PairState::Holding {
            return true;
        }
        self.legs.len() == 2
            && self.legs[0].venue != self.legs[1].venue
            && self.legs[0].side != self.legs[1].side
    }

    /// Invariant 2 (spec §8): in PAUSED or READY, zero legs.
    #[must_use]
    pub fn flat_invariant_holds(&self) -> bool {
        if matches!(self.state, PairState::Paused | PairState::Ready) {
            self.legs.is_empty()
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairState {
    Paused,
    Ready,
    Entering,
    Holding,
    Exiting,
    Error,
}

/// One side of an open arbitrage position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    pub venue: String,
    pub side: LegSide,
    /// Quantity-weighted average fill price across parts.
    pub entry_price: Decimal,
    pub current_price: Decimal,
    /// Filled quantity, in base units.
    pub quantity: Decimal,
    pub unrealized_pnl: Decimal,
}

impl Leg {
    #[must_use]
    pub fn mark_to_market(&self, mark_price: Decimal) -> Decimal {
        let direction = match self.side {
            LegSide::Long => Decimal::ONE,
            LegSide::Short => Decimal::NEGATIVE_ONE,
        };
        direction * (mark_price - self.entry_price) * self.quantity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegSide {
    Long,
    Short,
}

impl LegSide {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

/// Deferred config edit, captured when the operator edits an ACTIVE pair
/// while HOLDING/EXITING; applied atomically on the next READY transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfig {
    pub entry_spread_pct: Decimal,
    pub exit_spread_pct: Decimal,
    pub volume_asset: Decimal,
    pub n_orders: u32,
    pub stop_loss_usdt: Decimal,
}

/// A configured venue connection.
///
/// `encrypted_*` fields are opaque ciphertext blobs produced by
/// `arb-engine-vault`; plaintext credentials live only inside the active
/// adapter instance and are never returned from repository or registry reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeAccount {
    pub name: String,
    pub encrypted_api_key: String,
    pub encrypted_secret: String,
    pub encrypted_passphrase: Option<String>,
    pub connected: bool,
    pub balance_usdt: Decimal,
    pub last_error: Option<String>,
}

/// Venue-reported error, distinguishable from a generic transport error.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("venue error [{venue}] {code}: {message}")]
pub struct ExchangeError {
    pub venue: String,
    pub code: String,
    pub message: String,
}

/// Last-seen tick for a `(venue, symbol)` pair. Monotonically replaced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub ts: DateTime<Utc>,
}

impl Ticker {
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now.signed_duration_since(self.ts) > threshold
    }
}

/// Persistence-only row types, owned by the (out-of-scope) repository
/// collaborator and defined here only as the shared contract shape (spec §6).
pub mod persistence {
    use super::{Decimal, DateTime, Utc, Uuid};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct OrderRecord {
        pub id: Uuid,
        pub pair_id: Uuid,
        pub venue: String,
        pub side: super::LegSide,
        pub qty: Decimal,
        pub avg_fill_price: Decimal,
        pub status: OrderStatus,
        pub placed_at: DateTime<Utc>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum OrderStatus {
        Filled,
        Partial,
        Rejected,
        Cancelled,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Notification {
        pub id: Uuid,
        pub pair_id: Option<Uuid>,
        pub kind: NotificationKind,
        pub severity: Severity,
        pub message: String,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum NotificationKind {
        Open,
        Close,
        Sl,
        Liquidation,
        Error,
        Margin,
        Pause,
        SecondLegFail,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum Severity {
        Info,
        Warn,
        Error,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Trade {
        pub id: Uuid,
        pub pair_id: Uuid,
        pub symbol: String,
        pub venue_long: String,
        pub venue_short: String,
        pub entry_ts: DateTime<Utc>,
        pub exit_ts: DateTime<Utc>,
        pub realized_pnl: Decimal,
        pub was_stop_loss: bool,
        pub was_liquidation: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlacklistEntry {
        pub symbol: String,
        pub reason: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct NotificationPreferences {
        pub open: bool,
        pub close: bool,
        pub sl: bool,
        pub liquidation: bool,
        pub error: bool,
        pub margin: bool,
        pub pause: bool,
        pub second_leg_fail: bool,
    }

    impl Default for NotificationPreferences {
        fn default() -> Self {
            Self {
                open: true,
                close: true,
                sl: true,
                liquidation: true,
                error: true,
                margin: true,
                pause: true,
                second_leg_fail: true,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Settings {
        pub notification_prefs: NotificationPreferences,
        pub consider_funding: bool,
        pub max_concurrent_trades: Option<u32>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                notification_prefs: NotificationPreferences::default(),
                consider_funding: false,
                max_concurrent_trades: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> PairConfig {
        PairConfig {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            entry_spread_pct: dec!(0.50),
            exit_spread_pct: dec!(0.10),
            volume_asset: dec!(0.01),
            n_orders: 1,
            stop_loss_usdt: Decimal::ZERO,
            status: PairStatus::Paused,
            trades_count: 0,
            total_pnl: Decimal::ZERO,
        }
    }

    #[test]
    fn test_valid_pair_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_exit_must_be_strictly_less_than_entry() {
        let mut config = base_config();
        config.exit_spread_pct = config.entry_spread_pct;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_volume_rejected() {
        let mut config = base_config();
        config.volume_asset = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lowercase_symbol_rejected() {
        let mut config = base_config();
        config.symbol = "btcusdt".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_holding_invariant_requires_two_opposite_legs() {
        let mut runtime = PairRuntime::new(Uuid::new_v4());
        runtime.state = PairState::Holding;
        assert!(!runtime.holding_invariant_holds());
        runtime.legs.push(Leg {
            venue: "bybit".to_string(),
            side: LegSide::Long,
            entry_price: dec!(100),
            current_price: dec!(100),
            quantity: dec!(0.01),
            unrealized_pnl: Decimal::ZERO,
        });
        runtime.legs.push(Leg {
            venue: "bitget".to_string(),
            side: LegSide::Short,
            entry_price: dec!(100.6),
            current_price: dec!(100.6),
            quantity: dec!(0.01),
            unrealized_pnl: Decimal::ZERO,
        });
        assert!(runtime.holding_invariant_holds());
    }

    #[test]
    fn test_flat_invariant_requires_zero_legs() {
        let mut runtime = PairRuntime::new(Uuid::new_v4());
        runtime.state = PairState::Ready;
        assert!(runtime.flat_invariant_holds());
        runtime.legs.push(Leg {
            venue: "okx".to_string(),
            side: LegSide::Long,
            entry_price: dec!(100),
            current_price: dec!(100),
            quantity: dec!(0.01),
            unrealized_pnl: Decimal::ZERO,
        });
        assert!(!runtime.flat_invariant_holds());
    }

    #[test]
    fn test_leg_mark_to_market_long() {
        let leg = Leg {
            venue: "bybit".to_string(),
            side: LegSide::Long,
            entry_price: dec!(100),
            current_price: dec!(105),
            quantity: dec!(0.01),
            unrealized_pnl: Decimal::ZERO,
        };
        assert_eq!(leg.mark_to_market(dec!(105)), dec!(0.05));
    }

    #[test]
    fn test_leg_mark_to_market_short() {
        let leg = Leg {
            venue: "bitget".to_string(),
            side: LegSide::Short,
            entry_price: dec!(100),
            current_price: dec!(95),
            quantity: dec!(0.01),
            unrealized_pnl: Decimal::ZERO,
        };
        assert_eq!(leg.mark_to_market(dec!(95)), dec!(0.05));
    }

    #[test]
    fn test_ticker_mid_and_staleness() {
        let ticker = Ticker {
            bid: dec!(100.0),
            ask: dec!(100.2),
            last: dec!(100.1),
            ts: Utc::now() - chrono::Duration::seconds(10),
        };
        assert_eq!(ticker.mid(), dec!(100.1));
        assert!(ticker.is_stale(Utc::now(), chrono::Duration::seconds(5)));
        assert!(!ticker.is_stale(Utc::now(), chrono::Duration::seconds(20)));
    }
}
