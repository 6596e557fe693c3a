//! Risk Manager & Monitor (spec §4.9): the pure stop-loss/liquidation/margin/
//! limit checks, plus a 500ms sweep over every HOLDING pair.
//!
//! The sweep needs the live set of HOLDING pairs, which only the engine
//! supervisor owns; rather than depend on the engine crate (and create a
//! cycle), the sweep is driven through the `RiskObserver` trait the
//! supervisor implements — the same dependency-inversion shape as the
//! repository traits in `arb-engine-core`.

use arb_engine_core::adapter::{OpenPosition, VenueLimits};
use arb_engine_core::error::{EngineError, Result};
use arb_engine_core::model::LegSide;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Sweep cadence for the HOLDING monitor (spec §4.9, §5).
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    Liquidation,
}

/// What the monitor needs to know about one HOLDING pair on each sweep.
#[derive(Debug, Clone, Copy)]
pub struct HoldingSnapshot {
    pub pair_id: Uuid,
    pub unrealized_pnl: Decimal,
    pub stop_loss_usdt: Decimal,
}

#[async_trait::async_trait]
pub trait RiskObserver: Send + Sync {
    /// Every pair currently in the HOLDING state.
    async fn holding_snapshots(&self) -> Vec<HoldingSnapshot>;
    /// Called once per pair whose exit condition has tripped; the observer
    /// owns the actual EXITING transition and notification emission.
    async fn signal_exit(&self, pair_id: Uuid, reason: ExitReason);
}

/// Returns `true` when a pair's unrealized PNL has crossed its configured
/// stop-loss (spec §4.9: `stop_loss_usdt > 0 && unrealized_pnl <= -stop_loss_usdt`).
#[must_use]
pub fn stop_loss_triggered(stop_loss_usdt: Decimal, unrealized_pnl: Decimal) -> bool {
    stop_loss_usdt > Decimal::ZERO && unrealized_pnl <= -stop_loss_usdt
}

/// Returns `true` when a position-update callback reports liquidation: the
/// size dropped to zero while a position was expected open, or the mark
/// price has crossed the venue's reported liquidation price.
#[must_use]
pub fn liquidation_triggered(position: &OpenPosition, expected_open: bool) -> bool {
    if expected_open && position.size.is_zero() {
        return true;
    }
    match position.side {
        LegSide::Long => position.mark_price <= position.liquidation_price,
        LegSide::Short => position.mark_price >= position.liquidation_price,
    }
}

/// Preflight margin check before an ENTERING transition (spec §4.9): the
/// required notional for one part, inflated by `safety_margin`, must not
/// exceed the venue's equity.
///
/// # Errors
/// Returns `EngineError::Margin` carrying the required/available amounts.
pub fn margin_preflight(price: Decimal, qty_per_part: Decimal, safety_margin: Decimal, equity: Decimal) -> Result<Decimal> {
    let required = price * qty_per_part * (Decimal::ONE + safety_margin);
    if equity < required {
        return Err(EngineError::margin(required, equity));
    }
    Ok(required)
}

/// Validates and rounds an order quantity against a venue's instrument
/// limits (spec §4.9 limit validation): rounds down to `qty_step`, rejects
/// if the rounded quantity falls outside `[min_qty, max_qty]` or its notional
/// (at `price`) is below `min_notional`.
///
/// # Errors
/// Returns `EngineError::Limit` describing the violated bound.
pub fn validate_order_size(limits: &VenueLimits, price: Decimal, qty: Decimal) -> Result<Decimal> {
    let rounded = limits.round_down_to_step(qty);
    if rounded < limits.min_qty {
        return Err(EngineError::limit(format!(
            "qty {rounded} below min_qty {}",
            limits.min_qty
        )));
    }
    if rounded > limits.max_qty {
        return Err(EngineError::limit(format!(
            "qty {rounded} above max_qty {}",
            limits.max_qty
        )));
    }
    let notional = rounded * price;
    if notional < limits.min_notional {
        return Err(EngineError::limit(format!(
            "notional {notional} below min_notional {} after rounding to step",
            limits.min_notional
        )));
    }
    Ok(rounded)
}

/// Periodic sweep of every HOLDING pair, checking the stop-loss condition
/// (liquidation is event-driven off the position-update callback and does
/// not wait for this cadence).
pub struct RiskMonitor {
    observer: Arc<dyn RiskObserver>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RiskMonitor {
    #[must_use]
    pub fn new(observer: Arc<dyn RiskObserver>) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                observer,
                shutdown_rx,
            },
            shutdown_tx,
        )
    }

    /// Runs the sweep loop until the shutdown signal fires. Intended to be
    /// spawned as its own task by the engine supervisor.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep_once().await,
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        tracing::info!("risk monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn sweep_once(&self) {
        for snapshot in self.observer.holding_snapshots().await {
            if stop_loss_triggered(snapshot.stop_loss_usdt, snapshot.unrealized_pnl) {
                tracing::warn!(
                    pair_id = %snapshot.pair_id,
                    pnl = %snapshot.unrealized_pnl,
                    stop_loss = %snapshot.stop_loss_usdt,
                    "stop-loss triggered"
                );
                self.observer
                    .signal_exit(snapshot.pair_id, ExitReason::StopLoss)
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_engine_core::adapter::VenueLimits;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[test]
    fn stop_loss_not_triggered_when_disabled() {
        assert!(!stop_loss_triggered(Decimal::ZERO, dec!(-1000)));
    }

    #[test]
    fn stop_loss_triggered_at_threshold() {
        assert!(stop_loss_triggered(dec!(50), dec!(-50)));
    }

    #[test]
    fn stop_loss_not_triggered_above_threshold() {
        assert!(!stop_loss_triggered(dec!(50), dec!(-10)));
    }

    fn position(side: LegSide, size: Decimal, mark: Decimal, liq: Decimal) -> OpenPosition {
        OpenPosition {
            symbol: "BTCUSDT".to_string(),
            side,
            size,
            entry_price: dec!(100),
            mark_price: mark,
            leverage: dec!(10),
            unrealized_pnl: Decimal::ZERO,
            liquidation_price: liq,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn liquidation_triggered_on_unexpected_zero_size() {
        let pos = position(LegSide::Long, Decimal::ZERO, dec!(100), dec!(80));
        assert!(liquidation_triggered(&pos, true));
    }

    #[test]
    fn liquidation_triggered_when_long_mark_crosses_below() {
        let pos = position(LegSide::Long, dec!(1), dec!(79), dec!(80));
        assert!(liquidation_triggered(&pos, true));
    }

    #[test]
    fn liquidation_not_triggered_when_long_mark_above_liq() {
        let pos = position(LegSide::Long, dec!(1), dec!(90), dec!(80));
        assert!(!liquidation_triggered(&pos, true));
    }

    #[test]
    fn liquidation_triggered_when_short_mark_crosses_above() {
        let pos = position(LegSide::Short, dec!(1), dec!(121), dec!(120));
        assert!(liquidation_triggered(&pos, true));
    }

    #[test]
    fn margin_preflight_rejects_insufficient_equity() {
        let result = margin_preflight(dec!(100), dec!(1), dec!(0.1), dec!(50));
        assert!(result.is_err());
    }

    #[test]
    fn margin_preflight_accepts_sufficient_equity() {
        let result = margin_preflight(dec!(100), dec!(1), dec!(0.1), dec!(200));
        assert!(result.is_ok());
    }

    #[test]
    fn validate_order_size_rounds_down_to_step() {
        let limits = VenueLimits {
            min_qty: dec!(0.001),
            max_qty: dec!(1000),
            qty_step: dec!(0.01),
            min_notional: dec!(5),
            price_step: dec!(0.01),
            max_leverage: dec!(20),
        };
        let rounded = validate_order_size(&limits, dec!(100), dec!(0.017)).unwrap();
        assert_eq!(rounded, dec!(0.01));
    }

    #[test]
    fn validate_order_size_rejects_when_rounded_notional_too_small() {
        let limits = VenueLimits {
            min_qty: dec!(0.0001),
            max_qty: dec!(1000),
            qty_step: dec!(0.0001),
            min_notional: dec!(5),
            price_step: dec!(0.01),
            max_leverage: dec!(20),
        };
        let result = validate_order_size(&limits, dec!(100), dec!(0.0001));
        assert!(result.is_err());
    }

    struct FakeObserver {
        snapshots: Vec<HoldingSnapshot>,
        exits: Arc<Mutex<Vec<(Uuid, ExitReason)>>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RiskObserver for FakeObserver {
        async fn holding_snapshots(&self) -> Vec<HoldingSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.snapshots.clone()
        }

        async fn signal_exit(&self, pair_id: Uuid, reason: ExitReason) {
            self.exits.lock().await.push((pair_id, reason));
        }
    }

    #[tokio::test]
    async fn sweep_once_signals_exit_for_tripped_pairs() {
        let pair_id = Uuid::new_v4();
        let exits = Arc::new(Mutex::new(Vec::new()));
        let observer = Arc::new(FakeObserver {
            snapshots: vec![HoldingSnapshot {
                pair_id,
                unrealized_pnl: dec!(-60),
                stop_loss_usdt: dec!(50),
            }],
            exits: Arc::clone(&exits),
            calls: AtomicUsize::new(0),
        });
        let (monitor, _tx) = RiskMonitor::new(observer);
        monitor.sweep_once().await;
        let seen = exits.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (pair_id, ExitReason::StopLoss));
    }
}
