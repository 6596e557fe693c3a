//! Order Executor (spec §4.8): the two-leg, N-part open sequence, the
//! second-leg-failure compensation protocol, and the losing-leg-first close
//! sequence. Parts within one pair execute strictly serially — this crate
//! never spawns concurrent orders for the same pair.

use arb_engine_core::adapter::OrderResult;
use arb_engine_core::error::{EngineError, Result};
use arb_engine_core::model::{Leg, LegSide};
use arb_engine_registry::ExchangeRegistry;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Outcome of the full N-part open sequence.
#[derive(Debug, Clone)]
pub enum OpenOutcome {
    /// Every part filled on both legs.
    Complete { long_leg: Leg, short_leg: Leg },
    /// The long leg rejected or filled zero on some part before any short
    /// order was placed for it; no compensation is needed.
    StoppedEarly {
        filled_parts: u32,
        legs: Option<(Leg, Leg)>,
    },
    /// The short leg failed after the long leg filled; compensation closed
    /// the stray long fill. The pair may return to READY.
    CompensatedPartial {
        filled_parts: u32,
        legs: Option<(Leg, Leg)>,
    },
    /// Compensation itself failed; the pair must enter ERROR and a
    /// `SECOND_LEG_FAIL` notification is warranted.
    UncompensatedPartial {
        filled_parts: u32,
        legs: Option<(Leg, Leg)>,
        compensation_error: String,
    },
}

/// A fill-size mismatch between the two legs of a part that exceeds either
/// venue's quantity step (spec §4.8 fill reconciliation).
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationMismatch {
    pub long_qty: Decimal,
    pub short_qty: Decimal,
}

pub struct OrderExecutor {
    registry: Arc<ExchangeRegistry>,
}

impl OrderExecutor {
    #[must_use]
    pub fn new(registry: Arc<ExchangeRegistry>) -> Self {
        Self { registry }
    }

    fn accumulate(leg: Option<Leg>, venue: &str, side: LegSide, fill_qty: Decimal, fill_price: Decimal) -> Leg {
        match leg {
            None => Leg {
                venue: venue.to_string(),
                side,
                entry_price: fill_price,
                current_price: fill_price,
                quantity: fill_qty,
                unrealized_pnl: Decimal::ZERO,
            },
            Some(existing) => {
                let total_qty = existing.quantity + fill_qty;
                let weighted_avg = if total_qty.is_zero() {
                    existing.entry_price
                } else {
                    (existing.entry_price * existing.quantity + fill_price * fill_qty) / total_qty
                };
                Leg {
                    venue: existing.venue,
                    side: existing.side,
                    entry_price: weighted_avg,
                    current_price: fill_price,
                    quantity: total_qty,
                    unrealized_pnl: Decimal::ZERO,
                }
            }
        }
    }

    /// Runs the open sequence for `n_orders` parts of `volume_asset / n_orders`
    /// each, on `(long_venue, short_venue)` determined by the caller's spread
    /// snapshot (spec §4.7 READY semantics).
    ///
    /// # Errors
    /// Returns `Margin` if the preflight check fails before any order is
    /// placed (the transition is aborted with no side effects), or a `Venue`
    /// error if either adapter is not connected.
    pub async fn open(
        &self,
        symbol: &str,
        long_venue: &str,
        short_venue: &str,
        volume_asset: Decimal,
        n_orders: u32,
        reference_price: Decimal,
        safety_margin: Decimal,
    ) -> Result<OpenOutcome> {
        let long_adapter = self
            .registry
            .get_adapter(long_venue)
            .await
            .ok_or_else(|| EngineError::venue(long_venue, "not connected", false))?;
        let short_adapter = self
            .registry
            .get_adapter(short_venue)
            .await
            .ok_or_else(|| EngineError::venue(short_venue, "not connected", false))?;

        let qty_per_part = volume_asset / Decimal::from(n_orders);

        let (long_balance, short_balance) = (
            long_adapter.get_balance().await?,
            short_adapter.get_balance().await?,
        );
        arb_engine_risk::margin_preflight(reference_price, qty_per_part, safety_margin, long_balance)?;
        arb_engine_risk::margin_preflight(reference_price, qty_per_part, safety_margin, short_balance)?;

        let (long_limits, short_limits) = (
            long_adapter.get_limits(symbol).await?,
            short_adapter.get_limits(symbol).await?,
        );
        let long_qty_per_part =
            arb_engine_risk::validate_order_size(&long_limits, reference_price, qty_per_part)?;
        arb_engine_risk::validate_order_size(&short_limits, reference_price, qty_per_part)?;

        let mut long_leg: Option<Leg> = None;
        let mut short_leg: Option<Leg> = None;
        let mut filled_parts = 0u32;

        for _ in 0..n_orders {
            let long_fill = long_adapter
                .place_market_order(symbol, LegSide::Long, long_qty_per_part)
                .await?;
            if !long_fill.is_filled_at_all() {
                return Ok(OpenOutcome::StoppedEarly {
                    filled_parts,
                    legs: long_leg.zip(short_leg),
                });
            }

            let short_qty = short_limits.round_down_to_step(long_fill.filled_qty);
            let short_fill = short_adapter
                .place_market_order(symbol, LegSide::Short, short_qty)
                .await?;

            if !short_fill.is_filled_at_all() {
                tracing::warn!(
                    symbol,
                    long_venue,
                    short_venue,
                    qty = %long_fill.filled_qty,
                    "second-leg failure, attempting compensation"
                );
                return match long_adapter
                    .close_position(symbol, LegSide::Long, long_fill.filled_qty)
                    .await
                {
                    Ok(_) => Ok(OpenOutcome::CompensatedPartial {
                        filled_parts,
                        legs: long_leg.zip(short_leg),
                    }),
                    Err(err) => Ok(OpenOutcome::UncompensatedPartial {
                        filled_parts,
                        legs: long_leg.zip(short_leg),
                        compensation_error: err.to_string(),
                    }),
                };
            }

            check_reconciliation(&long_fill, &short_fill);

            long_leg = Some(Self::accumulate(
                long_leg,
                long_venue,
                LegSide::Long,
                long_fill.filled_qty,
                long_fill.avg_fill_price,
            ));
            short_leg = Some(Self::accumulate(
                short_leg,
                short_venue,
                LegSide::Short,
                short_fill.filled_qty,
                short_fill.avg_fill_price,
            ));
            filled_parts += 1;
        }

        let long_leg = long_leg.expect("at least one part filled when n_orders >= 1");
        let short_leg = short_leg.expect("at least one part filled when n_orders >= 1");
        Ok(OpenOutcome::Complete { long_leg, short_leg })
    }

    /// Closes both legs with a full-quantity reduce-only market order,
    /// closing the losing leg first (spec §4.8 close sequence).
    ///
    /// # Errors
    /// Returns the first adapter error encountered; the caller decides how to
    /// retry or surface a partial close.
    pub async fn close(&self, symbol: &str, long_leg: &Leg, short_leg: &Leg) -> Result<(OrderResult, OrderResult)> {
        let (first, second) = Self::close_order(long_leg, short_leg);

        let first_adapter = self
            .registry
            .get_adapter(&first.venue)
            .await
            .ok_or_else(|| EngineError::venue(&first.venue, "not connected", false))?;
        let first_result = first_adapter
            .close_position(symbol, first.side, first.quantity)
            .await?;

        let second_adapter = self
            .registry
            .get_adapter(&second.venue)
            .await
            .ok_or_else(|| EngineError::venue(&second.venue, "not connected", false))?;
        let second_result = second_adapter
            .close_position(symbol, second.side, second.quantity)
            .await?;

        if first.venue == long_leg.venue {
            Ok((first_result, second_result))
        } else {
            Ok((second_result, first_result))
        }
    }

    /// Orders the two legs so the losing one (more negative unrealized PNL)
    /// closes first; ties break by lexical venue order.
    fn close_order<'a>(long_leg: &'a Leg, short_leg: &'a Leg) -> (&'a Leg, &'a Leg) {
        const NEAR_ZERO: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

        let diff = long_leg.unrealized_pnl - short_leg.unrealized_pnl;
        if diff.abs() <= NEAR_ZERO {
            if long_leg.venue <= short_leg.venue {
                (long_leg, short_leg)
            } else {
                (short_leg, long_leg)
            }
        } else if long_leg.unrealized_pnl < short_leg.unrealized_pnl {
            (long_leg, short_leg)
        } else {
            (short_leg, long_leg)
        }
    }
}

/// Logs (and signals, via the returned mismatch) a fill-size gap between the
/// two legs of one part; the caller turns this into a `MARGIN` notification
/// when it exceeds either venue's quantity step.
fn check_reconciliation(long_fill: &OrderResult, short_fill: &OrderResult) -> Option<ReconciliationMismatch> {
    if long_fill.filled_qty != short_fill.filled_qty {
        tracing::warn!(
            long_qty = %long_fill.filled_qty,
            short_qty = %short_fill.filled_qty,
            "leg fill-size mismatch"
        );
        Some(ReconciliationMismatch {
            long_qty: long_fill.filled_qty,
            short_qty: short_fill.filled_qty,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_engine_core::adapter::OrderStatus;
    use rust_decimal_macros::dec;

    fn filled(qty: Decimal, price: Decimal) -> OrderResult {
        OrderResult {
            id: "1".to_string(),
            filled_qty: qty,
            avg_fill_price: price,
            status: OrderStatus::Filled,
        }
    }

    #[test]
    fn accumulate_first_fill_sets_entry_price() {
        let leg = OrderExecutor::accumulate(None, "bybit", LegSide::Long, dec!(0.01), dec!(100));
        assert_eq!(leg.entry_price, dec!(100));
        assert_eq!(leg.quantity, dec!(0.01));
    }

    #[test]
    fn accumulate_second_fill_computes_weighted_average() {
        let first = OrderExecutor::accumulate(None, "bybit", LegSide::Long, dec!(1), dec!(100));
        let second = OrderExecutor::accumulate(Some(first), "bybit", LegSide::Long, dec!(1), dec!(110));
        assert_eq!(second.entry_price, dec!(105));
        assert_eq!(second.quantity, dec!(2));
    }

    #[test]
    fn reconciliation_flags_mismatched_fills() {
        let long_fill = filled(dec!(1.0), dec!(100));
        let short_fill = filled(dec!(0.98), dec!(100));
        assert!(check_reconciliation(&long_fill, &short_fill).is_some());
    }

    #[test]
    fn reconciliation_allows_matching_fills() {
        let long_fill = filled(dec!(1.0), dec!(100));
        let short_fill = filled(dec!(1.0), dec!(100));
        assert!(check_reconciliation(&long_fill, &short_fill).is_none());
    }

    fn leg(venue: &str, side: LegSide, pnl: Decimal) -> Leg {
        Leg {
            venue: venue.to_string(),
            side,
            entry_price: dec!(100),
            current_price: dec!(100),
            quantity: dec!(1),
            unrealized_pnl: pnl,
        }
    }

    #[test]
    fn close_order_picks_losing_leg_first() {
        let long_leg = leg("bybit", LegSide::Long, dec!(-5));
        let short_leg = leg("bitget", LegSide::Short, dec!(2));
        let (first, _) = OrderExecutor::close_order(&long_leg, &short_leg);
        assert_eq!(first.venue, "bybit");
    }

    #[test]
    fn close_order_breaks_ties_lexically() {
        let long_leg = leg("okx", LegSide::Long, dec!(0));
        let short_leg = leg("bitget", LegSide::Short, dec!(0));
        let (first, _) = OrderExecutor::close_order(&long_leg, &short_leg);
        assert_eq!(first.venue, "bitget");
    }
}
