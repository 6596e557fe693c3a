//! Stats Aggregator (spec §4.11): records completed trades and serves the
//! aggregate snapshot (totals, today/week/month windows, top-5 pairs,
//! stop-loss/liquidation tails) consumed by the dashboard broadcaster.

use arb_engine_core::broadcaster::{Broadcaster, StatsSnapshot};
use arb_engine_core::model::persistence::Trade;
use arb_engine_core::repository::{PairRepository, TradeRepository};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

const TOP_N: usize = 5;
/// How far back `get_trades_in_time_range` is swept to find the SL/liquidation
/// tails; the trait has no dedicated filter, so this bounds the scan.
const EVENT_TAIL_LOOKBACK: ChronoDuration = ChronoDuration::days(90);
const EVENT_TAIL_LEN: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    pub trades: u64,
    pub pnl: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct AggregateSnapshot {
    pub total_trades: u64,
    pub total_pnl: Decimal,
    pub today: WindowStats,
    pub week: WindowStats,
    pub month: WindowStats,
    pub top_pairs_by_trades: Vec<(Uuid, u64)>,
    pub top_pairs_by_profit: Vec<(Uuid, Decimal)>,
    pub top_pairs_by_loss: Vec<(Uuid, Decimal)>,
    pub recent_stop_losses: Vec<Trade>,
    pub recent_liquidations: Vec<Trade>,
}

pub struct StatsAggregator {
    trades: Arc<dyn TradeRepository>,
    pairs: Arc<dyn PairRepository>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl StatsAggregator {
    #[must_use]
    pub fn new(
        trades: Arc<dyn TradeRepository>,
        pairs: Arc<dyn PairRepository>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            trades,
            pairs,
            broadcaster,
        }
    }

    /// Records a completed round-trip: appends the trade row, rolls the
    /// owning pair's counters, and broadcasts the refreshed snapshot.
    ///
    /// # Errors
    /// Propagates the first repository failure; the trade row is appended
    /// before the pair counters are rolled, so a failure here may leave the
    /// pair's `trades_count`/`total_pnl` one trade behind until retried.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_trade_completion(
        &self,
        pair_id: Uuid,
        symbol: &str,
        venue_long: &str,
        venue_short: &str,
        entry_ts: DateTime<Utc>,
        exit_ts: DateTime<Utc>,
        realized_pnl: Decimal,
        was_stop_loss: bool,
        was_liquidation: bool,
    ) -> arb_engine_core::error::Result<AggregateSnapshot> {
        let trade = Trade {
            id: Uuid::new_v4(),
            pair_id,
            symbol: symbol.to_string(),
            venue_long: venue_long.to_string(),
            venue_short: venue_short.to_string(),
            entry_ts,
            exit_ts,
            realized_pnl,
            was_stop_loss,
            was_liquidation,
        };
        self.trades.record_trade(trade).await?;
        self.pairs.increment_trades(pair_id).await?;
        self.pairs.update_pnl(pair_id, realized_pnl).await?;

        let snapshot = self.snapshot().await?;
        self.broadcaster
            .broadcast_stats_update(StatsSnapshot {
                total_trades: snapshot.total_trades,
                total_pnl: snapshot.total_pnl,
            })
            .await;
        Ok(snapshot)
    }

    /// Builds the full aggregate snapshot as of now.
    ///
    /// # Errors
    /// Propagates the first repository failure encountered.
    pub async fn snapshot(&self) -> arb_engine_core::error::Result<AggregateSnapshot> {
        let now = Utc::now();
        let total_trades = self.trades.count().await? as u64;
        let total_pnl = self
            .pairs
            .get_all()
            .await?
            .iter()
            .fold(Decimal::ZERO, |acc, pair| acc + pair.total_pnl);

        let today = self.window_stats(today_start(now), now).await?;
        let week = self.window_stats(now - ChronoDuration::days(7), now).await?;
        let month = self.window_stats(now - ChronoDuration::days(30), now).await?;

        let top_pairs_by_trades = self.trades.get_top_pairs_by_trades(TOP_N).await?;
        let top_pairs_by_profit = self.trades.get_top_pairs_by_profit(TOP_N).await?;
        let top_pairs_by_loss = self.trades.get_top_pairs_by_loss(TOP_N).await?;

        let recent = self
            .trades
            .get_trades_in_time_range(now - EVENT_TAIL_LOOKBACK, now)
            .await?;
        let recent_stop_losses = tail_matching(&recent, |t| t.was_stop_loss);
        let recent_liquidations = tail_matching(&recent, |t| t.was_liquidation);

        Ok(AggregateSnapshot {
            total_trades,
            total_pnl,
            today,
            week,
            month,
            top_pairs_by_trades,
            top_pairs_by_profit,
            top_pairs_by_loss,
            recent_stop_losses,
            recent_liquidations,
        })
    }

    async fn window_stats(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> arb_engine_core::error::Result<WindowStats> {
        let trades = self.trades.get_trades_in_time_range(from, to).await?;
        let pnl = trades.iter().fold(Decimal::ZERO, |acc, t| acc + t.realized_pnl);
        Ok(WindowStats {
            trades: trades.len() as u64,
            pnl,
        })
    }
}

fn today_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn tail_matching(trades: &[Trade], pred: impl Fn(&Trade) -> bool) -> Vec<Trade> {
    let mut matching: Vec<Trade> = trades.iter().filter(|t| pred(t)).cloned().collect();
    matching.sort_by_key(|t| t.exit_ts);
    if matching.len() > EVENT_TAIL_LEN {
        matching.split_off(matching.len() - EVENT_TAIL_LEN)
    } else {
        matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_engine_core::error::Result;
    use arb_engine_core::model::{PairConfig, PairStatus};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTradeRepo {
        trades: Mutex<Vec<Trade>>,
    }

    #[async_trait]
    impl TradeRepository for FakeTradeRepo {
        async fn record_trade(&self, trade: Trade) -> Result<()> {
            self.trades.lock().unwrap().push(trade);
            Ok(())
        }
        async fn get_top_pairs_by_trades(&self, _limit: usize) -> Result<Vec<(Uuid, u64)>> {
            Ok(vec![])
        }
        async fn get_top_pairs_by_profit(&self, _limit: usize) -> Result<Vec<(Uuid, Decimal)>> {
            Ok(vec![])
        }
        async fn get_top_pairs_by_loss(&self, _limit: usize) -> Result<Vec<(Uuid, Decimal)>> {
            Ok(vec![])
        }
        async fn get_trades_by_pair_id(&self, pair_id: Uuid) -> Result<Vec<Trade>> {
            Ok(self
                .trades
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.pair_id == pair_id)
                .cloned()
                .collect())
        }
        async fn get_trades_in_time_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Trade>> {
            Ok(self
                .trades
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.exit_ts >= from && t.exit_ts <= to)
                .cloned()
                .collect())
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.trades.lock().unwrap().len())
        }
        async fn get_pnl_by_symbol(&self, symbol: &str) -> Result<Decimal> {
            Ok(self
                .trades
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.symbol == symbol)
                .fold(Decimal::ZERO, |acc, t| acc + t.realized_pnl))
        }
        async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
            Ok(0)
        }
        async fn reset_counters(&self) -> Result<()> {
            self.trades.lock().unwrap().clear();
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePairRepo {
        pairs: Mutex<HashMap<Uuid, PairConfig>>,
    }

    fn sample_pair(id: Uuid) -> PairConfig {
        PairConfig {
            id,
            symbol: "BTCUSDT".to_string(),
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            entry_spread_pct: dec!(0.5),
            exit_spread_pct: dec!(0.1),
            volume_asset: dec!(0.01),
            n_orders: 1,
            stop_loss_usdt: Decimal::ZERO,
            status: PairStatus::Active,
            trades_count: 0,
            total_pnl: Decimal::ZERO,
        }
    }

    #[async_trait]
    impl PairRepository for FakePairRepo {
        async fn create(&self, pair: PairConfig) -> Result<PairConfig> {
            self.pairs.lock().unwrap().insert(pair.id, pair.clone());
            Ok(pair)
        }
        async fn get_by_id(&self, id: Uuid) -> Result<PairConfig> {
            self.pairs
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or_else(|| arb_engine_core::error::EngineError::not_found("pair"))
        }
        async fn get_all(&self) -> Result<Vec<PairConfig>> {
            Ok(self.pairs.lock().unwrap().values().cloned().collect())
        }
        async fn get_active(&self) -> Result<Vec<PairConfig>> {
            Ok(self
                .pairs
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.status == PairStatus::Active)
                .cloned()
                .collect())
        }
        async fn update(&self, pair: PairConfig) -> Result<PairConfig> {
            self.pairs.lock().unwrap().insert(pair.id, pair.clone());
            Ok(pair)
        }
        async fn delete(&self, id: Uuid) -> Result<()> {
            self.pairs.lock().unwrap().remove(&id);
            Ok(())
        }
        async fn update_status(&self, id: Uuid, status: PairStatus) -> Result<()> {
            if let Some(pair) = self.pairs.lock().unwrap().get_mut(&id) {
                pair.status = status;
            }
            Ok(())
        }
        async fn update_params(&self, _id: Uuid, _pending: arb_engine_core::model::PendingConfig) -> Result<()> {
            Ok(())
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.pairs.lock().unwrap().len())
        }
        async fn count_active(&self) -> Result<usize> {
            Ok(0)
        }
        async fn exists_by_symbol(&self, _symbol: &str) -> Result<bool> {
            Ok(false)
        }
        async fn increment_trades(&self, id: Uuid) -> Result<()> {
            if let Some(pair) = self.pairs.lock().unwrap().get_mut(&id) {
                pair.trades_count += 1;
            }
            Ok(())
        }
        async fn update_pnl(&self, id: Uuid, delta: Decimal) -> Result<()> {
            if let Some(pair) = self.pairs.lock().unwrap().get_mut(&id) {
                pair.total_pnl += delta;
            }
            Ok(())
        }
        async fn search(&self, _query: &str) -> Result<Vec<PairConfig>> {
            Ok(vec![])
        }
        async fn reset_stats(&self, id: Uuid) -> Result<()> {
            if let Some(pair) = self.pairs.lock().unwrap().get_mut(&id) {
                pair.trades_count = 0;
                pair.total_pnl = Decimal::ZERO;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullBroadcaster;

    #[async_trait]
    impl Broadcaster for NullBroadcaster {
        async fn broadcast_notification(&self, _notification: arb_engine_core::model::persistence::Notification) {}
        async fn broadcast_balance_update(&self, _venue: &str, _balance: Decimal) {}
        async fn broadcast_all_balances(&self, _balances: HashMap<String, Decimal>) {}
        async fn broadcast_stats_update(&self, _stats: StatsSnapshot) {}
    }

    #[tokio::test]
    async fn record_trade_completion_rolls_pair_counters() {
        let trades = Arc::new(FakeTradeRepo::default());
        let pairs = Arc::new(FakePairRepo::default());
        let pair_id = Uuid::new_v4();
        pairs.create(sample_pair(pair_id)).await.unwrap();
        let aggregator = StatsAggregator::new(trades.clone(), pairs.clone(), Arc::new(NullBroadcaster));

        let now = Utc::now();
        aggregator
            .record_trade_completion(pair_id, "BTCUSDT", "bybit", "bitget", now, now, dec!(12.5), false, false)
            .await
            .unwrap();

        let pair = pairs.get_by_id(pair_id).await.unwrap();
        assert_eq!(pair.trades_count, 1);
        assert_eq!(pair.total_pnl, dec!(12.5));
    }

    #[tokio::test]
    async fn snapshot_buckets_trade_into_today_window() {
        let trades = Arc::new(FakeTradeRepo::default());
        let pairs = Arc::new(FakePairRepo::default());
        let pair_id = Uuid::new_v4();
        pairs.create(sample_pair(pair_id)).await.unwrap();
        let aggregator = StatsAggregator::new(trades.clone(), pairs.clone(), Arc::new(NullBroadcaster));

        let now = Utc::now();
        aggregator
            .record_trade_completion(pair_id, "BTCUSDT", "bybit", "bitget", now, now, dec!(5), false, false)
            .await
            .unwrap();

        let snapshot = aggregator.snapshot().await.unwrap();
        assert_eq!(snapshot.today.trades, 1);
        assert_eq!(snapshot.total_trades, 1);
    }

    #[tokio::test]
    async fn snapshot_tails_stop_loss_and_liquidation_events_separately() {
        let trades = Arc::new(FakeTradeRepo::default());
        let pairs = Arc::new(FakePairRepo::default());
        let pair_id = Uuid::new_v4();
        pairs.create(sample_pair(pair_id)).await.unwrap();
        let aggregator = StatsAggregator::new(trades.clone(), pairs.clone(), Arc::new(NullBroadcaster));

        let now = Utc::now();
        aggregator
            .record_trade_completion(pair_id, "BTCUSDT", "bybit", "bitget", now, now, dec!(-5), true, false)
            .await
            .unwrap();
        aggregator
            .record_trade_completion(pair_id, "BTCUSDT", "bybit", "bitget", now, now, dec!(-80), false, true)
            .await
            .unwrap();

        let snapshot = aggregator.snapshot().await.unwrap();
        assert_eq!(snapshot.recent_stop_losses.len(), 1);
        assert_eq!(snapshot.recent_liquidations.len(), 1);
    }
}
