use arb_engine_core::error::Result;
use arb_engine_core::model::persistence::Trade;
use arb_engine_core::repository::TradeRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory `TradeRepository`: an append-only log plus the aggregate
/// queries `arb-engine-stats` needs.
#[derive(Default)]
pub struct InMemoryTradeRepository {
    trades: RwLock<Vec<Trade>>,
}

impl InMemoryTradeRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeRepository for InMemoryTradeRepository {
    async fn record_trade(&self, trade: Trade) -> Result<()> {
        self.trades.write().await.push(trade);
        Ok(())
    }

    async fn get_top_pairs_by_trades(&self, limit: usize) -> Result<Vec<(Uuid, u64)>> {
        let mut counts: HashMap<Uuid, u64> = HashMap::new();
        for trade in self.trades.read().await.iter() {
            *counts.entry(trade.pair_id).or_insert(0) += 1;
        }
        let mut ranked: Vec<(Uuid, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn get_top_pairs_by_profit(&self, limit: usize) -> Result<Vec<(Uuid, Decimal)>> {
        let mut ranked = pnl_by_pair(&*self.trades.read().await);
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn get_top_pairs_by_loss(&self, limit: usize) -> Result<Vec<(Uuid, Decimal)>> {
        let mut ranked = pnl_by_pair(&*self.trades.read().await);
        ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn get_trades_by_pair_id(&self, pair_id: Uuid) -> Result<Vec<Trade>> {
        Ok(self
            .trades
            .read()
            .await
            .iter()
            .filter(|t| t.pair_id == pair_id)
            .cloned()
            .collect())
    }

    async fn get_trades_in_time_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Trade>> {
        Ok(self
            .trades
            .read()
            .await
            .iter()
            .filter(|t| t.exit_ts >= from && t.exit_ts <= to)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.trades.read().await.len())
    }

    async fn get_pnl_by_symbol(&self, symbol: &str) -> Result<Decimal> {
        Ok(self
            .trades
            .read()
            .await
            .iter()
            .filter(|t| t.symbol == symbol)
            .fold(Decimal::ZERO, |acc, t| acc + t.realized_pnl))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut trades = self.trades.write().await;
        let before = trades.len();
        trades.retain(|t| t.exit_ts >= cutoff);
        Ok(before - trades.len())
    }

    async fn reset_counters(&self) -> Result<()> {
        self.trades.write().await.clear();
        Ok(())
    }
}

fn pnl_by_pair(trades: &[Trade]) -> Vec<(Uuid, Decimal)> {
    let mut totals: HashMap<Uuid, Decimal> = HashMap::new();
    for trade in trades {
        *totals.entry(trade.pair_id).or_insert(Decimal::ZERO) += trade.realized_pnl;
    }
    totals.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(pair_id: Uuid, symbol: &str, realized_pnl: Decimal, exit_ts: DateTime<Utc>) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            pair_id,
            symbol: symbol.to_string(),
            venue_long: "bybit".to_string(),
            venue_short: "bitget".to_string(),
            entry_ts: exit_ts - chrono::Duration::minutes(5),
            exit_ts,
            realized_pnl,
            was_stop_loss: false,
            was_liquidation: false,
        }
    }

    #[tokio::test]
    async fn pnl_by_symbol_sums_across_trades() {
        let repo = InMemoryTradeRepository::new();
        let now = Utc::now();
        repo.record_trade(trade(Uuid::new_v4(), "BTCUSDT", dec!(10), now)).await.unwrap();
        repo.record_trade(trade(Uuid::new_v4(), "BTCUSDT", dec!(-4), now)).await.unwrap();
        assert_eq!(repo.get_pnl_by_symbol("BTCUSDT").await.unwrap(), dec!(6));
    }

    #[tokio::test]
    async fn top_pairs_by_trades_counts_and_ranks() {
        let repo = InMemoryTradeRepository::new();
        let now = Utc::now();
        let busy = Uuid::new_v4();
        let quiet = Uuid::new_v4();
        repo.record_trade(trade(busy, "BTCUSDT", dec!(1), now)).await.unwrap();
        repo.record_trade(trade(busy, "BTCUSDT", dec!(1), now)).await.unwrap();
        repo.record_trade(trade(quiet, "ETHUSDT", dec!(1), now)).await.unwrap();
        let top = repo.get_top_pairs_by_trades(1).await.unwrap();
        assert_eq!(top, vec![(busy, 2)]);
    }

    #[tokio::test]
    async fn top_pairs_by_loss_ranks_most_negative_first() {
        let repo = InMemoryTradeRepository::new();
        let now = Utc::now();
        let loser = Uuid::new_v4();
        let winner = Uuid::new_v4();
        repo.record_trade(trade(loser, "BTCUSDT", dec!(-20), now)).await.unwrap();
        repo.record_trade(trade(winner, "ETHUSDT", dec!(15), now)).await.unwrap();
        let worst = repo.get_top_pairs_by_loss(1).await.unwrap();
        assert_eq!(worst, vec![(loser, dec!(-20))]);
    }

    #[tokio::test]
    async fn delete_older_than_removes_only_stale_trades() {
        let repo = InMemoryTradeRepository::new();
        let now = Utc::now();
        repo.record_trade(trade(Uuid::new_v4(), "BTCUSDT", dec!(1), now - chrono::Duration::days(100))).await.unwrap();
        repo.record_trade(trade(Uuid::new_v4(), "BTCUSDT", dec!(1), now)).await.unwrap();
        let removed = repo.delete_older_than(now - chrono::Duration::days(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn trades_in_time_range_is_inclusive_at_both_ends() {
        let repo = InMemoryTradeRepository::new();
        let now = Utc::now();
        repo.record_trade(trade(Uuid::new_v4(), "BTCUSDT", dec!(1), now)).await.unwrap();
        let hits = repo.get_trades_in_time_range(now, now).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
