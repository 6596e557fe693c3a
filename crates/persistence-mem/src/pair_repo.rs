use arb_engine_core::error::{EngineError, Result};
use arb_engine_core::model::{PairConfig, PairStatus, PendingConfig};
use arb_engine_core::repository::PairRepository;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory `PairRepository`. `pending` is tracked purely so
/// `update_params` has somewhere to land; applying the overlay back onto a
/// live `PairConfig` is `arb-engine-pairs`'s job, not this store's.
#[derive(Default)]
pub struct InMemoryPairRepository {
    pairs: RwLock<HashMap<Uuid, PairConfig>>,
    pending: RwLock<HashMap<Uuid, PendingConfig>>,
}

impl InMemoryPairRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PairRepository for InMemoryPairRepository {
    async fn create(&self, pair: PairConfig) -> Result<PairConfig> {
        let mut pairs = self.pairs.write().await;
        if pairs.contains_key(&pair.id) {
            return Err(EngineError::conflict(format!("pair {} already exists", pair.id)));
        }
        pairs.insert(pair.id, pair.clone());
        Ok(pair)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<PairConfig> {
        self.pairs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("pair {id}")))
    }

    async fn get_all(&self) -> Result<Vec<PairConfig>> {
        Ok(self.pairs.read().await.values().cloned().collect())
    }

    async fn get_active(&self) -> Result<Vec<PairConfig>> {
        Ok(self
            .pairs
            .read()
            .await
            .values()
            .filter(|p| p.status == PairStatus::Active)
            .cloned()
            .collect())
    }

    async fn update(&self, pair: PairConfig) -> Result<PairConfig> {
        let mut pairs = self.pairs.write().await;
        if !pairs.contains_key(&pair.id) {
            return Err(EngineError::not_found(format!("pair {}", pair.id)));
        }
        pairs.insert(pair.id, pair.clone());
        Ok(pair)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.pairs
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| EngineError::not_found(format!("pair {id}")))?;
        self.pending.write().await.remove(&id);
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: PairStatus) -> Result<()> {
        let mut pairs = self.pairs.write().await;
        let pair = pairs.get_mut(&id).ok_or_else(|| EngineError::not_found(format!("pair {id}")))?;
        pair.status = status;
        Ok(())
    }

    async fn update_params(&self, id: Uuid, pending: PendingConfig) -> Result<()> {
        if !self.pairs.read().await.contains_key(&id) {
            return Err(EngineError::not_found(format!("pair {id}")));
        }
        self.pending.write().await.insert(id, pending);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.pairs.read().await.len())
    }

    async fn count_active(&self) -> Result<usize> {
        Ok(self
            .pairs
            .read()
            .await
            .values()
            .filter(|p| p.status == PairStatus::Active)
            .count())
    }

    async fn exists_by_symbol(&self, symbol: &str) -> Result<bool> {
        Ok(self.pairs.read().await.values().any(|p| p.symbol == symbol))
    }

    async fn increment_trades(&self, id: Uuid) -> Result<()> {
        let mut pairs = self.pairs.write().await;
        let pair = pairs.get_mut(&id).ok_or_else(|| EngineError::not_found(format!("pair {id}")))?;
        pair.trades_count += 1;
        Ok(())
    }

    async fn update_pnl(&self, id: Uuid, delta: Decimal) -> Result<()> {
        let mut pairs = self.pairs.write().await;
        let pair = pairs.get_mut(&id).ok_or_else(|| EngineError::not_found(format!("pair {id}")))?;
        pair.total_pnl += delta;
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<PairConfig>> {
        let query = query.to_uppercase();
        Ok(self
            .pairs
            .read()
            .await
            .values()
            .filter(|p| p.symbol.contains(&query))
            .cloned()
            .collect())
    }

    async fn reset_stats(&self, id: Uuid) -> Result<()> {
        let mut pairs = self.pairs.write().await;
        let pair = pairs.get_mut(&id).ok_or_else(|| EngineError::not_found(format!("pair {id}")))?;
        pair.trades_count = 0;
        pair.total_pnl = Decimal::ZERO;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(id: Uuid, symbol: &str) -> PairConfig {
        PairConfig {
            id,
            symbol: symbol.to_string(),
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            entry_spread_pct: dec!(0.5),
            exit_spread_pct: dec!(0.1),
            volume_asset: dec!(0.01),
            n_orders: 2,
            stop_loss_usdt: dec!(50),
            status: PairStatus::Active,
            trades_count: 0,
            total_pnl: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = InMemoryPairRepository::new();
        let id = Uuid::new_v4();
        repo.create(sample(id, "BTCUSDT")).await.unwrap();
        let fetched = repo.get_by_id(id).await.unwrap();
        assert_eq!(fetched.symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let repo = InMemoryPairRepository::new();
        let id = Uuid::new_v4();
        repo.create(sample(id, "BTCUSDT")).await.unwrap();
        assert!(repo.create(sample(id, "BTCUSDT")).await.is_err());
    }

    #[tokio::test]
    async fn get_missing_pair_not_found() {
        let repo = InMemoryPairRepository::new();
        assert!(repo.get_by_id(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn update_pnl_and_increment_trades_accumulate() {
        let repo = InMemoryPairRepository::new();
        let id = Uuid::new_v4();
        repo.create(sample(id, "BTCUSDT")).await.unwrap();
        repo.update_pnl(id, dec!(10)).await.unwrap();
        repo.update_pnl(id, dec!(-3)).await.unwrap();
        repo.increment_trades(id).await.unwrap();
        let pair = repo.get_by_id(id).await.unwrap();
        assert_eq!(pair.total_pnl, dec!(7));
        assert_eq!(pair.trades_count, 1);
    }

    #[tokio::test]
    async fn reset_stats_zeroes_counters() {
        let repo = InMemoryPairRepository::new();
        let id = Uuid::new_v4();
        repo.create(sample(id, "BTCUSDT")).await.unwrap();
        repo.update_pnl(id, dec!(10)).await.unwrap();
        repo.increment_trades(id).await.unwrap();
        repo.reset_stats(id).await.unwrap();
        let pair = repo.get_by_id(id).await.unwrap();
        assert_eq!(pair.total_pnl, Decimal::ZERO);
        assert_eq!(pair.trades_count, 0);
    }

    #[tokio::test]
    async fn search_matches_substring_case_insensitively() {
        let repo = InMemoryPairRepository::new();
        repo.create(sample(Uuid::new_v4(), "BTCUSDT")).await.unwrap();
        repo.create(sample(Uuid::new_v4(), "ETHUSDT")).await.unwrap();
        let hits = repo.search("btc").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn delete_removes_pending_overlay_too() {
        let repo = InMemoryPairRepository::new();
        let id = Uuid::new_v4();
        repo.create(sample(id, "BTCUSDT")).await.unwrap();
        repo.update_params(
            id,
            PendingConfig {
                entry_spread_pct: dec!(0.6),
                exit_spread_pct: dec!(0.2),
                volume_asset: dec!(0.02),
                n_orders: 3,
                stop_loss_usdt: dec!(60),
            },
        )
        .await
        .unwrap();
        repo.delete(id).await.unwrap();
        assert!(repo.get_by_id(id).await.is_err());
    }
}
