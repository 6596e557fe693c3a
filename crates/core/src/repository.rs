//! Repository interfaces consumed by the engine (spec §6).
//!
//! The durable store itself is out of scope; these traits are the contract
//! the engine programs against. `arb-engine-persistence-mem` supplies an
//! in-memory implementation used by tests and available as a development
//! stand-in for a future durable backend.

use crate::error::Result;
use crate::model::persistence::{BlacklistEntry, Notification, NotificationKind, Settings, Trade};
use crate::model::PairConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

#[async_trait]
pub trait PairRepository: Send + Sync {
    async fn create(&self, pair: PairConfig) -> Result<PairConfig>;
    async fn get_by_id(&self, id: Uuid) -> Result<PairConfig>;
    async fn get_all(&self) -> Result<Vec<PairConfig>>;
    async fn get_active(&self) -> Result<Vec<PairConfig>>;
    async fn update(&self, pair: PairConfig) -> Result<PairConfig>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    async fn update_status(&self, id: Uuid, status: crate::model::PairStatus) -> Result<()>;
    async fn update_params(&self, id: Uuid, pending: crate::model::PendingConfig) -> Result<()>;
    async fn count(&self) -> Result<usize>;
    async fn count_active(&self) -> Result<usize>;
    async fn exists_by_symbol(&self, symbol: &str) -> Result<bool>;
    async fn increment_trades(&self, id: Uuid) -> Result<()>;
    async fn update_pnl(&self, id: Uuid, delta: Decimal) -> Result<()>;
    async fn search(&self, query: &str) -> Result<Vec<PairConfig>>;
    async fn reset_stats(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait ExchangeAccountRepository: Send + Sync {
    async fn create(&self, account: crate::model::ExchangeAccount) -> Result<()>;
    async fn get_by_name(&self, name: &str) -> Result<crate::model::ExchangeAccount>;
    async fn get_by_id(&self, name: &str) -> Result<crate::model::ExchangeAccount>;
    async fn get_all(&self) -> Result<Vec<crate::model::ExchangeAccount>>;
    async fn get_connected(&self) -> Result<Vec<crate::model::ExchangeAccount>>;
    async fn update(&self, account: crate::model::ExchangeAccount) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
    async fn update_balance(&self, name: &str, balance: Decimal) -> Result<()>;
    async fn set_last_error(&self, name: &str, error: Option<String>) -> Result<()>;
    async fn count_connected(&self) -> Result<usize>;
}

#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn record_trade(&self, trade: Trade) -> Result<()>;
    async fn get_top_pairs_by_trades(&self, limit: usize) -> Result<Vec<(Uuid, u64)>>;
    async fn get_top_pairs_by_profit(&self, limit: usize) -> Result<Vec<(Uuid, Decimal)>>;
    async fn get_top_pairs_by_loss(&self, limit: usize) -> Result<Vec<(Uuid, Decimal)>>;
    async fn get_trades_by_pair_id(&self, pair_id: Uuid) -> Result<Vec<Trade>>;
    async fn get_trades_in_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Trade>>;
    async fn count(&self) -> Result<usize>;
    async fn get_pnl_by_symbol(&self, symbol: &str) -> Result<Decimal>;
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
    async fn reset_counters(&self) -> Result<()>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: Notification) -> Result<()>;
    async fn get_recent(&self, limit: usize) -> Result<Vec<Notification>>;
    async fn get_by_types(&self, kinds: &[NotificationKind]) -> Result<Vec<Notification>>;
    async fn count(&self) -> Result<usize>;
    async fn count_by_type(&self, kind: NotificationKind) -> Result<usize>;
    async fn keep_recent(&self, n: usize) -> Result<()>;
    async fn delete_all(&self) -> Result<()>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self) -> Result<Settings>;
    async fn update(&self, settings: Settings) -> Result<()>;
    async fn update_notification_prefs(
        &self,
        prefs: crate::model::persistence::NotificationPreferences,
    ) -> Result<()>;
    async fn update_consider_funding(&self, consider_funding: bool) -> Result<()>;
    async fn update_max_concurrent_trades(&self, max: Option<u32>) -> Result<()>;
    async fn reset_to_defaults(&self) -> Result<()>;
}

#[async_trait]
pub trait BlacklistRepository: Send + Sync {
    async fn create(&self, entry: BlacklistEntry) -> Result<()>;
    async fn get_all(&self) -> Result<Vec<BlacklistEntry>>;
    async fn get_by_symbol(&self, symbol: &str) -> Result<BlacklistEntry>;
    async fn delete(&self, symbol: &str) -> Result<()>;
    async fn exists(&self, symbol: &str) -> Result<bool>;
    async fn update_reason(&self, symbol: &str, reason: String) -> Result<()>;
    async fn count(&self) -> Result<usize>;
    async fn delete_all(&self) -> Result<()>;
    async fn search(&self, query: &str) -> Result<Vec<BlacklistEntry>>;
}
