//! Pair Registry & Pending Overlay (spec §4.6).
//!
//! In-memory mirror of persisted pair configs plus a `pair_id -> PendingConfig`
//! map under a separate lock, so an edit made while a pair is HOLDING or
//! EXITING never races the pair task's own read of its config.

use arb_engine_core::error::{EngineError, Result};
use arb_engine_core::model::{PairConfig, PairStatus, PendingConfig};
use arb_engine_registry::ExchangeRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const MAX_PAIRS: usize = 30;

/// Fired whenever a config change must reach the pair's running task — the
/// registry never talks to the Supervisor directly (spec §9 cyclic references).
pub type SupervisorPushCallback = Box<dyn Fn(Uuid, PairConfig) + Send + Sync>;

pub struct PairRegistry {
    exchange_registry: Arc<ExchangeRegistry>,
    pairs: RwLock<HashMap<Uuid, PairConfig>>,
    pending: RwLock<HashMap<Uuid, PendingConfig>>,
    on_supervisor_push: RwLock<Option<SupervisorPushCallback>>,
}

impl PairRegistry {
    #[must_use]
    pub fn new(exchange_registry: Arc<ExchangeRegistry>) -> Self {
        Self {
            exchange_registry,
            pairs: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
            on_supervisor_push: RwLock::new(None),
        }
    }

    pub async fn set_on_supervisor_push(&self, callback: SupervisorPushCallback) {
        *self.on_supervisor_push.write().await = Some(callback);
    }

    async fn push_to_supervisor(&self, pair_id: Uuid, config: PairConfig) {
        if let Some(callback) = self.on_supervisor_push.read().await.as_ref() {
            callback(pair_id, config);
        }
    }

    /// Counts connected venues on which `symbol` can be traded, by probing
    /// `GetTicker`. Used by Create/Start to enforce the two-venue minimum.
    async fn tradeable_venue_count(&self, symbol: &str) -> usize {
        let mut count = 0;
        for venue in self.exchange_registry.connected_venues().await {
            let Some(adapter) = self.exchange_registry.get_adapter(&venue).await else {
                continue;
            };
            if adapter.get_ticker(symbol).await.is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Validates, checks the 30-pair cap, and checks `symbol` is tradeable on
    /// at least two connected venues before persisting with status PAUSED.
    ///
    /// # Errors
    /// Returns `Validation` (invariant violated), `Conflict` (cap reached or
    /// duplicate symbol), or `NotFound`-flavored errors are never produced
    /// here; see spec §7.
    pub async fn create(&self, mut config: PairConfig) -> Result<PairConfig> {
        config.validate()?;

        let mut pairs = self.pairs.write().await;
        if pairs.len() >= MAX_PAIRS {
            return Err(EngineError::conflict(format!(
                "pair cap reached: at most {MAX_PAIRS} pairs"
            )));
        }
        if pairs.values().any(|p| p.symbol == config.symbol) {
            return Err(EngineError::conflict(format!(
                "a pair for {} already exists",
                config.symbol
            )));
        }
        drop(pairs);

        if self.tradeable_venue_count(&config.symbol).await < 2 {
            return Err(EngineError::validation(format!(
                "{} is not tradeable on at least two connected venues",
                config.symbol
            )));
        }

        config.status = PairStatus::Paused;
        self.pairs.write().await.insert(config.id, config.clone());
        Ok(config)
    }

    /// Validates the merged config. If `has_open_position` (the pair's
    /// runtime is HOLDING or EXITING), writes the pending overlay and returns
    /// the unchanged current config; otherwise writes through and pushes to
    /// the Supervisor.
    ///
    /// # Errors
    /// Returns `NotFound` if `pair_id` is unknown, `Validation` if the merged
    /// config violates an invariant.
    pub async fn update(
        &self,
        pair_id: Uuid,
        merged: PairConfig,
        has_open_position: bool,
    ) -> Result<PairConfig> {
        merged.validate()?;

        let current = self
            .pairs
            .read()
            .await
            .get(&pair_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("pair {pair_id} not found")))?;

        if has_open_position {
            self.pending.write().await.insert(
                pair_id,
                PendingConfig {
                    entry_spread_pct: merged.entry_spread_pct,
                    exit_spread_pct: merged.exit_spread_pct,
                    volume_asset: merged.volume_asset,
                    n_orders: merged.n_orders,
                    stop_loss_usdt: merged.stop_loss_usdt,
                },
            );
            return Ok(current);
        }

        self.pairs.write().await.insert(pair_id, merged.clone());
        self.push_to_supervisor(pair_id, merged.clone()).await;
        Ok(merged)
    }

    /// Requires PAUSED and no open position.
    ///
    /// # Errors
    /// Returns `NotFound`, or `Conflict` if the pair is not paused or has an
    /// open position.
    pub async fn delete(&self, pair_id: Uuid, has_open_position: bool) -> Result<()> {
        let config = self
            .pairs
            .read()
            .await
            .get(&pair_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("pair {pair_id} not found")))?;

        if config.status != PairStatus::Paused {
            return Err(EngineError::conflict("pair must be paused before deletion"));
        }
        if has_open_position {
            return Err(EngineError::conflict(
                "ErrPairHasOpenPosition: cannot delete a pair with an open position",
            ));
        }

        self.pairs.write().await.remove(&pair_id);
        self.pending.write().await.remove(&pair_id);
        Ok(())
    }

    /// Gated on (i) current status PAUSED, (ii) at least two connected
    /// venues, (iii) symbol tradeable on at least two of them.
    ///
    /// # Errors
    /// Returns `NotFound`, or `Conflict`/`Validation` if a gate fails.
    pub async fn start(&self, pair_id: Uuid) -> Result<PairConfig> {
        let mut pairs = self.pairs.write().await;
        let config = pairs
            .get_mut(&pair_id)
            .ok_or_else(|| EngineError::not_found(format!("pair {pair_id} not found")))?;

        if config.status != PairStatus::Paused {
            return Err(EngineError::conflict("pair is already active"));
        }
        if self.exchange_registry.connected_count().await < 2 {
            return Err(EngineError::validation(
                "at least two venues must be connected to start a pair",
            ));
        }
        let symbol = config.symbol.clone();
        drop(pairs);

        if self.tradeable_venue_count(&symbol).await < 2 {
            return Err(EngineError::validation(format!(
                "{symbol} is not tradeable on at least two connected venues"
            )));
        }

        let mut pairs = self.pairs.write().await;
        let config = pairs.get_mut(&pair_id).expect("checked above");
        config.status = PairStatus::Active;
        let snapshot = config.clone();
        drop(pairs);
        self.push_to_supervisor(pair_id, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Gated on current status and, for an open position, an explicit
    /// `force_close` flag (spec §4.6: without it returns
    /// `ErrPairHasOpenPosition`).
    ///
    /// # Errors
    /// Returns `NotFound`, `Conflict` if already paused, or `Conflict` with
    /// the `ErrPairHasOpenPosition` marker if `has_open_position` and
    /// `force_close` is false.
    pub async fn pause(&self, pair_id: Uuid, has_open_position: bool, force_close: bool) -> Result<PairConfig> {
        let mut pairs = self.pairs.write().await;
        let config = pairs
            .get_mut(&pair_id)
            .ok_or_else(|| EngineError::not_found(format!("pair {pair_id} not found")))?;

        if config.status == PairStatus::Paused {
            return Err(EngineError::conflict("pair is already paused"));
        }
        if has_open_position && !force_close {
            return Err(EngineError::conflict(
                "ErrPairHasOpenPosition: pause requires force_close to close an open position",
            ));
        }

        config.status = PairStatus::Paused;
        let snapshot = config.clone();
        drop(pairs);
        self.push_to_supervisor(pair_id, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Atomically drains the pending overlay onto the stored config,
    /// persists, and pushes to the Supervisor. Invoked by the state machine
    /// on its transition into READY.
    ///
    /// # Errors
    /// Returns `NotFound` if `pair_id` is unknown.
    pub async fn apply_pending_config(&self, pair_id: Uuid) -> Result<Option<PairConfig>> {
        let Some(overlay) = self.pending.write().await.remove(&pair_id) else {
            return Ok(None);
        };

        let mut pairs = self.pairs.write().await;
        let config = pairs
            .get_mut(&pair_id)
            .ok_or_else(|| EngineError::not_found(format!("pair {pair_id} not found")))?;
        config.entry_spread_pct = overlay.entry_spread_pct;
        config.exit_spread_pct = overlay.exit_spread_pct;
        config.volume_asset = overlay.volume_asset;
        config.n_orders = overlay.n_orders;
        config.stop_loss_usdt = overlay.stop_loss_usdt;
        let snapshot = config.clone();
        drop(pairs);

        self.push_to_supervisor(pair_id, snapshot.clone()).await;
        Ok(Some(snapshot))
    }

    #[must_use]
    pub async fn get(&self, pair_id: Uuid) -> Option<PairConfig> {
        self.pairs.read().await.get(&pair_id).cloned()
    }

    #[must_use]
    pub async fn get_all(&self) -> Vec<PairConfig> {
        self.pairs.read().await.values().cloned().collect()
    }

    #[must_use]
    pub async fn get_active(&self) -> Vec<PairConfig> {
        self.pairs
            .read()
            .await
            .values()
            .filter(|p| p.status == PairStatus::Active)
            .cloned()
            .collect()
    }

    #[must_use]
    pub async fn count(&self) -> usize {
        self.pairs.read().await.len()
    }
}
