//! State Machine Runtime & Engine Supervisor (spec §4.7, §4.12).
//!
//! One cooperative task per ACTIVE pair runs [`run_pair`]; the
//! [`EngineSupervisor`] owns every task plus the Risk Monitor, and is the
//! glue that wires the callback seams `arb-engine-registry` and
//! `arb-engine-pairs` leave open to avoid depending on this crate.

pub mod spread;

use arb_engine_core::adapter::OrderResult;
use arb_engine_core::error::EngineError;
use arb_engine_core::model::persistence::{NotificationKind, Severity};
use arb_engine_core::model::{Leg, LegSide, PairConfig, PairRuntime, PairState, PairStatus};
use arb_engine_executor::{OpenOutcome, OrderExecutor};
use arb_engine_notifications::NotificationRouter;
use arb_engine_pairs::PairRegistry;
use arb_engine_price_tracker::PriceTracker;
use arb_engine_registry::ExchangeRegistry;
use arb_engine_risk::{ExitReason, HoldingSnapshot, RiskMonitor, RiskObserver};
use arb_engine_stats::StatsAggregator;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use spread::best_spread;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Shared collaborators every pair task and the supervisor read from.
pub struct EngineContext {
    pub registry: Arc<ExchangeRegistry>,
    pub price_tracker: Arc<PriceTracker>,
    pub executor: Arc<OrderExecutor>,
    pub notifications: Arc<NotificationRouter>,
    pub stats: Arc<StatsAggregator>,
    pub pairs: Arc<PairRegistry>,
    pub tick_interval: Duration,
    pub stale_tick_threshold: chrono::Duration,
    pub safety_margin: Decimal,
    /// Bounded grace period `Shutdown` waits for tasks to exit (spec §5).
    pub shutdown_grace: Duration,
    /// Cap on pairs simultaneously ENTERING or HOLDING a position, mirrored
    /// from `Settings.max_concurrent_trades`; `None` disables the cap.
    pub max_concurrent_trades: RwLock<Option<u32>>,
    /// Every live pair's runtime, shared with the supervisor so a pair task
    /// can read the rest of the fleet's state without depending on it.
    pub runtimes: RwLock<HashMap<Uuid, Arc<RwLock<PairRuntime>>>>,
}

async fn active_trade_count(ctx: &EngineContext) -> u32 {
    let mut count = 0;
    for runtime in ctx.runtimes.read().await.values() {
        if matches!(runtime.read().await.state, PairState::Entering | PairState::Holding) {
            count += 1;
        }
    }
    count
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairControl {
    Run,
    Pause { force_close: bool },
}

/// Whether a tick's evaluation hit a Venue/Transport failure, for
/// [`ConsecutiveErrorGuard`] (spec §7 propagation policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    Normal,
    VenueError,
}

/// Tracks consecutive Venue/Transport failures for one pair task. A pair
/// recovers locally by retrying next tick; after 3 in a row it stops being
/// silent and emits a warn-level notification, then resets so it doesn't
/// fire on every subsequent tick.
struct ConsecutiveErrorGuard {
    count: u32,
}

impl ConsecutiveErrorGuard {
    const THRESHOLD: u32 = 3;

    const fn new() -> Self {
        Self { count: 0 }
    }

    /// Records one tick's outcome. Returns `true` the tick the threshold is
    /// crossed (and resets the counter so the caller only warns once).
    fn record(&mut self, outcome: TickOutcome) -> bool {
        match outcome {
            TickOutcome::Normal => {
                self.count = 0;
                false
            }
            TickOutcome::VenueError => {
                self.count += 1;
                if self.count >= Self::THRESHOLD {
                    self.count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }
}

struct PairTaskHandle {
    runtime: Arc<RwLock<PairRuntime>>,
    control_tx: watch::Sender<PairControl>,
    join: JoinHandle<()>,
}

/// Owns every per-pair task and the Risk Monitor (spec §4.12).
pub struct EngineSupervisor {
    ctx: Arc<EngineContext>,
    tasks: RwLock<HashMap<Uuid, PairTaskHandle>>,
    risk_shutdown_tx: RwLock<Option<watch::Sender<bool>>>,
}

impl EngineSupervisor {
    #[must_use]
    pub fn new(ctx: Arc<EngineContext>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            tasks: RwLock::new(HashMap::new()),
            risk_shutdown_tx: RwLock::new(None),
        })
    }

    pub async fn set_max_concurrent_trades(&self, max: Option<u32>) {
        *self.ctx.max_concurrent_trades.write().await = max;
    }

    /// Boots the Risk Monitor, wires the registry/pairs callback seams back
    /// to this supervisor, and starts a task for every stored pair whose
    /// status is ACTIVE, provided at least two venues are connected (spec
    /// §4.12).
    pub async fn start(self: &Arc<Self>) {
        let observer: Arc<dyn RiskObserver> = Arc::clone(self) as Arc<dyn RiskObserver>;
        let (monitor, monitor_tx) = RiskMonitor::new(observer);
        tokio::spawn(monitor.run());
        *self.risk_shutdown_tx.write().await = Some(monitor_tx);

        let supervisor_for_count = Arc::clone(self);
        self.ctx
            .registry
            .set_on_count_changed(Box::new(move |count| {
                let supervisor = Arc::clone(&supervisor_for_count);
                tokio::spawn(async move {
                    supervisor.on_venue_count_changed(count).await;
                });
            }))
            .await;

        let supervisor_for_push = Arc::clone(self);
        self.ctx
            .pairs
            .set_on_supervisor_push(Box::new(move |pair_id, config| {
                let supervisor = Arc::clone(&supervisor_for_push);
                tokio::spawn(async move {
                    supervisor.on_pair_config_pushed(pair_id, config).await;
                });
            }))
            .await;

        if self.ctx.registry.connected_count().await >= 2 {
            for config in self.ctx.pairs.get_active().await {
                self.spawn_pair_task(config).await;
            }
        }
    }

    async fn spawn_pair_task(self: &Arc<Self>, config: PairConfig) {
        let pair_id = config.id;
        if self.tasks.read().await.contains_key(&pair_id) {
            return;
        }
        let runtime = Arc::new(RwLock::new(PairRuntime::new(pair_id)));
        {
            let mut rt = runtime.write().await;
            rt.state = PairState::Ready;
        }
        self.ctx.runtimes.write().await.insert(pair_id, Arc::clone(&runtime));
        let (control_tx, control_rx) = watch::channel(PairControl::Run);
        let ctx = Arc::clone(&self.ctx);
        let runtime_clone = Arc::clone(&runtime);
        let join = tokio::spawn(run_pair(pair_id, runtime_clone, ctx, control_rx));
        self.tasks.write().await.insert(
            pair_id,
            PairTaskHandle {
                runtime,
                control_tx,
                join,
            },
        );
    }

    /// Spawns a task for a freshly-activated pair (spec §4.12 `StartPair`).
    pub async fn start_pair(self: &Arc<Self>, pair_id: Uuid) {
        if let Some(config) = self.ctx.pairs.get(pair_id).await {
            if config.status == PairStatus::Active {
                self.spawn_pair_task(config).await;
            }
        }
    }

    /// Cooperatively cancels a pair's task; if `force_close`, the task closes
    /// any open legs before exiting (spec §4.12 `PausePair`).
    pub async fn pause_pair(&self, pair_id: Uuid, force_close: bool) {
        if let Some(handle) = self.tasks.write().await.remove(&pair_id) {
            let _ = handle.control_tx.send(PairControl::Pause { force_close });
            let _ = tokio::time::timeout(self.ctx.shutdown_grace, handle.join).await;
        }
        self.ctx.runtimes.write().await.remove(&pair_id);
    }

    /// Cancels every task, waits up to `shutdown_grace`, stops the Risk
    /// Monitor, and tears down every adapter (spec §4.12).
    pub async fn shutdown(&self) {
        let handles: Vec<PairTaskHandle> = self.tasks.write().await.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            let _ = handle.control_tx.send(PairControl::Pause { force_close: true });
        }
        for handle in handles {
            let _ = tokio::time::timeout(self.ctx.shutdown_grace, handle.join).await;
        }
        if let Some(tx) = self.risk_shutdown_tx.write().await.take() {
            let _ = tx.send(true);
        }
        self.ctx.runtimes.write().await.clear();
        self.ctx.registry.close().await;
    }

    /// Runtime snapshot for the API layer.
    #[must_use]
    pub async fn runtime_snapshot(&self, pair_id: Uuid) -> Option<PairRuntime> {
        let tasks = self.tasks.read().await;
        let handle = tasks.get(&pair_id)?;
        Some(handle.runtime.read().await.clone())
    }

    /// Fires from `ExchangeRegistry`'s `VenueCountCallback`: pauses every
    /// active pair once fewer than two venues remain connected (spec §4.4/§9).
    pub async fn on_venue_count_changed(&self, count: usize) {
        if count >= 2 {
            return;
        }
        let pair_ids: Vec<Uuid> = self.tasks.read().await.keys().copied().collect();
        for pair_id in pair_ids {
            self.pause_pair(pair_id, true).await;
        }
    }

    /// Fires from `PairRegistry`'s `SupervisorPushCallback`: reacts to a
    /// config push by spawning/stopping the pair's task as its status dictates.
    pub async fn on_pair_config_pushed(self: &Arc<Self>, pair_id: Uuid, config: PairConfig) {
        match config.status {
            PairStatus::Active => self.spawn_pair_task(config).await,
            PairStatus::Paused => {
                if self.tasks.read().await.contains_key(&pair_id) {
                    self.pause_pair(pair_id, true).await;
                }
            }
        }
    }
}

#[async_trait]
impl RiskObserver for EngineSupervisor {
    async fn holding_snapshots(&self) -> Vec<HoldingSnapshot> {
        let mut snapshots = Vec::new();
        for (pair_id, handle) in self.tasks.read().await.iter() {
            let rt = handle.runtime.read().await;
            if rt.state != PairState::Holding {
                continue;
            }
            let Some(config) = self.ctx.pairs.get(*pair_id).await else {
                continue;
            };
            snapshots.push(HoldingSnapshot {
                pair_id: *pair_id,
                unrealized_pnl: rt.unrealized_pnl,
                stop_loss_usdt: config.stop_loss_usdt,
            });
        }
        snapshots
    }

    async fn signal_exit(&self, pair_id: Uuid, reason: ExitReason) {
        let Some(handle) = self.tasks.read().await.get(&pair_id).map(|h| Arc::clone(&h.runtime)) else {
            return;
        };
        let Some(config) = self.ctx.pairs.get(pair_id).await else {
            return;
        };
        let (was_liquidation, was_stop_loss) = match reason {
            ExitReason::Liquidation => (true, false),
            ExitReason::StopLoss => (false, true),
        };
        trigger_exit(&config, &handle, &self.ctx, was_liquidation, was_stop_loss).await;
    }
}

/// The per-pair cooperative task loop (spec §5: ticks at ≤100ms, suspends on
/// cancellation, a subscription signal, or network I/O inside the executor).
async fn run_pair(pair_id: Uuid, runtime: Arc<RwLock<PairRuntime>>, ctx: Arc<EngineContext>, mut control_rx: watch::Receiver<PairControl>) {
    let mut ticker = tokio::time::interval(ctx.tick_interval);
    let mut error_guard = ConsecutiveErrorGuard::new();
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = control_rx.changed() => {
                if let PairControl::Pause { force_close } = *control_rx.borrow() {
                    handle_pause(pair_id, &runtime, &ctx, force_close).await;
                    return;
                }
            }
        }

        let Some(config) = ctx.pairs.get(pair_id).await else {
            tracing::warn!(pair_id = %pair_id, "pair task running for a pair no longer in the registry, exiting");
            return;
        };
        if config.status != PairStatus::Active {
            return;
        }

        let state = runtime.read().await.state;
        let outcome = match state {
            PairState::Ready => evaluate_ready(&config, &runtime, &ctx).await,
            PairState::Holding => evaluate_holding(&config, &runtime, &ctx).await,
            PairState::Entering | PairState::Exiting | PairState::Error | PairState::Paused => TickOutcome::Normal,
        };

        if error_guard.record(outcome) {
            ctx.notifications
                .route(
                    Some(pair_id),
                    NotificationKind::Error,
                    Severity::Warn,
                    format!("{} hit {} consecutive venue errors", config.symbol, ConsecutiveErrorGuard::THRESHOLD),
                )
                .await;
        }
    }
}

async fn handle_pause(pair_id: Uuid, runtime: &Arc<RwLock<PairRuntime>>, ctx: &Arc<EngineContext>, force_close: bool) {
    let state = runtime.read().await.state;
    if force_close && state == PairState::Holding {
        if let Some(config) = ctx.pairs.get(pair_id).await {
            trigger_exit(&config, runtime, ctx, false, false).await;
        }
    }
    runtime.write().await.state = PairState::Paused;
}

async fn fresh_tickers(config: &PairConfig, ctx: &Arc<EngineContext>) -> Vec<(String, arb_engine_core::model::Ticker)> {
    let now = Utc::now();
    let mut tickers = Vec::new();
    for venue in ctx.registry.connected_venues().await {
        if let Some(t) = ctx.price_tracker.get_fresh(&venue, &config.symbol, now, ctx.stale_tick_threshold) {
            tickers.push((venue, t));
        }
    }
    tickers
}

/// READY: evaluate the cross-venue spread; if it meets `entry_spread_pct`,
/// run the open sequence (spec §4.7, §4.8).
async fn evaluate_ready(config: &PairConfig, runtime: &Arc<RwLock<PairRuntime>>, ctx: &Arc<EngineContext>) -> TickOutcome {
    let tickers = fresh_tickers(config, ctx).await;
    let Some(quote) = best_spread(&tickers) else {
        return TickOutcome::Normal;
    };

    {
        let mut rt = runtime.write().await;
        rt.current_spread = quote.current_spread_pct;
        rt.last_update = Utc::now();
    }

    if quote.current_spread_pct < config.entry_spread_pct {
        return TickOutcome::Normal;
    }

    if let Some(max) = *ctx.max_concurrent_trades.read().await {
        if active_trade_count(ctx).await >= max {
            return TickOutcome::Normal;
        }
    }

    runtime.write().await.state = PairState::Entering;
    let reference_price = (quote.best_ask_cheap + quote.best_bid_expensive) / Decimal::TWO;

    let outcome = ctx
        .executor
        .open(
            &config.symbol,
            &quote.long_venue,
            &quote.short_venue,
            config.volume_asset,
            config.n_orders,
            reference_price,
            ctx.safety_margin,
        )
        .await;

    handle_open_outcome(config, runtime, ctx, outcome).await
}

async fn handle_open_outcome(
    config: &PairConfig,
    runtime: &Arc<RwLock<PairRuntime>>,
    ctx: &Arc<EngineContext>,
    outcome: Result<OpenOutcome, EngineError>,
) -> TickOutcome {
    match outcome {
        Ok(OpenOutcome::Complete { long_leg, short_leg }) => {
            let now = Utc::now();
            {
                let mut rt = runtime.write().await;
                rt.legs = vec![long_leg, short_leg];
                rt.filled_parts = config.n_orders;
                rt.state = PairState::Holding;
                rt.entry_ts = Some(now);
            }
            ctx.notifications
                .route(
                    Some(config.id),
                    NotificationKind::Open,
                    Severity::Info,
                    format!("{} opened", config.symbol),
                )
                .await;
            TickOutcome::Normal
        }
        Ok(OpenOutcome::StoppedEarly { filled_parts, legs }) => {
            settle_partial_open(config, runtime, ctx, filled_parts, legs, None).await;
            TickOutcome::Normal
        }
        Ok(OpenOutcome::CompensatedPartial { filled_parts, legs }) => {
            settle_partial_open(
                config,
                runtime,
                ctx,
                filled_parts,
                legs,
                Some((Severity::Warn, "second-leg failure; compensation succeeded".to_string())),
            )
            .await;
            TickOutcome::VenueError
        }
        Ok(OpenOutcome::UncompensatedPartial {
            filled_parts,
            legs,
            compensation_error,
        }) => {
            {
                let mut rt = runtime.write().await;
                rt.filled_parts = filled_parts;
                rt.legs = legs.map_or_else(Vec::new, |(l, s)| vec![l, s]);
                rt.state = PairState::Error;
            }
            ctx.notifications
                .route(
                    Some(config.id),
                    NotificationKind::SecondLegFail,
                    Severity::Error,
                    format!("second-leg failure, compensation failed: {compensation_error}; auto-trading suspended"),
                )
                .await;
            TickOutcome::VenueError
        }
        Err(err) => {
            runtime.write().await.state = PairState::Ready;
            match &err {
                EngineError::Margin { .. } => {
                    ctx.notifications
                        .route(Some(config.id), NotificationKind::Margin, Severity::Warn, err.to_string())
                        .await;
                    TickOutcome::Normal
                }
                EngineError::Venue { .. } => {
                    tracing::warn!(pair_id = %config.id, error = %err, "open sequence aborted on a venue error, retrying next tick");
                    TickOutcome::VenueError
                }
                _ => {
                    tracing::warn!(pair_id = %config.id, error = %err, "open sequence aborted");
                    TickOutcome::Normal
                }
            }
        }
    }
}

async fn settle_partial_open(
    config: &PairConfig,
    runtime: &Arc<RwLock<PairRuntime>>,
    ctx: &Arc<EngineContext>,
    filled_parts: u32,
    legs: Option<(Leg, Leg)>,
    notify: Option<(Severity, String)>,
) {
    {
        let mut rt = runtime.write().await;
        rt.filled_parts = filled_parts;
        match legs {
            Some((long_leg, short_leg)) => {
                rt.legs = vec![long_leg, short_leg];
                rt.state = PairState::Holding;
                rt.entry_ts = Some(Utc::now());
            }
            None => rt.state = PairState::Ready,
        }
    }
    if let Some((severity, message)) = notify {
        ctx.notifications
            .route(Some(config.id), NotificationKind::SecondLegFail, severity, message)
            .await;
    }
}

/// HOLDING: mark legs to market, check liquidation then stop-loss then the
/// exit spread, in that priority order (spec §4.7).
async fn evaluate_holding(config: &PairConfig, runtime: &Arc<RwLock<PairRuntime>>, ctx: &Arc<EngineContext>) -> TickOutcome {
    let legs = runtime.read().await.legs.clone();
    if legs.len() != 2 {
        return TickOutcome::Normal;
    }

    let mut venue_error = false;
    for leg in &legs {
        let Some(adapter) = ctx.registry.get_adapter(&leg.venue).await else {
            continue;
        };
        match adapter.get_open_positions().await {
            Ok(positions) => {
                if let Some(position) = positions.iter().find(|p| p.symbol == config.symbol) {
                    if arb_engine_risk::liquidation_triggered(position, true) {
                        trigger_exit(config, runtime, ctx, true, false).await;
                        return TickOutcome::Normal;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(pair_id = %config.id, venue = %leg.venue, error = %err, "position check failed, retrying next tick");
                venue_error = true;
            }
        }
    }

    let now = Utc::now();
    let mut marked_legs = legs;
    let mut marked_pnl = Decimal::ZERO;
    for leg in &mut marked_legs {
        match ctx.price_tracker.get_fresh(&leg.venue, &config.symbol, now, ctx.stale_tick_threshold) {
            Some(t) => {
                leg.current_price = t.mid();
                leg.unrealized_pnl = leg.mark_to_market(t.mid());
                marked_pnl += leg.unrealized_pnl;
            }
            // stale-tick policy: skip the rest of this evaluation entirely
            None => return if venue_error { TickOutcome::VenueError } else { TickOutcome::Normal },
        }
    }

    {
        let mut rt = runtime.write().await;
        rt.legs = marked_legs;
        rt.unrealized_pnl = marked_pnl;
        rt.last_update = now;
    }

    if arb_engine_risk::stop_loss_triggered(config.stop_loss_usdt, marked_pnl) {
        trigger_exit(config, runtime, ctx, false, true).await;
        return TickOutcome::Normal;
    }

    let tickers = fresh_tickers(config, ctx).await;
    if let Some(quote) = best_spread(&tickers) {
        runtime.write().await.current_spread = quote.current_spread_pct;
        if quote.current_spread_pct <= config.exit_spread_pct {
            trigger_exit(config, runtime, ctx, false, false).await;
        }
    }

    if venue_error {
        TickOutcome::VenueError
    } else {
        TickOutcome::Normal
    }
}

fn split_legs(legs: &[Leg]) -> Option<(Leg, Leg)> {
    let long_leg = legs.iter().find(|l| l.side == LegSide::Long)?.clone();
    let short_leg = legs.iter().find(|l| l.side == LegSide::Short)?.clone();
    Some((long_leg, short_leg))
}

fn realized_pnl_from(long_leg: &Leg, short_leg: &Leg, long_close: &OrderResult, short_close: &OrderResult) -> Decimal {
    let long_pnl = (long_close.avg_fill_price - long_leg.entry_price) * long_leg.quantity;
    let short_pnl = (short_leg.entry_price - short_close.avg_fill_price) * short_leg.quantity;
    long_pnl + short_pnl
}

/// EXITING: close both legs, losing leg first, then return to READY and
/// apply any pending config overlay (spec §4.7, §4.8).
async fn trigger_exit(config: &PairConfig, runtime: &Arc<RwLock<PairRuntime>>, ctx: &Arc<EngineContext>, was_liquidation: bool, was_stop_loss: bool) {
    let (legs, entry_ts) = {
        let mut rt = runtime.write().await;
        rt.state = PairState::Exiting;
        (rt.legs.clone(), rt.entry_ts.unwrap_or_else(Utc::now))
    };

    let Some((long_leg, short_leg)) = split_legs(&legs) else {
        runtime.write().await.state = PairState::Ready;
        return;
    };

    match ctx.executor.close(&config.symbol, &long_leg, &short_leg).await {
        Ok((long_result, short_result)) => {
            let realized_pnl = realized_pnl_from(&long_leg, &short_leg, &long_result, &short_result);
            let exit_ts = Utc::now();

            if let Err(err) = ctx
                .stats
                .record_trade_completion(
                    config.id,
                    &config.symbol,
                    &long_leg.venue,
                    &short_leg.venue,
                    entry_ts,
                    exit_ts,
                    realized_pnl,
                    was_stop_loss,
                    was_liquidation,
                )
                .await
            {
                tracing::warn!(pair_id = %config.id, error = %err, "failed to record trade completion");
            }

            let (kind, severity) = if was_liquidation {
                (NotificationKind::Liquidation, Severity::Error)
            } else if was_stop_loss {
                (NotificationKind::Sl, Severity::Warn)
            } else {
                (NotificationKind::Close, Severity::Info)
            };
            ctx.notifications
                .route(
                    Some(config.id),
                    kind,
                    severity,
                    format!("{} closed, realized_pnl={realized_pnl}", config.symbol),
                )
                .await;

            {
                let mut rt = runtime.write().await;
                rt.legs.clear();
                rt.filled_parts = 0;
                rt.unrealized_pnl = Decimal::ZERO;
                rt.realized_pnl += realized_pnl;
                rt.entry_ts = None;
                rt.state = PairState::Ready;
            }

            let _ = ctx.pairs.apply_pending_config(config.id).await;
        }
        Err(err) => {
            tracing::error!(pair_id = %config.id, error = %err, "close sequence failed; pair remains EXITING pending operator action");
        }
    }
}
