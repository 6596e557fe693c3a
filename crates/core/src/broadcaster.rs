//! Broadcaster interface produced by the engine (spec §6).
//!
//! Broadcasters are non-blocking: a slow consumer may see coalesced or
//! dropped updates. The HTTP/WebSocket front-end that would fan these out to
//! browsers is out of scope; `ChannelBroadcaster` only wraps the
//! `tokio::sync::broadcast` channel a front-end would subscribe to.

use crate::model::persistence::Notification;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub total_trades: u64,
    pub total_pnl: Decimal,
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast_notification(&self, notification: Notification);
    async fn broadcast_balance_update(&self, venue: &str, balance: Decimal);
    async fn broadcast_all_balances(&self, balances: HashMap<String, Decimal>);
    async fn broadcast_stats_update(&self, stats: StatsSnapshot);
}

/// Discards every update. Useful for headless/test configurations where no
/// front-end is attached.
#[derive(Debug, Default)]
pub struct NullBroadcaster;

#[async_trait]
impl Broadcaster for NullBroadcaster {
    async fn broadcast_notification(&self, _notification: Notification) {}
    async fn broadcast_balance_update(&self, _venue: &str, _balance: Decimal) {}
    async fn broadcast_all_balances(&self, _balances: HashMap<String, Decimal>) {}
    async fn broadcast_stats_update(&self, _stats: StatsSnapshot) {}
}

#[derive(Debug, Clone)]
pub enum BroadcastEvent {
    Notification(Notification),
    BalanceUpdate { venue: String, balance: Decimal },
    AllBalances(HashMap<String, Decimal>),
    StatsUpdate(StatsSnapshot),
}

/// Wraps a `tokio::sync::broadcast::Sender` a front-end would subscribe to.
/// A closed/lagging channel is dropped silently, matching the non-blocking
/// contract: UI liveness over UI completeness.
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl ChannelBroadcaster {
    #[must_use]
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<BroadcastEvent>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn broadcast_notification(&self, notification: Notification) {
        let _ = self.tx.send(BroadcastEvent::Notification(notification));
    }

    async fn broadcast_balance_update(&self, venue: &str, balance: Decimal) {
        let _ = self.tx.send(BroadcastEvent::BalanceUpdate {
            venue: venue.to_string(),
            balance,
        });
    }

    async fn broadcast_all_balances(&self, balances: HashMap<String, Decimal>) {
        let _ = self.tx.send(BroadcastEvent::AllBalances(balances));
    }

    async fn broadcast_stats_update(&self, stats: StatsSnapshot) {
        let _ = self.tx.send(BroadcastEvent::StatsUpdate(stats));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_channel_broadcaster_delivers_balance_update() {
        let (broadcaster, mut rx) = ChannelBroadcaster::new(16);
        broadcaster.broadcast_balance_update("bybit", dec!(1000)).await;
        let event = rx.recv().await.unwrap();
        match event {
            BroadcastEvent::BalanceUpdate { venue, balance } => {
                assert_eq!(venue, "bybit");
                assert_eq!(balance, dec!(1000));
            }
            _ => panic!("unexpected event"),
        }
    }

    #[tokio::test]
    async fn test_null_broadcaster_discards_silently() {
        let broadcaster = NullBroadcaster;
        broadcaster.broadcast_balance_update("okx", dec!(500)).await;
        // No assertion beyond "did not panic" — discard is the contract.
    }

    #[tokio::test]
    async fn test_no_subscriber_does_not_error() {
        let (broadcaster, rx) = ChannelBroadcaster::new(4);
        drop(rx);
        broadcaster.broadcast_balance_update("gate", dec!(10)).await;
    }
}
