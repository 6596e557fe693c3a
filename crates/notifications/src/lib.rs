//! Notification Router (spec §4.10): on every engine event, consult the
//! user's preferences, drop silently if the matching flag is off, otherwise
//! persist and push to the broadcaster. A failed preference lookup never
//! loses an event — it persists and pushes as though enabled.

use arb_engine_core::broadcaster::Broadcaster;
use arb_engine_core::model::persistence::{Notification, NotificationKind, NotificationPreferences, Severity};
use arb_engine_core::repository::{NotificationRepository, SettingsRepository};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Most-recent notification rows retained (spec §4.10).
pub const RETENTION_CAP: usize = 500;

/// Cadence of the background `keep_recent` sweep. Not spec-mandated; picked
/// to bound retained-row churn without adding lookup pressure on every route
/// call (see DESIGN.md).
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct NotificationRouter {
    notifications: Arc<dyn NotificationRepository>,
    settings: Arc<dyn SettingsRepository>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl NotificationRouter {
    #[must_use]
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        settings: Arc<dyn SettingsRepository>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            notifications,
            settings,
            broadcaster,
        }
    }

    fn is_enabled(prefs: &NotificationPreferences, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::Open => prefs.open,
            NotificationKind::Close => prefs.close,
            NotificationKind::Sl => prefs.sl,
            NotificationKind::Liquidation => prefs.liquidation,
            NotificationKind::Error => prefs.error,
            NotificationKind::Margin => prefs.margin,
            NotificationKind::Pause => prefs.pause,
            NotificationKind::SecondLegFail => prefs.second_leg_fail,
        }
    }

    /// Routes one event. Drops it silently (no persistence) if the user
    /// disabled its kind; otherwise persists then broadcasts.
    pub async fn route(&self, pair_id: Option<Uuid>, kind: NotificationKind, severity: Severity, message: impl Into<String>) {
        let allowed = match self.settings.get().await {
            Ok(settings) => Self::is_enabled(&settings.notification_prefs, kind),
            Err(err) => {
                tracing::warn!(error = %err, "preference lookup failed, routing event anyway");
                true
            }
        };
        if !allowed {
            return;
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            pair_id,
            kind,
            severity,
            message: message.into(),
            created_at: Utc::now(),
        };

        if let Err(err) = self.notifications.create(notification.clone()).await {
            tracing::error!(error = %err, "failed to persist notification");
        }
        self.broadcaster.broadcast_notification(notification).await;
    }

    async fn retention_sweep(&self) {
        if let Err(err) = self.notifications.keep_recent(RETENTION_CAP).await {
            tracing::warn!(error = %err, "notification retention sweep failed");
        }
    }

    /// Runs the periodic retention sweep until the shutdown signal fires.
    pub async fn run_retention_sweep(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.retention_sweep().await,
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
