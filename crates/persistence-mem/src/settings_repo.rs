use arb_engine_core::error::Result;
use arb_engine_core::model::persistence::{NotificationPreferences, Settings};
use arb_engine_core::repository::SettingsRepository;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// In-memory `SettingsRepository`. There is exactly one `Settings` row per
/// process, same as the durable store this stands in for.
pub struct InMemorySettingsRepository {
    settings: RwLock<Settings>,
}

impl Default for InMemorySettingsRepository {
    fn default() -> Self {
        Self {
            settings: RwLock::new(Settings::default()),
        }
    }
}

impl InMemorySettingsRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(&self) -> Result<Settings> {
        Ok(self.settings.read().await.clone())
    }

    async fn update(&self, settings: Settings) -> Result<()> {
        *self.settings.write().await = settings;
        Ok(())
    }

    async fn update_notification_prefs(&self, prefs: NotificationPreferences) -> Result<()> {
        self.settings.write().await.notification_prefs = prefs;
        Ok(())
    }

    async fn update_consider_funding(&self, consider_funding: bool) -> Result<()> {
        self.settings.write().await.consider_funding = consider_funding;
        Ok(())
    }

    async fn update_max_concurrent_trades(&self, max: Option<u32>) -> Result<()> {
        self.settings.write().await.max_concurrent_trades = max;
        Ok(())
    }

    async fn reset_to_defaults(&self) -> Result<()> {
        *self.settings.write().await = Settings::default();
        Ok(())
    }
}
