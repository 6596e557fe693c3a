//! Exchange Registry: the process-wide venue connection cache (spec §4.4).
//!
//! Owns the live `Arc<dyn ExchangeAdapter>` for every connected venue plus the
//! account metadata (encrypted credentials, balance, last error) that survives
//! a disconnect. The registry and the vault secret are both process-wide
//! singletons (spec §9); teardown via `close()` is idempotent.

use arb_engine_core::adapter::ExchangeAdapter;
use arb_engine_core::model::ExchangeAccount;
use arb_engine_vault::CredentialVault;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Invoked whenever the number of connected venues changes, so the engine
/// supervisor can apply the "fewer than two venues" auto-pause rule without
/// the registry depending on the pair-task crate (spec §9 cyclic references).
pub type VenueCountCallback = Box<dyn Fn(usize) + Send + Sync>;

pub struct ExchangeRegistry {
    vault: CredentialVault,
    http_timeout: Duration,
    adapters: RwLock<HashMap<String, Arc<dyn ExchangeAdapter>>>,
    accounts: RwLock<HashMap<String, ExchangeAccount>>,
    on_count_changed: RwLock<Option<VenueCountCallback>>,
}

impl ExchangeRegistry {
    #[must_use]
    pub fn new(vault: CredentialVault, http_timeout: Duration) -> Self {
        Self {
            vault,
            http_timeout,
            adapters: RwLock::new(HashMap::new()),
            accounts: RwLock::new(HashMap::new()),
            on_count_changed: RwLock::new(None),
        }
    }

    pub async fn set_on_count_changed(&self, callback: VenueCountCallback) {
        *self.on_count_changed.write().await = Some(callback);
    }

    async fn notify_count_changed(&self) {
        let count = self.adapters.read().await.len();
        if let Some(callback) = self.on_count_changed.read().await.as_ref() {
            callback(count);
        }
    }

    /// Connects a venue: builds its adapter, authenticates, encrypts the
    /// credentials for storage, registers the live adapter, and refreshes the
    /// balance — the five-step contract of spec §4.4.
    ///
    /// # Errors
    /// Returns an error if the venue name is unsupported, the vault fails to
    /// encrypt the credentials, or the venue rejects the connection.
    pub async fn connect_exchange(
        &self,
        venue: &str,
        api_key: &str,
        secret: &str,
        passphrase: Option<&str>,
    ) -> arb_engine_core::Result<()> {
        if self.adapters.read().await.contains_key(venue) {
            return Err(arb_engine_core::EngineError::conflict(format!("{venue} is already connected")));
        }

        // 1. Build the adapter for this venue.
        let adapter = arb_engine_venues::build_adapter(venue, self.http_timeout)
            .map_err(|e| arb_engine_venues::to_engine_error(venue, e))?;

        // 2. Authenticate against the venue.
        adapter.connect(api_key, secret, passphrase).await?;

        // 3. Encrypt credentials for storage; plaintext never leaves this call.
        let encrypted_api_key = self
            .vault
            .encrypt(api_key)
            .map_err(|e| arb_engine_core::EngineError::internal(e.to_string()))?;
        let encrypted_secret = self
            .vault
            .encrypt(secret)
            .map_err(|e| arb_engine_core::EngineError::internal(e.to_string()))?;
        let encrypted_passphrase = passphrase
            .map(|p| self.vault.encrypt(p))
            .transpose()
            .map_err(|e| arb_engine_core::EngineError::internal(e.to_string()))?;

        // 4. Register the live adapter.
        self.adapters
            .write()
            .await
            .insert(venue.to_string(), adapter);

        // 5. Refresh balance and persist account metadata.
        let balance = self.get_balance_live(venue).await.unwrap_or(Decimal::ZERO);
        self.accounts.write().await.insert(
            venue.to_string(),
            ExchangeAccount {
                name: venue.to_string(),
                encrypted_api_key,
                encrypted_secret,
                encrypted_passphrase,
                connected: true,
                balance_usdt: balance,
                last_error: None,
            },
        );

        self.notify_count_changed().await;
        Ok(())
    }

    /// Disconnects a venue, tearing down its adapter. If this drops the
    /// connected-venue count below two, the registered callback fires so the
    /// supervisor can pause every ACTIVE pair (spec §4.4).
    ///
    /// # Errors
    /// Propagates any error returned by the adapter's own teardown.
    pub async fn disconnect_exchange(&self, venue: &str) -> arb_engine_core::Result<()> {
        let adapter = self.adapters.write().await.remove(venue);
        if let Some(adapter) = adapter {
            adapter.close().await?;
        }
        if let Some(account) = self.accounts.write().await.get_mut(venue) {
            account.connected = false;
            account.encrypted_api_key.clear();
            account.encrypted_secret.clear();
            account.encrypted_passphrase = None;
            account.balance_usdt = Decimal::ZERO;
        }
        self.notify_count_changed().await;
        Ok(())
    }

    #[must_use]
    pub async fn get_adapter(&self, venue: &str) -> Option<Arc<dyn ExchangeAdapter>> {
        self.adapters.read().await.get(venue).cloned()
    }

    #[must_use]
    pub async fn connected_count(&self) -> usize {
        self.adapters.read().await.len()
    }

    #[must_use]
    pub async fn connected_venues(&self) -> Vec<String> {
        self.adapters.read().await.keys().cloned().collect()
    }

    async fn get_balance_live(&self, venue: &str) -> arb_engine_core::Result<Decimal> {
        let adapter = self
            .adapters
            .read()
            .await
            .get(venue)
            .cloned()
            .ok_or_else(|| arb_engine_core::EngineError::not_found(format!("venue {venue} not connected")))?;
        adapter.get_balance().await
    }

    /// Refreshes one venue's stored balance from its live adapter.
    ///
    /// # Errors
    /// Returns an error if the venue is not connected or the adapter read
    /// fails; on failure `last_error` is recorded rather than propagated to
    /// the caller's account snapshot.
    pub async fn update_balance(&self, venue: &str) -> arb_engine_core::Result<()> {
        match self.get_balance_live(venue).await {
            Ok(balance) => {
                if let Some(account) = self.accounts.write().await.get_mut(venue) {
                    account.balance_usdt = balance;
                    account.last_error = None;
                }
                Ok(())
            }
            Err(err) => {
                if let Some(account) = self.accounts.write().await.get_mut(venue) {
                    account.last_error = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Refreshes every connected venue's balance. A single venue's failure is
    /// recorded on its account and never aborts the fan-out (spec §4.4).
    pub async fn update_all_balances(&self) {
        let venues: Vec<String> = self.adapters.read().await.keys().cloned().collect();
        for venue in venues {
            if let Err(err) = self.update_balance(&venue).await {
                tracing::warn!(venue, error = %err, "balance refresh failed");
            }
        }
    }

    /// Returns account snapshots for display, with ciphertext stripped
    /// (spec §4.4: "credential-stripping on UI reads").
    #[must_use]
    pub async fn list_accounts(&self) -> Vec<ExchangeAccount> {
        self.accounts
            .read()
            .await
            .values()
            .map(|account| ExchangeAccount {
                name: account.name.clone(),
                encrypted_api_key: String::new(),
                encrypted_secret: String::new(),
                encrypted_passphrase: None,
                connected: account.connected,
                balance_usdt: account.balance_usdt,
                last_error: account.last_error.clone(),
            })
            .collect()
    }

    /// Idempotent teardown of every connected adapter.
    pub async fn close(&self) {
        let adapters: Vec<Arc<dyn ExchangeAdapter>> =
            self.adapters.write().await.drain().map(|(_, a)| a).collect();
        for adapter in adapters {
            if let Err(err) = adapter.close().await {
                tracing::warn!(venue = adapter.name(), error = %err, "error closing adapter");
            }
        }
        self.accounts.write().await.clear();
        self.notify_count_changed().await;
    }
}
