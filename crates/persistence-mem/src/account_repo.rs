use arb_engine_core::error::{EngineError, Result};
use arb_engine_core::model::ExchangeAccount;
use arb_engine_core::repository::ExchangeAccountRepository;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory `ExchangeAccountRepository`, keyed by venue name — there is no
/// separate numeric id, so `get_by_id`/`get_by_name` are the same lookup.
#[derive(Default)]
pub struct InMemoryExchangeAccountRepository {
    accounts: RwLock<HashMap<String, ExchangeAccount>>,
}

impl InMemoryExchangeAccountRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExchangeAccountRepository for InMemoryExchangeAccountRepository {
    async fn create(&self, account: ExchangeAccount) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.name) {
            return Err(EngineError::conflict(format!("account {} already exists", account.name)));
        }
        accounts.insert(account.name.clone(), account);
        Ok(())
    }

    async fn get_by_name(&self, name: &str) -> Result<ExchangeAccount> {
        self.accounts
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("account {name}")))
    }

    async fn get_by_id(&self, name: &str) -> Result<ExchangeAccount> {
        self.get_by_name(name).await
    }

    async fn get_all(&self) -> Result<Vec<ExchangeAccount>> {
        Ok(self.accounts.read().await.values().cloned().collect())
    }

    async fn get_connected(&self) -> Result<Vec<ExchangeAccount>> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.connected)
            .cloned()
            .collect())
    }

    async fn update(&self, account: ExchangeAccount) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if !accounts.contains_key(&account.name) {
            return Err(EngineError::not_found(format!("account {}", account.name)));
        }
        accounts.insert(account.name.clone(), account);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.accounts
            .write()
            .await
            .remove(name)
            .ok_or_else(|| EngineError::not_found(format!("account {name}")))?;
        Ok(())
    }

    async fn update_balance(&self, name: &str, balance: Decimal) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(name).ok_or_else(|| EngineError::not_found(format!("account {name}")))?;
        account.balance_usdt = balance;
        Ok(())
    }

    async fn set_last_error(&self, name: &str, error: Option<String>) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(name).ok_or_else(|| EngineError::not_found(format!("account {name}")))?;
        account.last_error = error;
        Ok(())
    }

    async fn count_connected(&self) -> Result<usize> {
        Ok(self.accounts.read().await.values().filter(|a| a.connected).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, connected: bool) -> ExchangeAccount {
        ExchangeAccount {
            name: name.to_string(),
            encrypted_api_key: "enc-key".to_string(),
            encrypted_secret: "enc-secret".to_string(),
            encrypted_passphrase: None,
            connected,
            balance_usdt: Decimal::ZERO,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_by_name_round_trips() {
        let repo = InMemoryExchangeAccountRepository::new();
        repo.create(sample("bybit", true)).await.unwrap();
        let account = repo.get_by_name("bybit").await.unwrap();
        assert!(account.connected);
    }

    #[tokio::test]
    async fn get_by_id_aliases_get_by_name() {
        let repo = InMemoryExchangeAccountRepository::new();
        repo.create(sample("bybit", true)).await.unwrap();
        assert_eq!(repo.get_by_id("bybit").await.unwrap().name, "bybit");
    }

    #[tokio::test]
    async fn count_connected_only_counts_connected_accounts() {
        let repo = InMemoryExchangeAccountRepository::new();
        repo.create(sample("bybit", true)).await.unwrap();
        repo.create(sample("okx", false)).await.unwrap();
        assert_eq!(repo.count_connected().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_last_error_then_update_balance() {
        let repo = InMemoryExchangeAccountRepository::new();
        repo.create(sample("bybit", true)).await.unwrap();
        repo.set_last_error("bybit", Some("timeout".to_string())).await.unwrap();
        repo.update_balance("bybit", Decimal::from(100)).await.unwrap();
        let account = repo.get_by_name("bybit").await.unwrap();
        assert_eq!(account.last_error, Some("timeout".to_string()));
        assert_eq!(account.balance_usdt, Decimal::from(100));
    }

    #[tokio::test]
    async fn delete_missing_account_not_found() {
        let repo = InMemoryExchangeAccountRepository::new();
        assert!(repo.delete("bybit").await.is_err());
    }
}
