use arb_engine_core::error::{EngineError, Result};
use arb_engine_core::model::persistence::BlacklistEntry;
use arb_engine_core::repository::BlacklistRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory `BlacklistRepository`, keyed by symbol.
#[derive(Default)]
pub struct InMemoryBlacklistRepository {
    entries: RwLock<HashMap<String, BlacklistEntry>>,
}

impl InMemoryBlacklistRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlacklistRepository for InMemoryBlacklistRepository {
    async fn create(&self, entry: BlacklistEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.symbol) {
            return Err(EngineError::conflict(format!("{} is already blacklisted", entry.symbol)));
        }
        entries.insert(entry.symbol.clone(), entry);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<BlacklistEntry>> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn get_by_symbol(&self, symbol: &str) -> Result<BlacklistEntry> {
        self.entries
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("blacklist entry {symbol}")))
    }

    async fn delete(&self, symbol: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .remove(symbol)
            .ok_or_else(|| EngineError::not_found(format!("blacklist entry {symbol}")))?;
        Ok(())
    }

    async fn exists(&self, symbol: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(symbol))
    }

    async fn update_reason(&self, symbol: &str, reason: String) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(symbol)
            .ok_or_else(|| EngineError::not_found(format!("blacklist entry {symbol}")))?;
        entry.reason = reason;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn delete_all(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<BlacklistEntry>> {
        let query = query.to_uppercase();
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.symbol.to_uppercase().contains(&query))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(symbol: &str) -> BlacklistEntry {
        BlacklistEntry {
            symbol: symbol.to_string(),
            reason: "low liquidity".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_exists() {
        let repo = InMemoryBlacklistRepository::new();
        repo.create(sample("SHIBUSDT")).await.unwrap();
        assert!(repo.exists("SHIBUSDT").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let repo = InMemoryBlacklistRepository::new();
        repo.create(sample("SHIBUSDT")).await.unwrap();
        assert!(repo.create(sample("SHIBUSDT")).await.is_err());
    }

    #[tokio::test]
    async fn update_reason_then_get_reflects_it() {
        let repo = InMemoryBlacklistRepository::new();
        repo.create(sample("SHIBUSDT")).await.unwrap();
        repo.update_reason("SHIBUSDT", "delisted".to_string()).await.unwrap();
        assert_eq!(repo.get_by_symbol("SHIBUSDT").await.unwrap().reason, "delisted");
    }

    #[tokio::test]
    async fn delete_then_missing_lookups_fail() {
        let repo = InMemoryBlacklistRepository::new();
        repo.create(sample("SHIBUSDT")).await.unwrap();
        repo.delete("SHIBUSDT").await.unwrap();
        assert!(!repo.exists("SHIBUSDT").await.unwrap());
        assert!(repo.get_by_symbol("SHIBUSDT").await.is_err());
    }
}
