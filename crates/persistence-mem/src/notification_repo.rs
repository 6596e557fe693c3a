use arb_engine_core::error::Result;
use arb_engine_core::model::persistence::{Notification, NotificationKind};
use arb_engine_core::repository::NotificationRepository;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// In-memory `NotificationRepository`. Stored oldest-first; `get_recent`
/// returns newest-first, matching what a notification feed displays.
#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<Vec<Notification>>,
}

impl InMemoryNotificationRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn create(&self, notification: Notification) -> Result<()> {
        self.notifications.write().await.push(notification);
        Ok(())
    }

    async fn get_recent(&self, limit: usize) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications.iter().rev().take(limit).cloned().collect())
    }

    async fn get_by_types(&self, kinds: &[NotificationKind]) -> Result<Vec<Notification>> {
        Ok(self
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| kinds.contains(&n.kind))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.notifications.read().await.len())
    }

    async fn count_by_type(&self, kind: NotificationKind) -> Result<usize> {
        Ok(self.notifications.read().await.iter().filter(|n| n.kind == kind).count())
    }

    async fn keep_recent(&self, n: usize) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        let drop = notifications.len().saturating_sub(n);
        notifications.drain(0..drop);
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.notifications.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_engine_core::model::persistence::Severity;
    use chrono::Utc;
    use uuid::Uuid;

    fn notification(kind: NotificationKind) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            pair_id: None,
            kind,
            severity: Severity::Info,
            message: "test".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn get_recent_returns_newest_first() {
        let repo = InMemoryNotificationRepository::new();
        repo.create(notification(NotificationKind::Open)).await.unwrap();
        repo.create(notification(NotificationKind::Close)).await.unwrap();
        let recent = repo.get_recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].kind, NotificationKind::Close);
    }

    #[tokio::test]
    async fn count_by_type_filters_correctly() {
        let repo = InMemoryNotificationRepository::new();
        repo.create(notification(NotificationKind::Open)).await.unwrap();
        repo.create(notification(NotificationKind::Open)).await.unwrap();
        repo.create(notification(NotificationKind::Sl)).await.unwrap();
        assert_eq!(repo.count_by_type(NotificationKind::Open).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn keep_recent_caps_retention() {
        let repo = InMemoryNotificationRepository::new();
        for _ in 0..5 {
            repo.create(notification(NotificationKind::Open)).await.unwrap();
        }
        repo.keep_recent(2).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn get_by_types_matches_any_listed_kind() {
        let repo = InMemoryNotificationRepository::new();
        repo.create(notification(NotificationKind::Open)).await.unwrap();
        repo.create(notification(NotificationKind::Margin)).await.unwrap();
        repo.create(notification(NotificationKind::Close)).await.unwrap();
        let hits = repo
            .get_by_types(&[NotificationKind::Open, NotificationKind::Margin])
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }
}
