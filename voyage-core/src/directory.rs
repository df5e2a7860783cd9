use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::CoreResult;

/// Resolves the contact address for a user id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn email_for(&self, user_id: Uuid) -> CoreResult<Option<String>>;
}

/// Fixed in-memory directory for tests and local runs.
#[derive(Default)]
pub struct StaticUserDirectory {
    emails: RwLock<HashMap<Uuid, String>>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid, email: impl Into<String>) {
        self.emails.write().await.insert(user_id, email.into());
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn email_for(&self, user_id: Uuid) -> CoreResult<Option<String>> {
        Ok(self.emails.read().await.get(&user_id).cloned())
    }
}
