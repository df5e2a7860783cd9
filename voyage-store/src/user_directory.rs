use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use voyage_core::{CoreError, CoreResult, UserDirectory};

/// Looks contact addresses up in the `users` table.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn email_for(&self, user_id: Uuid) -> CoreResult<Option<String>> {
        sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Unavailable(format!("user directory: {e}")))
    }
}
