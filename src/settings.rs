//! Key-value settings stored on database.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;

pub const APPROVALS_WEBHOOK: &str = "jexactyl::approvals:webhook";
pub const APPROVALS_WEBHOOK_URL: &str = "jexactyl::approvals:webhook_url";
pub const APP_NAME: &str = "settings::app:name";

/// Port for reading panel settings.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Get raw value of `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Get value of `key` or `default` when unset.
    async fn get_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get(key).await?.unwrap_or_else(|| default.to_owned()))
    }
}

/// PostgreSQL settings repository.
#[derive(Clone)]
pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    /// Create a new [`PgSettingsRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace `key`.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar::<_, String>(
                r#"SELECT value FROM settings WHERE key = $1"#,
            )
            .bind(key)
            .fetch_optional(&self.pool)
            .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[sqlx::test]
    async fn test_get_and_set(pool: Pool<Postgres>) {
        let settings = PgSettingsRepository::new(pool);

        assert_eq!(settings.get(APP_NAME).await.unwrap(), None);
        assert_eq!(settings.get_or(APP_NAME, "Panel").await.unwrap(), "Panel");

        settings.set(APP_NAME, "Nebula").await.unwrap();
        settings.set(APP_NAME, "Nebula Hosting").await.unwrap();
        assert_eq!(
            settings.get(APP_NAME).await.unwrap().as_deref(),
            Some("Nebula Hosting")
        );
    }
}
