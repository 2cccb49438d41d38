//! API key repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::ApiKeyDbModel;
use crate::database::time::now_ms;
use crate::{Error, Result};

/// API key repository trait.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn get_key(&self, id: &str) -> Result<ApiKeyDbModel>;
    async fn list_keys(&self) -> Result<Vec<ApiKeyDbModel>>;
    async fn create_key(&self, key: &ApiKeyDbModel) -> Result<()>;
    /// Operator toggle. Enabling also clears the error counter so the key
    /// re-enters rotation cleanly.
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()>;
    async fn delete_key(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of ApiKeyRepository.
pub struct SqlxApiKeyRepository {
    pool: SqlitePool,
}

impl SqlxApiKeyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepository for SqlxApiKeyRepository {
    async fn get_key(&self, id: &str) -> Result<ApiKeyDbModel> {
        sqlx::query_as::<_, ApiKeyDbModel>("SELECT * FROM api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("ApiKey", id))
    }

    async fn list_keys(&self) -> Result<Vec<ApiKeyDbModel>> {
        let keys =
            sqlx::query_as::<_, ApiKeyDbModel>("SELECT * FROM api_keys ORDER BY created_at, name")
                .fetch_all(&self.pool)
                .await?;
        Ok(keys)
    }

    async fn create_key(&self, key: &ApiKeyDbModel) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO api_keys (
                id, name, secret, status, quota_used_today, total_requests,
                last_used_at, last_quota_reset_at, quota_exceeded_at,
                consecutive_errors, last_error, last_error_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key.id)
        .bind(&key.name)
        .bind(&key.secret)
        .bind(&key.status)
        .bind(key.quota_used_today)
        .bind(key.total_requests)
        .bind(key.last_used_at)
        .bind(key.last_quota_reset_at)
        .bind(key.quota_exceeded_at)
        .bind(key.consecutive_errors)
        .bind(&key.last_error)
        .bind(key.last_error_at)
        .bind(key.created_at)
        .bind(key.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                Error::validation("an API key with this secret already exists"),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let now = now_ms();
        let affected = if enabled {
            sqlx::query(
                r#"
                UPDATE api_keys
                SET status = 'active',
                    consecutive_errors = 0,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query("UPDATE api_keys SET status = 'inactive', updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?
        };

        if affected.rows_affected() == 0 {
            return Err(Error::not_found("ApiKey", id));
        }
        Ok(())
    }

    async fn delete_key(&self, id: &str) -> Result<()> {
        let affected = sqlx::query("DELETE FROM api_keys WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if affected.rows_affected() == 0 {
            return Err(Error::not_found("ApiKey", id));
        }
        Ok(())
    }
}
