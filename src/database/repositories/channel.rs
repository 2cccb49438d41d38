//! Channel roster repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::ChannelDbModel;
use crate::database::time::now_ms;
use crate::{Error, Result};

/// Channel repository trait.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get_channel(&self, id: &str) -> Result<ChannelDbModel>;
    async fn list_channels(&self) -> Result<Vec<ChannelDbModel>>;
    async fn list_enabled_channels(&self) -> Result<Vec<ChannelDbModel>>;
    /// Channels with no avatar yet, oldest first. `limit = 0` means no limit.
    async fn list_channels_missing_avatar(&self, limit: u32) -> Result<Vec<ChannelDbModel>>;
    async fn create_channel(&self, channel: &ChannelDbModel) -> Result<()>;
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()>;
    async fn update_avatar(&self, id: &str, avatar_url: &str) -> Result<()>;
    async fn delete_channel(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of ChannelRepository.
pub struct SqlxChannelRepository {
    pool: SqlitePool,
}

impl SqlxChannelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for SqlxChannelRepository {
    async fn get_channel(&self, id: &str) -> Result<ChannelDbModel> {
        sqlx::query_as::<_, ChannelDbModel>("SELECT * FROM channels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Channel", id))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelDbModel>> {
        let channels =
            sqlx::query_as::<_, ChannelDbModel>("SELECT * FROM channels ORDER BY title")
                .fetch_all(&self.pool)
                .await?;
        Ok(channels)
    }

    async fn list_enabled_channels(&self) -> Result<Vec<ChannelDbModel>> {
        let channels = sqlx::query_as::<_, ChannelDbModel>(
            "SELECT * FROM channels WHERE enabled = 1 ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(channels)
    }

    async fn list_channels_missing_avatar(&self, limit: u32) -> Result<Vec<ChannelDbModel>> {
        let sql = if limit > 0 {
            "SELECT * FROM channels WHERE enabled = 1 AND (avatar_url IS NULL OR avatar_url = '') ORDER BY created_at LIMIT ?"
        } else {
            "SELECT * FROM channels WHERE enabled = 1 AND (avatar_url IS NULL OR avatar_url = '') ORDER BY created_at"
        };
        let mut query = sqlx::query_as::<_, ChannelDbModel>(sql);
        if limit > 0 {
            query = query.bind(limit);
        }
        let channels = query.fetch_all(&self.pool).await?;
        Ok(channels)
    }

    async fn create_channel(&self, channel: &ChannelDbModel) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO channels (id, title, avatar_url, enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&channel.id)
        .bind(&channel.title)
        .bind(&channel.avatar_url)
        .bind(channel.enabled)
        .bind(channel.created_at)
        .bind(channel.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::validation(format!(
                    "channel {} already exists",
                    channel.id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let affected = sqlx::query("UPDATE channels SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if affected.rows_affected() == 0 {
            return Err(Error::not_found("Channel", id));
        }
        Ok(())
    }

    async fn update_avatar(&self, id: &str, avatar_url: &str) -> Result<()> {
        sqlx::query("UPDATE channels SET avatar_url = ?, updated_at = ? WHERE id = ?")
            .bind(avatar_url)
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_channel(&self, id: &str) -> Result<()> {
        let affected = sqlx::query("DELETE FROM channels WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if affected.rows_affected() == 0 {
            return Err(Error::not_found("Channel", id));
        }
        Ok(())
    }
}
