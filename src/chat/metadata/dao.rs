//! 会话元数据数据访问层（DAO）
//!
//! 元数据与会话记录分表存放，任何会话 upsert 都不会触碰这张表；
//! 读取不存在的 key 时返回空元数据而不是 None，调用方无需区分。

use crate::chat::error::Result;
use crate::chat::metadata::models::{ChatMetadata, ChatTag};
use crate::chat::notify::{ChangeHub, RecordFamily};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use std::sync::Arc;

/// 元数据 DAO
pub struct MetadataDao {
    db: Pool<Sqlite>,
    hub: Arc<ChangeHub>,
}

impl MetadataDao {
    pub fn new(db: Pool<Sqlite>, hub: Arc<ChangeHub>) -> Self {
        Self { db, hub }
    }

    fn row_to_metadata(row: sqlx::sqlite::SqliteRow) -> ChatMetadata {
        let tags_json: String = row.get("tags_json");
        let tags: Vec<ChatTag> = serde_json::from_str(&tags_json).unwrap_or_default();
        ChatMetadata {
            chat_key: row.get("chat_key"),
            messages_fetched: row.get::<i64, _>("messages_fetched") != 0,
            last_fetched_at: row.get("last_fetched_at"),
            is_blocked: row.get::<i64, _>("is_blocked") != 0,
            is_archived: row.get::<i64, _>("is_archived") != 0,
            tags,
        }
    }

    /// 读取某会话的元数据（无记录时返回空元数据）
    pub async fn get_metadata(&self, chat_key: &str) -> Result<ChatMetadata> {
        let row = sqlx::query("SELECT * FROM chat_metadata WHERE chat_key = ?")
            .bind(chat_key)
            .fetch_optional(&self.db)
            .await?;
        Ok(row
            .map(Self::row_to_metadata)
            .unwrap_or_else(|| ChatMetadata::empty(chat_key)))
    }

    /// 读取全部元数据（查询层批量合并用）
    pub async fn get_all_metadata(&self) -> Result<Vec<ChatMetadata>> {
        let rows = sqlx::query("SELECT * FROM chat_metadata")
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Self::row_to_metadata).collect())
    }

    /// 整条写入元数据
    pub async fn upsert_metadata(&self, meta: &ChatMetadata) -> Result<()> {
        let tags_json = serde_json::to_string(&meta.tags)?;
        let sql = r#"
            INSERT INTO chat_metadata (
                chat_key, messages_fetched, last_fetched_at,
                is_blocked, is_archived, tags_json
            ) VALUES (?,?,?,?,?,?)
            ON CONFLICT(chat_key) DO UPDATE SET
                messages_fetched = excluded.messages_fetched,
                last_fetched_at = excluded.last_fetched_at,
                is_blocked = excluded.is_blocked,
                is_archived = excluded.is_archived,
                tags_json = excluded.tags_json
        "#;
        sqlx::query(sql)
            .bind(&meta.chat_key)
            .bind(if meta.messages_fetched { 1 } else { 0 })
            .bind(meta.last_fetched_at)
            .bind(if meta.is_blocked { 1 } else { 0 })
            .bind(if meta.is_archived { 1 } else { 0 })
            .bind(tags_json)
            .execute(&self.db)
            .await?;
        self.hub
            .publish(RecordFamily::Metadata, Some(meta.chat_key.clone()));
        Ok(())
    }

    /// 设置归档标记（仅归档同步与显式操作调用）
    pub async fn set_archived(&self, chat_key: &str, archived: bool) -> Result<()> {
        let mut meta = self.get_metadata(chat_key).await?;
        meta.is_archived = archived;
        self.upsert_metadata(&meta).await
    }

    /// 设置屏蔽标记
    pub async fn set_blocked(&self, chat_key: &str, blocked: bool) -> Result<()> {
        let mut meta = self.get_metadata(chat_key).await?;
        meta.is_blocked = blocked;
        self.upsert_metadata(&meta).await
    }

    /// 标记消息历史已完整回填，并记录拉取时间
    pub async fn mark_messages_fetched(&self, chat_key: &str) -> Result<()> {
        let mut meta = self.get_metadata(chat_key).await?;
        meta.messages_fetched = true;
        meta.last_fetched_at = Utc::now().timestamp_millis();
        self.upsert_metadata(&meta).await
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chat_metadata")
            .execute(&self.db)
            .await?;
        self.hub.publish(RecordFamily::Metadata, None);
        Ok(())
    }
}
