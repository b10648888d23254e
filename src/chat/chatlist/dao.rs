//! 会话/文件夹/游标数据访问层（DAO）
//!
//! 负责会话列表相关的全部数据库操作，将数据访问逻辑与业务逻辑分离。
//! 写入以规范 key 为冲突键，单条 upsert 原子执行；每次写入后广播变更事件。

use crate::chat::chatlist::models::{LocalChat, LocalFolder, SyncCursor};
use crate::chat::error::Result;
use crate::chat::notify::{ChangeHub, RecordFamily};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use std::sync::Arc;
use tracing::debug;

/// 会话 DAO
pub struct ChatDao {
    db: Pool<Sqlite>,
    hub: Arc<ChangeHub>,
}

impl ChatDao {
    pub fn new(db: Pool<Sqlite>, hub: Arc<ChangeHub>) -> Self {
        Self { db, hub }
    }

    fn row_to_chat(row: sqlx::sqlite::SqliteRow) -> LocalChat {
        LocalChat {
            chat_key: row.get("chat_key"),
            group_id: row.get("group_id"),
            db_id: row.get("db_id"),
            broadcast_id: row.get("broadcast_id"),
            name: row.get("name"),
            avatar: row.get("avatar"),
            last_message: row.get("last_message"),
            last_activity: row.get("last_activity"),
            last_activity_ts: row.get("last_activity_ts"),
            unread_count: row.get("unread_count"),
            is_pinned: row.get::<i64, _>("is_pinned") != 0,
            is_online: row.get::<i64, _>("is_online") != 0,
            folder_id: row.get("folder_id"),
            is_broadcast: row.get::<i64, _>("is_broadcast") != 0,
            broadcast_type: row.get("broadcast_type"),
            subject: row.get("subject"),
            body: row.get("body"),
        }
    }

    /// 插入或更新会话（远端来源字段全量覆盖）
    pub async fn upsert_chat(&self, chat: &LocalChat) -> Result<()> {
        let sql = r#"
            INSERT INTO chats (
                chat_key, group_id, db_id, broadcast_id, name, avatar,
                last_message, last_activity, last_activity_ts, unread_count,
                is_pinned, is_online, folder_id, is_broadcast, broadcast_type,
                subject, body
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(chat_key) DO UPDATE SET
                group_id = excluded.group_id,
                db_id = excluded.db_id,
                broadcast_id = excluded.broadcast_id,
                name = excluded.name,
                avatar = excluded.avatar,
                last_message = excluded.last_message,
                last_activity = excluded.last_activity,
                last_activity_ts = excluded.last_activity_ts,
                unread_count = excluded.unread_count,
                is_pinned = excluded.is_pinned,
                is_online = excluded.is_online,
                folder_id = excluded.folder_id,
                is_broadcast = excluded.is_broadcast,
                broadcast_type = excluded.broadcast_type,
                subject = excluded.subject,
                body = excluded.body
        "#;
        sqlx::query(sql)
            .bind(&chat.chat_key)
            .bind(chat.group_id)
            .bind(chat.db_id)
            .bind(&chat.broadcast_id)
            .bind(&chat.name)
            .bind(&chat.avatar)
            .bind(&chat.last_message)
            .bind(&chat.last_activity)
            .bind(chat.last_activity_ts)
            .bind(chat.unread_count)
            .bind(if chat.is_pinned { 1 } else { 0 })
            .bind(if chat.is_online { 1 } else { 0 })
            .bind(chat.folder_id)
            .bind(if chat.is_broadcast { 1 } else { 0 })
            .bind(chat.broadcast_type)
            .bind(&chat.subject)
            .bind(&chat.body)
            .execute(&self.db)
            .await?;

        self.hub
            .publish(RecordFamily::Chats, Some(chat.chat_key.clone()));
        Ok(())
    }

    /// 获取全部本地会话
    pub async fn get_all_chats(&self) -> Result<Vec<LocalChat>> {
        // 按 rowid 返回，保证"发现顺序"稳定（查询层文本分组依赖这一点）
        let rows = sqlx::query("SELECT * FROM chats ORDER BY rowid")
            .fetch_all(&self.db)
            .await?;
        let chats: Vec<LocalChat> = rows.into_iter().map(Self::row_to_chat).collect();
        debug!("[ChatDAO] 获取本地会话列表，共 {} 个", chats.len());
        Ok(chats)
    }

    /// 按文件夹获取会话（走 folder_id 索引）
    pub async fn get_chats_by_folder(&self, folder_id: i64) -> Result<Vec<LocalChat>> {
        let rows = sqlx::query("SELECT * FROM chats WHERE folder_id = ? ORDER BY rowid")
            .bind(folder_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Self::row_to_chat).collect())
    }

    /// 按规范 key 查询单个会话
    pub async fn get_chat_by_key(&self, chat_key: &str) -> Result<Option<LocalChat>> {
        let row = sqlx::query("SELECT * FROM chats WHERE chat_key = ?")
            .bind(chat_key)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Self::row_to_chat))
    }

    /// 删除单个会话（仅文件夹移除或显式清缓存时使用）
    pub async fn delete_chat(&self, chat_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM chats WHERE chat_key = ?")
            .bind(chat_key)
            .execute(&self.db)
            .await?;
        self.hub
            .publish(RecordFamily::Chats, Some(chat_key.to_string()));
        Ok(())
    }

    /// 总未读消息数
    pub async fn total_unread(&self) -> Result<i32> {
        let row = sqlx::query("SELECT SUM(unread_count) as total FROM chats")
            .fetch_one(&self.db)
            .await?;
        let total: Option<i64> = row.get("total");
        Ok(total.unwrap_or(0) as i32)
    }

    /// 清空会话表（显式清缓存）
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chats").execute(&self.db).await?;
        self.hub.publish(RecordFamily::Chats, None);
        Ok(())
    }
}

/// 文件夹 DAO
pub struct FolderDao {
    db: Pool<Sqlite>,
    hub: Arc<ChangeHub>,
}

impl FolderDao {
    pub fn new(db: Pool<Sqlite>, hub: Arc<ChangeHub>) -> Self {
        Self { db, hub }
    }

    pub async fn upsert_folder(&self, folder: &LocalFolder) -> Result<()> {
        let sql = r#"
            INSERT INTO folders (folder_id, name, unread_count)
            VALUES (?,?,?)
            ON CONFLICT(folder_id) DO UPDATE SET
                name = excluded.name,
                unread_count = excluded.unread_count
        "#;
        sqlx::query(sql)
            .bind(folder.folder_id)
            .bind(&folder.name)
            .bind(folder.unread_count)
            .execute(&self.db)
            .await?;
        self.hub
            .publish(RecordFamily::Folders, Some(folder.folder_id.to_string()));
        Ok(())
    }

    pub async fn get_all_folders(&self) -> Result<Vec<LocalFolder>> {
        let rows = sqlx::query("SELECT folder_id, name, unread_count FROM folders")
            .fetch_all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| LocalFolder {
                folder_id: row.get("folder_id"),
                name: row.get("name"),
                unread_count: row.get("unread_count"),
            })
            .collect())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM folders").execute(&self.db).await?;
        self.hub.publish(RecordFamily::Folders, None);
        Ok(())
    }
}

/// 同步游标 DAO
pub struct CursorDao {
    db: Pool<Sqlite>,
    hub: Arc<ChangeHub>,
}

impl CursorDao {
    pub fn new(db: Pool<Sqlite>, hub: Arc<ChangeHub>) -> Self {
        Self { db, hub }
    }

    pub async fn get_cursor(&self, scope: &str) -> Result<Option<SyncCursor>> {
        let row = sqlx::query(
            "SELECT scope, last_activity_ts, updated_at FROM sync_cursors WHERE scope = ?",
        )
        .bind(scope)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(|row| SyncCursor {
            scope: row.get("scope"),
            last_activity_ts: row.get("last_activity_ts"),
            updated_at: row.get("updated_at"),
        }))
    }

    pub async fn save_cursor(&self, scope: &str, last_activity_ts: i64) -> Result<()> {
        let sql = r#"
            INSERT INTO sync_cursors (scope, last_activity_ts, updated_at)
            VALUES (?,?,?)
            ON CONFLICT(scope) DO UPDATE SET
                last_activity_ts = excluded.last_activity_ts,
                updated_at = excluded.updated_at
        "#;
        sqlx::query(sql)
            .bind(scope)
            .bind(last_activity_ts)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.db)
            .await?;
        self.hub
            .publish(RecordFamily::Cursors, Some(scope.to_string()));
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM sync_cursors")
            .execute(&self.db)
            .await?;
        self.hub.publish(RecordFamily::Cursors, None);
        Ok(())
    }
}
