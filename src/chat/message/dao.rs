//! 消息数据访问层（DAO）
//!
//! 单表存放全部消息，(group_id, message_id) 为冲突键，(group_id, ts) 建索引。
//! 读取一律按时间戳升序返回；"最新消息"指时间戳最大的那条（不假设 ID 随时间单调）。

use crate::chat::error::Result;
use crate::chat::message::models::LocalMessage;
use crate::chat::notify::{ChangeHub, RecordFamily};
use sqlx::{Pool, Row, Sqlite};
use std::sync::Arc;
use tracing::debug;

/// 消息 DAO
pub struct MessageDao {
    db: Pool<Sqlite>,
    hub: Arc<ChangeHub>,
}

impl MessageDao {
    pub fn new(db: Pool<Sqlite>, hub: Arc<ChangeHub>) -> Self {
        Self { db, hub }
    }

    fn row_to_message(row: sqlx::sqlite::SqliteRow) -> LocalMessage {
        LocalMessage {
            group_id: row.get("group_id"),
            message_id: row.get("message_id"),
            temp_id: row.get("temp_id"),
            sender: row.get("sender"),
            payload: row.get("payload"),
            ts: row.get("ts"),
            quote_id: row.get("quote_id"),
            quote_text: row.get("quote_text"),
            seen: row.get::<i64, _>("seen") != 0,
        }
    }

    /// 插入或更新单条消息
    pub async fn upsert_message(&self, msg: &LocalMessage) -> Result<()> {
        let sql = r#"
            INSERT INTO messages (
                group_id, message_id, temp_id, sender, payload,
                ts, quote_id, quote_text, seen
            ) VALUES (?,?,?,?,?,?,?,?,?)
            ON CONFLICT(group_id, message_id) DO UPDATE SET
                temp_id = excluded.temp_id,
                sender = excluded.sender,
                payload = excluded.payload,
                ts = excluded.ts,
                quote_id = excluded.quote_id,
                quote_text = excluded.quote_text,
                seen = excluded.seen
        "#;
        sqlx::query(sql)
            .bind(msg.group_id)
            .bind(msg.message_id)
            .bind(&msg.temp_id)
            .bind(msg.sender)
            .bind(&msg.payload)
            .bind(msg.ts)
            .bind(msg.quote_id)
            .bind(&msg.quote_text)
            .bind(if msg.seen { 1 } else { 0 })
            .execute(&self.db)
            .await?;
        self.hub
            .publish(RecordFamily::Messages, Some(msg.group_id.to_string()));
        Ok(())
    }

    /// 某会话的全部消息，时间戳升序
    pub async fn get_messages_asc(&self, group_id: i64) -> Result<Vec<LocalMessage>> {
        let rows = sqlx::query("SELECT * FROM messages WHERE group_id = ? ORDER BY ts ASC")
            .bind(group_id)
            .fetch_all(&self.db)
            .await?;
        let messages: Vec<LocalMessage> = rows.into_iter().map(Self::row_to_message).collect();
        debug!(
            "[MsgDAO] 读取会话 {} 的消息，共 {} 条",
            group_id,
            messages.len()
        );
        Ok(messages)
    }

    /// 某会话本地已知的最大消息 ID（无消息时为 0）
    pub async fn max_message_id(&self, group_id: i64) -> Result<i64> {
        let row = sqlx::query(
            "SELECT IFNULL(MAX(message_id), 0) as max_id FROM messages WHERE group_id = ?",
        )
        .bind(group_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row.get("max_id"))
    }

    /// 某会话最新一条消息的发送方（无消息时为 None）
    pub async fn last_message_sender(&self, group_id: i64) -> Result<Option<i32>> {
        let row = sqlx::query(
            "SELECT sender FROM messages WHERE group_id = ? ORDER BY ts DESC LIMIT 1",
        )
        .bind(group_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(|r| r.get("sender")))
    }

    /// 某会话是否存在对方发送的消息（单次 EXISTS，不整载内存）
    pub async fn has_other_sender(&self, group_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE group_id = ? AND sender != 0) as has_other",
        )
        .bind(group_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row.get::<i64, _>("has_other") != 0)
    }

    /// 某会话是否存在任何消息
    pub async fn has_messages(&self, group_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE group_id = ?) as has_any",
        )
        .bind(group_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row.get::<i64, _>("has_any") != 0)
    }

    /// 把某会话对方发来的消息全部置为已读
    pub async fn mark_seen(&self, group_id: i64) -> Result<u64> {
        let res = sqlx::query("UPDATE messages SET seen = 1 WHERE group_id = ? AND sender != 0")
            .bind(group_id)
            .execute(&self.db)
            .await?;
        self.hub
            .publish(RecordFamily::Messages, Some(group_id.to_string()));
        Ok(res.rows_affected())
    }

    /// 删除单条消息（显式用户删除）
    pub async fn delete_message(&self, group_id: i64, message_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE group_id = ? AND message_id = ?")
            .bind(group_id)
            .bind(message_id)
            .execute(&self.db)
            .await?;
        self.hub
            .publish(RecordFamily::Messages, Some(group_id.to_string()));
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM messages").execute(&self.db).await?;
        self.hub.publish(RecordFamily::Messages, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::db::create_sqlite_pool_with_migration;

    async fn dao() -> MessageDao {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:")
            .await
            .unwrap();
        MessageDao::new(pool, Arc::new(ChangeHub::new()))
    }

    fn msg(group_id: i64, message_id: i64, sender: i32, ts: i64) -> LocalMessage {
        LocalMessage {
            group_id,
            message_id,
            temp_id: String::new(),
            sender,
            payload: format!("消息{}", message_id),
            ts,
            quote_id: 0,
            quote_text: String::new(),
            seen: false,
        }
    }

    #[tokio::test]
    async fn test_messages_ordered_by_ts_ascending() {
        let dao = dao().await;
        // 乱序写入，ID 与时间戳不单调
        dao.upsert_message(&msg(1, 30, 0, 300)).await.unwrap();
        dao.upsert_message(&msg(1, 10, 1, 500)).await.unwrap();
        dao.upsert_message(&msg(1, 20, 1, 100)).await.unwrap();

        let list = dao.get_messages_asc(1).await.unwrap();
        let ts: Vec<i64> = list.iter().map(|m| m.ts).collect();
        assert_eq!(ts, vec![100, 300, 500]);
        // ID 与时间戳不单调，最大 ID 只用于差量比对
        assert_eq!(dao.max_message_id(1).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_sender_lookups() {
        let dao = dao().await;
        assert_eq!(dao.last_message_sender(1).await.unwrap(), None);
        assert!(!dao.has_other_sender(1).await.unwrap());
        assert!(!dao.has_messages(1).await.unwrap());

        dao.upsert_message(&msg(1, 1, 0, 100)).await.unwrap();
        dao.upsert_message(&msg(1, 2, 1, 200)).await.unwrap();
        assert_eq!(dao.last_message_sender(1).await.unwrap(), Some(1));
        assert!(dao.has_other_sender(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_seen_skips_own_messages() {
        let dao = dao().await;
        dao.upsert_message(&msg(1, 1, 0, 100)).await.unwrap();
        dao.upsert_message(&msg(1, 2, 1, 200)).await.unwrap();
        let affected = dao.mark_seen(1).await.unwrap();
        assert_eq!(affected, 1);
        let list = dao.get_messages_asc(1).await.unwrap();
        assert!(!list[0].seen);
        assert!(list[1].seen);
    }

    #[tokio::test]
    async fn test_delete_single_message() {
        let dao = dao().await;
        dao.upsert_message(&msg(1, 1, 0, 100)).await.unwrap();
        dao.upsert_message(&msg(1, 2, 1, 200)).await.unwrap();
        dao.delete_message(1, 1).await.unwrap();
        let list = dao.get_messages_asc(1).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message_id, 2);
    }
}
