//! SQLite 数据库工具：统一创建连接池并执行版本化迁移
//!
//! 约定：所有记录族（会话、文件夹、消息、会话元数据）和同步游标
//! 共用一个 SQLite 库。迁移通过 `PRAGMA user_version` 守护，只增不改，
//! 升级永远不要求丢弃既有数据。

use crate::chat::error::{ChatError, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use tracing::info;

/// 当前 schema 版本。新增字段/索引时递增并在 run_migrations 中追加一段。
const CURRENT_VERSION: i64 = 2;

/// 创建 SQLite 连接池并执行所有未执行的迁移
pub async fn create_sqlite_pool_with_migration(db_url: &str) -> Result<Pool<Sqlite>> {
    // 内存库每个连接各是一个独立数据库，必须锁死单连接并常驻，
    // 否则迁移结果会随连接回收一起丢失
    let is_memory = db_url.contains(":memory:");
    let pool = SqlitePoolOptions::new()
        .max_connections(if is_memory { 1 } else { 5 })
        .min_connections(if is_memory { 1 } else { 0 })
        .connect(db_url)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// 执行所有未执行的迁移（可重复调用，已执行的步骤会被跳过）
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    let row = sqlx::query("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    let current: i64 = row.get(0);
    info!(
        "[DB] 检查数据库迁移，当前版本: {}, 目标版本: {}",
        current, CURRENT_VERSION
    );

    if current < 1 {
        info!("[DB] 执行迁移 v1（建表 + 索引）");
        migrate_v1(pool).await?;
        sqlx::query("PRAGMA user_version = 1").execute(pool).await?;
    }

    if current < 2 {
        info!("[DB] 执行迁移 v2（元数据增加标签列）");
        migrate_v2(pool).await?;
        sqlx::query("PRAGMA user_version = 2").execute(pool).await?;
    }

    Ok(())
}

/// v1：四个记录族 + 同步游标表
async fn migrate_v1(pool: &Pool<Sqlite>) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            chat_key          TEXT PRIMARY KEY,
            group_id          INTEGER NOT NULL DEFAULT 0,
            db_id             INTEGER NOT NULL DEFAULT 0,
            broadcast_id      TEXT NOT NULL DEFAULT '',
            name              TEXT NOT NULL DEFAULT '',
            avatar            TEXT NOT NULL DEFAULT '',
            last_message      TEXT NOT NULL DEFAULT '',
            last_activity     TEXT NOT NULL DEFAULT '',
            last_activity_ts  INTEGER NOT NULL DEFAULT 0,
            unread_count      INTEGER NOT NULL DEFAULT 0,
            is_pinned         INTEGER NOT NULL DEFAULT 0,
            is_online         INTEGER NOT NULL DEFAULT 0,
            folder_id         INTEGER NOT NULL DEFAULT 0,
            is_broadcast      INTEGER NOT NULL DEFAULT 0,
            broadcast_type    INTEGER NOT NULL DEFAULT 0,
            subject           TEXT NOT NULL DEFAULT '',
            body              TEXT NOT NULL DEFAULT ''
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_chats_folder ON chats(folder_id)",
        "CREATE INDEX IF NOT EXISTS idx_chats_pinned ON chats(is_pinned)",
        "CREATE INDEX IF NOT EXISTS idx_chats_activity ON chats(last_activity_ts)",
        r#"
        CREATE TABLE IF NOT EXISTS folders (
            folder_id     INTEGER PRIMARY KEY,
            name          TEXT NOT NULL DEFAULT '',
            unread_count  INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            group_id    INTEGER NOT NULL,
            message_id  INTEGER NOT NULL,
            temp_id     TEXT NOT NULL DEFAULT '',
            sender      INTEGER NOT NULL DEFAULT 0,
            payload     TEXT NOT NULL DEFAULT '',
            ts          INTEGER NOT NULL DEFAULT 0,
            quote_id    INTEGER NOT NULL DEFAULT 0,
            quote_text  TEXT NOT NULL DEFAULT '',
            seen        INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (group_id, message_id)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_messages_group_ts ON messages(group_id, ts)",
        r#"
        CREATE TABLE IF NOT EXISTS chat_metadata (
            chat_key          TEXT PRIMARY KEY,
            messages_fetched  INTEGER NOT NULL DEFAULT 0,
            last_fetched_at   INTEGER NOT NULL DEFAULT 0,
            is_blocked        INTEGER NOT NULL DEFAULT 0,
            is_archived       INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sync_cursors (
            scope             TEXT PRIMARY KEY,
            last_activity_ts  INTEGER NOT NULL DEFAULT 0,
            updated_at        INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ];

    for sql in statements {
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|e| ChatError::Migration(format!("v1: {}", e)))?;
    }
    Ok(())
}

/// v2：元数据表追加标签列（JSON 文本，最多 5 条 {text, color}）
async fn migrate_v2(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("ALTER TABLE chat_metadata ADD COLUMN tags_json TEXT NOT NULL DEFAULT '[]'")
        .execute(pool)
        .await
        .map_err(|e| ChatError::Migration(format!("v2: {}", e)))?;
    Ok(())
}
