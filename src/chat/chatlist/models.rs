//! 会话列表本地模型定义

use crate::chat::identity::{chat_key, parse_activity_ts};
use crate::chat::types::{RawChat, RawFolder};
use serde::{Deserialize, Serialize};

/// 本地会话记录
///
/// 远端来源字段由同步全量覆盖；本地元数据（屏蔽/归档/标签）单独存放，
/// 永远不会被同步写入覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalChat {
    /// 规范 key（g_<group_id> 或 b_<db_id>[_<broadcast_id>]）
    pub chat_key: String,
    pub group_id: i64,
    pub db_id: i64,
    pub broadcast_id: String,
    pub name: String,
    pub avatar: String,
    /// 最新消息预览文本
    pub last_message: String,
    /// 服务器侧字符串时间，可能为空或无法解析
    pub last_activity: String,
    /// 解析后的毫秒时间戳，无法解析时为 0（按最早处理）
    pub last_activity_ts: i64,
    pub unread_count: i32,
    pub is_pinned: bool,
    pub is_online: bool,
    /// 所属文件夹 ID，0 = 收件箱
    pub folder_id: i64,
    pub is_broadcast: bool,
    pub broadcast_type: i32,
    pub subject: String,
    pub body: String,
}

impl LocalChat {
    /// 由远端原始记录构建本地记录（计算规范 key 与解析时间戳）
    pub fn from_raw(raw: &RawChat) -> Self {
        Self {
            chat_key: chat_key(raw),
            group_id: raw.group_id,
            db_id: raw.db_id,
            broadcast_id: raw.broadcast_id.clone(),
            name: raw.name.clone(),
            avatar: raw.avatar.clone(),
            last_message: raw.last_message.clone(),
            last_activity: raw.last_activity.clone(),
            last_activity_ts: parse_activity_ts(&raw.last_activity),
            unread_count: raw.unread_count.max(0),
            is_pinned: raw.is_pinned,
            is_online: raw.is_online,
            folder_id: raw.folder_id,
            is_broadcast: raw.is_broadcast,
            broadcast_type: raw.broadcast_type,
            subject: raw.subject.clone(),
            body: raw.body.clone(),
        }
    }
}

/// 本地文件夹记录（远端分配，UI 只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFolder {
    pub folder_id: i64,
    pub name: String,
    pub unread_count: i32,
}

impl LocalFolder {
    pub fn from_raw(raw: &RawFolder) -> Self {
        Self {
            folder_id: raw.folder_id,
            name: raw.name.clone(),
            unread_count: raw.unread_count.max(0),
        }
    }
}

/// 同步范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    /// 收件箱（无文件夹）
    Inbox,
    /// 指定文件夹
    Folder(i64),
    /// 归档列表
    Archives,
}

impl SyncScope {
    /// 游标表使用的范围字符串
    pub fn cursor_key(&self) -> String {
        match self {
            SyncScope::Inbox => "inbox".to_string(),
            SyncScope::Folder(id) => format!("folder_{}", id),
            SyncScope::Archives => "archives".to_string(),
        }
    }
}

/// 单个范围同步的结果
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOutcome {
    /// 本次落库的会话数（按去重后计）
    pub total_synced: usize,
    /// 本次观察到的最大活跃时间戳（毫秒）
    pub most_recent_ts: i64,
}

/// 同步游标：记录某范围上次完整同步时观察到的最大活跃时间戳
#[derive(Debug, Clone)]
pub struct SyncCursor {
    pub scope: String,
    pub last_activity_ts: i64,
    pub updated_at: i64,
}
