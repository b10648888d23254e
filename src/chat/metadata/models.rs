//! 会话本地元数据模型
//!
//! 元数据只存在于本地，远端同步永远不会产生或覆盖这类记录。

use serde::{Deserialize, Serialize};

/// 会话标签（每会话最多 5 条，文本大小写不敏感唯一，颜色为 6 位十六进制）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTag {
    pub text: String,
    /// 归一化后的 6 位十六进制颜色（小写，无 # 前缀）
    pub color: String,
}

/// 会话本地元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetadata {
    pub chat_key: String,
    /// 消息历史是否已完整回填
    pub messages_fetched: bool,
    /// 上次消息拉取时间（毫秒）
    pub last_fetched_at: i64,
    pub is_blocked: bool,
    pub is_archived: bool,
    pub tags: Vec<ChatTag>,
}

impl ChatMetadata {
    /// 某会话的空元数据（尚无任何本地标注）
    pub fn empty(chat_key: &str) -> Self {
        Self {
            chat_key: chat_key.to_string(),
            messages_fetched: false,
            last_fetched_at: 0,
            is_blocked: false,
            is_archived: false,
            tags: Vec::new(),
        }
    }
}
