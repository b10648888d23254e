//! 消息本地模型定义

use crate::chat::types::RawMessage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 本地消息记录
///
/// 以 (group_id, message_id) 为复合身份；乐观发送时 message_id 为占位负值，
/// 由客户端生成的 temp_id 区分。payload 原样存储（方括号迷你格式不在核心层解析）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalMessage {
    pub group_id: i64,
    pub message_id: i64,
    pub temp_id: String,
    /// 0 = 自己，1 = 对方
    pub sender: i32,
    pub payload: String,
    /// 排序用数值时间戳（消息按此字段升序全序排列）
    pub ts: i64,
    pub quote_id: i64,
    pub quote_text: String,
    pub seen: bool,
}

impl LocalMessage {
    pub fn from_raw(raw: &RawMessage) -> Self {
        Self {
            group_id: raw.group_id,
            message_id: raw.message_id,
            temp_id: raw.temp_id.clone(),
            sender: raw.sender,
            payload: raw.payload.clone(),
            ts: raw.ts,
            quote_id: raw.quote_id,
            quote_text: raw.quote_text.clone(),
            seen: raw.seen,
        }
    }
}

/// load_messages 的返回值
///
/// 首次打开（未回填）时 messages 为当前已有内容、is_loading 为 true，
/// 后续页通过进度回调送达；已回填时直接返回全量、is_loading 为 false。
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub messages: Vec<LocalMessage>,
    pub is_loading: bool,
}

/// 消息进度回调：每页落库后以"不断增长的升序全集"调用
pub type MessageProgressFn = Arc<dyn Fn(Vec<LocalMessage>) + Send + Sync>;
