//! 身份归一与去重
//!
//! 会话存在两套身份体系：单聊用 group_id，广播/频道用 db_id + 可选 broadcast_id。
//! 本模块负责计算规范 key、解析字符串活跃时间，以及对同一批次内的重复记录去重。
//! 纯函数，无副作用。

use crate::chat::types::RawChat;
use chrono::{DateTime, NaiveDateTime};
use std::collections::HashMap;

/// 计算会话的规范 key
///
/// - 单聊：`g_<group_id>`
/// - 广播（有 broadcast_id）：`b_<db_id>_<broadcast_id>`
/// - 广播（无 broadcast_id）：`b_<db_id>`
///
/// 已知局限：同一发送方的两条无 broadcast_id 广播无法区分，会合并为一条。
pub fn chat_key(raw: &RawChat) -> String {
    if raw.group_id != 0 {
        return format!("g_{}", raw.group_id);
    }
    if raw.broadcast_id.is_empty() {
        format!("b_{}", raw.db_id)
    } else {
        format!("b_{}_{}", raw.db_id, raw.broadcast_id)
    }
}

/// 由 group_id 直接构造单聊 key（推送事件、消息加载等场景使用）
pub fn group_key(group_id: i64) -> String {
    format!("g_{}", group_id)
}

/// 解析服务器侧的字符串活跃时间为毫秒时间戳
///
/// 依次尝试 `%Y-%m-%d %H:%M:%S` 与 RFC3339；空串或无法解析一律按最早（0）处理。
pub fn parse_activity_ts(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return dt.and_utc().timestamp_millis();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp_millis();
    }
    0
}

/// 批次内去重：同一规范 key 只保留活跃时间较晚的一条
///
/// 输出保持 key 首次出现的顺序（稳定，便于上层按发现顺序展示）。
pub fn dedup_chats(batch: Vec<RawChat>) -> Vec<RawChat> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, RawChat> = HashMap::new();

    for raw in batch {
        let key = chat_key(&raw);
        match best.get(&key) {
            Some(existing) => {
                let existing_ts = parse_activity_ts(&existing.last_activity);
                let incoming_ts = parse_activity_ts(&raw.last_activity);
                if incoming_ts > existing_ts {
                    best.insert(key, raw);
                }
            }
            None => {
                order.push(key.clone());
                best.insert(key, raw);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| best.remove(&key))
        .collect()
}
