//! 推送事件定义与边界校验
//!
//! 推送负载在进入合并引擎之前先转换为带标签的枚举变体并完成字段校验，
//! 不合法的负载在这里报 Payload 错误，管线内部不再接触无类型对象。

use crate::chat::error::{ChatError, Result};
use serde::Deserialize;
use serde_json::Value;

/// "message" 事件携带的会话补丁字段
///
/// 只有 groupId 是必填项；可选字段缺失时不参与补丁
/// （Option 为 None 不覆盖本地已有值）。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePushPayload {
    pub group_id: i64,
    /// 0 = 自己，1 = 对方
    #[serde(default)]
    pub sender: i32,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub is_online: Option<bool>,
}

/// 带标签的推送事件
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// 某人正在/停止输入
    Typing {
        group_id: i64,
        account_id: String,
        is_typing: bool,
    },
    /// 会话内消息被阅读
    Seen { group_id: i64 },
    /// 新消息到达（负载只带会话补丁，消息内容另行差量拉取）
    Message(MessagePushPayload),
}

fn require_i64(data: &Value, field: &str, event: &str) -> Result<i64> {
    data.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| ChatError::Payload(format!("{} 事件缺少 {} 字段", event, field)))
}

fn require_str(data: &Value, field: &str, event: &str) -> Result<String> {
    data.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChatError::Payload(format!("{} 事件缺少 {} 字段", event, field)))
}

/// 按事件名解析推送负载
///
/// 未知事件名与缺失必填字段都报 Payload 错误，由接收环路记日志后丢弃。
pub fn parse_event(name: &str, data: &Value) -> Result<PushEvent> {
    match name {
        "typing" => Ok(PushEvent::Typing {
            group_id: require_i64(data, "groupId", "typing")?,
            account_id: require_str(data, "accountId", "typing")?,
            is_typing: data
                .get("isTyping")
                .and_then(Value::as_bool)
                .ok_or_else(|| ChatError::Payload("typing 事件缺少 isTyping 字段".to_string()))?,
        }),
        "seen" => Ok(PushEvent::Seen {
            group_id: require_i64(data, "groupId", "seen")?,
        }),
        "message" => {
            let payload: MessagePushPayload = serde_json::from_value(data.clone())
                .map_err(|e| ChatError::Payload(format!("message 事件负载不合法: {}", e)))?;
            Ok(PushEvent::Message(payload))
        }
        other => Err(ChatError::Payload(format!("未知事件名: {}", other))),
    }
}
