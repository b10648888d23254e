//! 推送合并监听器回调接口

use async_trait::async_trait;

/// 推送合并监听器回调接口
///
/// 合并引擎完成落库后回调；on_message 的 chat_json 在本地未知会话时为
/// "null"（事件仍然上抛，UI 可能正在查看尚未同步到本地的会话）。
#[async_trait]
pub trait RealtimeListener: Send + Sync {
    /// 某会话的聚合输入状态翻转（只在"有人在输入"布尔值变化时回调）
    async fn on_typing_changed(&self, group_id: i64, anyone_typing: bool);

    /// 某会话的消息被阅读
    async fn on_seen(&self, group_id: i64);

    /// 新消息到达（chat_json 为补丁后的本地会话记录，未知会话为 "null"）
    async fn on_message(&self, group_id: i64, chat_json: String);
}

/// 空实现（默认监听器）
pub struct EmptyRealtimeListener;

#[async_trait]
impl RealtimeListener for EmptyRealtimeListener {
    async fn on_typing_changed(&self, _group_id: i64, _anyone_typing: bool) {}
    async fn on_seen(&self, _group_id: i64) {}
    async fn on_message(&self, _group_id: i64, _chat_json: String) {}
}
