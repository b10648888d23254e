//! 本地存储变更通知
//!
//! 存储层在每次写入后按记录族（可选带 key）广播一条变更事件，
//! 上层（查询层 / UI）通过订阅通道响应式刷新，核心层不依赖任何 UI 框架。

use tokio::sync::broadcast;
use tracing::trace;

/// 记录族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFamily {
    Chats,
    Folders,
    Messages,
    Metadata,
    Cursors,
}

/// 一条存储变更事件
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub family: RecordFamily,
    /// 变更记录的 key（chat_key / folder_id / group_id 等），整族变更时为 None
    pub key: Option<String>,
}

/// 变更通知中心
///
/// 基于 tokio broadcast 通道；无订阅者时发送返回 Err，直接忽略。
pub struct ChangeHub {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// 订阅变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }

    /// 发布一条变更（无订阅者时静默丢弃）
    pub fn publish(&self, family: RecordFamily, key: Option<String>) {
        trace!("[Notify] 发布变更: {:?}, key={:?}", family, key);
        let _ = self.tx.send(StoreChange { family, key });
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}
