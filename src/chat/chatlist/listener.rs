//! 会话列表监听器回调接口

use async_trait::async_trait;

/// 会话列表监听器回调接口
///
/// 同步引擎逐页落库后立即回调，部分进度对读者可见。
#[async_trait]
pub trait ChatListener: Send + Sync {
    /// 某范围同步开始
    async fn on_sync_start(&self, scope: String);

    /// 一页落库后的进度（synced_so_far 为本范围累计落库数）
    async fn on_sync_progress(&self, scope: String, page: u32, synced_so_far: usize);

    /// 某范围同步完成
    async fn on_sync_finish(&self, scope: String, total_synced: usize);

    /// 某范围同步失败（已落库的页保留）
    async fn on_sync_failed(&self, scope: String, error: String);

    /// 一页会话落库（JSON 数组，去重后的本地记录）
    async fn on_chats_changed(&self, chats_json: String);

    /// 文件夹列表变更（JSON 数组）
    async fn on_folders_changed(&self, folders_json: String);

    /// 总未读数变更
    async fn on_total_unread_changed(&self, total_unread: i32);
}

/// 空实现（默认监听器）
pub struct EmptyChatListener;

#[async_trait]
impl ChatListener for EmptyChatListener {
    async fn on_sync_start(&self, _scope: String) {}
    async fn on_sync_progress(&self, _scope: String, _page: u32, _synced_so_far: usize) {}
    async fn on_sync_finish(&self, _scope: String, _total_synced: usize) {}
    async fn on_sync_failed(&self, _scope: String, _error: String) {}
    async fn on_chats_changed(&self, _chats_json: String) {}
    async fn on_folders_changed(&self, _folders_json: String) {}
    async fn on_total_unread_changed(&self, _total_unread: i32) {}
}
