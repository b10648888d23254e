//! SDK 客户端：服务装配与公开接口
//!
//! 所有组件都在这里显式构造并按引用传递，没有模块级单例；
//! 生命周期跟随 ChatClient 实例，构造即初始化，drop 即回收。
//!
//! 读接口（get_all_chats / search）在存储出错时降级为空结果，
//! 只记日志不向上抛，UI 永远能拿到可渲染的列表。

use crate::chat::chatlist::api::{ChatListApi, HttpChatListApi};
use crate::chat::chatlist::dao::{ChatDao, CursorDao, FolderDao};
use crate::chat::chatlist::listener::{ChatListener, EmptyChatListener};
use crate::chat::chatlist::models::{LocalFolder, SyncOutcome};
use crate::chat::chatlist::service::ChatSyncer;
use crate::chat::db::create_sqlite_pool_with_migration;
use crate::chat::error::Result;
use crate::chat::message::api::{HttpMessageApi, MessageApi};
use crate::chat::message::dao::MessageDao;
use crate::chat::message::models::{LoadResult, MessageProgressFn};
use crate::chat::message::service::MessageSyncer;
use crate::chat::metadata::dao::MetadataDao;
use crate::chat::metadata::models::ChatTag;
use crate::chat::metadata::service::TagService;
use crate::chat::notify::{ChangeHub, StoreChange};
use crate::chat::query::service::{ChatView, QueryEngine, SearchFilter};
use crate::chat::realtime::events::PushEvent;
use crate::chat::realtime::listener::{EmptyRealtimeListener, RealtimeListener};
use crate::chat::realtime::service::RealtimeMerger;
use crate::chat::transport::PushTransport;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP API 地址
    pub api_base_url: String,
    /// WebSocket 推送地址
    pub ws_url: String,
    /// SQLite 连接串（形如 sqlite://chatmirror.db?mode=rwc）
    pub db_url: String,
    /// 认证令牌，随 token 头附在每个请求上
    pub auth_token: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:10002".to_string(),
            ws_url: "ws://localhost:10001".to_string(),
            db_url: "sqlite::memory:".to_string(),
            auth_token: String::new(),
        }
    }
}

/// 可替换的会话监听器插槽（注册晚于装配，转发到当前注册者）
struct ChatListenerSlot {
    inner: Mutex<Arc<dyn ChatListener>>,
}

impl ChatListenerSlot {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Arc::new(EmptyChatListener)),
        }
    }

    fn replace(&self, listener: Arc<dyn ChatListener>) {
        *self.inner.lock().unwrap() = listener;
    }

    fn current(&self) -> Arc<dyn ChatListener> {
        self.inner.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatListener for ChatListenerSlot {
    async fn on_sync_start(&self, scope: String) {
        self.current().on_sync_start(scope).await
    }
    async fn on_sync_progress(&self, scope: String, page: u32, synced_so_far: usize) {
        self.current().on_sync_progress(scope, page, synced_so_far).await
    }
    async fn on_sync_finish(&self, scope: String, total_synced: usize) {
        self.current().on_sync_finish(scope, total_synced).await
    }
    async fn on_sync_failed(&self, scope: String, error: String) {
        self.current().on_sync_failed(scope, error).await
    }
    async fn on_chats_changed(&self, chats_json: String) {
        self.current().on_chats_changed(chats_json).await
    }
    async fn on_folders_changed(&self, folders_json: String) {
        self.current().on_folders_changed(folders_json).await
    }
    async fn on_total_unread_changed(&self, total_unread: i32) {
        self.current().on_total_unread_changed(total_unread).await
    }
}

/// 可替换的推送监听器插槽
struct RealtimeListenerSlot {
    inner: Mutex<Arc<dyn RealtimeListener>>,
}

impl RealtimeListenerSlot {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Arc::new(EmptyRealtimeListener)),
        }
    }

    fn replace(&self, listener: Arc<dyn RealtimeListener>) {
        *self.inner.lock().unwrap() = listener;
    }

    fn current(&self) -> Arc<dyn RealtimeListener> {
        self.inner.lock().unwrap().clone()
    }
}

#[async_trait]
impl RealtimeListener for RealtimeListenerSlot {
    async fn on_typing_changed(&self, group_id: i64, anyone_typing: bool) {
        self.current().on_typing_changed(group_id, anyone_typing).await
    }
    async fn on_seen(&self, group_id: i64) {
        self.current().on_seen(group_id).await
    }
    async fn on_message(&self, group_id: i64, chat_json: String) {
        self.current().on_message(group_id, chat_json).await
    }
}

/// SDK 客户端
pub struct ChatClient {
    config: ClientConfig,
    hub: Arc<ChangeHub>,
    chat_dao: Arc<ChatDao>,
    folder_dao: Arc<FolderDao>,
    cursor_dao: Arc<CursorDao>,
    metadata_dao: Arc<MetadataDao>,
    message_dao: Arc<MessageDao>,
    chat_syncer: Arc<ChatSyncer>,
    message_syncer: MessageSyncer,
    tag_service: TagService,
    query_engine: QueryEngine,
    merger: Arc<RealtimeMerger>,
    chat_listener_slot: Arc<ChatListenerSlot>,
    realtime_listener_slot: Arc<RealtimeListenerSlot>,
}

impl ChatClient {
    /// 按配置装配客户端（HTTP 实现的拉取接口）
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if !config.auth_token.is_empty() {
            match reqwest::header::HeaderValue::from_str(&config.auth_token) {
                Ok(value) => {
                    headers.insert("token", value);
                }
                Err(_) => warn!("[Client] 认证令牌含非法字符，未附加 token 头"),
            }
        }
        let http = reqwest::Client::builder().default_headers(headers).build()?;

        let chat_api = Arc::new(HttpChatListApi::new(http.clone(), config.api_base_url.clone()));
        let message_api = Arc::new(HttpMessageApi::new(http, config.api_base_url.clone()));
        Self::with_apis(config, chat_api, message_api).await
    }

    /// 用注入的拉取接口装配（测试与非 HTTP 宿主用）
    pub async fn with_apis(
        config: ClientConfig,
        chat_api: Arc<dyn ChatListApi>,
        message_api: Arc<dyn MessageApi>,
    ) -> Result<Self> {
        let pool = create_sqlite_pool_with_migration(&config.db_url).await?;
        let hub = Arc::new(ChangeHub::new());

        let chat_dao = Arc::new(ChatDao::new(pool.clone(), hub.clone()));
        let folder_dao = Arc::new(FolderDao::new(pool.clone(), hub.clone()));
        let cursor_dao = Arc::new(CursorDao::new(pool.clone(), hub.clone()));
        let metadata_dao = Arc::new(MetadataDao::new(pool.clone(), hub.clone()));
        let message_dao = Arc::new(MessageDao::new(pool, hub.clone()));

        let chat_listener_slot = Arc::new(ChatListenerSlot::new());
        let realtime_listener_slot = Arc::new(RealtimeListenerSlot::new());

        let chat_syncer = Arc::new(ChatSyncer::new(
            chat_api,
            chat_dao.clone(),
            folder_dao.clone(),
            cursor_dao.clone(),
            metadata_dao.clone(),
            chat_listener_slot.clone(),
        ));
        let message_syncer =
            MessageSyncer::new(message_api, message_dao.clone(), metadata_dao.clone());
        let tag_service = TagService::new(metadata_dao.clone());
        let query_engine = QueryEngine::new(
            chat_dao.clone(),
            metadata_dao.clone(),
            message_dao.clone(),
        );
        let merger = Arc::new(RealtimeMerger::new(
            chat_dao.clone(),
            message_dao.clone(),
            chat_syncer.clone(),
            realtime_listener_slot.clone(),
        ));

        info!("[Client] ✅ 客户端装配完成, 数据库: {}", config.db_url);
        Ok(Self {
            config,
            hub,
            chat_dao,
            folder_dao,
            cursor_dao,
            metadata_dao,
            message_dao,
            chat_syncer,
            message_syncer,
            tag_service,
            query_engine,
            merger,
            chat_listener_slot,
            realtime_listener_slot,
        })
    }

    // ========== 监听器注册 ==========

    pub fn set_chat_listener(&self, listener: Arc<dyn ChatListener>) {
        self.chat_listener_slot.replace(listener);
    }

    pub fn set_realtime_listener(&self, listener: Arc<dyn RealtimeListener>) {
        self.realtime_listener_slot.replace(listener);
    }

    /// 订阅本地库变更通知（UI 反应式刷新用）
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.hub.subscribe()
    }

    // ========== 读接口（存储出错降级为空） ==========

    /// 全部会话投影（含归档）：元数据已合并，置顶在前按活跃降序
    pub async fn get_all_chats(&self) -> Vec<ChatView> {
        match self.query_engine.all_chats().await {
            Ok(views) => views,
            Err(e) => {
                error!("[Client] 读取会话列表失败，降级为空: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn search(&self, filter: &SearchFilter) -> Vec<ChatView> {
        match self.query_engine.search(filter).await {
            Ok(views) => views,
            Err(e) => {
                error!("[Client] 查询失败，降级为空: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn total_unread(&self) -> i32 {
        self.chat_dao.total_unread().await.unwrap_or(0)
    }

    // ========== 同步入口 ==========

    pub async fn sync_all(&self) -> Result<SyncOutcome> {
        self.chat_syncer.sync_all().await
    }

    pub async fn sync_inbox(&self) -> Result<SyncOutcome> {
        self.chat_syncer.sync_inbox().await
    }

    pub async fn sync_folder(&self, folder_id: i64) -> Result<SyncOutcome> {
        self.chat_syncer.sync_folder(folder_id).await
    }

    pub async fn sync_folders(&self) -> Result<Vec<LocalFolder>> {
        self.chat_syncer.sync_folders().await
    }

    pub async fn sync_archives(&self) -> Result<SyncOutcome> {
        self.chat_syncer.sync_archives().await
    }

    // ========== 消息 ==========

    pub async fn load_messages(
        &self,
        chat_key: &str,
        group_id: i64,
        on_progress: Option<MessageProgressFn>,
    ) -> Result<LoadResult> {
        self.message_syncer
            .load_messages(chat_key, group_id, on_progress)
            .await
    }

    pub async fn delete_message(&self, group_id: i64, message_id: i64) -> Result<()> {
        self.message_syncer.delete_message(group_id, message_id).await
    }

    // ========== 标签 ==========

    pub async fn get_tags(&self, chat_key: &str) -> Result<Vec<ChatTag>> {
        self.tag_service.get_tags(chat_key).await
    }

    pub async fn set_tags(&self, chat_key: &str, tags: Vec<ChatTag>) -> Result<Vec<ChatTag>> {
        self.tag_service.set_tags(chat_key, tags).await
    }

    pub async fn add_tag(&self, chat_key: &str, text: &str, color: &str) -> Result<ChatTag> {
        self.tag_service.add_tag(chat_key, text, color).await
    }

    pub async fn remove_tag(&self, chat_key: &str, text: &str) -> Result<()> {
        self.tag_service.remove_tag(chat_key, text).await
    }

    pub async fn update_tag(
        &self,
        chat_key: &str,
        old_text: &str,
        new_text: &str,
        new_color: &str,
    ) -> Result<ChatTag> {
        self.tag_service
            .update_tag(chat_key, old_text, new_text, new_color)
            .await
    }

    // ========== 推送 ==========

    /// 处理单个推送事件（传输层之外的宿主也可直接投递）
    ///
    /// message 事件合并完成后派生一次最新页差量拉取，补全推送里
    /// 没有携带的消息内容；该拉取的失败只记日志。
    pub async fn handle_push_event(&self, event: PushEvent) -> Result<()> {
        let refresh = match &event {
            PushEvent::Message(payload) => Some(payload.group_id),
            _ => None,
        };
        self.merger.handle_event(event).await?;

        if let Some(group_id) = refresh {
            let syncer = self.message_syncer.clone();
            let key = crate::chat::identity::group_key(group_id);
            tokio::spawn(async move {
                if let Err(e) = syncer.refresh_newest(&key, group_id, None).await {
                    warn!("[Client] 推送触发的消息差量拉取失败: {}", e);
                }
            });
        }
        Ok(())
    }

    /// 某会话当前是否有人在输入
    pub fn anyone_typing(&self, group_id: i64) -> bool {
        self.merger.anyone_typing(group_id)
    }

    /// 连接推送服务器并在后台跑接收环路（断开后任务结束，重连由调用方负责）
    pub fn connect_push(&self) -> tokio::task::JoinHandle<()> {
        let transport = PushTransport::new(self.merger.clone());
        let ws_url = self.config.ws_url.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.run(&ws_url).await {
                error!("[Client] 推送连接退出: {}", e);
            }
        })
    }

    // ========== 缓存管理 ==========

    /// 清空全部本地缓存（唯一的全表删除入口）
    pub async fn clear_cache(&self) -> Result<()> {
        self.message_dao.clear().await?;
        self.metadata_dao.clear().await?;
        self.cursor_dao.clear().await?;
        self.folder_dao.clear().await?;
        self.chat_dao.clear().await?;
        info!("[Client] 🗑️ 本地缓存已清空");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::chatlist::models::SyncScope;
    use crate::chat::notify::RecordFamily;
    use crate::chat::realtime::events::MessagePushPayload;
    use crate::chat::types::{ChatPage, MessagePage, RawChat, RawFolder};

    struct OnePageChatApi;

    #[async_trait]
    impl ChatListApi for OnePageChatApi {
        async fn fetch_chat_page(&self, scope: SyncScope, _page: u32) -> Result<ChatPage> {
            let chats = if scope == SyncScope::Inbox {
                vec![
                    RawChat {
                        group_id: 1,
                        name: "测试会话".to_string(),
                        last_activity: "2026-01-01 10:00:00".to_string(),
                        unread_count: 2,
                        ..Default::default()
                    },
                    RawChat {
                        group_id: 2,
                        name: "置顶会话".to_string(),
                        last_activity: "2026-01-01 09:00:00".to_string(),
                        unread_count: 1,
                        is_pinned: true,
                        ..Default::default()
                    },
                ]
            } else {
                Vec::new()
            };
            Ok(ChatPage { chats, next: None })
        }

        async fn fetch_folders(&self) -> Result<Vec<RawFolder>> {
            Ok(Vec::new())
        }
    }

    struct EmptyMessageApi;

    #[async_trait]
    impl MessageApi for EmptyMessageApi {
        async fn fetch_message_page(&self, _group_id: i64, _page: u32) -> Result<MessagePage> {
            Ok(MessagePage {
                messages: Vec::new(),
                next: None,
            })
        }
    }

    async fn client() -> ChatClient {
        ChatClient::with_apis(
            ClientConfig::default(),
            Arc::new(OnePageChatApi),
            Arc::new(EmptyMessageApi),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_sync_then_read_and_clear_cache() {
        let client = client().await;
        client.sync_inbox().await.unwrap();

        let chats = client.get_all_chats().await;
        assert_eq!(chats.len(), 2);
        assert_eq!(client.total_unread().await, 3);

        client.clear_cache().await.unwrap();
        assert!(client.get_all_chats().await.is_empty());
        assert_eq!(client.total_unread().await, 0);
    }

    #[tokio::test]
    async fn test_get_all_chats_returns_sorted_projections() {
        let client = client().await;
        client.sync_inbox().await.unwrap();
        client.add_tag("g_1", "工作", "#FF0000").await.unwrap();
        client.metadata_dao.set_archived("g_2", true).await.unwrap();

        let views = client.get_all_chats().await;
        // 置顶在前（哪怕活跃时间更旧），归档会话不从全量投影里剔除
        let ids: Vec<i64> = views.iter().map(|v| v.chat.group_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(views[0].is_archived);
        assert_eq!(views[1].tags.len(), 1);
        assert_eq!(views[1].tags[0].text, "工作");
    }

    #[tokio::test]
    async fn test_change_subscription_sees_sync_writes() {
        let client = client().await;
        let mut rx = client.subscribe_changes();
        client.sync_inbox().await.unwrap();

        let mut saw_chat_write = false;
        while let Ok(change) = rx.try_recv() {
            if change.family == RecordFamily::Chats && change.key.as_deref() == Some("g_1") {
                saw_chat_write = true;
            }
        }
        assert!(saw_chat_write);
    }

    #[tokio::test]
    async fn test_tag_surface_roundtrip() {
        let client = client().await;
        client.add_tag("g_1", "工作", "#FF0000").await.unwrap();
        let tags = client.get_tags("g_1").await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].color, "ff0000");

        client.remove_tag("g_1", "工作").await.unwrap();
        assert!(client.get_tags("g_1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_event_merges_into_store() {
        let client = client().await;
        client.sync_inbox().await.unwrap();

        client
            .handle_push_event(PushEvent::Message(MessagePushPayload {
                group_id: 1,
                sender: 1,
                preview: "推送消息".to_string(),
                last_activity: None,
                avatar: String::new(),
                is_online: None,
            }))
            .await
            .unwrap();

        let views = client.get_all_chats().await;
        let view = views.iter().find(|v| v.chat.group_id == 1).unwrap();
        assert_eq!(view.chat.unread_count, 3);
        assert_eq!(view.chat.last_message, "推送消息");
    }
}
