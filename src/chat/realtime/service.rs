//! 推送合并引擎
//!
//! 把推送事件合并进本地库与内存输入状态。推送与同步之间没有顺序保证，
//! 落库按记录身份后写覆盖；推送事件输掉与旧同步页的竞争时，
//! 字段可能短暂回退，这里不做版本修正（接受的行为）。
//!
//! 事件处理不得阻塞传输接收环路：文件夹计数刷新这类慢操作
//! 一律派生任务执行，其失败绝不影响事件处理本身。

use crate::chat::chatlist::dao::ChatDao;
use crate::chat::chatlist::models::LocalChat;
use crate::chat::chatlist::service::ChatSyncer;
use crate::chat::error::Result;
use crate::chat::identity::{group_key, parse_activity_ts};
use crate::chat::message::dao::MessageDao;
use crate::chat::realtime::events::{MessagePushPayload, PushEvent};
use crate::chat::realtime::listener::RealtimeListener;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// 推送负载里的头像引用是否完整
///
/// 只有末段带文件扩展名的完整路径才允许覆盖本地头像，
/// 裸目录前缀不能把缓存中的完整头像冲掉。
fn avatar_is_complete(avatar: &str) -> bool {
    let last = avatar.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((name, ext)) => !name.is_empty() && !ext.is_empty(),
        None => false,
    }
}

/// 推送合并器
///
/// 持久状态归本地库所有；这里只额外持有"谁在输入"的内存状态（不落库）。
pub struct RealtimeMerger {
    chat_dao: Arc<ChatDao>,
    message_dao: Arc<MessageDao>,
    chat_syncer: Arc<ChatSyncer>,
    listener: Arc<dyn RealtimeListener>,
    /// group_id -> 正在输入的账号集合
    typing: Mutex<HashMap<i64, HashSet<String>>>,
}

impl RealtimeMerger {
    pub fn new(
        chat_dao: Arc<ChatDao>,
        message_dao: Arc<MessageDao>,
        chat_syncer: Arc<ChatSyncer>,
        listener: Arc<dyn RealtimeListener>,
    ) -> Self {
        Self {
            chat_dao,
            message_dao,
            chat_syncer,
            listener,
            typing: Mutex::new(HashMap::new()),
        }
    }

    /// 某会话当前是否有人在输入
    pub fn anyone_typing(&self, group_id: i64) -> bool {
        self.typing
            .lock()
            .unwrap()
            .get(&group_id)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    /// 处理单个推送事件
    pub async fn handle_event(&self, event: PushEvent) -> Result<()> {
        match event {
            PushEvent::Typing {
                group_id,
                account_id,
                is_typing,
            } => self.handle_typing(group_id, account_id, is_typing).await,
            PushEvent::Seen { group_id } => self.handle_seen(group_id).await,
            PushEvent::Message(payload) => self.handle_message(payload).await,
        }
    }

    /// 输入状态：只在会话的聚合"有人在输入"布尔值翻转时通知，
    /// 单个成员的重复事件不产生回调。
    async fn handle_typing(&self, group_id: i64, account_id: String, is_typing: bool) -> Result<()> {
        let flipped = {
            let mut typing = self.typing.lock().unwrap();
            let entry = typing.entry(group_id).or_default();
            let before = !entry.is_empty();
            if is_typing {
                entry.insert(account_id);
            } else {
                entry.remove(&account_id);
            }
            let after = !entry.is_empty();
            if !after {
                typing.remove(&group_id);
            }
            before != after
        };

        if flipped {
            let anyone = self.anyone_typing(group_id);
            debug!("[Realtime] 会话 {} 输入状态翻转: {}", group_id, anyone);
            self.listener.on_typing_changed(group_id, anyone).await;
            // 翻转和已读/消息一样会动多方会话的计数展示
            if let Some(chat) = self.chat_dao.get_chat_by_key(&group_key(group_id)).await? {
                self.maybe_refresh_folders(&chat);
            }
        }
        Ok(())
    }

    /// 已读回执：按规范 key 定位会话后把对方消息置为已读。
    /// 本地找不到会话只记日志，不算失败。
    async fn handle_seen(&self, group_id: i64) -> Result<()> {
        let key = group_key(group_id);
        match self.chat_dao.get_chat_by_key(&key).await? {
            Some(chat) => {
                let affected = self.message_dao.mark_seen(group_id).await?;
                debug!("[Realtime] 会话 {} 已读回执，置位 {} 条", key, affected);
                self.maybe_refresh_folders(&chat);
            }
            None => {
                warn!("[Realtime] 已读回执命中未知会话: {}", key);
            }
        }
        self.listener.on_seen(group_id).await;
        Ok(())
    }

    /// 新消息事件：补丁会话的预览/时间戳/未读/在线字段。
    ///
    /// - 未读数只在发送方不是自己时 +1；
    /// - 头像只接受带扩展名的完整路径；
    /// - 本地未知会话不投机建记录（后续同步会正确创建），但事件照常上抛。
    async fn handle_message(&self, payload: MessagePushPayload) -> Result<()> {
        let key = group_key(payload.group_id);
        match self.chat_dao.get_chat_by_key(&key).await? {
            Some(mut chat) => {
                if !payload.preview.is_empty() {
                    chat.last_message = payload.preview.clone();
                }
                if let Some(activity) = &payload.last_activity {
                    chat.last_activity = activity.clone();
                    chat.last_activity_ts = parse_activity_ts(activity);
                }
                if payload.sender != 0 {
                    chat.unread_count += 1;
                }
                if let Some(online) = payload.is_online {
                    chat.is_online = online;
                }
                if avatar_is_complete(&payload.avatar) {
                    chat.avatar = payload.avatar.clone();
                }
                self.chat_dao.upsert_chat(&chat).await?;
                info!(
                    "[Realtime] 会话 {} 消息事件已合并，未读: {}",
                    key, chat.unread_count
                );

                let json = serde_json::to_string(&chat).unwrap_or_else(|_| "null".to_string());
                self.listener.on_message(payload.group_id, json).await;
                self.maybe_refresh_folders(&chat);
            }
            None => {
                info!("[Realtime] 消息事件命中未知会话 {}，不建记录", key);
                self.listener
                    .on_message(payload.group_id, "null".to_string())
                    .await;
            }
        }
        Ok(())
    }

    /// 多方（带文件夹）会话的事件派生一次文件夹计数刷新。
    /// 刷新失败只记日志，事件处理路径不受影响。
    fn maybe_refresh_folders(&self, chat: &LocalChat) {
        if chat.folder_id == 0 {
            return;
        }
        let syncer = self.chat_syncer.clone();
        let key = chat.chat_key.clone();
        tokio::spawn(async move {
            if let Err(e) = syncer.sync_folders().await {
                warn!("[Realtime] 会话 {} 触发的文件夹刷新失败: {}", key, e);
            }
        });
    }
}
