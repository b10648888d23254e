//! 消息同步服务层
//!
//! 消息历史按会话惰性回填：首次打开时立即返回本地已有内容并后台翻页拉取，
//! 每页落库后以"不断增长的升序全集"回调进度；回填完成后走快路径，
//! 直接返回本地全量并后台拉最新一页做差量。
//!
//! 屏蔽会话的错误是独立错误类型，必须向上抛给调用方，不能降级为空结果；
//! 之后任何一次成功拉取都会顺带清掉屏蔽标记。

use crate::chat::error::{ChatError, Result};
use crate::chat::message::api::MessageApi;
use crate::chat::message::dao::MessageDao;
use crate::chat::message::models::{LoadResult, LocalMessage, MessageProgressFn};
use crate::chat::metadata::dao::MetadataDao;
use crate::chat::types::{parse_continuation, MessagePage};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 消息同步器
#[derive(Clone)]
pub struct MessageSyncer {
    api: Arc<dyn MessageApi>,
    message_dao: Arc<MessageDao>,
    metadata_dao: Arc<MetadataDao>,
}

impl MessageSyncer {
    pub fn new(
        api: Arc<dyn MessageApi>,
        message_dao: Arc<MessageDao>,
        metadata_dao: Arc<MetadataDao>,
    ) -> Self {
        Self {
            api,
            message_dao,
            metadata_dao,
        }
    }

    /// 打开某会话的消息
    ///
    /// - 未回填：先拉第一页（屏蔽错误在这里向上抛）并落库，
    ///   返回 `is_loading: true`，剩余页在后台任务中继续，进度走回调；
    /// - 已回填：直接返回本地升序全量（`is_loading: false`），
    ///   后台拉最新一页按消息 ID 差量补新，有新增时走同一个回调。
    pub async fn load_messages(
        &self,
        chat_key: &str,
        group_id: i64,
        on_progress: Option<MessageProgressFn>,
    ) -> Result<LoadResult> {
        let meta = self.metadata_dao.get_metadata(chat_key).await?;

        if meta.messages_fetched {
            let stored = self.message_dao.get_messages_asc(group_id).await?;
            info!(
                "[MsgSync] 会话 {} 已回填，本地 {} 条，后台差量刷新",
                chat_key,
                stored.len()
            );
            let this = self.clone();
            let key = chat_key.to_string();
            tokio::spawn(async move {
                // 后台刷新失败只记日志，已返回的本地数据不受影响
                if let Err(e) = this.refresh_newest(&key, group_id, on_progress).await {
                    warn!("[MsgSync] 会话 {} 后台差量刷新失败: {}", key, e);
                }
            });
            return Ok(LoadResult {
                messages: stored,
                is_loading: false,
            });
        }

        info!("[MsgSync] 会话 {} 首次打开，开始回填历史", chat_key);
        let first = match self.api.fetch_message_page(group_id, 0).await {
            Ok(page) => page,
            Err(e @ ChatError::Blocked { .. }) => {
                self.metadata_dao.set_blocked(chat_key, true).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        for raw in &first.messages {
            self.message_dao
                .upsert_message(&LocalMessage::from_raw(raw))
                .await?;
        }

        let stored = self.message_dao.get_messages_asc(group_id).await?;
        let this = self.clone();
        let key = chat_key.to_string();
        tokio::spawn(async move {
            if let Err(e) = this
                .finish_backfill(&key, group_id, first, on_progress)
                .await
            {
                error!("[MsgSync] 会话 {} 历史回填失败: {}", key, e);
            }
        });
        Ok(LoadResult {
            messages: stored,
            is_loading: true,
        })
    }

    /// 续接第一页之后的历史回填
    ///
    /// 逐页拉取并落库（页内最新在前），全部页取完后从最旧页向最新页回放进度，
    /// 最后才标记 messages_fetched。中途任何一页失败都不标记，
    /// 下次打开会重新走回填（已落库的页不丢）。
    pub(crate) async fn finish_backfill(
        &self,
        chat_key: &str,
        group_id: i64,
        first: MessagePage,
        on_progress: Option<MessageProgressFn>,
    ) -> Result<()> {
        let mut pages: Vec<Vec<LocalMessage>> = Vec::new();
        let mut next = parse_continuation(0, first.next.as_deref());
        pages.push(first.messages.iter().map(LocalMessage::from_raw).collect());

        while let Some(page) = next {
            let resp = match self.api.fetch_message_page(group_id, page).await {
                Ok(resp) => resp,
                Err(e @ ChatError::Blocked { .. }) => {
                    self.metadata_dao.set_blocked(chat_key, true).await?;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            let locals: Vec<LocalMessage> =
                resp.messages.iter().map(LocalMessage::from_raw).collect();
            for msg in &locals {
                self.message_dao.upsert_message(msg).await?;
            }
            debug!(
                "[MsgSync] 会话 {} 第 {} 页落库 {} 条",
                chat_key,
                page,
                locals.len()
            );
            pages.push(locals);
            next = parse_continuation(page, resp.next.as_deref());
        }

        // 回放进度：最旧页先并入，每并入一页回调一次升序全集
        if let Some(cb) = &on_progress {
            let mut acc: Vec<LocalMessage> = Vec::new();
            for page in pages.iter().rev() {
                if page.is_empty() {
                    continue;
                }
                acc.extend(page.iter().cloned());
                acc.sort_by_key(|m| m.ts);
                cb(acc.clone());
            }
        }

        // 全部页落库后才算回填完成；成功拉取顺带清掉屏蔽标记
        let mut meta = self.metadata_dao.get_metadata(chat_key).await?;
        meta.messages_fetched = true;
        meta.last_fetched_at = Utc::now().timestamp_millis();
        meta.is_blocked = false;
        self.metadata_dao.upsert_metadata(&meta).await?;

        info!(
            "[MsgSync] ✅ 会话 {} 历史回填完成，共 {} 页",
            chat_key,
            pages.len()
        );
        Ok(())
    }

    /// 删除单条消息（显式用户删除，本地操作）
    pub async fn delete_message(&self, group_id: i64, message_id: i64) -> Result<()> {
        self.message_dao.delete_message(group_id, message_id).await
    }

    /// 拉最新一页并与本地做差量
    ///
    /// 只落库消息 ID 大于本地已知最大 ID 的记录；有新增时重读全量走回调。
    /// 推送侧收到新消息事件后也走这里补全内容。
    pub async fn refresh_newest(
        &self,
        chat_key: &str,
        group_id: i64,
        on_update: Option<MessageProgressFn>,
    ) -> Result<bool> {
        let resp = match self.api.fetch_message_page(group_id, 0).await {
            Ok(resp) => resp,
            Err(e @ ChatError::Blocked { .. }) => {
                self.metadata_dao.set_blocked(chat_key, true).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let max_id = self.message_dao.max_message_id(group_id).await?;
        let mut added = 0usize;
        for raw in &resp.messages {
            if raw.message_id > max_id {
                self.message_dao
                    .upsert_message(&LocalMessage::from_raw(raw))
                    .await?;
                added += 1;
            }
        }

        if added > 0 {
            debug!("[MsgSync] 会话 {} 差量新增 {} 条", chat_key, added);
            if let Some(cb) = &on_update {
                let all = self.message_dao.get_messages_asc(group_id).await?;
                cb(all);
            }
        }

        // 成功拉取即清屏蔽标记
        let meta = self.metadata_dao.get_metadata(chat_key).await?;
        if meta.is_blocked {
            self.metadata_dao.set_blocked(chat_key, false).await?;
        }
        Ok(added > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::db::create_sqlite_pool_with_migration;
    use crate::chat::notify::ChangeHub;
    use crate::chat::types::RawMessage;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// 按页号预置数据的 mock API
    struct MockApi {
        pages: Vec<MessagePage>,
        blocked: bool,
        fetch_count: Mutex<usize>,
    }

    impl MockApi {
        fn with_pages(pages: Vec<MessagePage>) -> Self {
            Self {
                pages,
                blocked: false,
                fetch_count: Mutex::new(0),
            }
        }

        fn blocked() -> Self {
            Self {
                pages: Vec::new(),
                blocked: true,
                fetch_count: Mutex::new(0),
            }
        }

        fn fetch_count(&self) -> usize {
            *self.fetch_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl MessageApi for MockApi {
        async fn fetch_message_page(&self, group_id: i64, page: u32) -> Result<MessagePage> {
            *self.fetch_count.lock().unwrap() += 1;
            if self.blocked {
                return Err(ChatError::Blocked { group_id });
            }
            self.pages
                .get(page as usize)
                .cloned()
                .ok_or_else(|| ChatError::Payload(format!("不存在的页号: {}", page)))
        }
    }

    fn raw(message_id: i64, group_id: i64, sender: i32, ts: i64) -> RawMessage {
        RawMessage {
            message_id,
            group_id,
            temp_id: String::new(),
            sender,
            payload: format!("消息{}", message_id),
            ts,
            quote_id: 0,
            quote_text: String::new(),
            seen: false,
        }
    }

    struct Env {
        syncer: MessageSyncer,
        message_dao: Arc<MessageDao>,
        metadata_dao: Arc<MetadataDao>,
        api: Arc<MockApi>,
    }

    async fn env(api: MockApi) -> Env {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:")
            .await
            .unwrap();
        let hub = Arc::new(ChangeHub::new());
        let message_dao = Arc::new(MessageDao::new(pool.clone(), hub.clone()));
        let metadata_dao = Arc::new(MetadataDao::new(pool, hub));
        let api = Arc::new(api);
        let syncer = MessageSyncer::new(api.clone(), message_dao.clone(), metadata_dao.clone());
        Env {
            syncer,
            message_dao,
            metadata_dao,
            api,
        }
    }

    async fn wait_fetched(dao: &MetadataDao, chat_key: &str) -> bool {
        for _ in 0..200 {
            if dao.get_metadata(chat_key).await.unwrap().messages_fetched {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_first_open_backfills_with_growing_progress() {
        // 第 0 页 20 条最新（ts 219..200），第 1 页 5 条最旧（ts 104..100）
        let page0 = MessagePage {
            messages: (0..20).map(|i| raw(25 - i, 1, 1, 219 - i)).collect(),
            next: Some("1".to_string()),
        };
        let page1 = MessagePage {
            messages: (0..5).map(|i| raw(5 - i, 1, 1, 104 - i)).collect(),
            next: None,
        };
        let env = env(MockApi::with_pages(vec![page0, page1])).await;

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<LocalMessage>>();
        let cb: MessageProgressFn = Arc::new(move |msgs| {
            tx.send(msgs).ok();
        });

        let result = env
            .syncer
            .load_messages("g_1", 1, Some(cb))
            .await
            .unwrap();
        assert!(result.is_loading);

        // 第一次回调：最旧页并入，5 条升序
        let first = rx.recv().await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(first.first().unwrap().ts, 100);
        assert_eq!(first.last().unwrap().ts, 104);

        // 第二次回调：全集 25 条，整体升序
        let second = rx.recv().await.unwrap();
        assert_eq!(second.len(), 25);
        assert_eq!(second.first().unwrap().ts, 100);
        assert_eq!(second.last().unwrap().ts, 219);
        assert!(second.windows(2).all(|w| w[0].ts <= w[1].ts));

        assert!(wait_fetched(&env.metadata_dao, "g_1").await);
        let stored = env.message_dao.get_messages_asc(1).await.unwrap();
        assert_eq!(stored.len(), 25);
    }

    #[tokio::test]
    async fn test_blocked_error_propagates_and_sets_flag() {
        let env = env(MockApi::blocked()).await;
        let err = env.syncer.load_messages("g_7", 7, None).await.unwrap_err();
        assert!(matches!(err, ChatError::Blocked { group_id: 7 }));

        let meta = env.metadata_dao.get_metadata("g_7").await.unwrap();
        assert!(meta.is_blocked);
        assert!(!meta.messages_fetched);
    }

    #[tokio::test]
    async fn test_successful_backfill_clears_blocked_flag() {
        let page0 = MessagePage {
            messages: vec![raw(1, 7, 1, 100)],
            next: None,
        };
        let env = env(MockApi::with_pages(vec![page0])).await;
        env.metadata_dao.set_blocked("g_7", true).await.unwrap();

        let result = env.syncer.load_messages("g_7", 7, None).await.unwrap();
        assert!(result.is_loading);
        assert!(wait_fetched(&env.metadata_dao, "g_7").await);

        let meta = env.metadata_dao.get_metadata("g_7").await.unwrap();
        assert!(!meta.is_blocked);
    }

    #[tokio::test]
    async fn test_fast_path_diffs_by_max_message_id() {
        // 本地已有 1、2 两条；最新一页带回已知的 2（内容有变）和新增的 3
        let mut changed = raw(2, 1, 1, 200);
        changed.payload = "服务器改过的内容".to_string();
        let page0 = MessagePage {
            messages: vec![raw(3, 1, 1, 300), changed],
            next: None,
        };
        let env = env(MockApi::with_pages(vec![page0])).await;
        env.metadata_dao.mark_messages_fetched("g_1").await.unwrap();
        env.message_dao
            .upsert_message(&LocalMessage::from_raw(&raw(1, 1, 0, 100)))
            .await
            .unwrap();
        env.message_dao
            .upsert_message(&LocalMessage::from_raw(&raw(2, 1, 1, 200)))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<LocalMessage>>();
        let cb: MessageProgressFn = Arc::new(move |msgs| {
            tx.send(msgs).ok();
        });

        let result = env
            .syncer
            .load_messages("g_1", 1, Some(cb))
            .await
            .unwrap();
        assert!(!result.is_loading);
        assert_eq!(result.messages.len(), 2);

        // 后台差量只补 ID 大于本地最大值的记录
        let updated = rx.recv().await.unwrap();
        assert_eq!(updated.len(), 3);
        assert_eq!(updated[1].payload, "消息2");
        assert_eq!(env.api.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_newest_without_new_messages_is_silent() {
        let page0 = MessagePage {
            messages: vec![raw(2, 1, 1, 200), raw(1, 1, 0, 100)],
            next: None,
        };
        let env = env(MockApi::with_pages(vec![page0])).await;
        env.message_dao
            .upsert_message(&LocalMessage::from_raw(&raw(1, 1, 0, 100)))
            .await
            .unwrap();
        env.message_dao
            .upsert_message(&LocalMessage::from_raw(&raw(2, 1, 1, 200)))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<LocalMessage>>();
        let cb: MessageProgressFn = Arc::new(move |msgs| {
            tx.send(msgs).ok();
        });
        let added = env.syncer.refresh_newest("g_1", 1, Some(cb)).await.unwrap();
        assert!(!added);
        assert!(rx.try_recv().is_err());
    }
}
