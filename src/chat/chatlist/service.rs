//! 会话列表同步服务层
//!
//! 实现会话列表的分页回填与基于游标的增量同步：
//! 逐页拉取、批内去重、立即落库（部分进度对读者可见）、
//! 记录本次观察到的最大活跃时间戳作为下次增量同步的游标。
//!
//! 增量模式的停止条件是"整页都落库后发现本页存在早于游标的记录"，
//! 而不是遇到第一条旧记录就停，避免漏掉同页中排在旧记录之后的新记录。

use crate::chat::chatlist::api::ChatListApi;
use crate::chat::chatlist::dao::{ChatDao, CursorDao, FolderDao};
use crate::chat::chatlist::listener::ChatListener;
use crate::chat::chatlist::models::{LocalChat, LocalFolder, SyncOutcome, SyncScope};
use crate::chat::error::Result;
use crate::chat::identity::dedup_chats;
use crate::chat::metadata::dao::MetadataDao;
use crate::chat::types::parse_continuation;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 会话同步器
pub struct ChatSyncer {
    api: Arc<dyn ChatListApi>,
    chat_dao: Arc<ChatDao>,
    folder_dao: Arc<FolderDao>,
    cursor_dao: Arc<CursorDao>,
    metadata_dao: Arc<MetadataDao>,
    listener: Arc<dyn ChatListener>,
}

impl ChatSyncer {
    pub fn new(
        api: Arc<dyn ChatListApi>,
        chat_dao: Arc<ChatDao>,
        folder_dao: Arc<FolderDao>,
        cursor_dao: Arc<CursorDao>,
        metadata_dao: Arc<MetadataDao>,
        listener: Arc<dyn ChatListener>,
    ) -> Self {
        Self {
            api,
            chat_dao,
            folder_dao,
            cursor_dao,
            metadata_dao,
            listener,
        }
    }

    /// 同步单个范围
    ///
    /// - `since` 为 None 时全量回填（翻到没有更多页为止）；
    /// - `since` 为 Some(游标) 时增量同步：发现某页含有早于游标的记录，
    ///   该页仍整页落库，但不再拉取后续页。
    ///
    /// 续传标记缺失/空/"end" 表示结束；无法解析或页号不前进的标记
    /// 视为数据结束（终止翻页），不算错误也不重试。
    pub async fn sync_scope(&self, scope: SyncScope, since: Option<i64>) -> Result<SyncOutcome> {
        let scope_key = scope.cursor_key();
        info!(
            "[ChatSync] 🔄 开始同步范围 {}，游标: {:?}",
            scope_key, since
        );
        self.listener.on_sync_start(scope_key.clone()).await;

        let mut page: u32 = 0;
        let mut total_synced = 0usize;
        let mut most_recent_ts = 0i64;

        loop {
            let resp = match self.api.fetch_chat_page(scope, page).await {
                Ok(resp) => resp,
                Err(e) => {
                    // 单页失败中止本范围同步；已落库的页保留，调用方从缓存兜底
                    error!("[ChatSync] 范围 {} 第 {} 页拉取失败: {}", scope_key, page, e);
                    self.listener
                        .on_sync_failed(scope_key.clone(), e.to_string())
                        .await;
                    return Err(e);
                }
            };

            let next = resp.next.clone();
            let deduped = dedup_chats(resp.chats);
            debug!(
                "[ChatSync] 范围 {} 第 {} 页，去重后 {} 条",
                scope_key,
                page,
                deduped.len()
            );

            let mut page_chats: Vec<LocalChat> = Vec::with_capacity(deduped.len());
            let mut saw_older = false;
            for raw in &deduped {
                let local = LocalChat::from_raw(raw);
                most_recent_ts = most_recent_ts.max(local.last_activity_ts);
                if let Some(cursor_ts) = since {
                    if local.last_activity_ts < cursor_ts {
                        saw_older = true;
                    }
                }
                // 逐条立即落库，不跨页缓冲
                self.chat_dao.upsert_chat(&local).await?;
                // 归档同步的副作用：命中的会话打归档标记；普通范围不碰该标记
                if scope == SyncScope::Archives {
                    self.metadata_dao.set_archived(&local.chat_key, true).await?;
                }
                page_chats.push(local);
            }
            total_synced += page_chats.len();

            if !page_chats.is_empty() {
                let json = serde_json::to_string(&page_chats).unwrap_or_else(|_| "[]".to_string());
                self.listener.on_chats_changed(json).await;
            }
            self.listener
                .on_sync_progress(scope_key.clone(), page, total_synced)
                .await;

            if saw_older {
                info!(
                    "[ChatSync] 范围 {} 第 {} 页发现早于游标的记录，停止翻页",
                    scope_key, page
                );
                break;
            }

            // 续传标记处理
            match parse_continuation(page, next.as_deref()) {
                Some(next_page) => page = next_page,
                None => {
                    debug!("[ChatSync] 范围 {} 第 {} 页后无更多数据", scope_key, page);
                    break;
                }
            }
        }

        // 完成后保存游标：取本次观察到的最大时间戳与旧游标的较大者
        let new_cursor = most_recent_ts.max(since.unwrap_or(0));
        if new_cursor > 0 {
            self.cursor_dao.save_cursor(&scope_key, new_cursor).await?;
        }

        self.listener
            .on_sync_finish(scope_key.clone(), total_synced)
            .await;
        if let Ok(total_unread) = self.chat_dao.total_unread().await {
            self.listener.on_total_unread_changed(total_unread).await;
        }

        info!(
            "[ChatSync] ✅ 范围 {} 同步完成，共 {} 条，最大时间戳: {}",
            scope_key, total_synced, most_recent_ts
        );
        Ok(SyncOutcome {
            total_synced,
            most_recent_ts,
        })
    }

    /// 读取某范围的游标后做一次增量同步（无游标则全量）
    async fn sync_scope_incremental(&self, scope: SyncScope) -> Result<SyncOutcome> {
        let cursor = self.cursor_dao.get_cursor(&scope.cursor_key()).await?;
        let since = cursor.map(|c| c.last_activity_ts).filter(|ts| *ts > 0);
        self.sync_scope(scope, since).await
    }

    /// 同步收件箱
    pub async fn sync_inbox(&self) -> Result<SyncOutcome> {
        self.sync_scope_incremental(SyncScope::Inbox).await
    }

    /// 同步指定文件夹
    pub async fn sync_folder(&self, folder_id: i64) -> Result<SyncOutcome> {
        self.sync_scope_incremental(SyncScope::Folder(folder_id)).await
    }

    /// 同步归档列表（命中的会话打归档标记）
    pub async fn sync_archives(&self) -> Result<SyncOutcome> {
        self.sync_scope_incremental(SyncScope::Archives).await
    }

    /// 同步文件夹列表（服务器侧未读计数一并落库）
    pub async fn sync_folders(&self) -> Result<Vec<LocalFolder>> {
        let raw_folders = self.api.fetch_folders().await?;
        let mut folders = Vec::with_capacity(raw_folders.len());
        for raw in &raw_folders {
            let folder = LocalFolder::from_raw(raw);
            self.folder_dao.upsert_folder(&folder).await?;
            folders.push(folder);
        }
        let json = serde_json::to_string(&folders).unwrap_or_else(|_| "[]".to_string());
        self.listener.on_folders_changed(json).await;
        info!("[ChatSync] ✅ 文件夹列表同步完成，共 {} 个", folders.len());
        Ok(folders)
    }

    /// 全量刷新：收件箱 + 每个已知文件夹，顺序执行
    ///
    /// 单个文件夹失败只告警，不中止其余文件夹的同步。
    pub async fn sync_all(&self) -> Result<SyncOutcome> {
        info!("[ChatSync] 🔄 开始全量刷新（收件箱 + 全部文件夹）...");

        // 先刷新文件夹列表，失败不阻断会话同步
        if let Err(e) = self.sync_folders().await {
            warn!("[ChatSync] 文件夹列表同步失败，沿用本地文件夹: {}", e);
        }

        let mut aggregate = SyncOutcome::default();
        match self.sync_inbox().await {
            Ok(outcome) => {
                aggregate.total_synced += outcome.total_synced;
                aggregate.most_recent_ts = aggregate.most_recent_ts.max(outcome.most_recent_ts);
            }
            Err(e) => warn!("[ChatSync] 收件箱同步失败: {}", e),
        }

        // 本地文件夹列表读不出来时按"全部文件夹失败"降级，已同步的范围照常返回
        let folders = match self.folder_dao.get_all_folders().await {
            Ok(folders) => folders,
            Err(e) => {
                warn!("[ChatSync] 读取本地文件夹列表失败，跳过文件夹同步: {}", e);
                return Ok(aggregate);
            }
        };
        for folder in folders {
            match self.sync_folder(folder.folder_id).await {
                Ok(outcome) => {
                    aggregate.total_synced += outcome.total_synced;
                    aggregate.most_recent_ts =
                        aggregate.most_recent_ts.max(outcome.most_recent_ts);
                }
                Err(e) => {
                    // 单个文件夹失败不影响其他文件夹
                    warn!(
                        "[ChatSync] 文件夹 {} 同步失败，继续下一个: {}",
                        folder.folder_id, e
                    );
                }
            }
        }

        info!(
            "[ChatSync] ✅ 全量刷新完成，共落库 {} 条",
            aggregate.total_synced
        );
        Ok(aggregate)
    }
}
