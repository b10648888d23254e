//! 查询引擎
//!
//! 所有视图查询纯走本地库，元数据在读取时合并进结果，不回写会话记录。
//! 过滤步骤的先后顺序是契约的一部分：范围 → 元数据合并 → 归档 → 屏蔽 →
//! 文本 → 布尔过滤 → 最新发送方 → 稳定排序。

use crate::chat::chatlist::dao::ChatDao;
use crate::chat::chatlist::models::LocalChat;
use crate::chat::error::Result;
use crate::chat::message::dao::MessageDao;
use crate::chat::metadata::dao::MetadataDao;
use crate::chat::metadata::models::ChatTag;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 查询条件（全部可选，未设置的条件不参与过滤）
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// 自由文本，对名称/预览/广播标题做大小写不敏感匹配
    pub query: Option<String>,
    pub folder_id: Option<i64>,
    pub unread_only: bool,
    pub pinned_only: bool,
    pub online_only: bool,
    /// 最新一条消息由自己发出
    pub last_message_by_me: bool,
    /// 最新一条消息由对方发出
    pub last_message_by_other: bool,
    /// 会话里只有自己发过消息（空会话不算"只有自己"）
    pub only_my_messages: bool,
    pub blocked_only: bool,
    /// true 只看归档，false/未设置只看未归档
    pub show_archives: bool,
}

/// 查询结果投影：会话记录 + 合并进来的本地元数据
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    #[serde(flatten)]
    pub chat: LocalChat,
    pub is_blocked: bool,
    pub is_archived: bool,
    pub tags: Vec<ChatTag>,
}

/// 查询引擎
pub struct QueryEngine {
    chat_dao: Arc<ChatDao>,
    metadata_dao: Arc<MetadataDao>,
    message_dao: Arc<MessageDao>,
}

impl QueryEngine {
    pub fn new(
        chat_dao: Arc<ChatDao>,
        metadata_dao: Arc<MetadataDao>,
        message_dao: Arc<MessageDao>,
    ) -> Self {
        Self {
            chat_dao,
            metadata_dao,
            message_dao,
        }
    }

    /// 全量会话投影：全部会话（含归档）合并元数据，置顶在前按活跃降序
    pub async fn all_chats(&self) -> Result<Vec<ChatView>> {
        let candidates = self.chat_dao.get_all_chats().await?;
        let mut views = self.merge_metadata(candidates).await?;
        views.sort_by_key(|v| (Reverse(v.chat.is_pinned), Reverse(v.chat.last_activity_ts)));
        Ok(views)
    }

    /// 把本地元数据（屏蔽/归档/标签）合并进会话投影，不回写会话记录
    async fn merge_metadata(&self, candidates: Vec<LocalChat>) -> Result<Vec<ChatView>> {
        let mut meta_by_key: HashMap<String, _> = self
            .metadata_dao
            .get_all_metadata()
            .await?
            .into_iter()
            .map(|m| (m.chat_key.clone(), m))
            .collect();
        Ok(candidates
            .into_iter()
            .map(|chat| {
                let meta = meta_by_key.remove(&chat.chat_key);
                let (is_blocked, is_archived, tags) = match meta {
                    Some(m) => (m.is_blocked, m.is_archived, m.tags),
                    None => (false, false, Vec::new()),
                };
                ChatView {
                    chat,
                    is_blocked,
                    is_archived,
                    tags,
                }
            })
            .collect())
    }

    /// 过滤 + 排序查询
    pub async fn search(&self, filter: &SearchFilter) -> Result<Vec<ChatView>> {
        // (1) 范围：按文件夹索引圈定候选
        let candidates = match filter.folder_id {
            Some(folder_id) => self.chat_dao.get_chats_by_folder(folder_id).await?,
            None => self.chat_dao.get_all_chats().await?,
        };

        // (2) 合并元数据（屏蔽/归档/标签）
        let mut views = self.merge_metadata(candidates).await?;

        // (3) 归档过滤：show_archives 只看归档，否则只看未归档
        views.retain(|v| v.is_archived == filter.show_archives);

        // (4) 屏蔽过滤
        if filter.blocked_only {
            views.retain(|v| v.is_blocked);
        }

        // (5) 文本过滤：名称精确命中排前，部分命中排后，组内保持发现顺序
        if let Some(q) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let q = q.to_lowercase();
            let (exact, partial): (Vec<ChatView>, Vec<ChatView>) = views
                .into_iter()
                .filter(|v| {
                    v.chat.name.to_lowercase().contains(&q)
                        || v.chat.last_message.to_lowercase().contains(&q)
                        || v.chat.subject.to_lowercase().contains(&q)
                })
                .partition(|v| v.chat.name.to_lowercase() == q);
            views = exact;
            views.extend(partial);
        }

        // (6) 布尔过滤
        if filter.unread_only {
            views.retain(|v| v.chat.unread_count > 0);
        }
        if filter.pinned_only {
            views.retain(|v| v.chat.is_pinned);
        }
        if filter.online_only {
            views.retain(|v| v.chat.is_online);
        }

        // (7) 最新发送方过滤：每个候选只做单行查询，不整载消息
        if filter.last_message_by_me || filter.last_message_by_other || filter.only_my_messages {
            let mut kept = Vec::with_capacity(views.len());
            for view in views {
                if self.matches_sender_filters(&view, filter).await? {
                    kept.push(view);
                }
            }
            views = kept;
        }

        // (8) 稳定排序：置顶在前，组内按活跃时间戳降序（无法解析的按最早）
        views.sort_by_key(|v| (Reverse(v.chat.is_pinned), Reverse(v.chat.last_activity_ts)));

        debug!("[Query] 查询返回 {} 条", views.len());
        Ok(views)
    }

    /// 最新发送方谓词。无消息的会话不满足任何一个谓词（空不算"只有自己"）。
    async fn matches_sender_filters(&self, view: &ChatView, filter: &SearchFilter) -> Result<bool> {
        let group_id = view.chat.group_id;
        if !self.message_dao.has_messages(group_id).await? {
            return Ok(false);
        }
        if filter.last_message_by_me || filter.last_message_by_other {
            let sender = self.message_dao.last_message_sender(group_id).await?;
            let by_me = sender == Some(0);
            if filter.last_message_by_me && !by_me {
                return Ok(false);
            }
            if filter.last_message_by_other && by_me {
                return Ok(false);
            }
        }
        if filter.only_my_messages && self.message_dao.has_other_sender(group_id).await? {
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::db::create_sqlite_pool_with_migration;
    use crate::chat::message::models::LocalMessage;
    use crate::chat::metadata::dao::MetadataDao;
    use crate::chat::notify::ChangeHub;
    use crate::chat::types::RawChat;

    struct Env {
        engine: QueryEngine,
        chat_dao: Arc<ChatDao>,
        metadata_dao: Arc<MetadataDao>,
        message_dao: Arc<MessageDao>,
    }

    async fn env() -> Env {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:")
            .await
            .unwrap();
        let hub = Arc::new(ChangeHub::new());
        let chat_dao = Arc::new(ChatDao::new(pool.clone(), hub.clone()));
        let metadata_dao = Arc::new(MetadataDao::new(pool.clone(), hub.clone()));
        let message_dao = Arc::new(MessageDao::new(pool, hub));
        let engine = QueryEngine::new(chat_dao.clone(), metadata_dao.clone(), message_dao.clone());
        Env {
            engine,
            chat_dao,
            metadata_dao,
            message_dao,
        }
    }

    async fn put_chat(env: &Env, raw: RawChat) {
        env.chat_dao
            .upsert_chat(&LocalChat::from_raw(&raw))
            .await
            .unwrap();
    }

    async fn put_message(env: &Env, group_id: i64, message_id: i64, sender: i32, ts: i64) {
        env.message_dao
            .upsert_message(&LocalMessage {
                group_id,
                message_id,
                temp_id: String::new(),
                sender,
                payload: String::new(),
                ts,
                quote_id: 0,
                quote_text: String::new(),
                seen: false,
            })
            .await
            .unwrap();
    }

    fn raw(group_id: i64, name: &str) -> RawChat {
        RawChat {
            group_id,
            name: name.to_string(),
            last_activity: "2026-01-01 10:00:00".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_folder_and_unread_filters_compose() {
        let env = env().await;
        put_chat(
            &env,
            RawChat {
                folder_id: 3,
                unread_count: 2,
                ..raw(1, "甲")
            },
        )
        .await;
        put_chat(
            &env,
            RawChat {
                folder_id: 3,
                unread_count: 0,
                ..raw(2, "乙")
            },
        )
        .await;
        put_chat(
            &env,
            RawChat {
                folder_id: 5,
                unread_count: 9,
                ..raw(3, "丙")
            },
        )
        .await;

        let filter = SearchFilter {
            folder_id: Some(3),
            unread_only: true,
            ..Default::default()
        };
        let views = env.engine.search(&filter).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].chat.group_id, 1);
        assert!(views
            .iter()
            .all(|v| v.chat.folder_id == 3 && v.chat.unread_count > 0));
    }

    #[tokio::test]
    async fn test_archive_filter_partitions_results() {
        let env = env().await;
        put_chat(&env, raw(1, "普通")).await;
        put_chat(&env, raw(2, "已归档")).await;
        env.metadata_dao.set_archived("g_2", true).await.unwrap();

        let normal = env.engine.search(&SearchFilter::default()).await.unwrap();
        assert_eq!(normal.len(), 1);
        assert_eq!(normal[0].chat.group_id, 1);

        let archived = env
            .engine
            .search(&SearchFilter {
                show_archives: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].chat.group_id, 2);
        assert!(archived[0].is_archived);
    }

    #[tokio::test]
    async fn test_text_search_ranks_exact_name_first() {
        let env = env().await;
        put_chat(&env, raw(1, "张三的群")).await;
        put_chat(&env, raw(2, "张三")).await;
        put_chat(
            &env,
            RawChat {
                last_message: "张三说你好".to_string(),
                ..raw(3, "无关")
            },
        )
        .await;
        put_chat(&env, raw(4, "李四")).await;

        let views = env
            .engine
            .search(&SearchFilter {
                query: Some("张三".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<i64> = views.iter().map(|v| v.chat.group_id).collect();
        // 精确名称命中排最前，其余按发现顺序
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_last_sender_predicates_skip_empty_chats() {
        let env = env().await;
        put_chat(&env, raw(1, "最新是自己")).await;
        put_chat(&env, raw(2, "最新是对方")).await;
        put_chat(&env, raw(3, "空会话")).await;
        put_chat(&env, raw(4, "只有自己")).await;
        put_message(&env, 1, 1, 1, 100).await;
        put_message(&env, 1, 2, 0, 200).await;
        put_message(&env, 2, 1, 0, 100).await;
        put_message(&env, 2, 2, 1, 200).await;
        put_message(&env, 4, 1, 0, 100).await;

        let by_me = env
            .engine
            .search(&SearchFilter {
                last_message_by_me: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<i64> = by_me.iter().map(|v| v.chat.group_id).collect();
        assert_eq!(ids, vec![1, 4]);

        let by_other = env
            .engine
            .search(&SearchFilter {
                last_message_by_other: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_other.len(), 1);
        assert_eq!(by_other[0].chat.group_id, 2);

        // 空会话不算"只有自己"
        let only_mine = env
            .engine
            .search(&SearchFilter {
                only_my_messages: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(only_mine.len(), 1);
        assert_eq!(only_mine[0].chat.group_id, 4);
    }

    #[tokio::test]
    async fn test_sort_pinned_first_then_activity_desc() {
        let env = env().await;
        put_chat(
            &env,
            RawChat {
                last_activity: "2026-01-03 10:00:00".to_string(),
                ..raw(1, "新")
            },
        )
        .await;
        put_chat(
            &env,
            RawChat {
                is_pinned: true,
                last_activity: "2026-01-01 10:00:00".to_string(),
                ..raw(2, "置顶旧")
            },
        )
        .await;
        // 无法解析的时间按最早排
        put_chat(
            &env,
            RawChat {
                last_activity: "昨天".to_string(),
                ..raw(3, "坏时间")
            },
        )
        .await;
        put_chat(
            &env,
            RawChat {
                last_activity: "2026-01-02 10:00:00".to_string(),
                ..raw(4, "中")
            },
        )
        .await;

        let views = env.engine.search(&SearchFilter::default()).await.unwrap();
        let ids: Vec<i64> = views.iter().map(|v| v.chat.group_id).collect();
        assert_eq!(ids, vec![2, 1, 4, 3]);
    }

    #[tokio::test]
    async fn test_all_chats_merges_metadata_and_sorts() {
        let env = env().await;
        put_chat(
            &env,
            RawChat {
                last_activity: "2026-01-03 10:00:00".to_string(),
                ..raw(1, "新")
            },
        )
        .await;
        put_chat(
            &env,
            RawChat {
                is_pinned: true,
                last_activity: "2026-01-01 10:00:00".to_string(),
                ..raw(2, "置顶旧")
            },
        )
        .await;
        put_chat(&env, raw(3, "已归档")).await;
        env.metadata_dao.set_archived("g_3", true).await.unwrap();
        let mut meta = env.metadata_dao.get_metadata("g_1").await.unwrap();
        meta.tags = vec![ChatTag {
            text: "工作".to_string(),
            color: "ff0000".to_string(),
        }];
        env.metadata_dao.upsert_metadata(&meta).await.unwrap();

        let views = env.engine.all_chats().await.unwrap();
        // 全量投影不过滤归档，置顶在前
        let ids: Vec<i64> = views.iter().map(|v| v.chat.group_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(views[1].tags.len(), 1);
        assert_eq!(views[1].tags[0].text, "工作");
        assert!(views[2].is_archived);
    }

    #[tokio::test]
    async fn test_blocked_only_filter() {
        let env = env().await;
        put_chat(&env, raw(1, "正常")).await;
        put_chat(&env, raw(2, "被屏蔽")).await;
        env.metadata_dao.set_blocked("g_2", true).await.unwrap();

        let views = env
            .engine
            .search(&SearchFilter {
                blocked_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].is_blocked);
    }
}
