//! 标签服务层
//!
//! 实现会话标签的增删改查与校验：每会话最多 5 条，文本大小写不敏感唯一，
//! 颜色归一化为 6 位小写十六进制。任何校验失败都拒绝整次变更，不做部分写入。

use crate::chat::error::{ChatError, Result};
use crate::chat::metadata::dao::MetadataDao;
use crate::chat::metadata::models::ChatTag;
use std::sync::Arc;
use tracing::debug;

/// 每会话标签上限
pub const MAX_TAGS_PER_CHAT: usize = 5;

/// 标签服务
pub struct TagService {
    metadata_dao: Arc<MetadataDao>,
}

impl TagService {
    pub fn new(metadata_dao: Arc<MetadataDao>) -> Self {
        Self { metadata_dao }
    }

    /// 归一化颜色：去掉可选的 # 前缀并转小写，要求恰好 6 位十六进制
    fn normalize_color(color: &str) -> Result<String> {
        let color = color.trim().trim_start_matches('#').to_lowercase();
        if color.len() != 6 || !color.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChatError::TagValidation(format!(
                "颜色必须是 6 位十六进制: {}",
                color
            )));
        }
        Ok(color)
    }

    /// 校验单条标签文本
    fn validate_text(text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ChatError::TagValidation("标签文本不能为空".to_string()));
        }
        Ok(())
    }

    /// 校验整个标签列表（数量、文本唯一性）
    fn validate_list(tags: &[ChatTag]) -> Result<()> {
        if tags.len() > MAX_TAGS_PER_CHAT {
            return Err(ChatError::TagValidation(format!(
                "标签数量超过上限 {}",
                MAX_TAGS_PER_CHAT
            )));
        }
        for (i, tag) in tags.iter().enumerate() {
            Self::validate_text(&tag.text)?;
            let lower = tag.text.to_lowercase();
            if tags[..i].iter().any(|t| t.text.to_lowercase() == lower) {
                return Err(ChatError::TagValidation(format!(
                    "标签文本重复（忽略大小写）: {}",
                    tag.text
                )));
            }
        }
        Ok(())
    }

    /// 读取某会话的标签
    pub async fn get_tags(&self, chat_key: &str) -> Result<Vec<ChatTag>> {
        Ok(self.metadata_dao.get_metadata(chat_key).await?.tags)
    }

    /// 整体替换某会话的标签（先归一化颜色，再整体校验）
    pub async fn set_tags(&self, chat_key: &str, tags: Vec<ChatTag>) -> Result<Vec<ChatTag>> {
        let mut normalized = Vec::with_capacity(tags.len());
        for tag in tags {
            normalized.push(ChatTag {
                text: tag.text.trim().to_string(),
                color: Self::normalize_color(&tag.color)?,
            });
        }
        Self::validate_list(&normalized)?;

        let mut meta = self.metadata_dao.get_metadata(chat_key).await?;
        meta.tags = normalized.clone();
        self.metadata_dao.upsert_metadata(&meta).await?;
        debug!(
            "[Tags] 会话 {} 标签已更新，共 {} 条",
            chat_key,
            normalized.len()
        );
        Ok(normalized)
    }

    /// 追加一条标签
    pub async fn add_tag(&self, chat_key: &str, text: &str, color: &str) -> Result<ChatTag> {
        Self::validate_text(text)?;
        let tag = ChatTag {
            text: text.trim().to_string(),
            color: Self::normalize_color(color)?,
        };

        let mut tags = self.get_tags(chat_key).await?;
        if tags.len() >= MAX_TAGS_PER_CHAT {
            return Err(ChatError::TagValidation(format!(
                "标签数量已达上限 {}",
                MAX_TAGS_PER_CHAT
            )));
        }
        let lower = tag.text.to_lowercase();
        if tags.iter().any(|t| t.text.to_lowercase() == lower) {
            return Err(ChatError::TagValidation(format!(
                "标签文本重复（忽略大小写）: {}",
                tag.text
            )));
        }
        tags.push(tag.clone());

        let mut meta = self.metadata_dao.get_metadata(chat_key).await?;
        meta.tags = tags;
        self.metadata_dao.upsert_metadata(&meta).await?;
        Ok(tag)
    }

    /// 删除一条标签（按文本匹配，忽略大小写）
    pub async fn remove_tag(&self, chat_key: &str, text: &str) -> Result<()> {
        let mut tags = self.get_tags(chat_key).await?;
        let lower = text.to_lowercase();
        let before = tags.len();
        tags.retain(|t| t.text.to_lowercase() != lower);
        if tags.len() == before {
            return Err(ChatError::TagValidation(format!("标签不存在: {}", text)));
        }

        let mut meta = self.metadata_dao.get_metadata(chat_key).await?;
        meta.tags = tags;
        self.metadata_dao.upsert_metadata(&meta).await
    }

    /// 修改一条标签的文本/颜色
    pub async fn update_tag(
        &self,
        chat_key: &str,
        old_text: &str,
        new_text: &str,
        new_color: &str,
    ) -> Result<ChatTag> {
        Self::validate_text(new_text)?;
        let new_tag = ChatTag {
            text: new_text.trim().to_string(),
            color: Self::normalize_color(new_color)?,
        };

        let mut tags = self.get_tags(chat_key).await?;
        let old_lower = old_text.to_lowercase();
        let new_lower = new_tag.text.to_lowercase();

        let idx = tags
            .iter()
            .position(|t| t.text.to_lowercase() == old_lower)
            .ok_or_else(|| ChatError::TagValidation(format!("标签不存在: {}", old_text)))?;

        // 新文本不得与其他标签冲突（与自身同名的改颜色操作除外）
        if tags
            .iter()
            .enumerate()
            .any(|(i, t)| i != idx && t.text.to_lowercase() == new_lower)
        {
            return Err(ChatError::TagValidation(format!(
                "标签文本重复（忽略大小写）: {}",
                new_tag.text
            )));
        }
        tags[idx] = new_tag.clone();

        let mut meta = self.metadata_dao.get_metadata(chat_key).await?;
        meta.tags = tags;
        self.metadata_dao.upsert_metadata(&meta).await?;
        Ok(new_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::db::create_sqlite_pool_with_migration;
    use crate::chat::notify::ChangeHub;

    async fn setup() -> TagService {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:")
            .await
            .unwrap();
        let hub = Arc::new(ChangeHub::new());
        TagService::new(Arc::new(MetadataDao::new(pool, hub)))
    }

    #[tokio::test]
    async fn test_add_then_read_tag() {
        let svc = setup().await;
        svc.add_tag("g_1", "重要", "#FF0000").await.unwrap();
        let tags = svc.get_tags("g_1").await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].text, "重要");
        // 颜色归一化为小写、去 # 前缀
        assert_eq!(tags[0].color, "ff0000");
    }

    #[tokio::test]
    async fn test_sixth_tag_rejected() {
        let svc = setup().await;
        for i in 0..5 {
            svc.add_tag("g_1", &format!("tag{}", i), "aabbcc").await.unwrap();
        }
        let err = svc.add_tag("g_1", "tag5", "aabbcc").await.unwrap_err();
        assert!(matches!(err, ChatError::TagValidation(_)));
        assert_eq!(svc.get_tags("g_1").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_case_insensitive_duplicate_rejected() {
        let svc = setup().await;
        svc.add_tag("g_1", "Match", "aabbcc").await.unwrap();
        let err = svc.add_tag("g_1", "match", "001122").await.unwrap_err();
        assert!(matches!(err, ChatError::TagValidation(_)));
    }

    #[tokio::test]
    async fn test_invalid_color_rejected() {
        let svc = setup().await;
        assert!(svc.add_tag("g_1", "a", "red").await.is_err());
        assert!(svc.add_tag("g_1", "a", "#12345").await.is_err());
        assert!(svc.add_tag("g_1", "a", "12345g").await.is_err());
        // 校验失败不产生部分写入
        assert!(svc.get_tags("g_1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let svc = setup().await;
        assert!(svc.add_tag("g_1", "  ", "aabbcc").await.is_err());
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let svc = setup().await;
        svc.add_tag("g_1", "旧名", "aabbcc").await.unwrap();
        svc.add_tag("g_1", "其他", "001122").await.unwrap();

        // 改名不得与其他标签冲突
        assert!(svc.update_tag("g_1", "旧名", "其他", "aabbcc").await.is_err());

        svc.update_tag("g_1", "旧名", "新名", "#DDEEFF").await.unwrap();
        let tags = svc.get_tags("g_1").await.unwrap();
        assert!(tags.iter().any(|t| t.text == "新名" && t.color == "ddeeff"));

        svc.remove_tag("g_1", "新名").await.unwrap();
        assert_eq!(svc.get_tags("g_1").await.unwrap().len(), 1);
        assert!(svc.remove_tag("g_1", "不存在").await.is_err());
    }
}
