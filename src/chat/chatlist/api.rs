//! 会话列表 HTTP API 客户端
//!
//! 远端拉取契约抽象为 trait（便于注入 mock / 替换宿主实现），
//! 默认实现基于 reqwest 的 POST-JSON 接口。

use crate::chat::chatlist::models::SyncScope;
use crate::chat::error::{ChatError, Result};
use crate::chat::types::{handle_http_response, ChatPage, FolderListResp, RawFolder};
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

/// 会话列表拉取契约
///
/// `fetch_chat_page` 返回一批有序记录加一个不透明续传标记；
/// `fetch_folders` 返回全部文件夹。请求/响应形状视为宿主给定。
#[async_trait]
pub trait ChatListApi: Send + Sync {
    async fn fetch_chat_page(&self, scope: SyncScope, page: u32) -> Result<ChatPage>;
    async fn fetch_folders(&self) -> Result<Vec<RawFolder>>;
}

/// 默认实现：reqwest POST-JSON
pub struct HttpChatListApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpChatListApi {
    /// `client` 应已在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }
}

#[async_trait]
impl ChatListApi for HttpChatListApi {
    async fn fetch_chat_page(&self, scope: SyncScope, page: u32) -> Result<ChatPage> {
        let operation_id = Uuid::new_v4().to_string();
        let (url, body) = match scope {
            SyncScope::Inbox => (
                format!("{}/chats/list", self.api_base_url),
                serde_json::json!({ "page": page }),
            ),
            SyncScope::Folder(folder_id) => (
                format!("{}/chats/list", self.api_base_url),
                serde_json::json!({ "page": page, "folderId": folder_id }),
            ),
            SyncScope::Archives => (
                format!("{}/chats/archives", self.api_base_url),
                serde_json::json!({ "page": page }),
            ),
        };

        info!("[ChatAPI] 📡 请求会话列表，scope: {:?}, 页: {}", scope, page);
        debug!("[ChatAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&body)
            .send()
            .await?;

        let api_resp = handle_http_response::<ChatPage>(response, "会话列表").await?;
        let page_resp = api_resp.data.ok_or_else(|| ChatError::Api {
            code: -1,
            message: "响应中缺少 data 字段".to_string(),
        })?;

        info!(
            "[ChatAPI] ✅ 会话列表响应，记录数: {}, next: {:?}",
            page_resp.chats.len(),
            page_resp.next
        );
        Ok(page_resp)
    }

    async fn fetch_folders(&self) -> Result<Vec<RawFolder>> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/folders/list", self.api_base_url);

        info!("[ChatAPI] 📡 请求文件夹列表");
        debug!("[ChatAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let api_resp = handle_http_response::<FolderListResp>(response, "文件夹列表").await?;
        let data = api_resp.data.ok_or_else(|| ChatError::Api {
            code: -1,
            message: "响应中缺少 data 字段".to_string(),
        })?;

        info!("[ChatAPI] ✅ 文件夹列表响应，共 {} 个", data.folders.len());
        Ok(data.folders)
    }
}
