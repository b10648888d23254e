//! 消息 HTTP API 客户端
//!
//! 消息分页由服务器按最新在前返回；服务器可能返回屏蔽状态码，
//! 此时映射为独立的 Blocked 错误向上传递（不能降级为空结果）。

use crate::chat::error::{ChatError, Result};
use crate::chat::types::{handle_http_response, MessagePage, ERR_CODE_BLOCKED};
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

/// 消息拉取契约
#[async_trait]
pub trait MessageApi: Send + Sync {
    /// 拉取某会话的一页消息（页内最新在前）
    async fn fetch_message_page(&self, group_id: i64, page: u32) -> Result<MessagePage>;
}

/// 默认实现：reqwest POST-JSON
pub struct HttpMessageApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpMessageApi {
    /// `client` 应已在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn fetch_message_page(&self, group_id: i64, page: u32) -> Result<MessagePage> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/messages/list", self.api_base_url);

        info!("[MsgAPI] 📡 请求消息列表，会话: {}, 页: {}", group_id, page);
        debug!("[MsgAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "groupId": group_id,
                "page": page,
            }))
            .send()
            .await?;

        let api_resp = match handle_http_response::<MessagePage>(response, "消息列表").await {
            Ok(resp) => resp,
            // 屏蔽状态码映射为独立错误
            Err(ChatError::Api { code, .. }) if code == ERR_CODE_BLOCKED => {
                return Err(ChatError::Blocked { group_id });
            }
            Err(e) => return Err(e),
        };

        let page_resp = api_resp.data.ok_or_else(|| ChatError::Api {
            code: -1,
            message: "响应中缺少 data 字段".to_string(),
        })?;

        info!(
            "[MsgAPI] ✅ 消息列表响应，记录数: {}, next: {:?}",
            page_resp.messages.len(),
            page_resp.next
        );
        Ok(page_resp)
    }
}
