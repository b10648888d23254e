//! 远端接口的线格式类型
//!
//! 远端返回的原始记录形状在这里定义（camelCase JSON，缺失字段取默认值），
//! 以及统一的 `{errCode, errMsg, data}` 响应包装和通用响应处理函数。

use crate::chat::error::{ChatError, Result};
use serde::{Deserialize, Serialize};

/// 服务器表示"会话被屏蔽"的业务错误码
pub const ERR_CODE_BLOCKED: i32 = 1302;

/// 统一的 API 响应包装结构体（包含 errCode、errMsg、data）
/// data 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg")]
    pub err_msg: String,
    pub data: Option<T>,
}

/// 通用 HTTP 响应处理函数：校验 HTTP 状态与业务错误码后反序列化
/// 所有 API 都共用此方法
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> Result<ApiResponse<T>> {
    use tracing::{debug, error};

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await?;
    let body_str = String::from_utf8_lossy(&body_bytes);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(ChatError::Api {
            code: status.as_u16() as i32,
            message: body_str.to_string(),
        });
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    // 从 bytes 反序列化（body 已被消费）
    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        ChatError::Serde(e)
    })?;

    // 检查业务错误码
    if api_resp.err_code != 0 {
        error!(
            "[HTTP] {}服务器错误，错误码: {}, 错误信息: {}",
            operation_name, api_resp.err_code, api_resp.err_msg
        );
        return Err(ChatError::Api {
            code: api_resp.err_code,
            message: api_resp.err_msg,
        });
    }

    Ok(api_resp)
}

// ========== 会话列表相关线格式 ==========

/// 服务器返回的原始会话记录
///
/// 单聊以 groupId 标识；广播/频道以 dbId（+ 可选 broadcastId）标识。
/// lastActivity 是服务器侧的字符串时间，可能为空或无法解析。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChat {
    #[serde(default)]
    pub group_id: i64,
    #[serde(default)]
    pub db_id: i64,
    #[serde(default)]
    pub broadcast_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub last_activity: String,
    #[serde(default)]
    pub unread_count: i32,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_online: bool,
    /// 所属文件夹 ID，0 = 收件箱
    #[serde(default)]
    pub folder_id: i64,
    #[serde(default)]
    pub is_broadcast: bool,
    #[serde(default)]
    pub broadcast_type: i32,
    /// 广播专用：标题
    #[serde(default)]
    pub subject: String,
    /// 广播专用：正文
    #[serde(default)]
    pub body: String,
}

/// 会话列表分页响应
///
/// next 为续传标记：缺失/空/"end" 表示没有更多页，
/// 否则其内容是下一页页号的十进制字符串。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPage {
    #[serde(default)]
    pub chats: Vec<RawChat>,
    #[serde(default)]
    pub next: Option<String>,
}

/// 服务器返回的原始文件夹记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFolder {
    pub folder_id: i64,
    #[serde(default)]
    pub name: String,
    /// 服务器侧统计的文件夹内未读数
    #[serde(default)]
    pub unread_count: i32,
}

/// 文件夹列表响应
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderListResp {
    #[serde(default)]
    pub folders: Vec<RawFolder>,
}

// ========== 消息相关线格式 ==========

/// 服务器返回的原始消息记录
///
/// payload 可能内嵌 `[imageId|text]` 这类方括号迷你格式（图片/视频/图集），
/// 核心层按不透明字符串原样存储，解析是 UI 的事。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub message_id: i64,
    #[serde(default)]
    pub group_id: i64,
    /// 乐观发送时客户端生成的临时 ID（message_id 为占位负值时使用）
    #[serde(default)]
    pub temp_id: String,
    /// 0 = 自己，1 = 对方
    #[serde(default)]
    pub sender: i32,
    #[serde(default)]
    pub payload: String,
    /// 排序用数值时间戳
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub quote_id: i64,
    #[serde(default)]
    pub quote_text: String,
    #[serde(default)]
    pub seen: bool,
}

/// 消息分页响应（服务器按最新在前返回）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub next: Option<String>,
}

/// 解析续传标记，返回下一页页号
///
/// 缺失/空/"end" 表示没有更多页；无法解析或页号不前进的标记
/// 一律按数据结束处理（终止翻页，不算错误也不重试）。
pub fn parse_continuation(current_page: u32, token: Option<&str>) -> Option<u32> {
    let token = token?.trim();
    if token.is_empty() || token == "end" {
        return None;
    }
    match token.parse::<u32>() {
        Ok(next) if next > current_page => Some(next),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_continuation() {
        assert_eq!(parse_continuation(0, Some("1")), Some(1));
        assert_eq!(parse_continuation(0, None), None);
        assert_eq!(parse_continuation(0, Some("")), None);
        assert_eq!(parse_continuation(0, Some("end")), None);
        // 无法解析或不前进：按结束处理
        assert_eq!(parse_continuation(0, Some("abc")), None);
        assert_eq!(parse_continuation(1, Some("1")), None);
        assert_eq!(parse_continuation(2, Some("1")), None);
    }
}
