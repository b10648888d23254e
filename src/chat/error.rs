//! 错误类型定义
//!
//! 核心错误分类：传输错误、存储错误、被屏蔽会话、标签校验、推送负载无效。
//! 被屏蔽会话必须作为独立错误向上传递（不能吞掉降级为空结果）。

use thiserror::Error;

/// 核心层错误
#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP 请求失败（单页拉取失败只中止当前 scope 的同步）
    #[error("网络请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    /// 本地 SQLite 存储错误（调用方应降级为空结果，不做自动重试）
    #[error("存储层错误: {0}")]
    Storage(#[from] sqlx::Error),

    /// WebSocket 推送连接错误（重连由调用方负责）
    #[error("推送连接错误: {0}")]
    Push(#[from] tokio_tungstenite::tungstenite::Error),

    /// 服务器返回业务错误码
    #[error("服务器错误 {code}: {message}")]
    Api { code: i32, message: String },

    /// 会话被屏蔽（消息拉取时服务器返回屏蔽状态码）
    #[error("会话已被屏蔽: group_id={group_id}")]
    Blocked { group_id: i64 },

    /// 标签校验失败（重复、超量、颜色非法等，拒绝本次变更，不做部分写入）
    #[error("标签校验失败: {0}")]
    TagValidation(String),

    /// 推送事件负载无效（在传输边界校验，不允许脏数据进入内部流程）
    #[error("推送事件负载无效: {0}")]
    Payload(String),

    /// JSON 序列化/反序列化失败
    #[error("序列化失败: {0}")]
    Serde(#[from] serde_json::Error),

    /// 数据库迁移失败
    #[error("数据库迁移失败: {0}")]
    Migration(String),
}

impl ChatError {
    /// 是否为被屏蔽会话错误
    pub fn is_blocked(&self) -> bool {
        matches!(self, ChatError::Blocked { .. })
    }
}

/// 核心层统一 Result 别名
pub type Result<T> = std::result::Result<T, ChatError>;
