//! 本地会话同步与缓存核心
//!
//! 维护远端消息系统的离线优先镜像（会话、文件夹、消息、本地元数据），
//! 在分页、部分有序的远端 API 下保持一致，合并 WebSocket 推送事件，
//! 并纯靠本地库回答多谓词查询。

pub mod chatlist;
pub mod client;
pub mod db;
pub mod error;
pub mod identity;
pub mod message;
pub mod metadata;
pub mod notify;
pub mod query;
pub mod realtime;
pub mod serialization;
pub mod transport;
pub mod types;

// 重新导出常用类型
pub use client::{ChatClient, ClientConfig};
pub use error::{ChatError, Result};
