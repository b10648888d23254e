//! 消息模块
//!
//! 实现按会话惰性回填与差量拉取的消息同步

pub mod api;
pub mod dao;
pub mod models;
pub mod service;

// 重新导出主要类型和函数
pub use api::{HttpMessageApi, MessageApi};
pub use dao::MessageDao;
pub use models::{LoadResult, LocalMessage, MessageProgressFn};
pub use service::MessageSyncer;
