//! 会话元数据模块
//!
//! 本地独有的元数据（屏蔽/归档/标签/回填状态），不属于远端权威记录，
//! 读取时合并进结果，永远不被上游同步覆盖。

pub mod dao;
pub mod models;
pub mod service;

// 重新导出主要类型和函数
pub use dao::MetadataDao;
pub use models::{ChatMetadata, ChatTag};
pub use service::TagService;
