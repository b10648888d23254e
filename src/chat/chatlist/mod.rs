//! 会话列表模块
//!
//! 实现会话与文件夹的分页回填和增量同步

pub mod api;
pub mod dao;
pub mod listener;
pub mod models;
pub mod service;

// 重新导出主要类型和函数
pub use api::{ChatListApi, HttpChatListApi};
pub use dao::{ChatDao, CursorDao, FolderDao};
pub use listener::{ChatListener, EmptyChatListener};
pub use models::{LocalChat, LocalFolder, SyncCursor, SyncOutcome, SyncScope};
pub use service::ChatSyncer;
