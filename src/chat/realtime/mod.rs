//! 推送合并模块
//!
//! 把推送事件（新消息、输入中、已读回执）合并进本地库与内存输入状态

pub mod events;
pub mod listener;
pub mod service;

// 重新导出主要类型和函数
pub use events::{parse_event, MessagePushPayload, PushEvent};
pub use listener::{EmptyRealtimeListener, RealtimeListener};
pub use service::RealtimeMerger;
