//! 查询模块
//!
//! 纯本地的过滤/排序/搜索视图

pub mod service;

// 重新导出主要类型和函数
pub use service::{ChatView, QueryEngine, SearchFilter};
