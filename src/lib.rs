pub mod chat;

// 重新导出常用类型和函数，方便外部使用
pub use chat::{
    chatlist::{ChatListener, ChatSyncer, LocalChat, LocalFolder, SyncOutcome, SyncScope},
    client::{ChatClient, ClientConfig},
    error::{ChatError, Result},
    message::{LoadResult, LocalMessage, MessageSyncer},
    metadata::{ChatMetadata, ChatTag},
    query::{ChatView, QueryEngine, SearchFilter},
    realtime::{PushEvent, RealtimeListener},
};
