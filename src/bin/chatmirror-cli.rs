//! ChatMirror CLI 客户端（测试版）
//!
//! 非交互式 CLI，用于对真实服务端做端到端验证：
//! 启动后做一轮全量同步，连接推送通道，持续打印收到的事件。

use anyhow::Result;
use chatmirror_sdk_core::chat::chatlist::listener::ChatListener;
use chatmirror_sdk_core::chat::client::{ChatClient, ClientConfig};
use chatmirror_sdk_core::chat::query::service::SearchFilter;
use chatmirror_sdk_core::chat::realtime::listener::RealtimeListener;
use clap::Parser;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

/// ChatMirror CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "chatmirror-cli")]
#[command(about = "ChatMirror CLI 客户端 - 用于测试本地同步核心", long_about = None)]
struct Args {
    /// HTTP API 地址
    #[arg(long, default_value = "http://localhost:10002")]
    api_url: String,

    /// WebSocket 推送地址
    #[arg(long, default_value = "ws://localhost:10001")]
    ws_url: String,

    /// SQLite 数据库文件路径
    #[arg(long, default_value = "chatmirror.db")]
    db_path: String,

    /// 认证令牌
    #[arg(short, long, default_value = "")]
    token: String,

    /// 运行时长（秒），0 表示持续运行
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// 日志级别（默认: info,chatmirror_sdk_core=debug）
    #[arg(long, default_value = "info,chatmirror_sdk_core=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("无法创建日志文件 debug.log");

    // 控制台保留颜色，文件禁用颜色
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
}

/// 设置监听器（输出所有接收到的信息）
fn setup_listeners(client: &ChatClient) {
    struct CliChatListener;
    #[async_trait::async_trait]
    impl ChatListener for CliChatListener {
        async fn on_sync_start(&self, scope: String) {
            info!("[CLI/Chat] 🔄 同步开始: {}", scope);
        }

        async fn on_sync_progress(&self, scope: String, page: u32, synced_so_far: usize) {
            info!(
                "[CLI/Chat] 📊 同步进度: {} 第 {} 页，累计 {} 条",
                scope, page, synced_so_far
            );
        }

        async fn on_sync_finish(&self, scope: String, total_synced: usize) {
            info!("[CLI/Chat] ✅ 同步完成: {}，共 {} 条", scope, total_synced);
        }

        async fn on_sync_failed(&self, scope: String, error: String) {
            error!("[CLI/Chat] ❌ 同步失败: {}，原因: {}", scope, error);
        }

        async fn on_chats_changed(&self, chats_json: String) {
            info!("[CLI/Chat] 🔄 会话变更: {}", chats_json);
        }

        async fn on_folders_changed(&self, folders_json: String) {
            info!("[CLI/Chat] 📁 文件夹变更: {}", folders_json);
        }

        async fn on_total_unread_changed(&self, total_unread: i32) {
            info!("[CLI/Chat] 📬 总未读数: {}", total_unread);
        }
    }
    client.set_chat_listener(Arc::new(CliChatListener));

    struct CliRealtimeListener;
    #[async_trait::async_trait]
    impl RealtimeListener for CliRealtimeListener {
        async fn on_typing_changed(&self, group_id: i64, anyone_typing: bool) {
            info!(
                "[CLI/RT] ⌨️ 输入状态: 会话 {}，有人在输入: {}",
                group_id, anyone_typing
            );
        }

        async fn on_seen(&self, group_id: i64) {
            info!("[CLI/RT] 📖 已读回执: 会话 {}", group_id);
        }

        async fn on_message(&self, group_id: i64, chat_json: String) {
            info!("[CLI/RT] 📨 新消息: 会话 {}，{}", group_id, chat_json);
        }
    }
    client.set_realtime_listener(Arc::new(CliRealtimeListener));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(&args.log_level);

    info!("[CLI] 🚀 ChatMirror CLI 客户端（测试模式）");
    info!("[CLI] 🌐 API: {}", args.api_url);
    info!("[CLI] 📡 推送: {}", args.ws_url);
    info!("[CLI] ⏱️  运行时长: {} 秒（0=持续运行）", args.duration);

    let config = ClientConfig {
        api_base_url: args.api_url,
        ws_url: args.ws_url,
        db_url: format!("sqlite://{}?mode=rwc", args.db_path),
        auth_token: args.token,
    };
    let client = ChatClient::new(config)
        .await
        .map_err(|e| anyhow::anyhow!("客户端装配失败: {}", e))?;

    setup_listeners(&client);

    // 全量同步
    info!("[CLI] 🔄 开始全量同步...");
    match client.sync_all().await {
        Ok(outcome) => info!(
            "[CLI] ✅ 全量同步完成，共 {} 条，最大时间戳: {}",
            outcome.total_synced, outcome.most_recent_ts
        ),
        Err(e) => error!("[CLI] ❌ 全量同步失败（继续用本地缓存）: {}", e),
    }

    // 显示初始信息
    let chats = client.search(&SearchFilter::default()).await;
    info!("[CLI] 📋 会话列表（共 {} 个）:", chats.len());
    for view in chats.iter().take(5) {
        let preview: String = view.chat.last_message.chars().take(30).collect();
        info!(
            "[CLI]   - {} | 未读: {} | 最新: {}",
            view.chat.name, view.chat.unread_count, preview
        );
    }
    info!("[CLI] 📬 总未读数: {}", client.total_unread().await);

    // 连接推送
    info!("[CLI] 🔗 正在连接推送服务器...");
    let push_task = client.connect_push();

    info!("[CLI] 📥 开始监听事件...");
    if args.duration > 0 {
        info!("[CLI] ⏰ {} 秒后自动退出", args.duration);
        sleep(Duration::from_secs(args.duration)).await;
        push_task.abort();
        info!("[CLI] 👋 程序退出");
    } else {
        info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
        loop {
            sleep(Duration::from_secs(3600)).await;
        }
    }

    Ok(())
}
