//! 日志工具模块
//!
//! 提供日志初始化和格式化的辅助函数
use crate::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`；未设置时按 `verbose_logging` 选择 debug 或 info。
/// 重复调用是安全的。
pub fn init(config: &Config) {
    let default_level = if config.verbose_logging { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 问答队列模式");
    info!("🌐 后端地址: {}", config.backend_url);
    info!("📊 最大并发数: {}", config.max_concurrent);
    info!("📋 队列上限: {}", config.max_pending);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `answered`: 成功回答数量
/// - `failed`: 失败数量
/// - `total`: 总数
pub fn print_final_stats(answered: usize, failed: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 会话统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 已回答: {}/{}", answered, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// 记录标识的前 8 个字符，用于日志
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
