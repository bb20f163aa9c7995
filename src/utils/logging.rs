//! 日志工具模块
//!
//! 提供日志初始化和格式化输出的辅助函数

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::orchestrator::{BatchSummary, SessionToken};

/// 初始化日志
///
/// `RUST_LOG` 优先；未设置时默认 `info`，详细模式下为 `debug`。
/// 重复调用不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `backend_url`: 提取接口地址
/// - `max_concurrent`: 最大并发数
pub fn log_startup(backend_url: &str, max_concurrent: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 证件批量提取模式");
    info!("🌐 提取接口: {}", backend_url);
    info!("📊 最大并发数: {}", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录批次提交信息
///
/// # 参数
/// - `token`: 会话令牌
/// - `dispatched`: 本次派发的条目数
/// - `max_concurrent`: 最大并发数
pub fn log_batch_submitted(token: SessionToken, dispatched: usize, max_concurrent: usize) {
    info!("\n{}", "─".repeat(60));
    info!("📦 [{}] 提交 {} 个文件", token, dispatched);
    if dispatched > max_concurrent {
        info!("📋 同时最多 {} 个请求，其余排队等待", max_concurrent);
    }
    info!("{}", "─".repeat(60));
}

/// 记录批次全部结束
pub fn log_batch_finished(token: SessionToken, summary: &BatchSummary) {
    info!(
        "✓ [{}] 本轮完成: 成功 {}/{}，失败 {}",
        token, summary.completed, summary.total, summary.failed
    );
}

/// 打印最终统计信息
///
/// # 参数
/// - `summary`: 批次统计
/// - `elapsed`: 总耗时
pub fn print_final_stats(summary: &BatchSummary, elapsed: Duration) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("耗时: {:.1} 秒", elapsed.as_secs_f64());
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.completed, summary.total);
    info!("❌ 失败: {}", summary.failed);
    if summary.pending > 0 {
        info!("⏸️ 未提交: {}", summary.pending);
    }
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
