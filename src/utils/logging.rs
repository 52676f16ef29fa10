/// 日志工具模块
///
/// 提供日志初始化和批量抓取时的输出辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化全局日志
///
/// `RUST_LOG` 优先；未设置时默认 `info`，详细模式为 `debug`
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 测试里可能被重复调用
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 出勤数据抓取");
    info!("📊 浏览器会话上限: {}", config.jobs.max_concurrent_sessions);
    info!("📋 排队任务上限: {}", config.jobs.max_pending_jobs);
    info!("🗄️ 数据库: {}", config.database_url);
    info!("{}", "=".repeat(60));
}

/// 记录账号加载信息
pub fn log_accounts_loaded(total: usize, batch_size: usize) {
    info!("✓ 找到 {} 个待抓取的账号", total);
    info!("📋 将以每批 {} 个的方式处理", batch_size);
}

/// 记录批次开始信息
pub fn log_batch_start(batch_num: usize, total_batches: usize, start: usize, end: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批", batch_num, total_batches);
    info!("📄 本批账号: {}-{} / 共 {} 个", start, end, total);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_batch_complete(batch_num: usize, success: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 第 {} 批完成: 成功 {}/{}", batch_num, success, total);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(success: usize, failed: usize, total: usize, records: usize, csv_path: Option<&str>) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("📚 出勤记录: {} 条", records);
    info!("{}", "=".repeat(60));
    if let Some(path) = csv_path {
        info!("\n数据已保存至: {}", path);
    }
}
