use anyhow::Result;
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::RunStatus;
use crate::report::Report;

/// 初始化日志订阅器
///
/// 优先使用 `RUST_LOG`，否则默认 `info`（详细模式下为 `debug`）。
/// 重复调用不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n法条匹配日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `providers`: 降级链上的后端名称
/// - `max_concurrent`: 初始并发数
/// - `cost_ceiling`: 费用上限
pub fn log_startup(providers: &[String], max_concurrent: usize, cost_ceiling: f64) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 考题法条匹配模式");
    info!("🔗 降级链: {}", providers.join(" → "));
    info!("📊 初始并发数: {}", max_concurrent);
    info!("💰 费用上限: {:.4}", cost_ceiling);
    info!("{}", "=".repeat(60));
}

/// 记录数据加载信息
pub fn log_data_loaded(articles: usize, vectorized: usize, questions: usize) {
    info!("✓ 加载法条 {} 条（其中 {} 条带向量）", articles, vectorized);
    info!("✓ 加载考题 {} 道\n", questions);
}

/// 记录切片开始信息
///
/// # 参数
/// - `slice_no`: 切片编号
/// - `start`: 起始题目序号（从1开始）
/// - `end`: 结束题目序号
/// - `total`: 题目总数
/// - `concurrency`: 本切片并发数
pub fn log_slice_start(slice_no: usize, start: usize, end: usize, total: usize, concurrency: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {} 个切片 (并发 {})", slice_no, concurrency);
    info!("📄 本切片题目: {}-{} / 共 {} 道", start, end, total);
    info!("{}", "=".repeat(60));
}

/// 记录切片完成信息
pub fn log_slice_complete(slice_no: usize, success: usize, total: usize, cost_spent: f64, cost_ceiling: f64) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 第 {} 个切片完成: 成功 {}/{}", slice_no, success, total);
    info!("💰 累计费用: {:.4} / {:.4}", cost_spent, cost_ceiling);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `report`: 汇总报告
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(report: &Report, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", report.successful, report.total_questions);
    info!("❌ 失败: {}", report.failed);
    info!("📈 平均信心度: {:.3}", report.average_confidence);
    for bucket in &report.confidence_distribution {
        info!("   {:<4} {}", bucket.label, bucket.count);
    }
    if let Some(top) = report.most_referenced_articles.first() {
        info!("📌 引用最多的法条: {} ({} 次)", top.article_id, top.count);
    }
    if report.halted {
        let reason = match report.run_status {
            Some(RunStatus::Cancelled) => "收到取消信号",
            _ => "达到费用上限",
        };
        info!(
            "⚠️ 运行因{}提前终止，已处理 {}/{} 题",
            reason, report.total_questions, report.input_questions
        );
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_text("民法第一百八十四条", 4), "民法第一...");
        assert_eq!(truncate_text("短", 4), "短");
    }

    #[test]
    fn test_init_log_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        init_log_file(path.to_str().unwrap()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("法条匹配日志"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init(false);
        init(true);
    }
}
