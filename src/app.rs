//! 应用生命周期：加载数据 → 构建组件 → 批量匹配 → 输出结果与报告

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clients::build_chain;
use crate::config::Config;
use crate::models::{load_articles, load_questions, load_vectors, ExamQuestion};
use crate::orchestrator::BatchOrchestrator;
use crate::report::{aggregate, aggregate_run, Report};
use crate::services::{ArticleIndex, CandidateRetriever, RetryController};
use crate::utils::logging::{init_log_file, log_data_loaded, log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    questions: Vec<ExamQuestion>,
    orchestrator: BatchOrchestrator,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)
            .with_context(|| format!("无法创建日志文件: {}", config.output_log_file))?;

        let chain = build_chain(&config.providers).context("构建后端降级链失败")?;
        let controller = RetryController::new(chain, config.retry.clone());
        log_startup(
            &controller.provider_names(),
            config.batch.initial_concurrency,
            config.batch.cost_ceiling,
        );

        // 加载数据
        let articles = load_articles(&config.articles_path)
            .await
            .context("加载法条失败")?;
        let questions = load_questions(&config.questions_path)
            .await
            .context("加载考题失败")?;
        let article_vectors = load_optional_vectors(config.article_vectors_path.as_deref()).await?;
        let question_vectors = load_optional_vectors(config.question_vectors_path.as_deref()).await?;

        let index = Arc::new(ArticleIndex::new(articles, article_vectors));
        log_data_loaded(index.len(), index.vectorized_count(), questions.len());

        let retriever = CandidateRetriever::new(index, config.retrieval.clone());
        let orchestrator = BatchOrchestrator::new(&config, controller, retriever)
            .with_question_vectors(question_vectors);

        Ok(Self {
            config,
            questions,
            orchestrator,
        })
    }

    /// 运行级取消信号（如 Ctrl-C）
    pub fn cancellation_token(&self) -> CancellationToken {
        self.orchestrator.cancellation_token()
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<Report> {
        if self.questions.is_empty() {
            warn!("⚠️ 没有找到待处理的考题，程序结束");
            return Ok(aggregate(std::iter::empty()));
        }

        let run = self.orchestrator.run_or_resume(&self.questions).await?;
        let report = aggregate_run(&run);

        // 输出结果
        let output_dir = Path::new(&self.config.output_dir);
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("无法创建输出目录: {}", output_dir.display()))?;

        let results_path = output_dir.join("results.json");
        tokio::fs::write(&results_path, serde_json::to_string_pretty(&run.results)?)
            .await
            .with_context(|| format!("写入结果失败: {}", results_path.display()))?;

        let report_path = output_dir.join("report.json");
        tokio::fs::write(&report_path, report.to_json_pretty()?)
            .await
            .with_context(|| format!("写入报告失败: {}", report_path.display()))?;

        info!("💾 结果已写入: {}", results_path.display());
        info!("💾 报告已写入: {}", report_path.display());

        print_final_stats(&report, &self.config.output_log_file);
        Ok(report)
    }
}

async fn load_optional_vectors(path: Option<&str>) -> Result<HashMap<String, Vec<f32>>> {
    match path {
        Some(path) => Ok(load_vectors(path)
            .await
            .with_context(|| format!("加载向量失败: {}", path))?),
        None => Ok(HashMap::new()),
    }
}
