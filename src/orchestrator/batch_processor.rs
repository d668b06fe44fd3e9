//! 批量题目处理器 - 编排层
//!
//! ## 职责
//!
//! 驱动匹配引擎处理整批题目，是唯一修改 [`BatchRun`] 的地方。
//!
//! ## 核心功能
//!
//! 1. **切片处理**：按当前切片长度取出下一段题目，切片内并发执行
//! 2. **并发控制**：使用 Semaphore 限制同时在途的后端调用
//! 3. **自适应调节**：每个切片结束后根据成功率与耗时调整并发数和切片长度
//! 4. **费用上限**：接近上限时切换到最便宜的后端，达到上限时平稳终止
//! 5. **检查点**：每个切片结束后保存进度，中断后可从断点继续
//!
//! ## 设计特点
//!
//! - **单一写入点**：工作任务只返回结果，由协调循环按输入顺序写入 `BatchRun`
//! - **失败隔离**：单题失败记为空结果，只有取消或费用上限会停止运行
//! - **取消安全**：取消后不再派发新题目，已在途的调用照常完成

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{BatchConfig, Config};
use crate::error::{AppError, AppResult, BatchError};
use crate::models::{fingerprint, BatchRun, ExamQuestion, QuestionOutcome, RunStatus};
use crate::orchestrator::adaptive::{AdaptiveSizer, Adjustment, SliceStats};
use crate::orchestrator::checkpoint::CheckpointStore;
use crate::services::{CandidateRetriever, RetryController};
use crate::utils::logging::{log_slice_complete, log_slice_start};
use crate::workflow::{MatchingEngine, QuestionCtx};

/// 达到费用上限的该比例后切换到最便宜的后端
const DOWNGRADE_RATIO: f64 = 0.9;

/// 批量编排器
pub struct BatchOrchestrator {
    engine: Arc<MatchingEngine>,
    retriever: CandidateRetriever,
    controller: RetryController,
    batch: BatchConfig,
    checkpoint: Option<CheckpointStore>,
    question_vectors: Arc<HashMap<String, Vec<f32>>>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(config: &Config, controller: RetryController, retriever: CandidateRetriever) -> Self {
        let cancel = CancellationToken::new();
        Self {
            engine: Arc::new(MatchingEngine::new(config)),
            retriever,
            controller: controller.with_cancellation(cancel.clone()),
            batch: config.batch.clone(),
            checkpoint: config
                .batch
                .checkpoint_path
                .as_ref()
                .map(|path| CheckpointStore::new(path.as_str())),
            question_vectors: Arc::new(HashMap::new()),
            cancel,
        }
    }

    /// 题目的预计算向量，缺失时检索退化为字面匹配
    pub fn with_question_vectors(mut self, vectors: HashMap<String, Vec<f32>>) -> Self {
        self.question_vectors = Arc::new(vectors);
        self
    }

    /// 运行级取消信号
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn checkpoint_store(&self) -> Option<&CheckpointStore> {
        self.checkpoint.as_ref()
    }

    /// 从头开始处理一批题目
    pub async fn run(
        &self,
        questions: &[ExamQuestion],
        initial_concurrency: usize,
        cost_ceiling: f64,
    ) -> AppResult<BatchRun> {
        let run = BatchRun::new(
            questions,
            initial_concurrency,
            self.batch.initial_batch_size,
            cost_ceiling,
        );
        self.drive(questions, run).await
    }

    /// 从检查点继续处理，已完成的题目不会重新处理
    pub async fn resume(&self, questions: &[ExamQuestion], mut checkpoint: BatchRun) -> AppResult<BatchRun> {
        let expected = fingerprint(questions);
        if checkpoint.question_fingerprint != expected || checkpoint.cursor > questions.len() {
            return Err(AppError::Batch(BatchError::Checkpoint {
                path: self
                    .checkpoint
                    .as_ref()
                    .map(|s| s.path().display().to_string())
                    .unwrap_or_default(),
                reason: format!(
                    "检查点属于另一批题目 ({} != {})",
                    checkpoint.question_fingerprint, expected
                ),
            }));
        }

        info!(
            "♻️ 从检查点继续: 已处理 {}/{} 题，已花费 {:.4}",
            checkpoint.cursor,
            questions.len(),
            checkpoint.cost_spent
        );
        checkpoint.status = RunStatus::Running;
        checkpoint.halted = false;
        self.drive(questions, checkpoint).await
    }

    /// 有可用检查点时继续，否则按配置从头开始
    pub async fn run_or_resume(&self, questions: &[ExamQuestion]) -> AppResult<BatchRun> {
        if let Some(store) = &self.checkpoint {
            if let Some(mut checkpoint) = store.load().await? {
                if checkpoint.question_fingerprint == fingerprint(questions) {
                    checkpoint.cost_ceiling = self.batch.cost_ceiling;
                    return self.resume(questions, checkpoint).await;
                }
                warn!(
                    "⚠️ 检查点 {} 与当前题目不符，忽略并重新开始",
                    store.path().display()
                );
            }
        }
        self.run(
            questions,
            self.batch.initial_concurrency,
            self.batch.cost_ceiling,
        )
        .await
    }

    async fn drive(&self, questions: &[ExamQuestion], mut run: BatchRun) -> AppResult<BatchRun> {
        let total = questions.len();
        let mut sizer = AdaptiveSizer::new(run.concurrency, run.batch_size, &self.batch);
        let mut downgraded: Option<RetryController> = None;
        let mut slice_no = 0usize;

        loop {
            // ========== 终止条件 ==========
            if run.cursor >= total {
                run.finish(RunStatus::Completed);
                break;
            }
            if self.cancel.is_cancelled() {
                info!(
                    "🛑 {}",
                    BatchError::Cancelled {
                        processed: run.cursor
                    }
                );
                run.finish(RunStatus::Cancelled);
                break;
            }
            if run.cost_spent >= run.cost_ceiling {
                warn!(
                    "💰 {}，停止派发新题目",
                    BatchError::CostCeiling {
                        spent: run.cost_spent,
                        ceiling: run.cost_ceiling
                    }
                );
                run.finish(RunStatus::Halted);
                break;
            }

            // ========== 费用降级 ==========
            let controller: &RetryController = if run.cost_spent >= run.cost_ceiling * DOWNGRADE_RATIO {
                downgraded.get_or_insert_with(|| {
                    let cheaper = self.controller.cheapest_first();
                    warn!(
                        "💸 已花费 {:.4} / {:.4}，切换到低价后端链: {:?}",
                        run.cost_spent,
                        run.cost_ceiling,
                        cheaper.provider_names()
                    );
                    cheaper
                })
            } else {
                &self.controller
            };

            // ========== 切片长度 ==========
            let mut len = sizer.batch_size().min(total - run.cursor);
            let lead_cost = controller.lead_cost();
            if lead_cost > 0.0 {
                let remaining = run.cost_ceiling - run.cost_spent;
                let affordable = (remaining / lead_cost - 1e-9).ceil().max(1.0) as usize;
                len = len.min(affordable);
            }

            slice_no += 1;
            let start = run.cursor;
            log_slice_start(slice_no, start + 1, start + len, total, sizer.concurrency());

            let (outcomes, stats, cost) = self
                .process_slice(&questions[start..start + len], start, total, sizer.concurrency(), controller)
                .await?;

            run.record_slice(outcomes, cost);

            let adjustment = sizer.adjust(&stats);
            if adjustment != Adjustment::Hold {
                info!(
                    "📐 自适应调整 ({:?}): 并发 {} → {}，切片 {} → {}",
                    adjustment,
                    run.concurrency,
                    sizer.concurrency(),
                    run.batch_size,
                    sizer.batch_size()
                );
            }
            run.concurrency = sizer.concurrency();
            run.batch_size = sizer.batch_size();

            log_slice_complete(
                slice_no,
                stats.succeeded,
                stats.processed,
                run.cost_spent,
                run.cost_ceiling,
            );
            self.save_checkpoint(&run).await;
        }

        match run.status {
            RunStatus::Completed => {
                if let Some(store) = &self.checkpoint {
                    if let Err(e) = store.clear().await {
                        warn!("⚠️ 清除检查点失败: {}", e);
                    }
                }
            }
            _ => self.save_checkpoint(&run).await,
        }

        Ok(run)
    }

    /// 并发处理一个切片，返回按输入顺序排列的结果
    ///
    /// 收到取消信号后停止派发，返回的结果只覆盖已派发的前缀
    async fn process_slice(
        &self,
        slice: &[ExamQuestion],
        offset: usize,
        total: usize,
        concurrency: usize,
        controller: &RetryController,
    ) -> AppResult<(Vec<QuestionOutcome>, SliceStats, f64)> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(slice.len());

        for (idx, question) in slice.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Other(format!("并发控制失败: {}", e)))?;
            // 等待并发名额期间可能已收到取消信号
            if self.cancel.is_cancelled() {
                break;
            }

            let ctx = QuestionCtx::new(question.question_id.clone(), offset + idx + 1, total);
            let query_vector = self
                .question_vectors
                .get(&question.question_id)
                .map(|v| v.as_slice());
            let candidates = self.retriever.retrieve(question, query_vector);

            let question_id = question.question_id.clone();
            let engine = Arc::clone(&self.engine);
            let controller = controller.clone();
            let question = question.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                engine
                    .evaluate(&question, &candidates, &controller, &ctx)
                    .await
            });
            handles.push((offset + idx + 1, question_id, handle));
        }

        // join_all 按派发顺序返回，保证与输入顺序一致
        let joined = join_all(handles.iter_mut().map(|(_, _, handle)| handle)).await;
        let mut outcomes = Vec::with_capacity(handles.len());
        let mut stats = SliceStats::default();
        let mut cost = 0.0;

        for ((index, question_id, _), joined) in handles.into_iter().zip(joined) {
            let result = match joined {
                Ok(evaluation) => {
                    cost += evaluation.cost;
                    stats.record(evaluation.result.is_some(), evaluation.latency);
                    evaluation.result
                }
                Err(e) => {
                    error!("[题目 #{}/{} ID#{}] 任务执行失败: {}", index, total, question_id, e);
                    stats.record(false, Default::default());
                    None
                }
            };
            outcomes.push(QuestionOutcome {
                question_id,
                result,
            });
        }

        Ok((outcomes, stats, cost))
    }

    async fn save_checkpoint(&self, run: &BatchRun) {
        if let Some(store) = &self.checkpoint {
            if let Err(e) = store.save(run).await {
                warn!("⚠️ 检查点保存失败，继续运行: {}", e);
            }
        }
    }
}
