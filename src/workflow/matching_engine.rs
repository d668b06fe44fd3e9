//! 匹配引擎 - 流程层
//!
//! 核心职责：定义"一道题"的完整匹配流程
//!
//! 流程顺序：
//! 1. 校验题干（为空直接失败，不调用后端）
//! 2. 构建确定性提示词（题干 + 选项 + 候选法条）
//! 3. 通过重试 / 降级控制器调用后端
//! 4. 解析并校验响应，推导信心度等级

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfidenceThresholds};
use crate::error::MatchError;
use crate::models::{AnalysisResult, ExamQuestion, MatchPayload};
use crate::models::analysis::Provenance;
use crate::services::{Candidate, RetryController};
use crate::utils::logging::truncate_text;
use crate::workflow::question_ctx::QuestionCtx;

/// 单题匹配的完整产出
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub result: Option<AnalysisResult>,
    /// 本题实际产生的费用（后端成功响应即计费，与解析是否成功无关）
    pub cost: f64,
    pub latency: Duration,
}

/// 发送给后端的候选法条格式
#[derive(Serialize)]
struct CandidateForPrompt<'a> {
    article_id: &'a str,
    law_name: &'a str,
    article: String,
    similarity: f32,
    excerpt: String,
    /// 按选项召回时命中的选项字母
    #[serde(skip_serializing_if = "Vec::is_empty")]
    options: Vec<String>,
}

/// 匹配引擎
///
/// - 不持有后端，后端由调用方通过控制器传入
/// - 配置在构造时复制，之后只读
pub struct MatchingEngine {
    thresholds: ConfidenceThresholds,
    excerpt_chars: usize,
    verbose_logging: bool,
}

impl MatchingEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            thresholds: config.thresholds,
            excerpt_chars: config.retrieval.excerpt_chars,
            verbose_logging: config.verbose_logging,
        }
    }

    /// 分析单道题目，失败时记录日志并返回 `None`
    pub async fn analyze_question(
        &self,
        question: &ExamQuestion,
        candidates: &[Candidate],
        controller: &RetryController,
        ctx: &QuestionCtx,
    ) -> Option<AnalysisResult> {
        self.evaluate(question, candidates, controller, ctx)
            .await
            .result
    }

    /// 分析单道题目，保留失败原因
    pub async fn try_analyze_question(
        &self,
        question: &ExamQuestion,
        candidates: &[Candidate],
        controller: &RetryController,
    ) -> Result<AnalysisResult, MatchError> {
        self.run(question, candidates, controller).await.0
    }

    /// 分析单道题目，同时返回费用与耗时（供编排器统计）
    pub async fn evaluate(
        &self,
        question: &ExamQuestion,
        candidates: &[Candidate],
        controller: &RetryController,
        ctx: &QuestionCtx,
    ) -> Evaluation {
        let started = Instant::now();
        let (result, cost) = self.run(question, candidates, controller).await;
        let latency = started.elapsed();

        let result = match result {
            Ok(result) => {
                info!(
                    "{} ✓ 信心度 {:.2} ({})，主要法条: {}，后端: {}",
                    ctx,
                    result.confidence(),
                    result.confidence_level(),
                    result.primary_article().unwrap_or("无"),
                    result.provider_used()
                );
                Some(result)
            }
            Err(e) => {
                match &e {
                    MatchError::ChainExhausted { .. } => error!("{} ❌ [{}] {}", ctx, e.kind(), e),
                    _ => warn!("{} ⚠️ [{}] {}", ctx, e.kind(), e),
                }
                None
            }
        };

        Evaluation {
            result,
            cost,
            latency,
        }
    }

    async fn run(
        &self,
        question: &ExamQuestion,
        candidates: &[Candidate],
        controller: &RetryController,
    ) -> (Result<AnalysisResult, MatchError>, f64) {
        let started = Instant::now();

        if question.is_blank() {
            return (
                Err(MatchError::Validation {
                    question_id: question.question_id.clone(),
                    reason: "题干为空".to_string(),
                }),
                0.0,
            );
        }

        let prompt = self.build_prompt(question, candidates);
        if self.verbose_logging {
            debug!(
                "题目 {} 提示词预览: {}",
                question.question_id,
                truncate_text(&prompt, 120)
            );
        }

        let outcome = match controller.call(&prompt).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                return (
                    Err(MatchError::ChainExhausted {
                        question_id: question.question_id.clone(),
                        failures: failure.failures,
                    }),
                    0.0,
                )
            }
        };

        let payload = match self.parse_response(&question.question_id, &outcome.response, candidates) {
            Ok(payload) => payload,
            Err(e) => return (Err(e), outcome.cost),
        };

        let provenance = Provenance {
            provider_used: outcome.provider,
            retry_count: outcome.retry_count,
            processing_time: started.elapsed(),
        };
        (
            Ok(AnalysisResult::new(
                question.question_id.clone(),
                payload,
                provenance,
                &self.thresholds,
            )),
            outcome.cost,
        )
    }

    /// 构建提示词，相同输入总是得到相同文本
    pub fn build_prompt(&self, question: &ExamQuestion, candidates: &[Candidate]) -> String {
        let mut prompt = String::new();
        prompt.push_str("请判断以下考题涉及哪些法条。\n\n");
        prompt.push_str(&format!("【题目编号】{}\n", question.question_id));
        prompt.push_str(&format!("【题型】{}\n", question.question_type));
        prompt.push_str(&format!("【题干】\n{}\n", question.content.trim()));

        if !question.options.is_empty() {
            prompt.push_str("【选项】\n");
            for (letter, option) in question.lettered_options() {
                prompt.push_str(&format!("({}) {}\n", letter, option.trim()));
            }
        }

        let items: Vec<CandidateForPrompt> = candidates
            .iter()
            .map(|c| CandidateForPrompt {
                article_id: &c.article_id,
                law_name: &c.article.law_name,
                article: c.article.article_label(),
                similarity: c.similarity,
                excerpt: truncate_text(c.article.content.trim(), self.excerpt_chars),
                options: c.options.iter().map(char::to_string).collect(),
            })
            .collect();
        // 序列化纯数据结构不会失败，失败时退化为空数组
        let candidates_json =
            serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string());
        prompt.push_str(&format!("\n【候选法条】\n{}\n", candidates_json));

        prompt.push_str(
            r#"
要求：
1. matched_articles 只能使用候选法条中的 article_id，按相关程度从高到低排列，可以为空
2. primary_article 必须是 matched_articles 中的一项，没有时为 null
3. confidence 为 0 到 1 之间的数字
4. 候选法条的 options 表示该法条是按哪些选项召回的，可据此逐项判断选项

只返回如下 JSON，不要输出其他内容：
{"confidence": 0.0, "matched_articles": [], "primary_article": null, "reasoning": ""}"#,
        );
        prompt
    }

    /// 解析后端响应
    ///
    /// 允许 ```json 代码块和前后的说明文字，取最外层的 `{...}`
    pub fn parse_response(
        &self,
        question_id: &str,
        raw: &str,
        candidates: &[Candidate],
    ) -> Result<MatchPayload, MatchError> {
        let parse_error = |reason: String| MatchError::ResponseParse {
            question_id: question_id.to_string(),
            reason,
        };

        let json = extract_json_object(raw)
            .ok_or_else(|| parse_error(format!("响应中没有 JSON 对象: {}", truncate_text(raw, 80))))?;
        let payload: MatchPayload =
            serde_json::from_str(json).map_err(|e| parse_error(format!("JSON 格式错误: {}", e)))?;

        let known: HashSet<&str> = candidates.iter().map(|c| c.article_id.as_str()).collect();
        payload.validate(&known).map_err(parse_error)
    }
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
