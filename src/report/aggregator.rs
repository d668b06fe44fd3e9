//! 报告汇总
//!
//! 把一组单题结果（可能为空）归约为统计信息与排名。相同的输入顺序总是得到
//! 字节级相同的输出，便于比对和回归测试。

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::{AnalysisResult, BatchRun, ConfidenceLevel, RunStatus};

/// 某条法条被引用的次数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCount {
    pub article_id: String,
    pub count: usize,
}

/// 信心度分布中的一档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCount {
    pub level: ConfidenceLevel,
    pub label: String,
    pub count: usize,
}

/// 汇总报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub total_questions: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    /// 只在成功的结果上计算
    pub average_confidence: f64,
    /// 固定五档，按从低到高排列，计数之和等于 `successful`
    pub confidence_distribution: Vec<BucketCount>,
    /// 按引用次数降序，次数相同时按法条编号升序
    pub most_referenced_articles: Vec<ArticleCount>,
    pub provider_usage: BTreeMap<String, usize>,
    /// 费用上限或取消导致提前终止
    pub halted: bool,
    /// 输入题目总数，提前终止时大于 `total_questions`
    pub input_questions: usize,
    /// 来自批量运行时的最终状态
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_status: Option<RunStatus>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn to_json_pretty(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn bucket(&self, level: ConfidenceLevel) -> usize {
        self.confidence_distribution
            .iter()
            .find(|b| b.level == level)
            .map(|b| b.count)
            .unwrap_or(0)
    }
}

/// 汇总一组结果，`None` 表示该题无法分析
pub fn aggregate<'a, I>(results: I) -> Report
where
    I: IntoIterator<Item = Option<&'a AnalysisResult>>,
{
    let mut total_questions = 0usize;
    let mut successful = 0usize;
    let mut confidence_sum = 0.0f64;
    let mut buckets: BTreeMap<ConfidenceLevel, usize> =
        ConfidenceLevel::ALL.iter().map(|l| (*l, 0)).collect();
    let mut article_counts: HashMap<&str, usize> = HashMap::new();
    let mut provider_usage: BTreeMap<String, usize> = BTreeMap::new();

    for result in results {
        total_questions += 1;
        let Some(result) = result else {
            continue;
        };

        successful += 1;
        confidence_sum += result.confidence();
        *buckets.entry(result.confidence_level()).or_insert(0) += 1;
        *provider_usage
            .entry(result.provider_used().to_string())
            .or_insert(0) += 1;
        for article_id in result.matched_articles() {
            *article_counts.entry(article_id.as_str()).or_insert(0) += 1;
        }
    }

    let mut most_referenced_articles: Vec<ArticleCount> = article_counts
        .into_iter()
        .map(|(article_id, count)| ArticleCount {
            article_id: article_id.to_string(),
            count,
        })
        .collect();
    most_referenced_articles.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.article_id.cmp(&b.article_id))
    });

    let ratio = |num: f64, den: usize| if den == 0 { 0.0 } else { num / den as f64 };

    Report {
        total_questions,
        successful,
        failed: total_questions - successful,
        success_rate: ratio(successful as f64, total_questions),
        average_confidence: ratio(confidence_sum, successful),
        confidence_distribution: buckets
            .into_iter()
            .map(|(level, count)| BucketCount {
                level,
                label: level.label().to_string(),
                count,
            })
            .collect(),
        most_referenced_articles,
        provider_usage,
        halted: false,
        input_questions: total_questions,
        run_status: None,
        generated_at: Utc::now(),
    }
}

/// 汇总一次批量运行，并带上是否提前终止
///
/// `total_questions` 只统计本次运行实际处理过的题目，`input_questions` 为输入总数
pub fn aggregate_run(run: &BatchRun) -> Report {
    let mut report = aggregate(run.ordered_results());
    report.halted = run.halted;
    report.input_questions = run.total_questions.max(report.total_questions);
    report.run_status = Some(run.status);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::ConfidenceThresholds;
    use crate::models::analysis::Provenance;
    use crate::models::MatchPayload;
    use pretty_assertions::assert_eq;

    fn result(id: &str, confidence: f64, articles: &[&str], provider: &str) -> AnalysisResult {
        AnalysisResult::new(
            id,
            MatchPayload {
                confidence,
                matched_articles: articles.iter().map(|a| a.to_string()).collect(),
                primary_article: articles.first().map(|a| a.to_string()),
                reasoning: String::new(),
            },
            Provenance {
                provider_used: provider.to_string(),
                retry_count: 0,
                processing_time: Duration::from_millis(10),
            },
            &ConfidenceThresholds::default(),
        )
    }

    #[test]
    fn test_empty_input_never_divides_by_zero() {
        let report = aggregate(std::iter::empty());
        assert_eq!(report.total_questions, 0);
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.average_confidence, 0.0);
        assert_eq!(report.confidence_distribution.len(), 5);
        assert!(report.most_referenced_articles.is_empty());
    }

    #[test]
    fn test_distribution_sums_to_successful() {
        let results = vec![
            Some(result("1", 0.1, &["A-1"], "sim")),
            None,
            Some(result("3", 0.3, &["A-2"], "sim")),
            Some(result("4", 0.9, &["A-1", "A-2"], "openai")),
            None,
            Some(result("6", 0.95, &[], "openai")),
        ];
        let report = aggregate(results.iter().map(|r| r.as_ref()));

        assert_eq!(report.total_questions, 6);
        assert_eq!(report.successful, 4);
        assert_eq!(report.failed, 2);
        assert!((report.success_rate - 4.0 / 6.0).abs() < 1e-12);
        assert!((report.average_confidence - 2.25 / 4.0).abs() < 1e-12);

        let sum: usize = report.confidence_distribution.iter().map(|b| b.count).sum();
        assert_eq!(sum, report.successful);
        assert_eq!(report.bucket(ConfidenceLevel::VeryLow), 1);
        assert_eq!(report.bucket(ConfidenceLevel::Low), 1);
        assert_eq!(report.bucket(ConfidenceLevel::Medium), 0);
        assert_eq!(report.bucket(ConfidenceLevel::VeryHigh), 2);

        let levels: Vec<ConfidenceLevel> = report
            .confidence_distribution
            .iter()
            .map(|b| b.level)
            .collect();
        assert_eq!(levels, ConfidenceLevel::ALL.to_vec());

        assert_eq!(report.provider_usage.get("openai"), Some(&2));
        assert_eq!(report.provider_usage.get("sim"), Some(&2));
    }

    #[test]
    fn test_ties_ranked_by_article_id() {
        let results = vec![
            result("1", 0.5, &["B-2", "A-10"], "sim"),
            result("2", 0.5, &["C-1", "A-9"], "sim"),
            result("3", 0.5, &["C-1"], "sim"),
        ];
        let report = aggregate(results.iter().map(Some));
        assert_eq!(
            report.most_referenced_articles,
            vec![
                ArticleCount { article_id: "C-1".into(), count: 2 },
                ArticleCount { article_id: "A-10".into(), count: 1 },
                ArticleCount { article_id: "A-9".into(), count: 1 },
                ArticleCount { article_id: "B-2".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_json_output_contains_halted_flag() {
        let report = aggregate(std::iter::once(None));
        let json = report.to_json_pretty().unwrap();
        assert!(json.contains("\"halted\": false"));
        assert!(json.contains("\"very_low\""));
    }

    #[test]
    fn test_cancelled_run_is_reported_as_interrupted() {
        let questions: Vec<crate::models::ExamQuestion> = (1..=10)
            .map(|i| {
                crate::models::ExamQuestion::new(
                    format!("Q{}", i),
                    "内容",
                    crate::models::QuestionType::Essay,
                    vec![],
                )
            })
            .collect();
        let mut run = BatchRun::new(&questions, 2, 4, 100.0);
        run.record_slice(
            (1..=6)
                .map(|i| crate::models::QuestionOutcome {
                    question_id: format!("Q{}", i),
                    result: Some(result(&format!("Q{}", i), 0.8, &["A-1"], "sim")),
                })
                .collect(),
            0.0,
        );
        run.finish(RunStatus::Cancelled);

        let report = aggregate_run(&run);
        assert!(report.halted);
        assert_eq!(report.run_status, Some(RunStatus::Cancelled));
        assert_eq!(report.total_questions, 6);
        assert_eq!(report.input_questions, 10);
        assert!(report.to_json_pretty().unwrap().contains("\"run_status\": \"cancelled\""));
    }
}
