use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::analysis::AnalysisResult;
use crate::models::question::ExamQuestion;

/// 批量运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    /// 达到费用上限后平稳终止
    Halted,
    Cancelled,
}

/// 单题的处理结果，`result` 为空表示该题本轮无法分析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: String,
    pub result: Option<AnalysisResult>,
}

/// 一次批量运行的状态
///
/// 只由编排器的协调点在每个切片结束后修改；序列化后即为检查点格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    /// 下一道未处理题目的下标
    pub cursor: usize,
    pub cost_spent: f64,
    pub cost_ceiling: f64,
    pub concurrency: usize,
    pub batch_size: usize,
    /// 按输入顺序排列的已处理结果
    pub results: Vec<QuestionOutcome>,
    pub status: RunStatus,
    pub halted: bool,
    pub failed_count: usize,
    pub total_questions: usize,
    /// 有序题目编号的指纹，用于确认检查点属于同一批题目
    pub question_fingerprint: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchRun {
    pub fn new(
        questions: &[ExamQuestion],
        concurrency: usize,
        batch_size: usize,
        cost_ceiling: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            cursor: 0,
            cost_spent: 0.0,
            cost_ceiling,
            concurrency,
            batch_size,
            results: Vec::with_capacity(questions.len()),
            status: RunStatus::Running,
            halted: false,
            failed_count: 0,
            total_questions: questions.len(),
            question_fingerprint: fingerprint(questions),
            started_at: now,
            updated_at: now,
        }
    }

    /// 追加一个切片的结果（调用方保证按输入顺序）
    pub fn record_slice(&mut self, outcomes: Vec<QuestionOutcome>, cost: f64) {
        self.failed_count += outcomes.iter().filter(|o| o.result.is_none()).count();
        self.cursor += outcomes.len();
        self.results.extend(outcomes);
        self.cost_spent += cost;
        self.updated_at = Utc::now();
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|o| o.result.is_some()).count()
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// 结束运行，费用上限与取消都记为提前终止
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.halted = matches!(status, RunStatus::Halted | RunStatus::Cancelled);
        self.updated_at = Utc::now();
    }

    /// 按输入顺序返回结果（空结果保留位置）
    pub fn ordered_results(&self) -> Vec<Option<&AnalysisResult>> {
        self.results.iter().map(|o| o.result.as_ref()).collect()
    }
}

/// 计算题目序列的指纹
pub fn fingerprint(questions: &[ExamQuestion]) -> String {
    // FNV-1a，结果在不同进程间稳定
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for question in questions {
        for byte in question.question_id.bytes().chain(std::iter::once(0u8)) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    }
    format!("{}:{:016x}", questions.len(), hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionType;

    fn questions(ids: &[&str]) -> Vec<ExamQuestion> {
        ids.iter()
            .map(|id| ExamQuestion::new(*id, "内容", QuestionType::Essay, vec![]))
            .collect()
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = fingerprint(&questions(&["1", "2"]));
        let b = fingerprint(&questions(&["2", "1"]));
        assert_ne!(a, b);
        assert_eq!(a, fingerprint(&questions(&["1", "2"])));
    }

    #[test]
    fn test_record_slice_advances_cursor_and_counts_failures() {
        let qs = questions(&["1", "2", "3"]);
        let mut run = BatchRun::new(&qs, 2, 2, 1.0);
        run.record_slice(
            vec![
                QuestionOutcome {
                    question_id: "1".into(),
                    result: None,
                },
                QuestionOutcome {
                    question_id: "2".into(),
                    result: None,
                },
            ],
            0.25,
        );
        assert_eq!(run.cursor, 2);
        assert_eq!(run.failed_count, 2);
        assert_eq!(run.cost_spent, 0.25);
        assert!(!run.is_finished());

        run.finish(RunStatus::Halted);
        assert!(run.halted);
    }

    #[test]
    fn test_every_early_stop_is_halted() {
        let qs = questions(&["1", "2"]);
        for (status, halted) in [
            (RunStatus::Completed, false),
            (RunStatus::Halted, true),
            (RunStatus::Cancelled, true),
        ] {
            let mut run = BatchRun::new(&qs, 1, 1, 1.0);
            run.finish(status);
            assert_eq!(run.halted, halted, "{:?}", status);
        }
    }
}
