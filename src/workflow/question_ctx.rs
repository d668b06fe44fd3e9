//! 题目处理上下文
//!
//! 封装"我正在处理第几题、是哪道题"这一信息，只用于日志前缀

use std::fmt::Display;

/// 题目处理上下文
#[derive(Debug, Clone)]
pub struct QuestionCtx {
    /// 题目编号
    pub question_id: String,

    /// 题目在本次运行中的序号（从1开始）
    pub index: usize,

    /// 本次运行的题目总数
    pub total: usize,
}

impl QuestionCtx {
    /// 创建新的题目上下文
    pub fn new(question_id: impl Into<String>, index: usize, total: usize) -> Self {
        Self {
            question_id: question_id.into(),
            index,
            total,
        }
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[题目 #{}/{} ID#{}]",
            self.index, self.total, self.question_id
        )
    }
}
