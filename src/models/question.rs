use serde::{Deserialize, Serialize};

/// 考题类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    Essay,
    TrueFalse,
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QuestionType::MultipleChoice => "选择题",
            QuestionType::Essay => "申论题",
            QuestionType::TrueFalse => "是非题",
        };
        f.write_str(name)
    }
}

/// 考题数据结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub question_id: String,
    pub content: String,
    pub question_type: QuestionType,
    /// 有序选项，申论题为空
    #[serde(default)]
    pub options: Vec<String>,
}

impl ExamQuestion {
    pub fn new(
        question_id: impl Into<String>,
        content: impl Into<String>,
        question_type: QuestionType,
        options: Vec<String>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            content: content.into(),
            question_type,
            options,
        }
    }

    /// 题干去除首尾空白后是否为空
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// 选项与字母标签配对：(A, 选项1), (B, 选项2) ...
    pub fn lettered_options(&self) -> impl Iterator<Item = (char, &str)> {
        ('A'..='Z')
            .zip(self.options.iter())
            .map(|(letter, text)| (letter, text.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_content() {
        let q = ExamQuestion::new("Q1", "   \n\t", QuestionType::Essay, vec![]);
        assert!(q.is_blank());
    }

    #[test]
    fn test_lettered_options_keep_order() {
        let q = ExamQuestion::new(
            "Q1",
            "下列何者正确？",
            QuestionType::MultipleChoice,
            vec!["甲".into(), "乙".into(), "丙".into()],
        );
        let letters: Vec<(char, &str)> = q.lettered_options().collect();
        assert_eq!(letters, vec![('A', "甲"), ('B', "乙"), ('C', "丙")]);
    }

    #[test]
    fn test_question_type_serde_names() {
        let json = serde_json::to_string(&QuestionType::TrueFalse).unwrap();
        assert_eq!(json, "\"true_false\"");
    }
}
