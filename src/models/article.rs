use serde::{Deserialize, Serialize};

/// 法条数据结构
///
/// 启动时加载一次，之后只读，在所有并发匹配任务之间共享
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawArticle {
    /// 法规代码，如 `CPLA`
    pub law_code: String,
    pub law_name: String,
    #[serde(default)]
    pub category: String,
    pub article_no_main: u32,
    #[serde(default)]
    pub article_no_sub: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
}

impl LawArticle {
    /// 法条唯一识别码：`法规代码-主号` 或 `法规代码-主号-次号`
    pub fn article_id(&self) -> String {
        if self.article_no_sub > 0 {
            format!(
                "{}-{}-{}",
                self.law_code, self.article_no_main, self.article_no_sub
            )
        } else {
            format!("{}-{}", self.law_code, self.article_no_main)
        }
    }

    /// 条文标签，如 `第12条` / `第12-1条`
    pub fn article_label(&self) -> String {
        if self.article_no_sub > 0 {
            format!("第{}-{}条", self.article_no_main, self.article_no_sub)
        } else {
            format!("第{}条", self.article_no_main)
        }
    }

    pub fn full_title(&self) -> String {
        format!("{} {}", self.law_name, self.article_label())
    }
}

impl std::fmt::Display for LawArticle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.article_id(), self.full_title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(main: u32, sub: u32) -> LawArticle {
        LawArticle {
            law_code: "CPLA".to_string(),
            law_name: "民法".to_string(),
            category: "民事".to_string(),
            article_no_main: main,
            article_no_sub: sub,
            content: "内容".to_string(),
            authority: None,
        }
    }

    #[test]
    fn test_article_id_without_sub_number() {
        assert_eq!(article(12, 0).article_id(), "CPLA-12");
        assert_eq!(article(12, 0).article_label(), "第12条");
    }

    #[test]
    fn test_article_id_with_sub_number() {
        assert_eq!(article(12, 1).article_id(), "CPLA-12-1");
        assert_eq!(article(12, 1).full_title(), "民法 第12-1条");
    }
}
