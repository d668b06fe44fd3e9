use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfidenceThresholds;

/// 信心度等级
///
/// 半开区间分桶：`[0,0.3)` `[0.3,0.5)` `[0.5,0.7)` `[0.7,0.9)` `[0.9,1]`，
/// 边界值归入较高的一档
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    /// 按从低到高的固定顺序列出全部等级
    pub const ALL: [ConfidenceLevel; 5] = [
        ConfidenceLevel::VeryLow,
        ConfidenceLevel::Low,
        ConfidenceLevel::Medium,
        ConfidenceLevel::High,
        ConfidenceLevel::VeryHigh,
    ];

    /// 根据分数判断信心度等级
    pub fn from_score(score: f64, thresholds: &ConfidenceThresholds) -> Self {
        if score < thresholds.low {
            ConfidenceLevel::VeryLow
        } else if score < thresholds.medium {
            ConfidenceLevel::Low
        } else if score < thresholds.high {
            ConfidenceLevel::Medium
        } else if score < thresholds.very_high {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::VeryHigh
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryLow => "极低",
            ConfidenceLevel::Low => "低",
            ConfidenceLevel::Medium => "中等",
            ConfidenceLevel::High => "高",
            ConfidenceLevel::VeryHigh => "极高",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 后端响应的固定格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPayload {
    pub confidence: f64,
    #[serde(default)]
    pub matched_articles: Vec<String>,
    #[serde(default)]
    pub primary_article: Option<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl MatchPayload {
    /// 校验响应内容，并按首次出现的顺序去重
    ///
    /// `known_ids` 为本题的候选法条集合
    pub fn validate(mut self, known_ids: &HashSet<&str>) -> Result<Self, String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} 不在 [0, 1] 区间内", self.confidence));
        }

        let mut seen = HashSet::new();
        self.matched_articles.retain(|id| seen.insert(id.clone()));

        if let Some(unknown) = self
            .matched_articles
            .iter()
            .find(|id| !known_ids.contains(id.as_str()))
        {
            return Err(format!("未知的法条编号: {}", unknown));
        }

        if let Some(primary) = &self.primary_article {
            if !self.matched_articles.contains(primary) {
                return Err(format!("primary_article {} 不在 matched_articles 中", primary));
            }
        }

        Ok(self)
    }
}

/// 调用过程的来源信息
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub provider_used: String,
    pub retry_count: u32,
    pub processing_time: Duration,
}

/// 单题分析结果
///
/// 由匹配引擎创建，之后只读。`confidence_level` 总是由 `confidence` 推导得到，
/// 没有单独设置它的途径；从检查点读回时同样按默认分桶重新推导。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredAnalysisResult")]
pub struct AnalysisResult {
    question_id: String,
    confidence: f64,
    confidence_level: ConfidenceLevel,
    matched_articles: Vec<String>,
    primary_article: Option<String>,
    reasoning: String,
    provider_used: String,
    retry_count: u32,
    /// 处理耗时（秒）
    processing_time: f64,
}

/// 检查点中的原始记录，`confidence_level` 字段被忽略
#[derive(Deserialize)]
struct StoredAnalysisResult {
    question_id: String,
    confidence: f64,
    #[serde(default)]
    matched_articles: Vec<String>,
    #[serde(default)]
    primary_article: Option<String>,
    #[serde(default)]
    reasoning: String,
    provider_used: String,
    #[serde(default)]
    retry_count: u32,
    #[serde(default)]
    processing_time: f64,
}

impl TryFrom<StoredAnalysisResult> for AnalysisResult {
    type Error = String;

    fn try_from(stored: StoredAnalysisResult) -> Result<Self, Self::Error> {
        if !stored.confidence.is_finite() || !(0.0..=1.0).contains(&stored.confidence) {
            return Err(format!("confidence {} 不在 [0, 1] 区间内", stored.confidence));
        }
        if let Some(primary) = &stored.primary_article {
            if !stored.matched_articles.contains(primary) {
                return Err(format!("primary_article {} 不在 matched_articles 中", primary));
            }
        }
        let processing_time = if stored.processing_time.is_finite() && stored.processing_time >= 0.0 {
            stored.processing_time
        } else {
            0.0
        };

        Ok(Self {
            confidence_level: ConfidenceLevel::from_score(
                stored.confidence,
                &ConfidenceThresholds::default(),
            ),
            question_id: stored.question_id,
            confidence: stored.confidence,
            matched_articles: stored.matched_articles,
            primary_article: stored.primary_article,
            reasoning: stored.reasoning,
            provider_used: stored.provider_used,
            retry_count: stored.retry_count,
            processing_time,
        })
    }
}

impl AnalysisResult {
    /// 由已校验的响应构建结果
    pub fn new(
        question_id: impl Into<String>,
        payload: MatchPayload,
        provenance: Provenance,
        thresholds: &ConfidenceThresholds,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            confidence: payload.confidence,
            confidence_level: ConfidenceLevel::from_score(payload.confidence, thresholds),
            matched_articles: payload.matched_articles,
            primary_article: payload.primary_article,
            reasoning: payload.reasoning,
            provider_used: provenance.provider_used,
            retry_count: provenance.retry_count,
            processing_time: provenance.processing_time.as_secs_f64(),
        }
    }

    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        self.confidence_level
    }

    pub fn matched_articles(&self) -> &[String] {
        &self.matched_articles
    }

    pub fn primary_article(&self) -> Option<&str> {
        self.primary_article.as_deref()
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn provider_used(&self) -> &str {
        &self.provider_used
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn processing_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.processing_time).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(score: f64) -> ConfidenceLevel {
        ConfidenceLevel::from_score(score, &ConfidenceThresholds::default())
    }

    #[test]
    fn test_boundaries_belong_to_upper_bucket() {
        assert_eq!(level(0.0), ConfidenceLevel::VeryLow);
        assert_eq!(level(0.2999), ConfidenceLevel::VeryLow);
        assert_eq!(level(0.3), ConfidenceLevel::Low);
        assert_eq!(level(0.5), ConfidenceLevel::Medium);
        assert_eq!(level(0.7), ConfidenceLevel::High);
        assert_eq!(level(0.8999), ConfidenceLevel::High);
        assert_eq!(level(0.9), ConfidenceLevel::VeryHigh);
        assert_eq!(level(1.0), ConfidenceLevel::VeryHigh);
    }

    #[test]
    fn test_every_score_lands_in_exactly_one_bucket() {
        let thresholds = ConfidenceThresholds::default();
        for step in 0..=1000 {
            let score = step as f64 / 1000.0;
            let level = ConfidenceLevel::from_score(score, &thresholds);
            let bounds = [0.0, 0.3, 0.5, 0.7, 0.9, f64::INFINITY];
            let idx = ConfidenceLevel::ALL
                .iter()
                .position(|l| *l == level)
                .unwrap();
            assert!(score >= bounds[idx] && score < bounds[idx + 1], "{}", score);
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        let known: HashSet<&str> = ["A-1"].into_iter().collect();
        let payload = MatchPayload {
            confidence: 1.2,
            matched_articles: vec!["A-1".into()],
            primary_article: None,
            reasoning: String::new(),
        };
        assert!(payload.validate(&known).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_and_orphan_primary() {
        let known: HashSet<&str> = ["A-1", "A-2"].into_iter().collect();
        let unknown = MatchPayload {
            confidence: 0.5,
            matched_articles: vec!["A-9".into()],
            primary_article: None,
            reasoning: String::new(),
        };
        assert!(unknown.validate(&known).is_err());

        let orphan = MatchPayload {
            confidence: 0.5,
            matched_articles: vec!["A-1".into()],
            primary_article: Some("A-2".into()),
            reasoning: String::new(),
        };
        assert!(orphan.validate(&known).is_err());
    }

    #[test]
    fn test_validate_dedups_keeping_first_occurrence() {
        let known: HashSet<&str> = ["A-1", "A-2"].into_iter().collect();
        let payload = MatchPayload {
            confidence: 0.5,
            matched_articles: vec!["A-2".into(), "A-1".into(), "A-2".into()],
            primary_article: Some("A-2".into()),
            reasoning: String::new(),
        }
        .validate(&known)
        .unwrap();
        assert_eq!(payload.matched_articles, vec!["A-2", "A-1"]);
    }

    #[test]
    fn test_level_is_derived_from_confidence() {
        let result = AnalysisResult::new(
            "Q1",
            MatchPayload {
                confidence: 0.7,
                matched_articles: vec![],
                primary_article: None,
                reasoning: "ok".into(),
            },
            Provenance {
                provider_used: "sim".into(),
                retry_count: 0,
                processing_time: Duration::from_millis(1500),
            },
            &ConfidenceThresholds::default(),
        );
        assert_eq!(result.confidence_level(), ConfidenceLevel::High);
        assert_eq!(result.processing_time(), Duration::from_millis(1500));
    }

    #[test]
    fn test_deserialize_rederives_level_from_confidence() {
        let raw = r#"{
            "question_id": "Q1",
            "confidence": 0.95,
            "confidence_level": "very_low",
            "matched_articles": ["A-1"],
            "primary_article": "A-1",
            "reasoning": "",
            "provider_used": "sim",
            "retry_count": 0,
            "processing_time": -3.0
        }"#;
        let result: AnalysisResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.confidence_level(), ConfidenceLevel::VeryHigh);
        assert_eq!(result.processing_time(), Duration::ZERO);
    }

    #[test]
    fn test_deserialize_rejects_out_of_range_confidence() {
        let raw = r#"{"question_id": "Q1", "confidence": 1.5, "provider_used": "sim"}"#;
        assert!(serde_json::from_str::<AnalysisResult>(raw).is_err());
    }
}
