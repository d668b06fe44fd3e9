//! 确定性模拟后端
//!
//! 不访问任何外部服务。以提示词内容为种子生成结构合法、内容合成的响应，
//! 用于在没有外部依赖的情况下验证整条流水线。

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::clients::{info_from_config, Backend, BackendInfo};
use crate::config::ProviderConfig;
use crate::error::{AppError, AppResult, BackendError};

/// 模拟后端
pub struct SimulatorBackend {
    info: BackendInfo,
    latency: Duration,
    candidate_re: Regex,
}

impl SimulatorBackend {
    pub fn new(config: &ProviderConfig) -> AppResult<Self> {
        let candidate_re = Regex::new(r#""article_id":\s*"([^"]+)""#)
            .map_err(|e| AppError::Other(format!("模拟器正则编译失败: {}", e)))?;

        Ok(Self {
            info: info_from_config(config),
            latency: Duration::from_millis(config.simulated_latency_ms),
            candidate_re,
        })
    }

    /// 根据提示词生成响应（纯函数，不含延迟）
    pub fn respond(&self, prompt: &str) -> String {
        let seed = fnv1a(prompt.as_bytes());

        // 候选在提示词中已按相似度排序，保持该顺序
        let mut candidates: Vec<&str> = Vec::new();
        for cap in self.candidate_re.captures_iter(prompt) {
            if let Some(m) = cap.get(1) {
                if !candidates.contains(&m.as_str()) {
                    candidates.push(m.as_str());
                }
            }
        }

        let payload = if candidates.is_empty() {
            json!({
                "confidence": (seed % 300) as f64 / 1000.0,
                "matched_articles": [],
                "primary_article": null,
                "reasoning": "模拟分析：没有可供比对的候选法条。",
            })
        } else {
            let take = 1 + (seed % candidates.len().min(3) as u64) as usize;
            let matched: Vec<&str> = candidates.iter().take(take).copied().collect();
            let confidence = 0.2 + ((seed >> 8) % 800) as f64 / 1000.0;
            json!({
                "confidence": confidence,
                "matched_articles": matched,
                "primary_article": matched[0],
                "reasoning": format!(
                    "模拟分析：题目与 {} 的条文要件最为接近，共参考 {} 条候选。",
                    matched[0],
                    candidates.len()
                ),
            })
        };

        // 一半的响应包在 markdown 代码块里，与真实模型的输出习惯一致
        if (seed >> 16) % 2 == 0 {
            format!("```json\n{}\n```", payload)
        } else {
            payload.to_string()
        }
    }
}

#[async_trait]
impl Backend for SimulatorBackend {
    async fn analyze(&self, prompt: &str) -> Result<String, BackendError> {
        debug!(
            "模拟后端 {} 处理提示词，长度: {} 字符",
            self.info.name,
            prompt.chars().count()
        );
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.respond(prompt))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn describe(&self) -> BackendInfo {
        self.info.clone()
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
