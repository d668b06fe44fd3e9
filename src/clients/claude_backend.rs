//! Anthropic messages 接口后端
//!
//! 只做单次请求与错误分类，重试与降级统一交给控制器处理。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clients::openai_backend::SYSTEM_MESSAGE;
use crate::clients::{info_from_config, Backend, BackendInfo};
use crate::config::ProviderConfig;
use crate::error::{AppError, AppResult, BackendError};

/// Claude 后端
///
/// 注意：不要为该结构派生 `Debug`，否则 `api_key` 会出现在日志里
pub struct ClaudeBackend {
    http: reqwest::Client,
    info: BackendInfo,
    api_key: String,
    api_base_url: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

impl ClaudeBackend {
    pub fn new(config: &ProviderConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Other(format!("无法创建 HTTP 客户端: {}", e)))?;

        Ok(Self {
            http,
            info: info_from_config(config),
            api_key: config.api_key.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn classify_status(&self, status: u16, retry_after: Option<Duration>, body: String) -> BackendError {
        let provider = self.info.name.clone();
        match status {
            401 | 403 => BackendError::Auth {
                provider,
                message: body,
            },
            429 => BackendError::RateLimit {
                provider,
                retry_after,
            },
            404 => BackendError::Unavailable {
                provider,
                message: body,
            },
            s if s >= 500 => BackendError::Transient {
                provider,
                message: format!("status {}: {}", s, body),
            },
            s => BackendError::Unavailable {
                provider,
                message: format!("status {}: {}", s, body),
            },
        }
    }

    fn classify_transport(&self, err: reqwest::Error) -> BackendError {
        let provider = self.info.name.clone();
        let message = err.to_string();
        if err.is_connect() {
            BackendError::Unavailable { provider, message }
        } else {
            BackendError::Transient { provider, message }
        }
    }
}

#[async_trait]
impl Backend for ClaudeBackend {
    async fn analyze(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/v1/messages", self.api_base_url);
        debug!("调用 Claude API，模型: {}", self.info.model);

        let body = MessagesRequest {
            model: &self.info.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_MESSAGE,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Claude 请求失败: {}", e);
                self.classify_transport(e)
            })?;

        let status = resp.status().as_u16();
        if status != 200 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = resp.text().await.unwrap_or_default();
            warn!("Claude 返回错误状态 {}: {}", status, text);
            return Err(self.classify_status(status, retry_after, text));
        }

        let parsed: MessagesResponse = resp.json().await.map_err(|e| BackendError::Transient {
            provider: self.info.name.clone(),
            message: format!("响应解析失败: {}", e),
        })?;

        let content = parsed
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(BackendError::Transient {
                provider: self.info.name.clone(),
                message: "Claude 返回内容为空".to_string(),
            });
        }

        Ok(content.trim().to_string())
    }

    fn is_available(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn describe(&self) -> BackendInfo {
        self.info.clone()
    }
}
