//! OpenAI 兼容后端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure、Gemini、本地部署的推理服务等）

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::{info_from_config, Backend, BackendInfo};
use crate::config::{ProviderConfig, ProviderKind};
use crate::error::BackendError;

/// 法条匹配的系统消息
pub const SYSTEM_MESSAGE: &str = "你是一个专业的法条比对助手，擅长判断考题与法规条文之间的对应关系。\
你只能从提示词给出的候选法条中选择，并且只返回约定的 JSON 格式。";

/// OpenAI 兼容后端
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    info: BackendInfo,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiBackend {
    /// 创建新的 OpenAI 兼容后端
    pub fn new(config: &ProviderConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if !config.api_base_url.is_empty() {
            openai_config = openai_config.with_api_base(&config.api_base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            info: info_from_config(config),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// 将 SDK 错误归类为统一的后端错误
    fn classify(&self, err: OpenAIError) -> BackendError {
        let provider = self.info.name.clone();
        match err {
            OpenAIError::ApiError(api) => {
                let code = api.code.as_deref().unwrap_or_default();
                let kind = api.r#type.as_deref().unwrap_or_default();
                let message = api.message;
                if code == "invalid_api_key"
                    || kind == "authentication_error"
                    || kind == "permission_error"
                {
                    BackendError::Auth { provider, message }
                } else if code == "rate_limit_exceeded" || kind == "rate_limit_error" {
                    BackendError::RateLimit {
                        provider,
                        retry_after: None,
                    }
                } else if code == "model_not_found"
                    || code == "insufficient_quota"
                    || kind == "invalid_request_error"
                {
                    BackendError::Unavailable { provider, message }
                } else {
                    BackendError::Transient { provider, message }
                }
            }
            OpenAIError::InvalidArgument(message) => BackendError::Unavailable { provider, message },
            other => {
                let message = other.to_string();
                let lower = message.to_lowercase();
                if lower.contains("error trying to connect") || lower.contains("dns error") {
                    BackendError::Unavailable { provider, message }
                } else {
                    BackendError::Transient { provider, message }
                }
            }
        }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn analyze(&self, prompt: &str) -> Result<String, BackendError> {
        debug!("调用 LLM API，模型: {}", self.info.model);
        debug!("用户消息长度: {} 字符", prompt.len());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_MESSAGE)
            .build()
            .map_err(|e| self.classify(e))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| self.classify(e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.info.model)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| self.classify(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败 ({}): {}", self.info.name, e);
            self.classify(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| BackendError::Transient {
                provider: self.info.name.clone(),
                message: "LLM 返回内容为空".to_string(),
            })?;

        Ok(content.trim().to_string())
    }

    fn is_available(&self) -> bool {
        // 本地服务不需要密钥
        self.info.kind == ProviderKind::Local || !self.api_key.trim().is_empty()
    }

    fn describe(&self) -> BackendInfo {
        self.info.clone()
    }
}
