//! 分析后端适配器 - 基础设施层
//!
//! 每种后端（商业 LLM 服务或确定性模拟器）都实现同一个 [`Backend`] 契约，
//! 调用方不需要针对具体后端做任何分支。
//!
//! ```text
//! RetryController
//!     ↓ Arc<dyn Backend>
//! ┌──────────────┬──────────────┬──────────────────┐
//! │ OpenAiBackend│ ClaudeBackend│ SimulatorBackend │
//! │ (openai/local)│  (claude)   │   (simulation)   │
//! └──────────────┴──────────────┴──────────────────┘
//! ```

pub mod claude_backend;
pub mod openai_backend;
pub mod simulator;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{AppResult, BackendError};

pub use claude_backend::ClaudeBackend;
pub use openai_backend::OpenAiBackend;
pub use simulator::SimulatorBackend;

/// 后端元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    /// 单次成功调用的估算费用
    pub cost_per_call: f64,
    /// 单次调用的等待上限
    pub timeout: Duration,
}

/// 分析后端的统一契约：文本进，文本出
#[async_trait]
pub trait Backend: Send + Sync {
    /// 发送提示词并返回原始响应文本
    async fn analyze(&self, prompt: &str) -> Result<String, BackendError>;

    /// 是否具备发起调用的条件（如密钥已配置）
    fn is_available(&self) -> bool;

    fn describe(&self) -> BackendInfo;
}

/// 按配置构建后端
pub fn build_backend(config: &ProviderConfig) -> AppResult<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match config.kind {
        ProviderKind::OpenAi | ProviderKind::Local => Arc::new(OpenAiBackend::new(config)),
        ProviderKind::Claude => Arc::new(ClaudeBackend::new(config)?),
        ProviderKind::Simulation => Arc::new(SimulatorBackend::new(config)?),
    };
    Ok(backend)
}

/// 按降级链顺序构建全部后端
pub fn build_chain(providers: &[ProviderConfig]) -> AppResult<Vec<Arc<dyn Backend>>> {
    providers.iter().map(build_backend).collect()
}

pub(crate) fn info_from_config(config: &ProviderConfig) -> BackendInfo {
    BackendInfo {
        name: config.name.clone(),
        kind: config.kind,
        model: config.model.clone(),
        cost_per_call: config.cost_per_call,
        timeout: Duration::from_secs(config.timeout_secs),
    }
}
