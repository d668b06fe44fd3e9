//! 测试用后端

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::clients::{Backend, BackendInfo};
use crate::config::ProviderKind;
use crate::error::BackendError;

/// 按预设顺序返回结果的后端，队列耗尽后重复 `fallback`
pub struct ScriptedBackend {
    info: BackendInfo,
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    fallback: Result<String, BackendError>,
    available: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(
        name: &str,
        script: Vec<Result<String, BackendError>>,
        fallback: Result<String, BackendError>,
    ) -> Self {
        Self {
            info: BackendInfo {
                name: name.to_string(),
                kind: ProviderKind::Simulation,
                model: "scripted".to_string(),
                cost_per_call: 0.0,
                timeout: Duration::from_secs(5),
            },
            script: Mutex::new(script.into()),
            fallback,
            available: true,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// 总是返回同一个响应
    pub fn always(name: &str, response: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Ok(response.into()))
    }

    /// 总是返回同一种错误
    pub fn failing(name: &str, error: BackendError) -> Self {
        Self::new(name, Vec::new(), Err(error))
    }

    pub fn with_cost(mut self, cost_per_call: f64) -> Self {
        self.info.cost_per_call = cost_per_call;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.info.timeout = timeout;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// 实际被调用的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn analyze(&self, _prompt: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn describe(&self) -> BackendInfo {
        self.info.clone()
    }
}

pub fn auth_error(provider: &str) -> BackendError {
    BackendError::Auth {
        provider: provider.to_string(),
        message: "invalid api key".to_string(),
    }
}

pub fn rate_limit(provider: &str) -> BackendError {
    BackendError::RateLimit {
        provider: provider.to_string(),
        retry_after: None,
    }
}

pub fn transient(provider: &str) -> BackendError {
    BackendError::Transient {
        provider: provider.to_string(),
        message: "502 bad gateway".to_string(),
    }
}

pub fn unavailable(provider: &str) -> BackendError {
    BackendError::Unavailable {
        provider: provider.to_string(),
        message: "model not found".to_string(),
    }
}
