//! 重试 / 降级控制器 - 业务能力层
//!
//! 包装一次后端调用，按错误种类决定在同一后端上退避重试，还是切换到降级链中的
//! 下一个后端。"换下一个后端"是普通的状态转移，不是异常。
//!
//! ```text
//! Attempting(i, n) ──ok──────────────────────────▶ Succeeded
//!      │ RateLimit / Transient 且 n ≤ max_retries ─▶ Attempting(i, n+1)
//!      │ 其他错误或重试用尽 ────────────────────────▶ Attempting(i+1, 1)
//!      │ 链已走完 ─────────────────────────────────▶ Exhausted
//!      └ 退避期间被取消 / 链为空 ──────────────────▶ Failed
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clients::Backend;
use crate::config::RetryConfig;
use crate::error::{AttemptFailure, BackendError};

/// 单次调用的状态
#[derive(Debug, Clone, PartialEq)]
pub enum CallState {
    /// 正在尝试第 `provider_index` 个后端的第 `attempt` 次（从 1 开始）
    Attempting { provider_index: usize, attempt: u32 },
    Succeeded { provider_index: usize, response: String },
    /// 降级链上的后端全部失败
    Exhausted,
    /// 无法继续（链为空，或在退避期间被取消）
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallState::Attempting { .. })
    }
}

/// 成功调用的结果
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub response: String,
    /// 实际给出响应的后端
    pub provider: String,
    /// 所有后端上的重试次数之和（首次尝试不计）
    pub retry_count: u32,
    pub total_attempts: u32,
    pub elapsed: Duration,
    pub cost: f64,
}

/// 失败调用的完整失败链
#[derive(Debug, Clone, PartialEq)]
pub struct ChainFailure {
    /// `Exhausted` 或 `Failed`
    pub state: CallState,
    pub failures: Vec<AttemptFailure>,
    pub elapsed: Duration,
}

/// 重试 / 降级控制器
#[derive(Clone)]
pub struct RetryController {
    chain: Vec<Arc<dyn Backend>>,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl RetryController {
    pub fn new(chain: Vec<Arc<dyn Backend>>, retry: RetryConfig) -> Self {
        Self {
            chain,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// 绑定运行级取消信号：取消后不再开始新的重试，进行中的调用照常完成
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.chain.iter().map(|b| b.describe().name).collect()
    }

    /// 首个可用后端的单次调用费用，用于预算估算
    pub fn lead_cost(&self) -> f64 {
        self.chain
            .iter()
            .find(|b| b.is_available())
            .map(|b| b.describe().cost_per_call)
            .unwrap_or(0.0)
    }

    /// 派生一个以最便宜的可用后端打头的控制器，其余后端按费用排在后面作为降级
    pub fn cheapest_first(&self) -> Self {
        let mut available: Vec<Arc<dyn Backend>> = self
            .chain
            .iter()
            .filter(|b| b.is_available())
            .cloned()
            .collect();
        available.sort_by(|a, b| {
            a.describe()
                .cost_per_call
                .total_cmp(&b.describe().cost_per_call)
        });
        let unavailable = self.chain.iter().filter(|b| !b.is_available()).cloned();

        Self {
            chain: available.into_iter().chain(unavailable).collect(),
            retry: self.retry.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// 第 `retry_index` 次重试（从 0 开始）前的等待时间：`base * 2^retry_index`，有上限
    pub fn backoff_delay(&self, retry_index: u32, error: &BackendError) -> Duration {
        let cap = Duration::from_millis(self.retry.max_backoff_ms);
        let exp = Duration::from_millis(
            self.retry
                .backoff_base_ms
                .saturating_mul(1u64 << retry_index.min(20)),
        );
        let delay = match error {
            BackendError::RateLimit {
                retry_after: Some(after),
                ..
            } => exp.max(*after),
            _ => exp,
        };
        delay.min(cap)
    }

    /// 执行一次带重试与降级的调用
    pub async fn call(&self, prompt: &str) -> Result<CallOutcome, ChainFailure> {
        let started = Instant::now();
        let mut failures: Vec<AttemptFailure> = Vec::new();
        let mut retry_count = 0u32;
        let mut total_attempts = 0u32;

        let mut state = if self.chain.is_empty() {
            CallState::Failed
        } else {
            CallState::Attempting {
                provider_index: 0,
                attempt: 1,
            }
        };

        while let CallState::Attempting {
            provider_index,
            attempt,
        } = state
        {
            let backend = &self.chain[provider_index];
            let info = backend.describe();

            if !backend.is_available() {
                debug!("后端 {} 不可用，直接切换", info.name);
                failures.push(AttemptFailure {
                    provider: info.name.clone(),
                    attempt,
                    error: BackendError::Unavailable {
                        provider: info.name.clone(),
                        message: "后端未就绪（缺少凭证）".to_string(),
                    },
                });
                state = self.next_provider(provider_index);
                continue;
            }

            total_attempts += 1;
            if attempt > 1 {
                retry_count += 1;
            }

            let result = match tokio::time::timeout(info.timeout, backend.analyze(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Transient {
                    provider: info.name.clone(),
                    message: format!("调用超时 ({:?})", info.timeout),
                }),
            };

            state = match result {
                Ok(response) => CallState::Succeeded {
                    provider_index,
                    response,
                },
                Err(error) => {
                    warn!(
                        "后端 {} 第 {} 次尝试失败 [{}]: {}",
                        info.name,
                        attempt,
                        error.kind(),
                        error
                    );
                    let next = if error.is_retryable() && attempt <= self.retry.max_retries {
                        let delay = self.backoff_delay(attempt - 1, &error);
                        debug!("{:?} 后重试后端 {}", delay, info.name);
                        if self.sleep_unless_cancelled(delay).await {
                            CallState::Attempting {
                                provider_index,
                                attempt: attempt + 1,
                            }
                        } else {
                            CallState::Failed
                        }
                    } else {
                        self.next_provider(provider_index)
                    };
                    failures.push(AttemptFailure {
                        provider: info.name.clone(),
                        attempt,
                        error,
                    });
                    next
                }
            };
        }

        match state {
            CallState::Succeeded {
                provider_index,
                response,
            } => {
                let info = self.chain[provider_index].describe();
                if provider_index > 0 {
                    debug!("降级后由后端 {} 完成调用", info.name);
                }
                Ok(CallOutcome {
                    response,
                    provider: info.name,
                    retry_count,
                    total_attempts,
                    elapsed: started.elapsed(),
                    cost: info.cost_per_call,
                })
            }
            terminal => Err(ChainFailure {
                state: terminal,
                failures,
                elapsed: started.elapsed(),
            }),
        }
    }

    fn next_provider(&self, provider_index: usize) -> CallState {
        if provider_index + 1 < self.chain.len() {
            CallState::Attempting {
                provider_index: provider_index + 1,
                attempt: 1,
            }
        } else {
            CallState::Exhausted
        }
    }

    /// 返回 false 表示等待期间收到取消信号
    async fn sleep_unless_cancelled(&self, delay: Duration) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }
}
