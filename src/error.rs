use std::time::Duration;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 分析后端错误
    #[error("后端错误: {0}")]
    Backend(#[from] BackendError),
    /// 单题匹配错误
    #[error("匹配错误: {0}")]
    Match(#[from] MatchError),
    /// 批量运行错误
    #[error("批量运行错误: {0}")]
    Batch(#[from] BatchError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 分析后端错误
///
/// 每个后端适配器都只会返回这四类错误，重试/降级控制器据此决定下一步
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// 凭证无效或缺失（不可重试）
    #[error("认证失败 ({provider}): {message}")]
    Auth { provider: String, message: String },
    /// 请求频率限制（退避后重试）
    #[error("请求频率限制 ({provider}), 建议等待: {retry_after:?}")]
    RateLimit {
        provider: String,
        retry_after: Option<Duration>,
    },
    /// 网络 / 5xx / 超时（可重试）
    #[error("临时错误 ({provider}): {message}")]
    Transient { provider: String, message: String },
    /// 服务或模型不可达（直接切换后端）
    #[error("后端不可用 ({provider}): {message}")]
    Unavailable { provider: String, message: String },
}

impl BackendError {
    /// 是否应该在同一后端上重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::RateLimit { .. } | BackendError::Transient { .. }
        )
    }

    /// 错误种类名称（用于日志与失败链）
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Auth { .. } => "AuthError",
            BackendError::RateLimit { .. } => "RateLimitError",
            BackendError::Transient { .. } => "TransientError",
            BackendError::Unavailable { .. } => "UnavailableError",
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            BackendError::Auth { provider, .. }
            | BackendError::RateLimit { provider, .. }
            | BackendError::Transient { provider, .. }
            | BackendError::Unavailable { provider, .. } => provider,
        }
    }
}

/// 降级链中的一次失败尝试
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub provider: String,
    /// 该后端上的第几次尝试（从 1 开始）
    pub attempt: u32,
    pub error: BackendError,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{} {}: {}",
            self.provider,
            self.attempt,
            self.error.kind(),
            self.error
        )
    }
}

/// 单题匹配错误（只影响当前题目，批量继续）
#[derive(Debug, Error)]
pub enum MatchError {
    /// 题目内容为空，不调用任何后端
    #[error("题目校验失败 ({question_id}): {reason}")]
    Validation { question_id: String, reason: String },
    /// 后端返回的文本不符合约定格式
    #[error("无法解析后端响应 ({question_id}): {reason}")]
    ResponseParse { question_id: String, reason: String },
    /// 降级链上的所有后端都失败
    #[error("所有后端均失败 ({question_id}): {}", format_failures(.failures))]
    ChainExhausted {
        question_id: String,
        failures: Vec<AttemptFailure>,
    },
}

impl MatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::Validation { .. } => "ValidationError",
            MatchError::ResponseParse { .. } => "ResponseParseError",
            MatchError::ChainExhausted { .. } => "ChainExhaustedError",
        }
    }
}

fn format_failures(failures: &[AttemptFailure]) -> String {
    if failures.is_empty() {
        return "降级链为空".to_string();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// 批量运行错误
#[derive(Debug, Error)]
pub enum BatchError {
    /// 累计费用达到上限，运行被平稳终止
    #[error("累计费用 {spent:.4} 已达到上限 {ceiling:.4}")]
    CostCeiling { spent: f64, ceiling: f64 },
    /// 运行被显式取消
    #[error("运行已取消 (已处理 {processed} 题)")]
    Cancelled { processed: usize },
    /// 检查点不可用
    #[error("检查点错误 ({path}): {reason}")]
    Checkpoint { path: String, reason: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// JSON 解析失败
    #[error("JSON解析失败 ({path}): {source}")]
    JsonParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: String, reason: String },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::File(FileError::JsonParseFailed {
            path: String::new(),
            source: err,
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: err,
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建配置项不合法错误
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let rate = BackendError::RateLimit {
            provider: "a".into(),
            retry_after: None,
        };
        let transient = BackendError::Transient {
            provider: "a".into(),
            message: "502".into(),
        };
        let auth = BackendError::Auth {
            provider: "a".into(),
            message: "bad key".into(),
        };
        let unavailable = BackendError::Unavailable {
            provider: "a".into(),
            message: "404".into(),
        };

        assert!(rate.is_retryable());
        assert!(transient.is_retryable());
        assert!(!auth.is_retryable());
        assert!(!unavailable.is_retryable());
    }

    #[test]
    fn test_chain_exhausted_lists_every_failure() {
        let err = MatchError::ChainExhausted {
            question_id: "Q1".into(),
            failures: vec![
                AttemptFailure {
                    provider: "openai".into(),
                    attempt: 1,
                    error: BackendError::Auth {
                        provider: "openai".into(),
                        message: "401".into(),
                    },
                },
                AttemptFailure {
                    provider: "claude".into(),
                    attempt: 2,
                    error: BackendError::Transient {
                        provider: "claude".into(),
                        message: "503".into(),
                    },
                },
            ],
        };

        let text = err.to_string();
        assert!(text.contains("openai#1 AuthError"));
        assert!(text.contains("claude#2 TransientError"));
        assert_eq!(err.kind(), "ChainExhaustedError");
    }
}
