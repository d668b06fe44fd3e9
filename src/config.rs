//! 程序配置
//!
//! 配置对象只构造一次，然后以引用的方式传入各层，不存在全局可变状态。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ConfigError, FileError};

/// 后端种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI 兼容的 chat completions 接口
    OpenAi,
    /// Anthropic messages 接口
    Claude,
    /// 本地部署的 OpenAI 兼容服务（无需密钥）
    Local,
    /// 确定性模拟器
    Simulation,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
            ProviderKind::Local => "local",
            ProviderKind::Simulation => "simulation",
        };
        f.write_str(name)
    }
}

/// 单个后端的配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// 后端名称（日志与 `provider_used` 中使用）
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: String,
    pub api_base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 单次调用的等待上限，超时按临时错误处理
    pub timeout_secs: u64,
    /// 单次成功调用的估算费用
    pub cost_per_call: f64,
    /// 仅模拟器使用：人为延迟
    pub simulated_latency_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::simulation("simulator")
    }
}

impl ProviderConfig {
    /// 模拟器后端的默认配置
    pub fn simulation(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::Simulation,
            model: "sim-v1".to_string(),
            api_key: String::new(),
            api_base_url: String::new(),
            temperature: 0.0,
            max_tokens: 1500,
            timeout_secs: 30,
            cost_per_call: 0.0,
            simulated_latency_ms: 50,
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            name: "openai".to_string(),
            kind: ProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            api_key: api_key.into(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            cost_per_call: 0.002,
            simulated_latency_ms: 0,
            ..Self::simulation("openai")
        }
    }

    pub fn claude(api_key: impl Into<String>) -> Self {
        Self {
            name: "claude".to_string(),
            kind: ProviderKind::Claude,
            model: "claude-3-5-haiku-latest".to_string(),
            api_key: api_key.into(),
            api_base_url: "https://api.anthropic.com".to_string(),
            cost_per_call: 0.003,
            simulated_latency_ms: 0,
            ..Self::simulation("claude")
        }
    }
}

/// 重试与退避配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 同一后端上的最大重试次数（不含首次尝试）
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

/// 批量编排配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub initial_concurrency: usize,
    pub max_concurrency: usize,
    /// 每个切片的初始题目数量
    pub initial_batch_size: usize,
    pub max_batch_size: usize,
    pub cost_ceiling: f64,
    /// 检查点文件路径，为空则不落盘
    pub checkpoint_path: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_concurrency: 4,
            max_concurrency: 16,
            initial_batch_size: 8,
            max_batch_size: 64,
            cost_ceiling: 10.0,
            checkpoint_path: None,
        }
    }
}

/// 候选法条召回配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// 选择题每个选项额外召回的法条数，0 表示不按选项召回
    pub option_top_k: usize,
    pub min_similarity: f32,
    /// 提示词中每条候选法条的摘要长度（字符）
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            option_top_k: 1,
            min_similarity: 0.0,
            excerpt_chars: 200,
        }
    }
}

/// 信心度分桶边界
///
/// 生产环境固定为 0.3 / 0.5 / 0.7 / 0.9，只在测试中覆盖
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub very_high: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            low: 0.3,
            medium: 0.5,
            high: 0.7,
            very_high: 0.9,
        }
    }
}

impl ConfidenceThresholds {
    fn validate(&self) -> AppResult<()> {
        let bounds = [0.0, self.low, self.medium, self.high, self.very_high, 1.0];
        if bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AppError::invalid_config(
                "thresholds",
                format!("边界必须在 (0, 1) 内严格递增: {:?}", &bounds[1..5]),
            ));
        }
        Ok(())
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 有序的降级链，第一个为首选后端
    pub providers: Vec<ProviderConfig>,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub retrieval: RetrievalConfig,
    pub thresholds: ConfidenceThresholds,
    /// 法条 JSON 文件
    pub articles_path: String,
    /// 考题 JSON 文件
    pub questions_path: String,
    /// 预计算的法条向量（可选）
    pub article_vectors_path: Option<String>,
    /// 预计算的题目向量（可选）
    pub question_vectors_path: Option<String>,
    /// 结果与报告输出目录
    pub output_dir: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: vec![ProviderConfig::simulation("simulator")],
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            retrieval: RetrievalConfig::default(),
            thresholds: ConfidenceThresholds::default(),
            articles_path: "data/law_articles.json".to_string(),
            questions_path: "data/questions.json".to_string(),
            article_vectors_path: None,
            question_vectors_path: None,
            output_dir: "results".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    /// 从 TOML 文件加载配置，缺失的字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            AppError::File(FileError::TomlParseFailed {
                path: path.display().to_string(),
                source: e,
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 从环境变量构造配置
    ///
    /// 设置了 `LAW_MATCHER_CONFIG` 时先读取该 TOML 文件，再叠加其余环境变量。
    /// 检测到 `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` 时，对应后端会排在模拟器之前。
    pub fn from_env() -> AppResult<Self> {
        let mut config = match std::env::var("LAW_MATCHER_CONFIG") {
            Ok(path) => Self::from_toml_file(path)?,
            Err(_) => Self::default(),
        };

        // 配置文件里已有同类后端时只补密钥，否则排到降级链最前面
        let mut chain = Vec::new();
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            let mut provider = ProviderConfig::openai(key.clone());
            if let Ok(model) = std::env::var("OPENAI_MODEL") {
                provider.model = model;
            }
            if let Ok(base) = std::env::var("OPENAI_API_BASE") {
                provider.api_base_url = base;
            }
            if !config.fill_api_key(ProviderKind::OpenAi, &key) {
                chain.push(provider);
            }
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !config.fill_api_key(ProviderKind::Claude, &key) {
                chain.push(ProviderConfig::claude(key));
            }
        }
        if !chain.is_empty() {
            chain.append(&mut config.providers);
            config.providers = chain;
        }

        if let Some(v) = env_parse::<u32>("LAW_MATCHER_MAX_RETRIES")? {
            config.retry.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("LAW_MATCHER_BACKOFF_BASE_MS")? {
            config.retry.backoff_base_ms = v;
        }
        if let Some(v) = env_parse::<usize>("LAW_MATCHER_CONCURRENCY")? {
            config.batch.initial_concurrency = v;
        }
        if let Some(v) = env_parse::<usize>("LAW_MATCHER_MAX_CONCURRENCY")? {
            config.batch.max_concurrency = v;
        }
        if let Some(v) = env_parse::<f64>("LAW_MATCHER_COST_CEILING")? {
            config.batch.cost_ceiling = v;
        }
        if let Ok(v) = std::env::var("LAW_MATCHER_CHECKPOINT") {
            config.batch.checkpoint_path = Some(v);
        }
        if let Ok(v) = std::env::var("LAW_MATCHER_ARTICLES") {
            config.articles_path = v;
        }
        if let Ok(v) = std::env::var("LAW_MATCHER_QUESTIONS") {
            config.questions_path = v;
        }
        if let Ok(v) = std::env::var("LAW_MATCHER_OUTPUT_DIR") {
            config.output_dir = v;
        }
        if let Some(v) = env_parse::<bool>("VERBOSE_LOGGING")? {
            config.verbose_logging = v;
        }
        if let Ok(v) = std::env::var("OUTPUT_LOG_FILE") {
            config.output_log_file = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// 为指定种类中缺少密钥的后端补上密钥，返回是否存在该种类的后端
    fn fill_api_key(&mut self, kind: ProviderKind, key: &str) -> bool {
        let mut found = false;
        for provider in self.providers.iter_mut().filter(|p| p.kind == kind) {
            found = true;
            if provider.api_key.trim().is_empty() {
                provider.api_key = key.to_string();
            }
        }
        found
    }

    /// 校验配置的一致性
    pub fn validate(&self) -> AppResult<()> {
        if self.providers.is_empty() {
            return Err(AppError::invalid_config("providers", "降级链不能为空"));
        }
        if self.batch.initial_concurrency == 0 || self.batch.max_concurrency == 0 {
            return Err(AppError::invalid_config("batch.concurrency", "并发数至少为 1"));
        }
        if self.batch.initial_concurrency > self.batch.max_concurrency {
            return Err(AppError::invalid_config(
                "batch.initial_concurrency",
                "初始并发数不能超过上限",
            ));
        }
        if self.batch.initial_batch_size == 0 || self.batch.max_batch_size == 0 {
            return Err(AppError::invalid_config("batch.batch_size", "切片大小至少为 1"));
        }
        if !(self.batch.cost_ceiling >= 0.0) {
            return Err(AppError::invalid_config("batch.cost_ceiling", "费用上限不能为负"));
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::invalid_config("retrieval.top_k", "至少召回 1 条候选"));
        }
        self.thresholds.validate()
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str) -> AppResult<Option<T>> {
    match std::env::var(var_name) {
        Ok(value) => value.parse::<T>().map(Some).map_err(|_| {
            AppError::Config(ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            })
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].kind, ProviderKind::Simulation);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [batch]
            cost_ceiling = 2.5

            [[providers]]
            name = "primary"
            kind = "openai"
            api_key = "sk-test"
            cost_per_call = 0.01

            [[providers]]
            name = "sim"
            kind = "simulation"
            "#,
        )
        .unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.batch.cost_ceiling, 2.5);
        assert_eq!(config.batch.initial_concurrency, 4);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, ProviderKind::OpenAi);
        assert_eq!(config.providers[0].timeout_secs, 30);
        assert_eq!(config.providers[1].kind, ProviderKind::Simulation);
    }

    #[test]
    fn test_rejects_non_monotonic_thresholds() {
        let mut config = Config::default();
        config.thresholds.medium = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fill_api_key_only_touches_empty_keys() {
        let mut config = Config {
            providers: vec![
                ProviderConfig::openai(""),
                ProviderConfig::openai("sk-existing"),
                ProviderConfig::simulation("sim"),
            ],
            ..Config::default()
        };
        assert!(config.fill_api_key(ProviderKind::OpenAi, "sk-env"));
        assert_eq!(config.providers[0].api_key, "sk-env");
        assert_eq!(config.providers[1].api_key, "sk-existing");
        assert!(!config.fill_api_key(ProviderKind::Claude, "sk-ant"));
    }

    #[test]
    fn test_rejects_empty_chain() {
        let config = Config {
            providers: Vec::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
