//! # Law Matcher
//!
//! 将考题与法规条文进行比对，输出带信心度的匹配结果和汇总报告
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Clients）
//! - `clients/` - 分析后端适配器，只暴露"文本进、文本出"的能力
//! - `Backend` - 统一契约（OpenAI 兼容 / Claude / 确定性模拟器）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `CandidateRetriever` - 候选法条检索能力
//! - `RetryController` - 重试与降级能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的完整匹配流程
//! - `QuestionCtx` - 上下文封装（题目序号 + 编号）
//! - `MatchingEngine` - 流程编排（校验 → 提示词 → 调用 → 解析）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量编排器，管理并发、费用与检查点
//! - `report/` - 结果汇总
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod report;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use clients::{build_backend, build_chain, Backend, BackendInfo};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{AnalysisResult, BatchRun, ConfidenceLevel, ExamQuestion, LawArticle};
pub use orchestrator::BatchOrchestrator;
pub use report::{aggregate, aggregate_run, Report};
pub use services::{ArticleIndex, CandidateRetriever, RetryController};
pub use workflow::{MatchingEngine, QuestionCtx};
