//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量编排器
//! - 按切片派发题目，控制并发数量（Semaphore）
//! - 费用上限与低价降级
//! - 唯一修改 `BatchRun` 的地方
//!
//! ### `adaptive` - 自适应调节
//! - 根据切片成功率与平均耗时调整并发数和切片长度
//!
//! ### `checkpoint` - 检查点
//! - 每个切片结束后保存 `BatchRun`，中断后可继续
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<ExamQuestion>)
//!     ↓
//! workflow::MatchingEngine (处理单道题目)
//!     ↓
//! services (能力层：候选检索 / 重试降级)
//!     ↓
//! clients (基础设施：分析后端)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一写入点**：工作任务只返回结果，协调循环负责写入
//! 2. **向下依赖**：编排层 → workflow → services → clients
//! 3. **无业务逻辑**：只做调度和统计，不做具体匹配判断

pub mod adaptive;
pub mod batch_processor;
pub mod checkpoint;

// 重新导出主要类型
pub use adaptive::{AdaptiveSizer, Adjustment, SliceStats};
pub use batch_processor::BatchOrchestrator;
pub use checkpoint::CheckpointStore;
