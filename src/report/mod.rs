//! 报告层：把批量结果归约为可供外部渲染的统计报告

pub mod aggregator;

pub use aggregator::{aggregate, aggregate_run, ArticleCount, BucketCount, Report};
