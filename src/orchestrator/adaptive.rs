//! 自适应切片大小
//!
//! 每个切片结束后根据成功率与平均耗时调整并发数与切片长度：
//! 成功率 > 0.9 且平均耗时 < 2s 时翻倍（不超过上限），
//! 成功率 < 0.7 或平均耗时 > 5s 时减半（不低于 1）

use std::time::Duration;

use crate::config::BatchConfig;

const GROW_SUCCESS_RATE: f64 = 0.9;
const GROW_MAX_LATENCY: Duration = Duration::from_secs(2);
const SHRINK_SUCCESS_RATE: f64 = 0.7;
const SHRINK_MIN_LATENCY: Duration = Duration::from_secs(5);

/// 单个切片的统计
#[derive(Debug, Clone, Default)]
pub struct SliceStats {
    pub processed: usize,
    pub succeeded: usize,
    pub total_latency: Duration,
}

impl SliceStats {
    pub fn record(&mut self, succeeded: bool, latency: Duration) {
        self.processed += 1;
        if succeeded {
            self.succeeded += 1;
        }
        self.total_latency += latency;
    }

    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.processed as f64
        }
    }

    pub fn average_latency(&self) -> Duration {
        if self.processed == 0 {
            Duration::ZERO
        } else {
            self.total_latency / self.processed as u32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Grow,
    Shrink,
    Hold,
}

/// 并发数与切片长度的调节器
#[derive(Debug, Clone)]
pub struct AdaptiveSizer {
    concurrency: usize,
    batch_size: usize,
    max_concurrency: usize,
    max_batch_size: usize,
}

impl AdaptiveSizer {
    pub fn new(concurrency: usize, batch_size: usize, config: &BatchConfig) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        let max_batch_size = config.max_batch_size.max(1);
        Self {
            concurrency: concurrency.clamp(1, max_concurrency),
            batch_size: batch_size.clamp(1, max_batch_size),
            max_concurrency,
            max_batch_size,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn adjust(&mut self, stats: &SliceStats) -> Adjustment {
        if stats.processed == 0 {
            return Adjustment::Hold;
        }

        let rate = stats.success_rate();
        let latency = stats.average_latency();

        if rate < SHRINK_SUCCESS_RATE || latency > SHRINK_MIN_LATENCY {
            self.concurrency = (self.concurrency / 2).max(1);
            self.batch_size = (self.batch_size / 2).max(1);
            Adjustment::Shrink
        } else if rate > GROW_SUCCESS_RATE && latency < GROW_MAX_LATENCY {
            self.concurrency = (self.concurrency * 2).min(self.max_concurrency);
            self.batch_size = (self.batch_size * 2).min(self.max_batch_size);
            Adjustment::Grow
        } else {
            Adjustment::Hold
        }
    }
}
