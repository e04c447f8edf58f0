use std::time::Duration;

use crate::config::Config;
use crate::core::error::TransferError;

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64, // 抖动避免重试风暴
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryStrategy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay: Duration::from_secs(config.retry_delay),
            max_delay: Duration::from_secs(config.retry_max_delay),
            ..Self::default()
        }
    }

    /// `attempt` 为已经重试过的次数
    pub fn should_retry(&self, error: &TransferError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        // 先截到上限再转换，指数很大时 from_secs_f64 会溢出
        let delay_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let jitter = delay_secs * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = (delay_secs + jitter).max(0.1); // 最小延迟100ms

        Duration::try_from_secs_f64(final_delay)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
