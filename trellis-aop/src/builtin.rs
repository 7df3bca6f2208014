//! 内置通知
//!
//! 三个内置通知会通过 inventory 注册到对应的绑定名称下：
//!
//! | 绑定 | 通知 |
//! |------|------|
//! | `logged` | [`LoggingAdvice`] |
//! | `timed` | [`PerformanceAdvice`]，绑定属性 `threshold_ms` 可覆盖阈值 |
//! | `errorLogged` | [`ErrorLoggingAdvice`] |

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::advice::{Advice, AdviceInterceptor, JoinPoint};
use crate::error_info::ErrorInfo;

pub const LOGGED_BINDING: &str = "logged";
pub const TIMED_BINDING: &str = "timed";
pub const ERROR_LOGGED_BINDING: &str = "errorLogged";

/// 记录方法进入和退出
#[derive(Debug, Default)]
pub struct LoggingAdvice;

impl Advice for LoggingAdvice {
    fn name(&self) -> &str {
        "LoggingAdvice"
    }

    fn order(&self) -> i32 {
        -100
    }

    fn before(&self, join_point: &JoinPoint) -> anyhow::Result<()> {
        tracing::info!("→ Entering: {}", join_point.signature());
        Ok(())
    }

    fn after_returning(&self, join_point: &JoinPoint, _result: &(dyn Any + Send)) {
        tracing::debug!("  ├─ {} returned normally", join_point.signature());
    }

    fn after(&self, join_point: &JoinPoint) {
        tracing::info!("← Exiting: {} (took {:?})", join_point.signature(), join_point.elapsed());
    }
}

/// 慢方法告警
#[derive(Debug)]
pub struct PerformanceAdvice {
    threshold: Duration,
    slow_calls: AtomicU64,
}

impl PerformanceAdvice {
    pub const DEFAULT_THRESHOLD: Duration = Duration::from_millis(1000);
    pub const THRESHOLD_ATTRIBUTE: &'static str = "threshold_ms";

    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            slow_calls: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// 超过阈值的调用次数
    pub fn slow_calls(&self) -> u64 {
        self.slow_calls.load(Ordering::Relaxed)
    }

    fn threshold_for(&self, join_point: &JoinPoint) -> Duration {
        join_point
            .attribute(Self::THRESHOLD_ATTRIBUTE)
            .and_then(|v| v.as_i64())
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis)
            .unwrap_or(self.threshold)
    }
}

impl Default for PerformanceAdvice {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl Advice for PerformanceAdvice {
    fn name(&self) -> &str {
        "PerformanceAdvice"
    }

    fn order(&self) -> i32 {
        -50
    }

    fn after(&self, join_point: &JoinPoint) {
        let elapsed = join_point.elapsed();
        let threshold = self.threshold_for(join_point);
        if elapsed > threshold {
            self.slow_calls.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "Slow method detected: {} took {}ms (threshold: {}ms)",
                join_point.signature(),
                elapsed.as_millis(),
                threshold.as_millis()
            );
        }
    }
}

/// 记录方法抛出的错误及其源链
#[derive(Debug, Default)]
pub struct ErrorLoggingAdvice;

impl Advice for ErrorLoggingAdvice {
    fn name(&self) -> &str {
        "ErrorLoggingAdvice"
    }

    fn after_throwing(&self, join_point: &JoinPoint, error: &ErrorInfo) {
        tracing::error!(
            "Exception in {}: {}",
            join_point.signature(),
            error.full_description()
        );
    }
}

crate::submit_interceptor!(LOGGED_BINDING, AdviceInterceptor<LoggingAdvice>);
crate::submit_interceptor!(TIMED_BINDING, AdviceInterceptor<PerformanceAdvice>);
crate::submit_interceptor!(ERROR_LOGGED_BINDING, AdviceInterceptor<ErrorLoggingAdvice>);
