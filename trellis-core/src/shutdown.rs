//! 优雅关闭
//!
//! 暴露 `dyn GracefulShutdownCapable` 的 Bean 会在上下文关闭前被并发地请求停止，
//! 全部完成后才开始销毁 Bean。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;

use crate::error::ContainerResult;

/// 支持优雅关闭的 Bean
pub trait GracefulShutdownCapable: Send + Sync {
    /// 诊断日志中使用的名称
    fn shutdown_name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// 开始关闭，返回在关闭完成时结束的 future
    ///
    /// 同步返回错误或 panic 视为已完成
    fn shutdown_gracefully(&self) -> ContainerResult<BoxFuture<'static, ()>>;
}

/// 单个参与者的关闭结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Completed,
    Failed(String),
    Panicked(String),
}

/// 优雅关闭报告
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub outcomes: Vec<(String, ShutdownOutcome)>,
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| outcome == &ShutdownOutcome::Completed)
    }

    pub fn failures(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome != &ShutdownOutcome::Completed)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// 优雅关闭协调器
pub struct GracefulShutdown;

impl GracefulShutdown {
    /// 同时通知所有参与者，等待全部完成
    pub async fn shutdown_all(participants: Vec<Arc<dyn GracefulShutdownCapable>>) -> ShutdownReport {
        let started = Instant::now();
        tracing::info!("Graceful shutdown of {} participant(s)", participants.len());

        let pending = participants.into_iter().map(|participant| {
            let name = participant.shutdown_name();
            async move {
                let started = catch_unwind(AssertUnwindSafe(|| participant.shutdown_gracefully()));
                let outcome = match started {
                    Ok(Ok(future)) => match AssertUnwindSafe(future).catch_unwind().await {
                        Ok(()) => ShutdownOutcome::Completed,
                        Err(panic) => ShutdownOutcome::Panicked(panic_message(panic)),
                    },
                    Ok(Err(e)) => ShutdownOutcome::Failed(e.to_string()),
                    Err(panic) => ShutdownOutcome::Panicked(panic_message(panic)),
                };

                match &outcome {
                    ShutdownOutcome::Completed => {
                        tracing::debug!("  ├─ {} shut down", name);
                    }
                    ShutdownOutcome::Failed(message) => {
                        tracing::warn!("  ├─ {} failed to shut down: {}", name, message);
                    }
                    ShutdownOutcome::Panicked(message) => {
                        tracing::warn!("  ├─ {} panicked during shutdown: {}", name, message);
                    }
                }
                (name, outcome)
            }
        });

        let outcomes = join_all(pending).await;
        let report = ShutdownReport {
            outcomes,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Graceful shutdown finished in {}ms ({} issue(s))",
            report.elapsed.as_millis(),
            report.failures().len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContainerError;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Worker {
        stopped: Arc<AtomicBool>,
    }

    impl GracefulShutdownCapable for Worker {
        fn shutdown_name(&self) -> String {
            "worker".to_string()
        }

        fn shutdown_gracefully(&self) -> ContainerResult<BoxFuture<'static, ()>> {
            let stopped = Arc::clone(&self.stopped);
            Ok(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                stopped.store(true, Ordering::SeqCst);
            }
            .boxed())
        }
    }

    struct Broken;

    impl GracefulShutdownCapable for Broken {
        fn shutdown_name(&self) -> String {
            "broken".to_string()
        }

        fn shutdown_gracefully(&self) -> ContainerResult<BoxFuture<'static, ()>> {
            Err(ContainerError::Other(anyhow::anyhow!("queue already closed")))
        }
    }

    struct Panicking;

    impl GracefulShutdownCapable for Panicking {
        fn shutdown_name(&self) -> String {
            "panicking".to_string()
        }

        fn shutdown_gracefully(&self) -> ContainerResult<BoxFuture<'static, ()>> {
            panic!("not today")
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let stopped = Arc::new(AtomicBool::new(false));
        let participants: Vec<Arc<dyn GracefulShutdownCapable>> = vec![
            Arc::new(Broken),
            Arc::new(Worker {
                stopped: Arc::clone(&stopped),
            }),
            Arc::new(Panicking),
        ];

        let report = GracefulShutdown::shutdown_all(participants).await;

        assert!(stopped.load(Ordering::SeqCst));
        assert!(!report.is_clean());
        assert_eq!(report.failures(), vec!["broken", "panicking"]);
        assert_eq!(report.outcomes[1], ("worker".to_string(), ShutdownOutcome::Completed));
    }

    #[tokio::test]
    async fn test_empty_shutdown_is_clean() {
        let report = GracefulShutdown::shutdown_all(Vec::new()).await;
        assert!(report.is_clean());
    }
}
