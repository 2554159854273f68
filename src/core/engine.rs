use crate::domain::model::RunSummary;
use crate::domain::ports::Method;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

/// 執行一個問答方法，並在前後記錄系統資源
pub struct MethodEngine<M: Method> {
    method: M,
    monitor: SystemMonitor,
}

impl<M: Method> MethodEngine<M> {
    pub fn new(method: M) -> Self {
        Self::new_with_monitoring(method, false)
    }

    pub fn new_with_monitoring(method: M, monitor_enabled: bool) -> Self {
        Self::with_monitor(method, SystemMonitor::new(monitor_enabled))
    }

    /// 與方法共用同一個監控器，讓每輪的統計接續同一段起始時間
    pub fn with_monitor(method: M, monitor: SystemMonitor) -> Self {
        Self { method, monitor }
    }

    pub fn method(&self) -> &M {
        &self.method
    }

    pub async fn run(&self) -> Result<RunSummary> {
        tracing::info!("🚀 Starting method {}", self.method.name());
        self.monitor.log_stats("Before answering");

        let result = self.method.run().await;

        self.monitor.log_stats(&format!("After {}", self.method.name()));
        self.monitor
            .log_final_stats(result.as_ref().map(|s| s.answered).unwrap_or(0));

        let summary = result?;
        tracing::info!(
            "📁 Results written to {} after {} round(s)",
            summary.output_path,
            summary.rounds
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::SmrError;
    use async_trait::async_trait;

    struct FixedMethod {
        outcome: fn() -> Result<RunSummary>,
    }

    #[async_trait]
    impl Method for FixedMethod {
        fn name(&self) -> &str {
            "Fixed"
        }

        async fn run(&self) -> Result<RunSummary> {
            (self.outcome)()
        }
    }

    #[tokio::test]
    async fn test_engine_returns_method_summary() {
        let engine = MethodEngine::new(FixedMethod {
            outcome: || {
                Ok(RunSummary {
                    output_path: "slake_SMRAgents_a_b_results.json".to_string(),
                    rounds: 1,
                    answered: 4,
                    failed: 0,
                    remaining: 0,
                })
            },
        });

        let summary = engine.run().await.unwrap();
        assert_eq!(summary.answered, 4);
        assert_eq!(engine.method().name(), "Fixed");
    }

    #[tokio::test]
    async fn test_engine_propagates_method_errors() {
        let engine = MethodEngine::new_with_monitoring(
            FixedMethod {
                outcome: || {
                    Err(SmrError::DatasetError {
                        message: "empty".to_string(),
                    })
                },
            },
            true,
        );

        assert!(matches!(
            engine.run().await,
            Err(SmrError::DatasetError { .. })
        ));
    }
}
