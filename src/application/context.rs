//! Request Context
//!
//! Deadline and shutdown cancellation carried by every inbound request.

use crate::error::DatasourceError;
use crate::infrastructure::ShutdownController;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Cancellation scope of one request.
///
/// Upstream calls run through [`RequestContext::run`] and abort with
/// [`DatasourceError::Cancelled`] when the deadline passes or the server
/// starts shutting down.
#[derive(Clone)]
pub struct RequestContext {
    deadline: Instant,
    shutdown: Option<ShutdownController>,
}

impl RequestContext {
    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            shutdown: None,
        }
    }

    /// Also cancel when `controller` initiates shutdown.
    pub fn with_shutdown(mut self, controller: ShutdownController) -> Self {
        self.shutdown = Some(controller);
        self
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Drive `work` until it completes or the request is cancelled.
    pub async fn run<T, F>(&self, work: F) -> Result<T, DatasourceError>
    where
        F: Future<Output = Result<T, DatasourceError>>,
    {
        let shutdown = async {
            match &self.shutdown {
                Some(controller) => controller.wait().await,
                None => std::future::pending::<()>().await,
            }
        };

        // Cancellation wins over work that is ready in the same poll.
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(self.deadline) => {
                tracing::warn!("request deadline exceeded");
                Err(DatasourceError::Cancelled("deadline exceeded".to_string()))
            }
            _ = shutdown => {
                Err(DatasourceError::Cancelled("server is shutting down".to_string()))
            }
            result = work => result,
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("remaining", &self.remaining())
            .field("shutdown", &self.shutdown.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(1));
        let result = ctx.run(async { Ok::<_, DatasourceError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_run_passes_errors_through() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(1));
        let result: Result<(), _> = ctx
            .run(async { Err(DatasourceError::Upstream("500".to_string())) })
            .await;
        assert_eq!(result, Err(DatasourceError::Upstream("500".to_string())));
    }

    #[tokio::test]
    async fn test_deadline_cancels() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(20));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, DatasourceError>(())
            })
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_cancels() {
        let controller = ShutdownController::new();
        let ctx = RequestContext::with_timeout(Duration::from_secs(60))
            .with_shutdown(controller.clone());

        let trigger = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.shutdown();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, DatasourceError>(())
            })
            .await;
        assert_eq!(
            result,
            Err(DatasourceError::Cancelled("server is shutting down".to_string()))
        );
    }

    #[tokio::test]
    async fn test_already_shut_down_never_runs_work() {
        let controller = ShutdownController::new();
        controller.shutdown();
        let ctx = RequestContext::with_timeout(Duration::from_secs(60)).with_shutdown(controller);

        let result = ctx.run(async { Ok::<_, DatasourceError>(1) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_remaining_is_bounded_by_timeout() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let ctx = RequestContext::with_timeout(Duration::from_secs(5));
            assert!(ctx.remaining() <= Duration::from_secs(5));
        });
    }
}
