use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Restart budget for a supervised task.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub max_restarts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Run `task` until it completes cleanly, restarting it with exponential
/// backoff when it errors. Once the restart budget is exhausted the last
/// error is returned instead of retrying forever.
pub async fn supervise<F, Fut>(
    name: &str,
    settings: SupervisorSettings,
    cancel: CancellationToken,
    mut task: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut restarts = 0u32;
    let mut backoff = settings.initial_backoff;

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            outcome = task() => outcome,
        };

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) => {
                if restarts >= settings.max_restarts {
                    tracing::error!(
                        task = name,
                        error = %e,
                        restarts,
                        "restart budget exhausted, giving up"
                    );
                    return Err(e);
                }
                restarts += 1;
                tracing::warn!(
                    task = name,
                    error = %e,
                    restarts,
                    backoff_ms = backoff.as_millis() as u64,
                    "task failed, restarting"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(settings.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_settings(max_restarts: u32) -> SupervisorSettings {
        SupervisorSettings {
            max_restarts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_clean_exit_is_not_restarted() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();

        supervise("t", fast_settings(5), CancellationToken::new(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restarts_until_success() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();

        supervise("t", fast_settings(5), CancellationToken::new(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow!("transient"))
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_error() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();

        let result = supervise("t", fast_settings(2), CancellationToken::new(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("permanent"))
            }
        })
        .await;

        assert!(result.is_err());
        // Initial run plus two restarts.
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_stops_restarting() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let settings = SupervisorSettings {
            max_restarts: u32::MAX,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(5),
        };
        let result = supervise("t", settings, cancel, || async {
            Err(anyhow!("always failing"))
        })
        .await;

        // Cancellation is a clean stop, not an error.
        assert!(result.is_ok());
    }
}
