/*!
 * Utility functions and helpers for relayflow.
 */
use std::future::Future;

use tracing::{debug, warn, Instrument, Span};

/// Spawn a task in `span` and log how it ends
///
/// # Arguments
///
/// * `name` - A name for the task (for logging)
/// * `span` - The span the task runs in
/// * `fut` - The future to run
pub fn spawn_and_log<F, T, E>(name: &str, span: Span, fut: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let task_name = name.to_string();
    tokio::spawn(
        async move {
            match fut.await {
                Ok(_) => {
                    debug!("Task '{}' completed successfully", task_name);
                }
                Err(e) => {
                    warn!("Task '{}' failed: {}", task_name, e);
                }
            }
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test_log::test(tokio::test)]
    async fn test_spawn_and_log_completes_on_error() {
        let handle = spawn_and_log("failing", Span::none(), async {
            Err::<(), _>(Error::other("intentional"))
        });
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_spawn_and_log_runs_future() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        spawn_and_log("ok", Span::none(), async move {
            tx.send(42).map_err(|_| Error::other("receiver gone"))
        })
        .await
        .unwrap();
        assert_eq!(rx.await.unwrap(), 42);
    }
}
