//! Readiness poller
//!
//! Turns the control plane's asynchronous provisioning into a blocking
//! wait. Lookups run immediately and then on a fixed interval until the
//! observed row reaches a terminal status, the deadline passes or the
//! operation is cancelled.

use crate::context::PollSpec;
use deltastream_client::ClientError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a "not found" lookup error is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Waiting for an object to appear. Not found means "not yet".
    Creation,
    /// Waiting for an object to disappear. Not found means done.
    Deletion,
}

/// Classification of one observed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug)]
pub enum PollError<T> {
    /// The row reached a terminal failure status.
    Failed(T),
    TimedOut {
        last: Option<T>,
        last_error: Option<String>,
        elapsed: Duration,
    },
    Cancelled,
}

/// Poll `lookup` until `classify` reports a terminal status.
///
/// Returns `Ok(Some(row))` on success, or `Ok(None)` when a deletion poll
/// observes the object as gone. Lookup errors other than not-found are kept
/// as the last error and only reported if the deadline expires.
pub async fn poll_until<T, F, Fut, C>(
    cancel: &CancellationToken,
    spec: PollSpec,
    mode: PollMode,
    mut lookup: F,
    classify: C,
) -> Result<Option<T>, PollError<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
    C: Fn(&T) -> PollStatus,
{
    let started = Instant::now();
    let mut last: Option<T> = None;
    let mut last_error: Option<String> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        match lookup().await {
            Ok(row) => match classify(&row) {
                PollStatus::Ready => return Ok(Some(row)),
                PollStatus::Failed => return Err(PollError::Failed(row)),
                PollStatus::Pending => last = Some(row),
            },
            Err(err) if err.is_not_found() => match mode {
                PollMode::Deletion => return Ok(None),
                PollMode::Creation => {
                    tracing::debug!("Object not visible yet: {}", err);
                }
            },
            Err(err) => {
                tracing::debug!("Poll lookup failed: {}", err);
                last_error = Some(err.to_string());
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= spec.timeout {
            return Err(PollError::TimedOut {
                last,
                last_error,
                elapsed,
            });
        }

        let wait = spec.interval.min(spec.timeout - elapsed);
        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltastream_client::SqlState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> PollSpec {
        PollSpec::new(Duration::from_millis(1), Duration::from_millis(200))
    }

    fn not_found() -> ClientError {
        ClientError::sql(SqlState::InvalidStore, "store does not exist")
    }

    fn by_state(state: &&'static str) -> PollStatus {
        match *state {
            "ready" => PollStatus::Ready,
            "errored" => PollStatus::Failed,
            _ => PollStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_creation_tolerates_not_found() {
        let calls = AtomicUsize::new(0);
        let result = poll_until(
            &CancellationToken::new(),
            fast(),
            PollMode::Creation,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 { Err(not_found()) } else { Ok("ready") }
                }
            },
            by_state,
        )
        .await;
        assert!(matches!(result, Ok(Some("ready"))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_deletion_not_found_is_immediate_success() {
        let calls = AtomicUsize::new(0);
        let result = poll_until(
            &CancellationToken::new(),
            fast(),
            PollMode::Deletion,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<&'static str, _>(not_found()) }
            },
            by_state,
        )
        .await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminal_failure() {
        let result = poll_until(
            &CancellationToken::new(),
            fast(),
            PollMode::Creation,
            || async { Ok("errored") },
            by_state,
        )
        .await;
        assert!(matches!(result, Err(PollError::Failed("errored"))));
    }

    #[tokio::test]
    async fn test_timeout_reports_last_error() {
        let spec = PollSpec::new(Duration::from_millis(2), Duration::from_millis(20));
        let result = poll_until(
            &CancellationToken::new(),
            spec,
            PollMode::Creation,
            || async {
                Err::<&'static str, _>(ClientError::Protocol("bad gateway".into()))
            },
            by_state,
        )
        .await;
        match result {
            Err(PollError::TimedOut {
                last, last_error, ..
            }) => {
                assert!(last.is_none());
                assert!(last_error.unwrap().contains("bad gateway"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_keeps_last_row() {
        let spec = PollSpec::new(Duration::from_millis(2), Duration::from_millis(20));
        let result = poll_until(
            &CancellationToken::new(),
            spec,
            PollMode::Creation,
            || async { Ok("creating") },
            by_state,
        )
        .await;
        assert!(matches!(
            result,
            Err(PollError::TimedOut {
                last: Some("creating"),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let spec = PollSpec::new(Duration::from_secs(60), Duration::from_secs(600));
        let handle = tokio::spawn(async move {
            poll_until(&cancel, spec, PollMode::Creation, || async { Ok("creating") }, by_state)
                .await
        });
        trigger.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(PollError::Cancelled)));
    }
}
