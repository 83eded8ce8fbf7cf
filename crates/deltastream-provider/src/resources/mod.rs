//! Resource controllers, one per DeltaStream object kind.

pub mod application;
pub mod database;
pub mod namespace;
pub mod object;
pub mod query;
pub mod store;

pub use application::{Application, ApplicationArgs, ApplicationState};
pub use database::{Database, DatabaseArgs, DatabaseState};
pub use namespace::{Namespace, NamespaceArgs, NamespaceState};
pub use object::{DeltaStreamObject, ObjectArgs, ObjectState};
pub use query::{Query, QueryArgs, QueryState};
pub use store::{KafkaInputs, PostgresInputs, SnowflakeInputs, Store, StoreArgs, StoreState};

use crate::error::{ProviderError, Result};
use crate::poll::PollError;
use crate::resource::CheckFailure;
use deltastream_client::{ClientError, Session};

fn now_rfc3339() -> String {
    crate::catalog::format_ts(&chrono::Utc::now())
}

fn require(failures: &mut Vec<CheckFailure>, property: &str, value: &str) {
    if value.trim().is_empty() {
        failures.push(CheckFailure::new(property, format!("{property} is required")));
    }
}

/// Swallow not-found, propagate everything else.
fn ignore_not_found(result: std::result::Result<(), ClientError>) -> Result<()> {
    match result {
        Err(err) if err.is_not_found() => {
            tracing::debug!("Object already absent: {}", err);
            Ok(())
        }
        other => other.map_err(ProviderError::from),
    }
}

/// Compensating statement after a failed create. Failures are logged only.
async fn cleanup(session: &Session, sql: String, what: &str) {
    tracing::info!("Cleaning up {} after failed create", what);
    if let Err(err) = session.exec(sql).await {
        tracing::warn!("Cleanup of {} failed: {}", what, err);
    }
}

/// Translate a poll outcome for `what` into a provider error.
fn poll_failure<T>(
    err: PollError<T>,
    what: &str,
    state_of: impl Fn(&T) -> String,
    status_message: Option<String>,
) -> ProviderError {
    match err {
        PollError::Failed(row) => ProviderError::Errored {
            what: what.to_string(),
            state: state_of(&row),
            message: status_message,
        },
        PollError::TimedOut {
            last,
            last_error,
            elapsed,
        } => ProviderError::Timeout {
            what: what.to_string(),
            elapsed,
            last_state: last.as_ref().map(&state_of),
            status_message,
            last_error,
        },
        PollError::Cancelled => ProviderError::Cancelled(format!("waiting for {what}")),
    }
}

/// Outcome of a best-effort deletion confirmation. Timeouts are logged and
/// swallowed; cancellation is still reported.
fn confirm_deleted<T>(result: std::result::Result<Option<T>, PollError<T>>, what: &str) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(PollError::Cancelled) => Err(ProviderError::Cancelled(format!(
            "waiting for {what} to be removed"
        ))),
        Err(PollError::TimedOut { elapsed, .. }) => {
            tracing::warn!(
                "{} still present after {}s, continuing with delete",
                what,
                elapsed.as_secs()
            );
            Ok(())
        }
        Err(PollError::Failed(_)) => {
            tracing::warn!("{} reported a failed state while being removed", what);
            Ok(())
        }
    }
}
