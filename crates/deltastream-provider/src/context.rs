//! Per-call provider context: connection manager, poll settings and
//! cancellation.

use crate::error::{ProviderError, Result};
use deltastream_client::{Config, ConnectionManager, Connector, Session, SessionContext};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const STORE_READY_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const STORE_READY_INTERVAL: Duration = Duration::from_secs(5);
pub const STORE_DROP_TIMEOUT: Duration = Duration::from_secs(60);
pub const STORE_DROP_INTERVAL: Duration = Duration::from_secs(5);
pub const QUERY_RUNNING_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const QUERY_RUNNING_INTERVAL: Duration = Duration::from_secs(5);
pub const QUERY_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const QUERY_TERMINATE_INTERVAL: Duration = Duration::from_secs(5);
pub const RELATION_READY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const RELATION_READY_INTERVAL: Duration = Duration::from_secs(5);
pub const RELATION_DROP_TIMEOUT: Duration = Duration::from_secs(60);
pub const RELATION_DROP_INTERVAL: Duration = Duration::from_secs(3);

/// Fixed-interval polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSpec {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Poll budgets for every asynchronous transition the controllers wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub store_ready: PollSpec,
    pub store_drop: PollSpec,
    pub query_running: PollSpec,
    pub query_terminate: PollSpec,
    pub relation_ready: PollSpec,
    pub relation_drop: PollSpec,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            store_ready: PollSpec::new(STORE_READY_INTERVAL, STORE_READY_TIMEOUT),
            store_drop: PollSpec::new(STORE_DROP_INTERVAL, STORE_DROP_TIMEOUT),
            query_running: PollSpec::new(QUERY_RUNNING_INTERVAL, QUERY_RUNNING_TIMEOUT),
            query_terminate: PollSpec::new(QUERY_TERMINATE_INTERVAL, QUERY_TERMINATE_TIMEOUT),
            relation_ready: PollSpec::new(RELATION_READY_INTERVAL, RELATION_READY_TIMEOUT),
            relation_drop: PollSpec::new(RELATION_DROP_INTERVAL, RELATION_DROP_TIMEOUT),
        }
    }
}

impl PollSettings {
    /// Same budget for every transition.
    pub fn uniform(interval: Duration, timeout: Duration) -> Self {
        let spec = PollSpec::new(interval, timeout);
        Self {
            store_ready: spec,
            store_drop: spec,
            query_running: spec,
            query_terminate: spec,
            relation_ready: spec,
            relation_drop: spec,
        }
    }
}

/// Everything a lifecycle operation needs besides its own inputs.
#[derive(Clone)]
pub struct ProviderContext {
    manager: ConnectionManager,
    pub poll: PollSettings,
    pub cancel: CancellationToken,
}

impl ProviderContext {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self {
            manager: ConnectionManager::new(config, connector),
            poll: PollSettings::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Config {
        self.manager.config()
    }

    /// Owner if set, otherwise the provider role.
    pub fn effective_role(&self, owner: Option<&str>) -> Option<String> {
        self.config().effective_role(owner)
    }

    /// Open a session bound to the configured organization and `role`.
    pub async fn connect(&self, role: Option<String>) -> Result<Session> {
        let session = self.manager.open().await.map_err(ProviderError::connect)?;
        session
            .bind(self.manager.base_context(role))
            .await
            .map_err(ProviderError::ContextBind)?;
        Ok(session)
    }

    /// Open a session acting as `owner` (or the provider role).
    pub async fn connect_as(&self, owner: Option<&str>) -> Result<Session> {
        self.connect(self.effective_role(owner)).await
    }

    /// Rebind `session` with name resolution scoped to a database, schema
    /// and store, keeping organization and role.
    pub async fn scope(
        &self,
        session: &Session,
        database: &str,
        schema: &str,
        store: &str,
    ) -> Result<()> {
        let ctx: SessionContext = session.context().scoped(database, schema, store);
        session.bind(ctx).await.map_err(ProviderError::ContextBind)
    }
}
