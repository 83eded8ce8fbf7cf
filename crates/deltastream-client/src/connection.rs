//! Connection manager and session handle
//!
//! A [`Connector`] turns provider configuration into a live [`Connection`].
//! Every lifecycle call opens its own [`Session`], binds organization and role
//! onto it, and closes it when the session is dropped.

use crate::config::Config;
use crate::context::{SessionContext, Statement};
use crate::error::{ClientError, Result};
use crate::row::{Row, Rows};
use async_trait::async_trait;
use std::sync::Arc;

/// A single authenticated channel to the control plane.
#[async_trait]
pub trait Connection: Send + Sync {
    fn context(&self) -> SessionContext;

    fn set_context(&self, context: SessionContext);

    /// Round-trip to the server using the current context.
    async fn ping(&self) -> Result<()>;

    async fn exec(&self, statement: &Statement) -> Result<()>;

    async fn query(&self, statement: &Statement) -> Result<Rows>;

    /// Release the connection. Must be idempotent.
    fn close(&self);
}

/// Factory for connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &Config) -> Result<Box<dyn Connection>>;
}

/// Opens sessions against one provider configuration.
#[derive(Clone)]
pub struct ConnectionManager {
    config: Config,
    connector: Arc<dyn Connector>,
}

impl ConnectionManager {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate configuration and open an unbound session.
    pub async fn open(&self) -> Result<Session> {
        if self.config.server.as_deref().is_none_or(str::is_empty) {
            return Err(ClientError::AuthConfig("server is required".into()));
        }
        if self.config.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ClientError::AuthConfig("apiKey is required".into()));
        }
        let conn = self.connector.connect(&self.config).await?;
        tracing::debug!("DeltaStream connection initialized");
        Ok(Session::new(conn))
    }

    /// Context carrying the configured organization and the given role.
    pub fn base_context(&self, role: Option<String>) -> SessionContext {
        SessionContext {
            organization: self.config.organization_ref(),
            role,
            ..Default::default()
        }
    }
}

/// Session-scoped connection handle, closed on drop.
pub struct Session {
    conn: Box<dyn Connection>,
}

impl Session {
    pub fn new(conn: Box<dyn Connection>) -> Self {
        Self { conn }
    }

    pub fn context(&self) -> SessionContext {
        self.conn.context()
    }

    /// Apply `context` and verify it with a ping.
    pub async fn bind(&self, context: SessionContext) -> Result<()> {
        tracing::debug!(
            "Binding session context (role: {:?}, database: {:?}, schema: {:?})",
            context.role,
            context.database,
            context.schema
        );
        self.conn.set_context(context);
        self.conn.ping().await
    }

    pub async fn exec(&self, statement: impl Into<Statement>) -> Result<()> {
        let statement = statement.into();
        tracing::debug!("exec: {}", statement.log_text());
        self.conn.exec(&statement).await
    }

    pub async fn query(&self, statement: impl Into<Statement>) -> Result<Rows> {
        let statement = statement.into();
        tracing::debug!("query: {}", statement.log_text());
        self.conn.query(&statement).await
    }

    /// First row of the result; an empty result is [`ClientError::NoRows`].
    pub async fn query_row(&self, statement: impl Into<Statement>) -> Result<Row> {
        self.query(statement).await?.first()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.conn.close();
    }
}
