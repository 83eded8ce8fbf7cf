//! Control-plane client for the DeltaStream provider
//!
//! This crate is the seam between the reconciliation engine and the
//! DeltaStream statement endpoint. It owns the provider configuration, typed
//! SQL error codes, the [`Connection`]/[`Connector`] traits, session handling
//! and an HTTP connector built on `reqwest`.
//!
//! # Example
//!
//! ```ignore
//! use deltastream_client::{Config, ConnectionManager, HttpConnector};
//! use std::sync::Arc;
//!
//! let manager = ConnectionManager::new(Config::from_env(), Arc::new(HttpConnector::new()));
//! let session = manager.open().await?;
//! session.bind(manager.base_context(Some("sysadmin".into()))).await?;
//! let rows = session.query("LIST DATABASES;").await?;
//! ```

pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod http;
pub mod row;
pub mod sql;

pub use config::{Config, OrganizationRef};
pub use connection::{Connection, ConnectionManager, Connector, Session};
pub use context::{Attachment, SessionContext, Statement};
pub use error::{ClientError, Result, SqlState};
pub use http::HttpConnector;
pub use row::{Row, Rows};
pub use sql::{WithOptions, bool_to_sql, quote_fqn, quote_ident, quote_string};
