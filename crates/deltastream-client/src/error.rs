//! DeltaStream client error types

use std::fmt;
use thiserror::Error;

/// SQL state codes returned by the control plane.
///
/// Only the "object does not exist" family is modelled explicitly. Every
/// other code is carried verbatim in [`SqlState::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlState {
    InvalidDatabase,
    InvalidSchema,
    InvalidStore,
    InvalidRelation,
    InvalidQuery,
    Other(String),
}

impl SqlState {
    pub const SUCCESS: &'static str = "00000";

    pub fn from_code(code: &str) -> Self {
        match code {
            "3D018" => Self::InvalidDatabase,
            "3F018" => Self::InvalidSchema,
            "3D022" => Self::InvalidStore,
            "42P01" => Self::InvalidRelation,
            "42P20" => Self::InvalidQuery,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::InvalidDatabase => "3D018",
            Self::InvalidSchema => "3F018",
            Self::InvalidStore => "3D022",
            Self::InvalidRelation => "42P01",
            Self::InvalidQuery => "42P20",
            Self::Other(code) => code,
        }
    }

    pub fn is_not_found(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid provider configuration: {0}")]
    AuthConfig(String),

    #[error("SQL error {state}: {message}")]
    Sql { state: SqlState, message: String },

    #[error("query returned no rows")]
    NoRows,

    #[error("Column error: {0}")]
    Column(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn sql(state: SqlState, message: impl Into<String>) -> Self {
        Self::Sql {
            state,
            message: message.into(),
        }
    }

    /// The SQL state carried by this error, if any.
    pub fn sql_state(&self) -> Option<&SqlState> {
        match self {
            Self::Sql { state, .. } => Some(state),
            _ => None,
        }
    }

    /// True when the control plane reported that the object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.sql_state().is_some_and(SqlState::is_not_found)
    }

    /// True when this error carries exactly `state`.
    pub fn is_state(&self, state: &SqlState) -> bool {
        self.sql_state() == Some(state)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
