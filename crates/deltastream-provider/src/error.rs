//! Provider error types

use deltastream_client::ClientError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Invalid provider configuration: {0}")]
    Config(String),

    #[error("failed to establish connection: {0}")]
    ContextBind(#[source] ClientError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(
        "timed out after {}s waiting for {what}{}",
        .elapsed.as_secs(),
        timeout_detail(.last_state, .status_message, .last_error)
    )]
    Timeout {
        what: String,
        elapsed: Duration,
        last_state: Option<String>,
        status_message: Option<String>,
        last_error: Option<String>,
    },

    #[error("{what} entered state {state}{}", message_suffix(.message))]
    Errored {
        what: String,
        state: String,
        message: Option<String>,
    },

    #[error("{what} was created but could not be verified: {source}")]
    PartialFailure {
        what: String,
        #[source]
        source: Box<ProviderError>,
    },

    #[error("operation cancelled while {0}")]
    Cancelled(String),

    #[error("Unsupported update: {0}")]
    Unsupported(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn message_suffix(message: &Option<String>) -> String {
    match message.as_deref().filter(|m| !m.is_empty()) {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

fn timeout_detail(
    last_state: &Option<String>,
    status_message: &Option<String>,
    last_error: &Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(state) = last_state {
        parts.push(format!("last state: {state}"));
    }
    if let Some(msg) = status_message.as_deref().filter(|m| !m.is_empty()) {
        parts.push(format!("status message: {msg}"));
    }
    if let Some(err) = last_error {
        parts.push(format!("last error: {err}"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join("; "))
    }
}

impl ProviderError {
    /// Map a failure to open a session. Missing credentials are configuration
    /// errors; everything else is passed through.
    pub fn connect(err: ClientError) -> Self {
        match err {
            ClientError::AuthConfig(msg) => Self::Config(msg),
            other => Self::Client(other),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Wrap an error raised after the remote object was created.
    pub fn partial(what: impl Into<String>, source: ProviderError) -> Self {
        Self::PartialFailure {
            what: what.into(),
            source: Box::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Client(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// True for errors worth retrying without changing inputs.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ContextBind(_) => true,
            Self::Client(e) => matches!(
                e,
                ClientError::Http(_) | ClientError::Io(_) | ClientError::Protocol(_)
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
