//! HTTP implementation of [`Connector`]
//!
//! Statements are POSTed to `{server}/statements` with bearer authentication.
//! A statement carrying attachments is sent as `multipart/form-data` with the
//! request JSON in a `request` part and one part per attachment.

use crate::config::{Config, OrganizationRef};
use crate::connection::{Connection, Connector};
use crate::context::{SessionContext, Statement};
use crate::error::{ClientError, Result, SqlState};
use crate::row::Rows;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const USER_AGENT: &str = "deltastream-provider";
const MAX_ERROR_DETAIL: usize = 256;

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl HttpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, config: &Config) -> Result<Box<dyn Connection>> {
        let server = config
            .server
            .as_deref()
            .ok_or_else(|| ClientError::AuthConfig("server is required".into()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ClientError::AuthConfig("apiKey is required".into()))?;

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .user_agent(user_agent(config.session_id.as_deref()))
            .build()?;

        Ok(Box::new(HttpConnection {
            client,
            base_url: server.trim_end_matches('/').to_string(),
            api_key,
            session_id: config.session_id.clone(),
            context: Mutex::new(SessionContext::default()),
            closed: AtomicBool::new(false),
        }))
    }
}

fn user_agent(session_id: Option<&str>) -> String {
    match session_id.filter(|s| !s.is_empty()) {
        Some(id) => format!("{USER_AGENT} session/{id}"),
        None => USER_AGENT.to_string(),
    }
}

pub struct HttpConnection {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    session_id: Option<String>,
    context: Mutex<SessionContext>,
    closed: AtomicBool,
}

impl HttpConnection {
    fn current_context(&self) -> SessionContext {
        match self.context.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Protocol("connection is closed".into()));
        }
        Ok(())
    }

    async fn submit(&self, statement: &Statement) -> Result<ResultSet> {
        self.ensure_open()?;
        let body = StatementRequest::new(statement, &self.current_context(), self.session_id.as_deref());
        let url = format!("{}/statements", self.base_url);

        let request = self.client.post(&url).bearer_auth(&self.api_key);
        let request = if statement.attachments.is_empty() {
            request.json(&body)
        } else {
            let mut form = Form::new().text("request", serde_json::to_string(&body)?);
            for attachment in &statement.attachments {
                form = form.part(
                    attachment.name.clone(),
                    Part::bytes(attachment.data.clone()).file_name(attachment.name.clone()),
                );
            }
            request.multipart(form)
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let result: ResultSet = serde_json::from_str(&text).map_err(|_| {
            ClientError::Protocol(format!(
                "unexpected response (HTTP {status}): {}",
                error_detail(&text)
            ))
        })?;

        if result.sql_state != SqlState::SUCCESS {
            return Err(ClientError::sql(
                SqlState::from_code(&result.sql_state),
                result.message.clone().unwrap_or_default(),
            ));
        }
        if !status.is_success() {
            return Err(ClientError::Protocol(format!(
                "HTTP {status}: {}",
                error_detail(&text)
            )));
        }
        Ok(result)
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn context(&self) -> SessionContext {
        self.current_context()
    }

    fn set_context(&self, context: SessionContext) {
        match self.context.lock() {
            Ok(mut guard) => *guard = context,
            Err(poisoned) => *poisoned.into_inner() = context,
        }
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        let url = format!("{}/version", self.base_url);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Protocol(format!(
                "ping failed (HTTP {status}): {}",
                error_detail(&body)
            )));
        }
        Ok(())
    }

    async fn exec(&self, statement: &Statement) -> Result<()> {
        self.submit(statement).await.map(|_| ())
    }

    async fn query(&self, statement: &Statement) -> Result<Rows> {
        Ok(self.submit(statement).await?.into_rows())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============ Wire Types ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatementRequest<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<String>,
    #[serde(rename = "sessionID", skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

impl<'a> StatementRequest<'a> {
    fn new(statement: &'a Statement, ctx: &SessionContext, session_id: Option<&'a str>) -> Self {
        let (organization_id, organization_name) = match &ctx.organization {
            Some(OrganizationRef::Id(id)) => (Some(id.to_string()), None),
            Some(OrganizationRef::Name(name)) => (None, Some(name.clone())),
            None => (None, None),
        };
        Self {
            statement: &statement.sql,
            organization_id,
            organization_name,
            role: ctx.role.clone(),
            database: ctx.database.clone(),
            schema: ctx.schema.clone(),
            store: ctx.store.clone(),
            session_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSet {
    sql_state: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    metadata: Option<ResultMetadata>,
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ResultMetadata {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
struct ColumnInfo {
    name: String,
}

impl ResultSet {
    fn into_rows(self) -> Rows {
        let columns = self
            .metadata
            .map(|m| m.columns.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();
        let data = self
            .data
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect();
        Rows::new(columns, data)
    }
}

/// The server's `message` field when the body carries one, otherwise a
/// bounded prefix of the raw body.
fn error_detail(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    let detail = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { message: Some(message) }) => message,
        _ => body.trim().to_string(),
    };
    match detail.char_indices().nth(MAX_ERROR_DETAIL) {
        Some((end, _)) => format!("{}... ({} bytes)", &detail[..end], detail.len()),
        None => detail,
    }
}

fn cell_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent() {
        assert_eq!(user_agent(None), "deltastream-provider");
        assert_eq!(user_agent(Some("")), "deltastream-provider");
        assert_eq!(
            user_agent(Some("abc-123")),
            "deltastream-provider session/abc-123"
        );
    }

    #[test]
    fn test_request_body_carries_context() {
        let stmt = Statement::new("SELECT 1;");
        let ctx = SessionContext {
            organization: Some(OrganizationRef::Name("acme".into())),
            role: Some("sysadmin".into()),
            ..Default::default()
        };
        let body = serde_json::to_value(StatementRequest::new(&stmt, &ctx, Some("s1"))).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "statement": "SELECT 1;",
                "organizationName": "acme",
                "role": "sysadmin",
                "sessionID": "s1"
            })
        );
    }

    #[test]
    fn test_result_set_rows() {
        let rs: ResultSet = serde_json::from_str(
            r#"{
                "sqlState": "00000",
                "metadata": {"columns": [{"name": "name"}, {"name": "version"}, {"name": "owner"}]},
                "data": [["q1", 2, null]]
            }"#,
        )
        .unwrap();
        let row = rs.into_rows().first().unwrap();
        assert_eq!(row.get_str("name").unwrap(), "q1");
        assert_eq!(row.get_opt_i64("version").unwrap(), Some(2));
        assert_eq!(row.get_opt_str("owner").unwrap(), None);
    }

    #[test]
    fn test_error_detail_is_bounded() {
        assert_eq!(
            error_detail(r#"{"message": "rate limited", "trace": "abc"}"#),
            "rate limited"
        );
        assert_eq!(error_detail("  bad gateway \n"), "bad gateway");

        let page = format!("<html>{}</html>", "x".repeat(4096));
        let detail = error_detail(&page);
        assert!(detail.starts_with("<html>xxx"));
        assert!(detail.ends_with(&format!("... ({} bytes)", page.len())));
        assert!(detail.len() < MAX_ERROR_DETAIL + 32);

        let wide = "é".repeat(MAX_ERROR_DETAIL + 1);
        assert!(error_detail(&wide).starts_with(&"é".repeat(MAX_ERROR_DETAIL)));
    }

    #[tokio::test]
    async fn test_connect_requires_server() {
        let result = HttpConnector::new().connect(&Config::default()).await;
        assert!(matches!(result, Err(ClientError::AuthConfig(_))));
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_statements() {
        let config = Config {
            server: Some("https://api.example.invalid/v2/".into()),
            api_key: Some("token".into()),
            ..Default::default()
        };
        let conn = HttpConnector::new().connect(&config).await.unwrap();
        conn.close();
        conn.close();
        let err = conn.exec(&Statement::new("SELECT 1;")).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
