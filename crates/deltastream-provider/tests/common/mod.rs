use async_trait::async_trait;
use deltastream_client::{
    ClientError, Config, Connection, Connector, Result, Rows, SessionContext, SqlState, Statement,
};
use deltastream_provider::{PollSettings, ProviderContext};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[allow(dead_code)]
pub const TS: &str = "2024-05-01 10:20:30";

/// Canned answer for a matched statement.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Reply {
    Ok,
    Rows(Vec<String>, Vec<Vec<Option<String>>>),
    SqlError(SqlState, String),
    Protocol(String),
}

impl Reply {
    fn into_exec(self) -> Result<()> {
        match self {
            Reply::Ok | Reply::Rows(..) => Ok(()),
            Reply::SqlError(state, msg) => Err(ClientError::sql(state, msg)),
            Reply::Protocol(msg) => Err(ClientError::Protocol(msg)),
        }
    }

    fn into_query(self) -> Result<Rows> {
        match self {
            Reply::Ok => Ok(Rows::empty()),
            Reply::Rows(columns, data) => Ok(Rows::new(columns, data)),
            Reply::SqlError(state, msg) => Err(ClientError::sql(state, msg)),
            Reply::Protocol(msg) => Err(ClientError::Protocol(msg)),
        }
    }
}

struct Rule {
    needle: String,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
struct Script {
    rules: Vec<Rule>,
    statements: Vec<String>,
    attachments: Vec<(String, Vec<u8>)>,
    contexts: Vec<SessionContext>,
}

impl Script {
    /// First rule whose needle occurs in `sql`. The last queued reply of a
    /// rule keeps answering once the others are used up.
    fn reply(&mut self, sql: &str) -> Option<Reply> {
        let rule = self.rules.iter_mut().find(|r| sql.contains(&r.needle))?;
        if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        }
    }
}

/// In-memory control plane answering statements from a script.
///
/// Unmatched `exec` succeeds, unmatched `query` returns no rows (which the
/// catalog reports as not-found).
#[derive(Clone, Default)]
pub struct FakeConnector {
    script: Arc<Mutex<Script>>,
}

#[allow(dead_code)]
impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, needle: &str, replies: Vec<Reply>) -> &Self {
        self.script.lock().unwrap().rules.push(Rule {
            needle: needle.to_string(),
            replies: replies.into(),
        });
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.script.lock().unwrap().statements.clone()
    }

    pub fn attachments(&self) -> Vec<(String, Vec<u8>)> {
        self.script.lock().unwrap().attachments.clone()
    }

    /// Every context the provider bound, in order.
    pub fn contexts(&self) -> Vec<SessionContext> {
        self.script.lock().unwrap().contexts.clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.statements().iter().position(|s| s.contains(needle))
    }

    pub fn ctx(&self) -> ProviderContext {
        ProviderContext::new(config(), Arc::new(self.clone())).with_poll_settings(
            PollSettings::uniform(Duration::from_millis(1), Duration::from_millis(200)),
        )
    }
}

struct FakeConnection {
    script: Arc<Mutex<Script>>,
    context: Mutex<SessionContext>,
}

#[async_trait]
impl Connection for FakeConnection {
    fn context(&self) -> SessionContext {
        self.context.lock().unwrap().clone()
    }

    fn set_context(&self, context: SessionContext) {
        self.script.lock().unwrap().contexts.push(context.clone());
        *self.context.lock().unwrap() = context;
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn exec(&self, statement: &Statement) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        script.statements.push(statement.sql.clone());
        for a in &statement.attachments {
            script.attachments.push((a.name.clone(), a.data.clone()));
        }
        match script.reply(&statement.sql) {
            Some(reply) => reply.into_exec(),
            None => Ok(()),
        }
    }

    async fn query(&self, statement: &Statement) -> Result<Rows> {
        let mut script = self.script.lock().unwrap();
        script.statements.push(statement.sql.clone());
        match script.reply(&statement.sql) {
            Some(reply) => reply.into_query(),
            None => Ok(Rows::empty()),
        }
    }

    fn close(&self) {}
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _config: &Config) -> Result<Box<dyn Connection>> {
        Ok(Box::new(FakeConnection {
            script: Arc::clone(&self.script),
            context: Mutex::new(SessionContext::default()),
        }))
    }
}

pub fn config() -> Config {
    Config {
        server: Some("https://api.example.invalid/v2".into()),
        api_key: Some("test-token".into()),
        organization: Some("acme".into()),
        role: Some("sysadmin".into()),
        ..Default::default()
    }
}

// ============ Row builders ============

fn rows(columns: &[&str], data: Vec<Vec<Option<&str>>>) -> Reply {
    Reply::Rows(
        columns.iter().map(|c| c.to_string()).collect(),
        data.into_iter()
            .map(|row| row.into_iter().map(|v| v.map(str::to_string)).collect())
            .collect(),
    )
}

#[allow(dead_code)]
pub fn not_found(state: SqlState) -> Reply {
    Reply::SqlError(state, "object does not exist".into())
}

#[allow(dead_code)]
pub fn store_row(store_type: &str, status: &str) -> Reply {
    rows(
        &["type", "status", "owner", "created_at", "updated_at"],
        vec![vec![
            Some(store_type),
            Some(status),
            Some("sysadmin"),
            Some(TS),
            Some(TS),
        ]],
    )
}

#[allow(dead_code)]
pub fn status_message(message: &str) -> Reply {
    rows(&["status_message"], vec![vec![Some(message)]])
}

#[allow(dead_code)]
pub fn database_row(owner: &str) -> Reply {
    rows(&["owner", "created_at"], vec![vec![Some(owner), Some(TS)]])
}

#[allow(dead_code)]
pub fn database_rows(count: usize) -> Reply {
    let names: Vec<String> = (0..count).map(|i| format!("db_{i:03}")).collect();
    rows(
        &["name", "owner", "created_at"],
        names
            .iter()
            .map(|n| vec![Some(n.as_str()), Some("sysadmin"), Some(TS)])
            .collect(),
    )
}

#[allow(dead_code)]
pub fn relation_row(name: &str, relation_type: &str, state: &str) -> Reply {
    rows(
        &["name", "fqn", "relation_type", "owner", "state", "created_at", "updated_at"],
        vec![vec![
            Some(name),
            None,
            Some(relation_type),
            Some("sysadmin"),
            Some(state),
            Some(TS),
            Some(TS),
        ]],
    )
}

#[allow(dead_code)]
pub fn query_row(name: &str, state: &str) -> Reply {
    rows(
        &["name", "version", "current_state", "owner", "created_at", "updated_at"],
        vec![vec![
            Some(name),
            Some("1"),
            Some(state),
            Some("sysadmin"),
            Some(TS),
            Some(TS),
        ]],
    )
}

/// `DESCRIBE` answer: statement kind plus plan JSON.
#[allow(dead_code)]
pub fn describe(kind: &str, plan: serde_json::Value) -> Reply {
    let plan = plan.to_string();
    rows(&["type", "plan"], vec![vec![Some(kind), Some(plan.as_str())]])
}

/// Planned relation as the planner reports it.
#[allow(dead_code)]
pub fn planned(db: &str, schema: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "db_name": db,
        "schema_name": schema,
        "name": name,
        "fqn": format!("{db}.{schema}.{name}"),
        "type": "stream",
    })
}

/// Artifact row returned by an executed CREATE/INSERT statement.
#[allow(dead_code)]
pub fn artifact(kind: &str, name: &str) -> Reply {
    rows(
        &["type", "name", "command", "summary", "path"],
        vec![vec![Some(kind), Some(name), Some("CREATE"), None, None]],
    )
}

/// Artifact row of a relation-creating statement, with its `[db, schema, name]` path.
#[allow(dead_code)]
pub fn relation_artifact(kind: &str, path: [&str; 3]) -> Reply {
    let path_json = serde_json::json!(path).to_string();
    rows(
        &["type", "name", "command", "summary", "path"],
        vec![vec![
            Some(kind),
            Some(path[2]),
            Some("CREATE"),
            None,
            Some(path_json.as_str()),
        ]],
    )
}
