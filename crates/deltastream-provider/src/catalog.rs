//! Catalog lookup layer
//!
//! Read-only queries against the `deltastream.sys` views. A lookup that
//! returns no row is reported as the typed not-found SQL state of its kind so
//! callers can treat "absent" uniformly.

use chrono::{DateTime, SecondsFormat, Utc};
use deltastream_client::{ClientError, Result, Row, Session, SqlState, quote_fqn, quote_string};

pub const STORE_READY: &str = "ready";
pub const STORE_ERRORED: &str = "errored";
pub const QUERY_RUNNING: &str = "running";
pub const QUERY_ERRORED: &str = "errored";
pub const QUERY_TERMINATED: &str = "terminated";
pub const QUERY_TERMINATE_REQUESTED: &str = "terminate_requested";

/// RFC 3339 with second precision, as persisted in resource state.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn not_found(result: Result<Row>, state: SqlState, what: impl FnOnce() -> String) -> Result<Row> {
    match result {
        Err(ClientError::NoRows) => Err(ClientError::sql(state, format!("{} not found", what()))),
        other => other,
    }
}

fn limit_clause(limit: Option<usize>) -> String {
    limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default()
}

// ============ Databases ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRow {
    pub name: String,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DatabaseRow {
    fn from_row(name: Option<String>, row: &Row) -> Result<Self> {
        Ok(Self {
            name: match name {
                Some(n) => n,
                None => row.get_str("name")?,
            },
            owner: row.get_opt_str("owner")?,
            created_at: row.get_timestamp("created_at")?,
        })
    }
}

pub async fn lookup_database(session: &Session, name: &str) -> Result<DatabaseRow> {
    let sql = format!(
        "SELECT \"owner\", created_at FROM deltastream.sys.\"databases\" WHERE name = {};",
        quote_string(name)
    );
    let row = not_found(session.query_row(sql).await, SqlState::InvalidDatabase, || {
        format!("database {name}")
    })?;
    DatabaseRow::from_row(Some(name.to_string()), &row)
}

pub async fn list_databases(session: &Session, limit: Option<usize>) -> Result<Vec<DatabaseRow>> {
    let sql = format!(
        "SELECT name, \"owner\", created_at FROM deltastream.sys.\"databases\" ORDER BY name{};",
        limit_clause(limit)
    );
    session
        .query(sql)
        .await?
        .into_iter()
        .map(|row| DatabaseRow::from_row(None, &row))
        .collect()
}

// ============ Namespaces ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceRow {
    pub database: String,
    pub name: String,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn lookup_namespace(session: &Session, database: &str, name: &str) -> Result<NamespaceRow> {
    let sql = format!(
        "SELECT \"owner\", created_at FROM deltastream.sys.\"schemas\" WHERE database_name = {} AND name = {};",
        quote_string(database),
        quote_string(name)
    );
    let row = not_found(session.query_row(sql).await, SqlState::InvalidSchema, || {
        format!("namespace {database}.{name}")
    })?;
    Ok(NamespaceRow {
        database: database.to_string(),
        name: name.to_string(),
        owner: row.get_opt_str("owner")?,
        created_at: row.get_timestamp("created_at")?,
    })
}

pub async fn list_namespaces(
    session: &Session,
    database: &str,
    limit: Option<usize>,
) -> Result<Vec<NamespaceRow>> {
    let sql = format!(
        "SELECT name, \"owner\", created_at FROM deltastream.sys.\"schemas\" WHERE database_name = {} ORDER BY name{};",
        quote_string(database),
        limit_clause(limit)
    );
    session
        .query(sql)
        .await?
        .into_iter()
        .map(|row| {
            Ok(NamespaceRow {
                database: database.to_string(),
                name: row.get_str("name")?,
                owner: row.get_opt_str("owner")?,
                created_at: row.get_timestamp("created_at")?,
            })
        })
        .collect()
}

// ============ Stores ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRow {
    pub name: String,
    pub store_type: String,
    pub status: String,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoreRow {
    fn from_row(name: Option<String>, row: &Row) -> Result<Self> {
        Ok(Self {
            name: match name {
                Some(n) => n,
                None => row.get_str("name")?,
            },
            store_type: row.get_opt_str("type")?.unwrap_or_default(),
            status: row.get_opt_str("status")?.unwrap_or_default(),
            owner: row.get_opt_str("owner")?,
            created_at: row.get_timestamp("created_at")?,
            updated_at: row.get_timestamp("updated_at")?,
        })
    }
}

pub async fn lookup_store(session: &Session, name: &str) -> Result<StoreRow> {
    let sql = format!(
        "SELECT type, status, \"owner\", created_at, updated_at FROM deltastream.sys.\"stores\" WHERE name = {};",
        quote_string(name)
    );
    let row = not_found(session.query_row(sql).await, SqlState::InvalidStore, || {
        format!("store {name}")
    })?;
    StoreRow::from_row(Some(name.to_string()), &row)
}

/// Latest provisioning message of a store, for diagnostics.
pub async fn store_status_message(session: &Session, name: &str) -> Result<Option<String>> {
    let sql = format!(
        "SELECT status_message FROM deltastream.sys.\"stores\" WHERE name = {};",
        quote_string(name)
    );
    let row = not_found(session.query_row(sql).await, SqlState::InvalidStore, || {
        format!("store {name}")
    })?;
    row.get_opt_str("status_message")
}

pub async fn list_stores(session: &Session, limit: Option<usize>) -> Result<Vec<StoreRow>> {
    let sql = format!(
        "SELECT name, type, status, \"owner\", created_at, updated_at FROM deltastream.sys.\"stores\" ORDER BY name{};",
        limit_clause(limit)
    );
    session
        .query(sql)
        .await?
        .into_iter()
        .map(|row| StoreRow::from_row(None, &row))
        .collect()
}

// ============ Relations ============

/// `[database, namespace, name]` of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationPath {
    pub database: String,
    pub namespace: String,
    pub name: String,
}

impl RelationPath {
    pub fn new(database: &str, namespace: &str, name: &str) -> Self {
        Self {
            database: database.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// From the three-element path returned by a creating statement.
    pub fn from_segments(segments: &[String]) -> Option<Self> {
        match segments {
            [database, namespace, name] => Some(Self::new(database, namespace, name)),
            _ => None,
        }
    }

    pub fn segments(&self) -> Vec<String> {
        vec![
            self.database.clone(),
            self.namespace.clone(),
            self.name.clone(),
        ]
    }

    pub fn fqn(&self) -> String {
        quote_fqn(&self.database, &self.namespace, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRow {
    pub name: String,
    pub relation_type: String,
    pub owner: Option<String>,
    pub state: String,
    pub fqn: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelationRow {
    fn from_row(row: &Row, with_fqn: bool) -> Result<Self> {
        Ok(Self {
            name: row.get_str("name")?,
            relation_type: row
                .get_opt_str("relation_type")?
                .unwrap_or_default()
                .to_ascii_lowercase(),
            owner: row.get_opt_str("owner")?,
            state: row.get_opt_str("state")?.unwrap_or_default(),
            fqn: if with_fqn { row.get_opt_str("fqn")? } else { None },
            created_at: row.get_timestamp("created_at")?,
            updated_at: row.get_timestamp("updated_at")?,
        })
    }
}

pub async fn lookup_relation(session: &Session, path: &RelationPath) -> Result<RelationRow> {
    let sql = format!(
        "SELECT name, relation_type, \"owner\", \"state\", created_at, updated_at FROM deltastream.sys.\"relations\" WHERE database_name = {} AND schema_name = {} AND name = {};",
        quote_string(&path.database),
        quote_string(&path.namespace),
        quote_string(&path.name)
    );
    let row = not_found(session.query_row(sql).await, SqlState::InvalidRelation, || {
        format!("relation {}", path.fqn())
    })?;
    RelationRow::from_row(&row, false)
}

pub async fn lookup_relation_with_fqn(session: &Session, path: &RelationPath) -> Result<RelationRow> {
    let sql = format!(
        "SELECT name, fqn, relation_type, \"owner\", \"state\", created_at, updated_at FROM deltastream.sys.\"relations\" WHERE database_name = {} AND schema_name = {} AND name = {};",
        quote_string(&path.database),
        quote_string(&path.namespace),
        quote_string(&path.name)
    );
    let row = not_found(session.query_row(sql).await, SqlState::InvalidRelation, || {
        format!("relation {}", path.fqn())
    })?;
    RelationRow::from_row(&row, true)
}

pub async fn list_relations(
    session: &Session,
    database: &str,
    namespace: &str,
    limit: Option<usize>,
) -> Result<Vec<RelationRow>> {
    let sql = format!(
        "SELECT name, fqn, relation_type, \"owner\", \"state\", created_at, updated_at FROM deltastream.sys.\"relations\" WHERE database_name = {} AND schema_name = {} ORDER BY name{};",
        quote_string(database),
        quote_string(namespace),
        limit_clause(limit)
    );
    session
        .query(sql)
        .await?
        .into_iter()
        .map(|row| RelationRow::from_row(&row, true))
        .collect()
}

// ============ Queries ============

/// A continuous query or application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRow {
    pub id: String,
    pub name: Option<String>,
    pub version: Option<i64>,
    pub state: String,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn lookup_query(session: &Session, id: &str) -> Result<QueryRow> {
    let sql = format!(
        "select name, \"version\", current_state, \"owner\", created_at, updated_at from deltastream.sys.\"queries\" where id = {};",
        quote_string(id)
    );
    let row = not_found(session.query_row(sql).await, SqlState::InvalidQuery, || {
        format!("query {id}")
    })?;
    Ok(QueryRow {
        id: id.to_string(),
        name: row.get_opt_str("name")?,
        version: row.get_opt_i64("version")?,
        state: row.get_opt_str("current_state")?.unwrap_or_default(),
        owner: row.get_opt_str("owner")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_ts() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 30).unwrap();
        assert_eq!(format_ts(&ts), "2024-05-01T10:20:30Z");
    }

    #[test]
    fn test_relation_path() {
        let path = RelationPath::from_segments(&[
            "db".to_string(),
            "public".to_string(),
            "pageviews".to_string(),
        ])
        .unwrap();
        assert_eq!(path.fqn(), "\"db\".\"public\".\"pageviews\"");
        assert_eq!(path.segments().len(), 3);
        assert!(RelationPath::from_segments(&["db".to_string()]).is_none());
    }

    #[test]
    fn test_no_rows_maps_to_typed_state() {
        let err = not_found(Err(ClientError::NoRows), SqlState::InvalidStore, || {
            "store s".to_string()
        })
        .unwrap_err();
        assert!(err.is_state(&SqlState::InvalidStore));
        assert_eq!(err.to_string(), "SQL error 3D022: store s not found");

        let passthrough = not_found(
            Err(ClientError::Protocol("boom".into())),
            SqlState::InvalidStore,
            String::new,
        )
        .unwrap_err();
        assert!(!passthrough.is_not_found());
    }

    #[test]
    fn test_limit_clause() {
        assert_eq!(limit_clause(Some(101)), " LIMIT 101");
        assert_eq!(limit_clause(None), "");
    }
}
