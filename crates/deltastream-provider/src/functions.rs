//! Read-only invoke functions
//!
//! Catalog lookups exposed to the host outside any resource lifecycle. They
//! run with the provider-level role; plural lookups are capped at
//! [`MAX_ROWS`] and log a warning when more rows exist.

use crate::catalog::{self, DatabaseRow, NamespaceRow, RelationPath, RelationRow, StoreRow, format_ts};
use crate::context::ProviderContext;
use crate::error::{ProviderError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Row cap for plural lookups
pub const MAX_ROWS: usize = 100;

pub const GET_DATABASE: &str = "deltastream:index:getDatabase";
pub const GET_DATABASES: &str = "deltastream:index:getDatabases";
pub const GET_NAMESPACE: &str = "deltastream:index:getNamespace";
pub const GET_NAMESPACES: &str = "deltastream:index:getNamespaces";
pub const GET_STORE: &str = "deltastream:index:getStore";
pub const GET_STORES: &str = "deltastream:index:getStores";
pub const GET_OBJECT: &str = "deltastream:index:getObject";
pub const GET_OBJECTS: &str = "deltastream:index:getObjects";

pub const FUNCTIONS: &[&str] = &[
    GET_DATABASE,
    GET_DATABASES,
    GET_NAMESPACE,
    GET_NAMESPACES,
    GET_STORE,
    GET_STORES,
    GET_OBJECT,
    GET_OBJECTS,
];

// ============ Results ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub created_at: String,
}

impl From<DatabaseRow> for DatabaseInfo {
    fn from(row: DatabaseRow) -> Self {
        Self {
            name: row.name,
            owner: row.owner,
            created_at: format_ts(&row.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceInfo {
    pub database: String,
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub created_at: String,
}

impl From<NamespaceRow> for NamespaceInfo {
    fn from(row: NamespaceRow) -> Self {
        Self {
            database: row.database,
            name: row.name,
            owner: row.owner,
            created_at: format_ts(&row.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub store_type: String,
    pub state: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<StoreRow> for StoreInfo {
    fn from(row: StoreRow) -> Self {
        Self {
            name: row.name,
            store_type: row.store_type,
            state: row.status,
            owner: row.owner,
            created_at: format_ts(&row.created_at),
            updated_at: format_ts(&row.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub database: String,
    pub namespace: String,
    pub name: String,
    pub fqn: String,
    /// stream, changelog or table
    #[serde(rename = "type")]
    pub relation_type: String,
    pub state: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ObjectInfo {
    fn from_row(database: &str, namespace: &str, row: RelationRow) -> Self {
        let fqn = row
            .fqn
            .unwrap_or_else(|| RelationPath::new(database, namespace, &row.name).fqn());
        Self {
            database: database.to_string(),
            namespace: namespace.to_string(),
            name: row.name,
            fqn,
            relation_type: row.relation_type,
            state: row.state,
            owner: row.owner,
            created_at: format_ts(&row.created_at),
            updated_at: format_ts(&row.updated_at),
        }
    }
}

// ============ Arguments ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseArgs {
    database: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceArgs {
    database: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeArgs {
    database: String,
    namespace: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectArgs {
    database: String,
    namespace: String,
    name: String,
}

// ============ Lookups ============

/// Map the typed not-found code of a single lookup to [`ProviderError::NotFound`].
fn found<T>(result: deltastream_client::Result<T>, what: impl FnOnce() -> String) -> Result<T> {
    match result {
        Ok(row) => Ok(row),
        Err(err) if err.is_not_found() => Err(ProviderError::NotFound(what())),
        Err(err) => Err(err.into()),
    }
}

/// Keep the first [`MAX_ROWS`] rows of a `LIMIT MAX_ROWS + 1` result.
fn cap<T>(mut rows: Vec<T>, function: &str) -> Vec<T> {
    if rows.len() > MAX_ROWS {
        tracing::warn!(
            "{} truncated at {} rows (more available)",
            function,
            MAX_ROWS
        );
        rows.truncate(MAX_ROWS);
    }
    rows
}

pub async fn get_database(ctx: &ProviderContext, name: &str) -> Result<DatabaseInfo> {
    let session = ctx.connect_as(None).await?;
    let row = found(catalog::lookup_database(&session, name).await, || {
        format!("database {name}")
    })?;
    Ok(row.into())
}

pub async fn get_databases(ctx: &ProviderContext) -> Result<Vec<DatabaseInfo>> {
    let session = ctx.connect_as(None).await?;
    let rows = catalog::list_databases(&session, Some(MAX_ROWS + 1)).await?;
    Ok(cap(rows, "getDatabases").into_iter().map(Into::into).collect())
}

pub async fn get_namespace(ctx: &ProviderContext, database: &str, name: &str) -> Result<NamespaceInfo> {
    let session = ctx.connect_as(None).await?;
    let row = found(catalog::lookup_namespace(&session, database, name).await, || {
        format!("namespace {database}.{name}")
    })?;
    Ok(row.into())
}

pub async fn get_namespaces(ctx: &ProviderContext, database: &str) -> Result<Vec<NamespaceInfo>> {
    let session = ctx.connect_as(None).await?;
    let rows = catalog::list_namespaces(&session, database, Some(MAX_ROWS + 1)).await?;
    Ok(cap(rows, "getNamespaces").into_iter().map(Into::into).collect())
}

pub async fn get_store(ctx: &ProviderContext, name: &str) -> Result<StoreInfo> {
    let session = ctx.connect_as(None).await?;
    let row = found(catalog::lookup_store(&session, name).await, || {
        format!("store {name}")
    })?;
    Ok(row.into())
}

pub async fn get_stores(ctx: &ProviderContext) -> Result<Vec<StoreInfo>> {
    let session = ctx.connect_as(None).await?;
    let rows = catalog::list_stores(&session, Some(MAX_ROWS + 1)).await?;
    Ok(cap(rows, "getStores").into_iter().map(Into::into).collect())
}

pub async fn get_object(
    ctx: &ProviderContext,
    database: &str,
    namespace: &str,
    name: &str,
) -> Result<ObjectInfo> {
    let session = ctx.connect_as(None).await?;
    let path = RelationPath::new(database, namespace, name);
    let row = found(catalog::lookup_relation_with_fqn(&session, &path).await, || {
        format!("object {database}.{namespace}.{name}")
    })?;
    Ok(ObjectInfo::from_row(database, namespace, row))
}

pub async fn get_objects(
    ctx: &ProviderContext,
    database: &str,
    namespace: &str,
) -> Result<Vec<ObjectInfo>> {
    let session = ctx.connect_as(None).await?;
    let rows = catalog::list_relations(&session, database, namespace, Some(MAX_ROWS + 1)).await?;
    Ok(cap(rows, "getObjects")
        .into_iter()
        .map(|row| ObjectInfo::from_row(database, namespace, row))
        .collect())
}

// ============ Dispatch ============

fn args<T: DeserializeOwned>(token: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::invalid_input(format!("{token}: invalid arguments: {e}")))
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Run the function addressed by `token` with JSON arguments.
pub async fn invoke(ctx: &ProviderContext, token: &str, input: Value) -> Result<Value> {
    tracing::debug!("Invoking {}", token);
    match token {
        GET_DATABASE => {
            let a: NameArgs = args(token, input)?;
            to_value(get_database(ctx, &a.name).await?)
        }
        GET_DATABASES => to_value(serde_json::json!({ "databases": get_databases(ctx).await? })),
        GET_NAMESPACE => {
            let a: NamespaceArgs = args(token, input)?;
            to_value(get_namespace(ctx, &a.database, &a.name).await?)
        }
        GET_NAMESPACES => {
            let a: DatabaseArgs = args(token, input)?;
            to_value(serde_json::json!({ "namespaces": get_namespaces(ctx, &a.database).await? }))
        }
        GET_STORE => {
            let a: NameArgs = args(token, input)?;
            to_value(get_store(ctx, &a.name).await?)
        }
        GET_STORES => to_value(serde_json::json!({ "stores": get_stores(ctx).await? })),
        GET_OBJECT => {
            let a: ObjectArgs = args(token, input)?;
            to_value(get_object(ctx, &a.database, &a.namespace, &a.name).await?)
        }
        GET_OBJECTS => {
            let a: ScopeArgs = args(token, input)?;
            to_value(serde_json::json!({
                "objects": get_objects(ctx, &a.database, &a.namespace).await?
            }))
        }
        other => Err(ProviderError::invalid_input(format!(
            "unknown function token: {other}"
        ))),
    }
}
