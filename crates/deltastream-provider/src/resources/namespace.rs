//! Namespace (schema) resource

use super::{cleanup, ignore_not_found, now_rfc3339, require};
use crate::catalog::{self, format_ts};
use crate::context::ProviderContext;
use crate::diff::{DiffResponse, owner_changed};
use crate::error::{ProviderError, Result};
use crate::resource::{CheckResponse, CreateResponse, FieldDependency, ReadResponse, Resource};
use async_trait::async_trait;
use deltastream_client::quote_ident;
use serde::{Deserialize, Serialize};

pub struct Namespace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceArgs {
    /// Database containing the namespace
    pub database: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceState {
    pub database: String,
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub created_at: String,
}

/// `database/name`
fn namespace_id(database: &str, name: &str) -> String {
    format!("{database}/{name}")
}

fn qualified(database: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(database), quote_ident(name))
}

#[async_trait]
impl Resource for Namespace {
    type Args = NamespaceArgs;
    type State = NamespaceState;

    const TOKEN: &'static str = "deltastream:index:Namespace";

    const WIRING: &'static [FieldDependency] = &[
        FieldDependency::new("database", "database"),
        FieldDependency::new("name", "name"),
        FieldDependency::new("owner", "owner"),
    ];

    async fn check(
        &self,
        _ctx: &ProviderContext,
        inputs: NamespaceArgs,
    ) -> Result<CheckResponse<NamespaceArgs>> {
        let mut failures = Vec::new();
        require(&mut failures, "database", &inputs.database);
        require(&mut failures, "name", &inputs.name);
        Ok(CheckResponse::new(inputs, failures))
    }

    fn diff(&self, state: &NamespaceState, inputs: &NamespaceArgs) -> Result<DiffResponse> {
        let mut diff = DiffResponse::new();
        if state.database != inputs.database {
            diff.replace("database");
        }
        if state.name != inputs.name {
            diff.replace("name");
        }
        if owner_changed(state.owner.as_deref(), inputs.owner.as_deref()) {
            diff.update("owner");
        }
        Ok(diff)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        inputs: NamespaceArgs,
        dry_run: bool,
    ) -> Result<CreateResponse<NamespaceState>> {
        tracing::debug!("Creating namespace {}.{}", inputs.database, inputs.name);
        let id = namespace_id(&inputs.database, &inputs.name);
        if dry_run {
            return Ok(CreateResponse {
                id,
                state: NamespaceState {
                    database: inputs.database,
                    name: inputs.name,
                    owner: inputs.owner,
                    created_at: now_rfc3339(),
                },
            });
        }

        let session = ctx.connect_as(inputs.owner.as_deref()).await?;
        session
            .exec(format!(
                "CREATE SCHEMA {} IN DATABASE {};",
                quote_ident(&inputs.name),
                quote_ident(&inputs.database)
            ))
            .await?;

        let row = match catalog::lookup_namespace(&session, &inputs.database, &inputs.name).await {
            Ok(row) => row,
            Err(err) => {
                let what = format!("namespace {}.{}", inputs.database, inputs.name);
                let drop = format!("DROP SCHEMA {};", qualified(&inputs.database, &inputs.name));
                cleanup(&session, drop, &what).await;
                return Err(ProviderError::partial(what, err.into()));
            }
        };

        tracing::info!("Namespace created: {}.{}", inputs.database, inputs.name);
        Ok(CreateResponse {
            id,
            state: NamespaceState {
                database: inputs.database,
                name: inputs.name,
                owner: row.owner,
                created_at: format_ts(&row.created_at),
            },
        })
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        _id: &str,
        state: NamespaceState,
    ) -> Result<Option<ReadResponse<NamespaceArgs, NamespaceState>>> {
        let session = ctx.connect_as(state.owner.as_deref()).await?;
        let row = match catalog::lookup_namespace(&session, &state.database, &state.name).await {
            Ok(row) => row,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let state = NamespaceState {
            owner: row.owner,
            created_at: format_ts(&row.created_at),
            ..state
        };
        Ok(Some(ReadResponse {
            id: namespace_id(&state.database, &state.name),
            inputs: NamespaceArgs {
                database: state.database.clone(),
                name: state.name.clone(),
                owner: state.owner.clone(),
            },
            state,
        }))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        state: NamespaceState,
        inputs: NamespaceArgs,
        dry_run: bool,
    ) -> Result<NamespaceState> {
        if state.database != inputs.database || state.name != inputs.name {
            return Err(ProviderError::Unsupported(format!(
                "namespace {id}: only the owner can be updated"
            )));
        }
        let Some(new_owner) = inputs
            .owner
            .as_deref()
            .filter(|o| owner_changed(state.owner.as_deref(), Some(o)))
        else {
            return Ok(state);
        };
        if dry_run {
            return Ok(NamespaceState {
                owner: Some(new_owner.to_string()),
                ..state
            });
        }

        let session = ctx.connect_as(state.owner.as_deref()).await?;
        session
            .exec(format!(
                "ALTER SCHEMA {} OWNER TO {};",
                qualified(&state.database, &state.name),
                quote_ident(new_owner)
            ))
            .await?;
        let row = catalog::lookup_namespace(&session, &state.database, &state.name).await?;
        tracing::info!("Namespace {} owner changed to {}", id, new_owner);
        Ok(NamespaceState {
            owner: row.owner,
            created_at: format_ts(&row.created_at),
            ..state
        })
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, state: NamespaceState) -> Result<()> {
        let session = ctx.connect_as(state.owner.as_deref()).await?;
        let drop = format!("DROP SCHEMA {};", qualified(&state.database, &state.name));
        ignore_not_found(session.exec(drop).await)?;
        tracing::info!("Namespace deleted: {}", id);
        Ok(())
    }
}
