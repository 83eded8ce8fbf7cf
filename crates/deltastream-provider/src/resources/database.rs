//! Database resource

use super::{cleanup, ignore_not_found, now_rfc3339, require};
use crate::catalog::{self, format_ts};
use crate::context::ProviderContext;
use crate::diff::{DiffResponse, owner_changed};
use crate::error::{ProviderError, Result};
use crate::resource::{CheckResponse, CreateResponse, FieldDependency, ReadResponse, Resource};
use async_trait::async_trait;
use deltastream_client::quote_ident;
use serde::{Deserialize, Serialize};

pub struct Database;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseArgs {
    /// Database name. Wrap in quotes if case sensitive.
    pub name: String,
    /// Owning role; statements run as this role when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseState {
    pub name: String,
    /// Owner as reported by the catalog
    #[serde(default)]
    pub owner: Option<String>,
    pub created_at: String,
}

impl DatabaseState {
    fn args(&self) -> DatabaseArgs {
        DatabaseArgs {
            name: self.name.clone(),
            owner: self.owner.clone(),
        }
    }
}

fn drop_sql(name: &str) -> String {
    format!("DROP DATABASE {};", quote_ident(name))
}

#[async_trait]
impl Resource for Database {
    type Args = DatabaseArgs;
    type State = DatabaseState;

    const TOKEN: &'static str = "deltastream:index:Database";

    const WIRING: &'static [FieldDependency] = &[
        FieldDependency::new("name", "name"),
        FieldDependency::new("owner", "owner"),
    ];

    async fn check(
        &self,
        _ctx: &ProviderContext,
        inputs: DatabaseArgs,
    ) -> Result<CheckResponse<DatabaseArgs>> {
        let mut failures = Vec::new();
        require(&mut failures, "name", &inputs.name);
        Ok(CheckResponse::new(inputs, failures))
    }

    fn diff(&self, state: &DatabaseState, inputs: &DatabaseArgs) -> Result<DiffResponse> {
        let mut diff = DiffResponse::new();
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
        inputs: DatabaseArgs,
        dry_run: bool,
    ) -> Result<CreateResponse<DatabaseState>> {
        tracing::debug!("Creating database {}", inputs.name);
        if dry_run {
            return Ok(CreateResponse {
                id: inputs.name.clone(),
                state: DatabaseState {
                    name: inputs.name,
                    owner: inputs.owner,
                    created_at: now_rfc3339(),
                },
            });
        }

        let session = ctx.connect_as(inputs.owner.as_deref()).await?;
        session
            .exec(format!("CREATE DATABASE {};", quote_ident(&inputs.name)))
            .await?;

        let row = match catalog::lookup_database(&session, &inputs.name).await {
            Ok(row) => row,
            Err(err) => {
                let what = format!("database {}", inputs.name);
                cleanup(&session, drop_sql(&inputs.name), &what).await;
                return Err(ProviderError::partial(what, err.into()));
            }
        };

        tracing::info!("Database created successfully: {}", inputs.name);
        Ok(CreateResponse {
            id: inputs.name.clone(),
            state: DatabaseState {
                name: inputs.name,
                owner: row.owner,
                created_at: format_ts(&row.created_at),
            },
        })
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        state: DatabaseState,
    ) -> Result<Option<ReadResponse<DatabaseArgs, DatabaseState>>> {
        tracing::debug!("Reading database {}", id);
        let session = ctx.connect_as(state.owner.as_deref()).await?;
        let row = match catalog::lookup_database(&session, id).await {
            Ok(row) => row,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let state = DatabaseState {
            name: id.to_string(),
            owner: row.owner,
            created_at: format_ts(&row.created_at),
        };
        Ok(Some(ReadResponse {
            id: id.to_string(),
            inputs: state.args(),
            state,
        }))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        state: DatabaseState,
        inputs: DatabaseArgs,
        dry_run: bool,
    ) -> Result<DatabaseState> {
        if state.name != inputs.name {
            return Err(ProviderError::Unsupported(format!(
                "database {id} cannot be renamed in place"
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
            return Ok(DatabaseState {
                owner: Some(new_owner.to_string()),
                ..state
            });
        }

        let session = ctx.connect_as(state.owner.as_deref()).await?;
        session
            .exec(format!(
                "ALTER DATABASE {} OWNER TO {};",
                quote_ident(id),
                quote_ident(new_owner)
            ))
            .await?;
        let row = catalog::lookup_database(&session, id).await?;
        tracing::info!("Database {} owner changed to {}", id, new_owner);
        Ok(DatabaseState {
            owner: row.owner,
            created_at: format_ts(&row.created_at),
            ..state
        })
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, state: DatabaseState) -> Result<()> {
        tracing::debug!("Deleting database {}", id);
        let session = ctx.connect_as(state.owner.as_deref()).await?;
        ignore_not_found(session.exec(drop_sql(id)).await)?;
        tracing::info!("Database deleted successfully: {}", id);
        Ok(())
    }
}
