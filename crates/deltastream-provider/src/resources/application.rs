//! Multi-sink application resource (`BEGIN APPLICATION ... END APPLICATION`)
//!
//! Lifecycle matches [`super::Query`]; validation additionally covers every
//! sink and rejects virtual relations declared as sources.

use super::query::{alter_owner, check_plan, launch, terminate};
use super::{now_rfc3339, require};
use crate::catalog::{QueryRow, format_ts};
use crate::context::ProviderContext;
use crate::diff::{DiffResponse, owner_changed, same_set};
use crate::error::{ProviderError, Result};
use crate::plan;
use crate::preview::provisional_id;
use crate::resource::{
    CheckFailure, CheckResponse, CreateResponse, FieldDependency, ReadResponse, Resource,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub struct Application;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationArgs {
    /// Physical relations read by the application
    #[serde(default)]
    pub source_relation_fqns: Vec<String>,
    #[serde(default)]
    pub sink_relation_fqns: Vec<String>,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationState {
    #[serde(flatten)]
    pub args: ApplicationArgs,
    #[serde(default)]
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_version: Option<i64>,
    #[serde(default)]
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub current_owner: Option<String>,
}

impl ApplicationState {
    fn refresh(&mut self, row: QueryRow) {
        self.query_name = row.name;
        self.query_version = row.version;
        self.state = row.state;
        self.current_owner = row.owner;
        self.created_at = format_ts(&row.created_at);
        self.updated_at = format_ts(&row.updated_at);
    }
}

fn preview_base(args: &ApplicationArgs) -> &str {
    args.sink_relation_fqns
        .first()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("application")
}

#[async_trait]
impl Resource for Application {
    type Args = ApplicationArgs;
    type State = ApplicationState;

    const TOKEN: &'static str = "deltastream:index:Application";

    const WIRING: &'static [FieldDependency] = &[
        FieldDependency::new("state", "sql"),
        FieldDependency::new("applicationId", "sql"),
    ];

    async fn check(
        &self,
        ctx: &ProviderContext,
        inputs: ApplicationArgs,
    ) -> Result<CheckResponse<ApplicationArgs>> {
        let mut failures = Vec::new();
        require(&mut failures, "sql", &inputs.sql);
        for (property, list) in [
            ("sinkRelationFqns", &inputs.sink_relation_fqns),
            ("sourceRelationFqns", &inputs.source_relation_fqns),
        ] {
            if list.is_empty() {
                failures.push(CheckFailure::new(property, format!("{property} is required")));
            }
        }
        if !failures.is_empty() {
            return Ok(CheckResponse::new(inputs, failures));
        }

        let failures = check_plan(ctx, inputs.owner.as_deref(), &inputs.sql, |described| {
            plan::validate_application(
                described,
                &inputs.sink_relation_fqns,
                &inputs.source_relation_fqns,
            )
        })
        .await;
        Ok(CheckResponse::new(inputs, failures))
    }

    fn diff(&self, state: &ApplicationState, inputs: &ApplicationArgs) -> Result<DiffResponse> {
        let prior = &state.args;
        let mut diff = DiffResponse::new();
        if !prior.sql.is_empty() && prior.sql != inputs.sql {
            diff.replace("sql");
        }
        if !prior.sink_relation_fqns.is_empty()
            && !same_set(&prior.sink_relation_fqns, &inputs.sink_relation_fqns)
        {
            diff.replace("sinkRelationFqns");
        }
        if !prior.source_relation_fqns.is_empty()
            && !same_set(&prior.source_relation_fqns, &inputs.source_relation_fqns)
        {
            diff.replace("sourceRelationFqns");
        }
        if owner_changed(prior.owner.as_deref(), inputs.owner.as_deref()) {
            diff.update("owner");
        }
        // Two applications cannot write the same sinks at once.
        Ok(diff.delete_before_replace(true))
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        inputs: ApplicationArgs,
        dry_run: bool,
    ) -> Result<CreateResponse<ApplicationState>> {
        if dry_run {
            let now = now_rfc3339();
            return Ok(CreateResponse {
                id: provisional_id(preview_base(&inputs), &inputs.sql),
                state: ApplicationState {
                    current_owner: inputs.owner.clone(),
                    args: inputs,
                    application_id: String::new(),
                    query_name: None,
                    query_version: None,
                    state: "starting".to_string(),
                    created_at: now.clone(),
                    updated_at: now,
                },
            });
        }

        let session = ctx.connect_as(inputs.owner.as_deref()).await?;
        let described = plan::describe(&session, &inputs.sql).await?;
        plan::ensure_no_mismatches(&plan::validate_application(
            &described,
            &inputs.sink_relation_fqns,
            &inputs.source_relation_fqns,
        ))?;

        let row = launch(ctx, &session, &inputs.sql, "application").await?;
        let mut state = ApplicationState {
            args: inputs,
            application_id: row.id.clone(),
            query_name: None,
            query_version: None,
            state: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
            current_owner: None,
        };
        state.refresh(row);
        tracing::info!("Application created: {}", state.application_id);
        Ok(CreateResponse {
            id: state.application_id.clone(),
            state,
        })
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        mut state: ApplicationState,
    ) -> Result<Option<ReadResponse<ApplicationArgs, ApplicationState>>> {
        if id.is_empty() {
            return Ok(None);
        }
        let session = ctx.connect_as(state.args.owner.as_deref()).await?;
        let row = match crate::catalog::lookup_query(&session, id).await {
            Ok(row) => row,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        state.refresh(row);
        Ok(Some(ReadResponse {
            id: id.to_string(),
            inputs: state.args.clone(),
            state,
        }))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        mut state: ApplicationState,
        inputs: ApplicationArgs,
        dry_run: bool,
    ) -> Result<ApplicationState> {
        if self.diff(&state, &inputs)?.requires_replace() {
            return Err(ProviderError::Unsupported(format!(
                "application {id}: only the owner can be updated"
            )));
        }
        let Some(new_owner) = inputs
            .owner
            .as_deref()
            .filter(|o| owner_changed(state.args.owner.as_deref(), Some(o)))
            .map(str::to_string)
        else {
            return Ok(state);
        };
        if dry_run {
            state.args.owner = Some(new_owner);
            return Ok(state);
        }

        let row = alter_owner(
            ctx,
            &state.application_id,
            state.args.owner.as_deref(),
            &new_owner,
        )
        .await?;
        tracing::info!("Application {} owner changed to {}", id, new_owner);
        state.args.owner = Some(new_owner);
        state.refresh(row);
        Ok(state)
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, state: ApplicationState) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        let session = ctx.connect_as(state.args.owner.as_deref()).await?;
        terminate(ctx, &session, id, &state.state, "application").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ApplicationArgs {
        ApplicationArgs {
            source_relation_fqns: vec!["\"db\".\"public\".\"pageviews\"".into()],
            sink_relation_fqns: vec![
                "\"db\".\"public\".\"by_region\"".into(),
                "\"db\".\"public\".\"by_user\"".into(),
            ],
            sql: "BEGIN APPLICATION app1 ... END APPLICATION;".into(),
            owner: None,
        }
    }

    #[test]
    fn test_preview_base() {
        assert_eq!(preview_base(&args()), "\"db\".\"public\".\"by_region\"");
        let mut empty = args();
        empty.sink_relation_fqns.clear();
        assert_eq!(preview_base(&empty), "application");
    }

    #[test]
    fn test_diff_always_deletes_before_replace() {
        let state = ApplicationState {
            args: args(),
            application_id: "4c1d".into(),
            query_name: Some("app1".into()),
            query_version: Some(1),
            state: "running".into(),
            created_at: "2024-05-01T10:20:30Z".into(),
            updated_at: "2024-05-01T10:20:30Z".into(),
            current_owner: None,
        };
        let mut inputs = args();
        inputs.sink_relation_fqns.reverse();
        let diff = Application.diff(&state, &inputs).unwrap();
        assert!(!diff.has_changes);
        assert!(diff.delete_before_replace);

        inputs.sql = "BEGIN APPLICATION app2 ... END APPLICATION;".into();
        let diff = Application.diff(&state, &inputs).unwrap();
        assert!(diff.requires_replace());
    }
}
