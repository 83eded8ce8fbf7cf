//! Continuous query resource (`INSERT INTO ... SELECT ...`)

use super::{cleanup, confirm_deleted, ignore_not_found, now_rfc3339, poll_failure, require};
use crate::catalog::{self, QueryRow, format_ts};
use crate::context::ProviderContext;
use crate::diff::{DiffResponse, owner_changed, same_set};
use crate::error::{ProviderError, Result};
use crate::plan::{self, PlanMismatch};
use crate::poll::{PollMode, PollStatus, poll_until};
use crate::preview::provisional_id;
use crate::resource::{
    CheckFailure, CheckResponse, CreateResponse, FieldDependency, ReadResponse, Resource,
};
use async_trait::async_trait;
use deltastream_client::{Session, quote_ident};
use serde::{Deserialize, Serialize};

pub struct Query;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryArgs {
    /// Every relation the statement reads from, as `"db"."schema"."name"`
    #[serde(default)]
    pub source_relation_fqns: Vec<String>,
    pub sink_relation_fqn: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    #[serde(flatten)]
    pub args: QueryArgs,
    #[serde(default)]
    pub query_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_version: Option<i64>,
    /// starting, running, terminate_requested, terminated or errored
    #[serde(default)]
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub current_owner: Option<String>,
}

impl QueryState {
    fn refresh(&mut self, row: QueryRow) {
        self.query_name = row.name;
        self.query_version = row.version;
        self.state = row.state;
        self.current_owner = row.owner;
        self.created_at = format_ts(&row.created_at);
        self.updated_at = format_ts(&row.updated_at);
    }
}

fn classify_running(row: &QueryRow) -> PollStatus {
    match row.state.as_str() {
        catalog::QUERY_RUNNING => PollStatus::Ready,
        catalog::QUERY_ERRORED => PollStatus::Failed,
        _ => PollStatus::Pending,
    }
}

fn classify_terminated(row: &QueryRow) -> PollStatus {
    if row.state == catalog::QUERY_TERMINATED {
        PollStatus::Ready
    } else {
        PollStatus::Pending
    }
}

/// Run a validated query-creating statement and wait for it to reach
/// `running`. A query that never gets there is terminated again.
pub(super) async fn launch(
    ctx: &ProviderContext,
    session: &Session,
    sql: &str,
    kind: &str,
) -> Result<QueryRow> {
    let artifact = plan::execute_create(session, sql).await?;
    let id = artifact.name;
    tracing::debug!("{} {} submitted, waiting for running state", kind, id);

    let running = poll_until(
        &ctx.cancel,
        ctx.poll.query_running,
        PollMode::Creation,
        || catalog::lookup_query(session, &id),
        classify_running,
    )
    .await;
    match running {
        Ok(Some(row)) => Ok(row),
        Ok(None) => Err(ProviderError::NotFound(format!("{kind} {id}"))),
        Err(err) => {
            let what = format!("{kind} {id}");
            cleanup(session, format!("TERMINATE QUERY {id};"), &what).await;
            let err = poll_failure(
                err,
                &format!("{what} to reach running state"),
                |r: &QueryRow| r.state.clone(),
                None,
            );
            Err(match err {
                ProviderError::Cancelled(_) => err,
                other => ProviderError::partial(what, other),
            })
        }
    }
}

/// Terminate a query unless it is already on its way out, then wait
/// (best effort) for it to report `terminated` or disappear.
pub(super) async fn terminate(
    ctx: &ProviderContext,
    session: &Session,
    id: &str,
    last_state: &str,
    kind: &str,
) -> Result<()> {
    if last_state != catalog::QUERY_TERMINATED && last_state != catalog::QUERY_TERMINATE_REQUESTED {
        ignore_not_found(session.exec(format!("TERMINATE QUERY {id};")).await)?;
    }
    let terminated = poll_until(
        &ctx.cancel,
        ctx.poll.query_terminate,
        PollMode::Deletion,
        || catalog::lookup_query(session, id),
        classify_terminated,
    )
    .await;
    confirm_deleted(terminated, &format!("{kind} {id}"))?;
    tracing::info!("{} terminated: {}", kind, id);
    Ok(())
}

/// `ALTER QUERY <id> OWNER TO "<owner>"`, run as the prior owner.
pub(super) async fn alter_owner(
    ctx: &ProviderContext,
    id: &str,
    prior_owner: Option<&str>,
    new_owner: &str,
) -> Result<QueryRow> {
    if id.is_empty() {
        return Err(ProviderError::invalid_input("missing queryId for update"));
    }
    let session = ctx.connect_as(prior_owner).await?;
    session
        .exec(format!("ALTER QUERY {id} OWNER TO {};", quote_ident(new_owner)))
        .await?;
    Ok(catalog::lookup_query(&session, id).await?)
}

fn to_failures(mismatches: Vec<PlanMismatch>) -> Vec<CheckFailure> {
    mismatches
        .into_iter()
        .map(|m| CheckFailure::new(m.property, m.reason))
        .collect()
}

/// Describe `sql` and compare the plan against the declared topology.
/// Without a connection nothing is reported.
pub(super) async fn check_plan<F>(
    ctx: &ProviderContext,
    owner: Option<&str>,
    sql: &str,
    validate: F,
) -> Vec<CheckFailure>
where
    F: FnOnce(&plan::Described) -> Vec<PlanMismatch>,
{
    let session = match ctx.connect_as(owner).await {
        Ok(session) => session,
        Err(err) => {
            tracing::debug!("Skipping plan validation: {}", err);
            return Vec::new();
        }
    };
    match plan::describe(&session, sql).await {
        Ok(described) => to_failures(validate(&described)),
        Err(err) => vec![CheckFailure::new("sql", format!("describe failed: {err}"))],
    }
}

#[async_trait]
impl Resource for Query {
    type Args = QueryArgs;
    type State = QueryState;

    const TOKEN: &'static str = "deltastream:index:Query";

    const WIRING: &'static [FieldDependency] = &[
        FieldDependency::new("state", "sql"),
        FieldDependency::new("queryId", "sql"),
    ];

    async fn check(&self, ctx: &ProviderContext, inputs: QueryArgs) -> Result<CheckResponse<QueryArgs>> {
        let mut failures = Vec::new();
        require(&mut failures, "sql", &inputs.sql);
        require(&mut failures, "sinkRelationFqn", &inputs.sink_relation_fqn);
        if inputs.source_relation_fqns.is_empty() {
            failures.push(CheckFailure::new(
                "sourceRelationFqns",
                "sourceRelationFqns is required",
            ));
        }
        if !failures.is_empty() {
            return Ok(CheckResponse::new(inputs, failures));
        }

        let failures = check_plan(ctx, inputs.owner.as_deref(), &inputs.sql, |described| {
            plan::validate_query(
                described,
                &inputs.sql,
                &inputs.sink_relation_fqn,
                &inputs.source_relation_fqns,
            )
        })
        .await;
        Ok(CheckResponse::new(inputs, failures))
    }

    fn diff(&self, state: &QueryState, inputs: &QueryArgs) -> Result<DiffResponse> {
        let prior = &state.args;
        let mut diff = DiffResponse::new();
        if !prior.sql.is_empty() && prior.sql != inputs.sql {
            diff.replace("sql");
        }
        if !prior.sink_relation_fqn.is_empty()
            && prior.sink_relation_fqn.trim() != inputs.sink_relation_fqn.trim()
        {
            diff.replace("sinkRelationFqn");
        }
        if !prior.source_relation_fqns.is_empty()
            && !same_set(&prior.source_relation_fqns, &inputs.source_relation_fqns)
        {
            diff.replace("sourceRelationFqns");
        }
        if owner_changed(prior.owner.as_deref(), inputs.owner.as_deref()) {
            diff.update("owner");
        }
        Ok(diff)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        inputs: QueryArgs,
        dry_run: bool,
    ) -> Result<CreateResponse<QueryState>> {
        if dry_run {
            let now = now_rfc3339();
            let base = match inputs.sink_relation_fqn.trim() {
                "" => "query",
                sink => sink,
            };
            return Ok(CreateResponse {
                id: provisional_id(base, &inputs.sql),
                state: QueryState {
                    current_owner: inputs.owner.clone(),
                    args: inputs,
                    query_id: String::new(),
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
        plan::ensure_no_mismatches(&plan::validate_query(
            &described,
            &inputs.sql,
            &inputs.sink_relation_fqn,
            &inputs.source_relation_fqns,
        ))?;

        let row = launch(ctx, &session, &inputs.sql, "query").await?;
        let mut state = QueryState {
            args: inputs,
            query_id: row.id.clone(),
            query_name: None,
            query_version: None,
            state: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
            current_owner: None,
        };
        state.refresh(row);
        tracing::info!("Query created: {}", state.query_id);
        Ok(CreateResponse {
            id: state.query_id.clone(),
            state,
        })
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        mut state: QueryState,
    ) -> Result<Option<ReadResponse<QueryArgs, QueryState>>> {
        if id.is_empty() {
            return Ok(None);
        }
        let session = ctx.connect_as(state.args.owner.as_deref()).await?;
        let row = match catalog::lookup_query(&session, id).await {
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
        mut state: QueryState,
        inputs: QueryArgs,
        dry_run: bool,
    ) -> Result<QueryState> {
        if self.diff(&state, &inputs)?.requires_replace() {
            return Err(ProviderError::Unsupported(format!(
                "query {id}: only the owner can be updated"
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

        let row = alter_owner(ctx, &state.query_id, state.args.owner.as_deref(), &new_owner).await?;
        tracing::info!("Query {} owner changed to {}", id, new_owner);
        state.args.owner = Some(new_owner);
        state.refresh(row);
        Ok(state)
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, state: QueryState) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        let session = ctx.connect_as(state.args.owner.as_deref()).await?;
        terminate(ctx, &session, id, &state.state, "query").await
    }
}
