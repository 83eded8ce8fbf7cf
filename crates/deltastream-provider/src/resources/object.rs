//! Relation (stream, changelog, table) resource
//!
//! Relations are created from a DDL statement. The statement is described
//! first so the planner-resolved target can be checked against the declared
//! database, namespace and store before anything is created.

use super::{cleanup, confirm_deleted, ignore_not_found, now_rfc3339, poll_failure, require};
use crate::catalog::{self, RelationPath, RelationRow, format_ts};
use crate::context::ProviderContext;
use crate::diff::{DiffResponse, owner_changed};
use crate::error::{ProviderError, Result};
use crate::plan::{self, Described, PlanMismatch};
use crate::poll::{PollMode, PollStatus, poll_until};
use crate::preview::provisional_id;
use crate::resource::{
    CheckFailure, CheckResponse, CreateResponse, FieldDependency, ReadResponse, Resource,
};
use async_trait::async_trait;
use deltastream_client::{Session, quote_ident};
use serde::{Deserialize, Serialize};

pub struct DeltaStreamObject;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectArgs {
    pub database: String,
    pub namespace: String,
    /// Store backing the relation
    pub store: String,
    /// `CREATE STREAM|CHANGELOG|TABLE ...` statement
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectState {
    #[serde(flatten)]
    pub args: ObjectArgs,
    /// Relation name as resolved by the server
    #[serde(default)]
    pub name: String,
    /// `[database, namespace, name]`
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub fqn: String,
    /// stream, changelog or table
    #[serde(rename = "type", default)]
    pub relation_type: String,
    #[serde(default)]
    pub state: String,
    /// Owner reported by the catalog
    #[serde(default)]
    pub current_owner: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ObjectState {
    fn refresh(&mut self, row: RelationRow) {
        self.name = row.name;
        self.relation_type = row.relation_type;
        self.state = row.state;
        self.current_owner = row.owner;
        self.created_at = format_ts(&row.created_at);
        self.updated_at = format_ts(&row.updated_at);
    }

    fn relation_path(&self) -> Result<RelationPath> {
        RelationPath::from_segments(&self.path).ok_or_else(|| {
            ProviderError::invalid_input(format!(
                "relation state has no valid path (got {:?})",
                self.path
            ))
        })
    }
}

/// Bind the declared scope on `session` and validate the planned target.
async fn plan_object(
    ctx: &ProviderContext,
    session: &Session,
    inputs: &ObjectArgs,
) -> Result<(Described, Vec<PlanMismatch>)> {
    ctx.scope(session, &inputs.database, &inputs.namespace, &inputs.store)
        .await?;
    let described = plan::describe(session, &inputs.sql).await?;
    let mismatches = plan::validate_object_target(
        &described,
        &inputs.database,
        &inputs.namespace,
        &inputs.store,
    );
    Ok((described, mismatches))
}

#[async_trait]
impl Resource for DeltaStreamObject {
    type Args = ObjectArgs;
    type State = ObjectState;

    const TOKEN: &'static str = "deltastream:index:DeltaStreamObject";

    const WIRING: &'static [FieldDependency] = &[
        FieldDependency::new("name", "sql"),
        FieldDependency::new("path", "sql"),
        FieldDependency::new("type", "sql"),
        FieldDependency::new("state", "sql"),
    ];

    async fn check(&self, ctx: &ProviderContext, inputs: ObjectArgs) -> Result<CheckResponse<ObjectArgs>> {
        let mut failures = Vec::new();
        require(&mut failures, "database", &inputs.database);
        require(&mut failures, "namespace", &inputs.namespace);
        require(&mut failures, "store", &inputs.store);
        require(&mut failures, "sql", &inputs.sql);
        if !failures.is_empty() {
            return Ok(CheckResponse::new(inputs, failures));
        }

        // No connection during preview: skip plan validation.
        let session = match ctx.connect_as(inputs.owner.as_deref()).await {
            Ok(session) => session,
            Err(err) => {
                tracing::debug!("Skipping relation plan validation: {}", err);
                return Ok(CheckResponse::ok(inputs));
            }
        };

        match plan_object(ctx, &session, &inputs).await {
            Ok((_, mismatches)) => failures.extend(
                mismatches
                    .into_iter()
                    .map(|m| CheckFailure::new(m.property, m.reason)),
            ),
            Err(err @ ProviderError::Validation(_)) => {
                failures.push(CheckFailure::new("sql", err.to_string()))
            }
            Err(err) => failures.push(CheckFailure::new("sql", format!("describe failed: {err}"))),
        }
        Ok(CheckResponse::new(inputs, failures))
    }

    fn diff(&self, state: &ObjectState, inputs: &ObjectArgs) -> Result<DiffResponse> {
        let prior = &state.args;
        let mut diff = DiffResponse::new();
        for (property, old, new) in [
            ("database", &prior.database, &inputs.database),
            ("namespace", &prior.namespace, &inputs.namespace),
            ("store", &prior.store, &inputs.store),
            ("sql", &prior.sql, &inputs.sql),
        ] {
            if !old.is_empty() && old != new {
                diff.replace(property);
            }
        }
        if owner_changed(prior.owner.as_deref(), inputs.owner.as_deref()) {
            diff.update("owner");
        }
        Ok(diff)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        inputs: ObjectArgs,
        dry_run: bool,
    ) -> Result<CreateResponse<ObjectState>> {
        tracing::debug!(
            "Planning object create in {}.{} store={}",
            inputs.database,
            inputs.namespace,
            inputs.store
        );
        if dry_run {
            let now = now_rfc3339();
            let base = format!("{}.{}", inputs.database, inputs.namespace);
            return Ok(CreateResponse {
                id: provisional_id(&base, &inputs.sql),
                state: ObjectState {
                    current_owner: inputs.owner.clone(),
                    args: inputs,
                    name: String::new(),
                    path: Vec::new(),
                    fqn: String::new(),
                    relation_type: String::new(),
                    state: String::new(),
                    created_at: now.clone(),
                    updated_at: now,
                },
            });
        }

        let session = ctx.connect_as(inputs.owner.as_deref()).await?;
        let (described, mismatches) = plan_object(ctx, &session, &inputs).await?;
        plan::ensure_no_mismatches(&mismatches)?;
        let relation_type = plan::relation_type(&described.kind)?;

        let artifact = plan::execute_create(&session, &inputs.sql).await?;
        let path = RelationPath::from_segments(&artifact.path).ok_or_else(|| {
            ProviderError::validation(format!(
                "unexpected object path {:?} for {}",
                artifact.path, artifact.name
            ))
        })?;
        let fqn = path.fqn();

        let ready = poll_until(
            &ctx.cancel,
            ctx.poll.relation_ready,
            PollMode::Creation,
            || catalog::lookup_relation(&session, &path),
            |_| PollStatus::Ready,
        )
        .await;
        let row = match ready {
            Ok(row) => row.ok_or_else(|| ProviderError::NotFound(format!("relation {fqn}")))?,
            Err(err) => {
                let what = format!("relation {fqn}");
                cleanup(&session, format!("DROP RELATION {fqn};"), &what).await;
                let err = poll_failure(err, &what, |r: &RelationRow| r.state.clone(), None);
                return Err(match err {
                    ProviderError::Cancelled(_) => err,
                    other => ProviderError::partial(what, other),
                });
            }
        };

        let mut state = ObjectState {
            args: inputs,
            name: artifact.name,
            path: path.segments(),
            fqn: fqn.clone(),
            relation_type: relation_type.to_string(),
            state: String::new(),
            current_owner: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        state.refresh(row);
        // Keep the type derived from the statement kind.
        state.relation_type = relation_type.to_string();
        tracing::info!("Object created: {} ({})", state.name, state.relation_type);
        Ok(CreateResponse { id: fqn, state })
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        mut state: ObjectState,
    ) -> Result<Option<ReadResponse<ObjectArgs, ObjectState>>> {
        if id.is_empty() {
            return Ok(None);
        }
        let path = state.relation_path()?;
        let session = ctx.connect_as(state.args.owner.as_deref()).await?;
        let row = match catalog::lookup_relation(&session, &path).await {
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
        mut state: ObjectState,
        inputs: ObjectArgs,
        dry_run: bool,
    ) -> Result<ObjectState> {
        if self.diff(&state, &inputs)?.requires_replace() {
            return Err(ProviderError::Unsupported(format!(
                "relation {id}: only the owner can be updated"
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

        let path = state.relation_path()?;
        let session = ctx.connect_as(state.args.owner.as_deref()).await?;
        session
            .exec(format!(
                "ALTER {} {} OWNER TO {};",
                state.relation_type.to_ascii_uppercase(),
                path.fqn(),
                quote_ident(&new_owner)
            ))
            .await?;
        let row = catalog::lookup_relation(&session, &path).await?;
        tracing::info!("Object {} owner changed to {}", id, new_owner);
        state.args.owner = Some(new_owner);
        state.refresh(row);
        Ok(state)
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, state: ObjectState) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        let path = state.relation_path()?;
        let session = ctx.connect_as(state.args.owner.as_deref()).await?;
        ignore_not_found(session.exec(format!("DROP RELATION {};", path.fqn())).await)?;

        let gone = poll_until(
            &ctx.cancel,
            ctx.poll.relation_drop,
            PollMode::Deletion,
            || catalog::lookup_relation(&session, &path),
            |_| PollStatus::Pending,
        )
        .await;
        confirm_deleted(gone, &format!("relation {}", path.fqn()))?;
        tracing::info!("Object deleted: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffKind;

    fn args() -> ObjectArgs {
        ObjectArgs {
            database: "analytics".into(),
            namespace: "public".into(),
            store: "kafka_store".into(),
            sql: "CREATE STREAM pageviews (viewtime BIGINT) WITH ('topic' = 'pageviews');".into(),
            owner: None,
        }
    }

    fn state() -> ObjectState {
        ObjectState {
            args: args(),
            name: "pageviews".into(),
            path: vec!["analytics".into(), "public".into(), "pageviews".into()],
            fqn: "\"analytics\".\"public\".\"pageviews\"".into(),
            relation_type: "stream".into(),
            state: "created".into(),
            current_owner: Some("sysadmin".into()),
            created_at: "2024-05-01T10:20:30Z".into(),
            updated_at: "2024-05-01T10:20:30Z".into(),
        }
    }

    #[test]
    fn test_diff_structural_fields_replace() {
        let mut inputs = args();
        inputs.sql.push_str(" -- v2");
        inputs.owner = Some("analyst".into());
        let diff = DeltaStreamObject.diff(&state(), &inputs).unwrap();
        assert_eq!(diff.kind_of("sql"), Some(DiffKind::Replace));
        assert_eq!(diff.kind_of("owner"), Some(DiffKind::Update));
        assert_eq!(diff.kind_of("store"), None);
    }

    #[test]
    fn test_state_flattens_inputs() {
        let value = serde_json::to_value(state()).unwrap();
        assert_eq!(value["database"], "analytics");
        assert_eq!(value["type"], "stream");
        assert_eq!(value["currentOwner"], "sysadmin");
        assert!(value.get("owner").is_none());
        let back: ObjectState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state());
    }

    #[test]
    fn test_relation_path_from_state() {
        assert_eq!(
            state().relation_path().unwrap().fqn(),
            "\"analytics\".\"public\".\"pageviews\""
        );
        let mut broken = state();
        broken.path.clear();
        assert!(broken.relation_path().is_err());
    }
}
