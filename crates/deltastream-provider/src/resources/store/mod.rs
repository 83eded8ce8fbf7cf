//! Store resource: connection configuration for Kafka, Snowflake or
//! PostgreSQL
//!
//! Exactly one subtype block is set per store. The subtype itself is
//! immutable; most connection parameters inside it are updated in place with
//! `UPDATE STORE ... WITH ( ... )`.

mod kafka;
mod postgres;
mod snowflake;

pub use kafka::KafkaInputs;
pub use postgres::{PostgresInputs, normalize_uri};
pub use snowflake::SnowflakeInputs;

use super::{cleanup, confirm_deleted, ignore_not_found, now_rfc3339, poll_failure, require};
use crate::catalog::{self, StoreRow, format_ts};
use crate::context::ProviderContext;
use crate::diff::{DiffResponse, owner_changed};
use crate::error::{ProviderError, Result};
use crate::poll::{PollMode, PollStatus, poll_until};
use crate::resource::{
    CheckFailure, CheckResponse, CreateResponse, FieldDependency, ReadResponse, Resource,
};
use async_trait::async_trait;
use deltastream_client::{Attachment, Session, Statement, WithOptions, quote_ident};
use serde::{Deserialize, Serialize};

pub struct Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreArgs {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka: Option<KafkaInputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snowflake: Option<SnowflakeInputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresInputs>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    #[serde(flatten)]
    pub args: StoreArgs,
    /// KAFKA, SNOWFLAKE or POSTGRESQL
    #[serde(rename = "type", default)]
    pub store_type: String,
    /// Provisioning status reported by the catalog
    #[serde(default)]
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub current_owner: Option<String>,
}

impl StoreState {
    fn refresh(&mut self, row: StoreRow) {
        self.store_type = row.store_type;
        self.state = row.status;
        self.current_owner = row.owner;
        self.created_at = format_ts(&row.created_at);
        self.updated_at = format_ts(&row.updated_at);
    }
}

/// Borrowed view of the single populated subtype block.
#[derive(Debug, Clone, Copy)]
enum Subtype<'a> {
    Kafka(&'a KafkaInputs),
    Snowflake(&'a SnowflakeInputs),
    Postgres(&'a PostgresInputs),
}

impl Subtype<'_> {
    fn type_label(&self) -> &'static str {
        match self {
            Subtype::Kafka(_) => "KAFKA",
            Subtype::Snowflake(_) => "SNOWFLAKE",
            Subtype::Postgres(_) => "POSTGRESQL",
        }
    }

    fn property(&self) -> &'static str {
        match self {
            Subtype::Kafka(_) => "kafka",
            Subtype::Snowflake(_) => "snowflake",
            Subtype::Postgres(_) => "postgres",
        }
    }

    fn validate(&self) -> Vec<CheckFailure> {
        match self {
            Subtype::Kafka(k) => k.validate(),
            Subtype::Snowflake(s) => s.validate(),
            Subtype::Postgres(p) => p.validate(),
        }
    }

    async fn create_options(&self) -> Result<StoreOptions> {
        match self {
            Subtype::Kafka(k) => k.create_options().await,
            Subtype::Snowflake(s) => s.create_options(),
            Subtype::Postgres(p) => p.create_options(),
        }
    }
}

impl StoreArgs {
    fn subtypes(&self) -> Vec<Subtype<'_>> {
        let mut found = Vec::with_capacity(1);
        if let Some(k) = &self.kafka {
            found.push(Subtype::Kafka(k));
        }
        if let Some(s) = &self.snowflake {
            found.push(Subtype::Snowflake(s));
        }
        if let Some(p) = &self.postgres {
            found.push(Subtype::Postgres(p));
        }
        found
    }

    fn subtype(&self) -> Result<Subtype<'_>> {
        match self.subtypes().as_slice() {
            [only] => Ok(*only),
            [] => Err(ProviderError::invalid_input(format!(
                "store {}: one store subtype required (kafka, snowflake or postgres)",
                self.name
            ))),
            _ => Err(ProviderError::invalid_input(format!(
                "store {}: only one store subtype may be specified",
                self.name
            ))),
        }
    }

    /// Canonical form kept in state: postgres URIs are normalized.
    fn normalized(mut self) -> Result<Self> {
        if let Some(pg) = self.postgres.as_mut() {
            pg.uris = normalize_uri(&pg.uris)?;
        }
        Ok(self)
    }
}

/// `WITH ( ... )` options plus the attachments they reference. No `Debug`:
/// values carry credentials.
#[derive(Default)]
pub(crate) struct StoreOptions {
    pub options: WithOptions,
    pub attachments: Vec<Attachment>,
}

impl StoreOptions {
    fn is_empty(&self) -> bool {
        self.options.is_empty() && self.attachments.is_empty()
    }

    pub(crate) fn attach(&mut self, name: &str, data: Vec<u8>) {
        self.attachments.push(Attachment {
            name: name.to_string(),
            data,
        });
    }

    /// `<head> WITH ( ... );`, redacted in logs.
    fn into_statement(self, head: String) -> Statement {
        let mut statement =
            Statement::new(format!("{head} WITH ( {} );", self.options.render())).sensitive();
        statement.attachments = self.attachments;
        statement
    }
}

/// Write `new` when it differs from `old`. A cleared or emptied value is sent
/// as `NULL`.
pub(crate) fn set_if_changed(
    options: &mut WithOptions,
    key: &str,
    old: Option<&str>,
    new: Option<&str>,
) {
    if old == new {
        return;
    }
    match new {
        Some(value) if !value.is_empty() => options.string(key, value),
        _ => options.null(key),
    };
}

/// Record an in-place update on `prefix.field` when the values differ.
pub(crate) fn diff_field<T: PartialEq>(
    diff: &mut DiffResponse,
    prefix: &str,
    field: &str,
    old: &T,
    new: &T,
) {
    if old != new {
        diff.update(&format!("{prefix}.{field}"));
    }
}

fn classify_ready(row: &StoreRow) -> PollStatus {
    if row.status.eq_ignore_ascii_case(catalog::STORE_READY) {
        PollStatus::Ready
    } else if row.status.eq_ignore_ascii_case(catalog::STORE_ERRORED) {
        PollStatus::Failed
    } else {
        PollStatus::Pending
    }
}

/// Wait for `name` to report `ready`. The catalog status message is attached
/// to failures and timeouts.
async fn wait_ready(ctx: &ProviderContext, session: &Session, name: &str) -> Result<StoreRow> {
    let ready = poll_until(
        &ctx.cancel,
        ctx.poll.store_ready,
        PollMode::Creation,
        || catalog::lookup_store(session, name),
        classify_ready,
    )
    .await;
    match ready {
        Ok(row) => row.ok_or_else(|| ProviderError::NotFound(format!("store {name}"))),
        Err(err) => {
            let message = catalog::store_status_message(session, name)
                .await
                .ok()
                .flatten();
            Err(poll_failure(
                err,
                &format!("store {name} to become ready"),
                |r: &StoreRow| r.status.clone(),
                message,
            ))
        }
    }
}

fn drop_sql(name: &str) -> String {
    format!("DROP STORE {};", quote_ident(name))
}

#[async_trait]
impl Resource for Store {
    type Args = StoreArgs;
    type State = StoreState;

    const TOKEN: &'static str = "deltastream:index:Store";

    const SECRETS: &'static [&'static str] = &[
        "kafka.saslUsername",
        "kafka.saslPassword",
        "postgres.password",
        "snowflake.clientKey",
    ];

    const WIRING: &'static [FieldDependency] = &[
        FieldDependency::new("type", "kafka"),
        FieldDependency::new("type", "snowflake"),
        FieldDependency::new("type", "postgres"),
        FieldDependency::new("state", "kafka"),
        FieldDependency::new("state", "snowflake"),
        FieldDependency::new("state", "postgres"),
    ];

    async fn check(&self, _ctx: &ProviderContext, inputs: StoreArgs) -> Result<CheckResponse<StoreArgs>> {
        let mut failures = Vec::new();
        require(&mut failures, "name", &inputs.name);
        match inputs.subtypes().as_slice() {
            [] => failures.push(CheckFailure::new(
                "",
                "one store subtype required (kafka, snowflake or postgres)",
            )),
            [only] => failures.extend(only.validate()),
            _ => failures.push(CheckFailure::new(
                "",
                "only one store subtype may be specified",
            )),
        }
        Ok(CheckResponse::new(inputs, failures))
    }

    fn diff(&self, state: &StoreState, inputs: &StoreArgs) -> Result<DiffResponse> {
        let prior = &state.args;
        let mut diff = DiffResponse::new();
        if prior.name != inputs.name {
            diff.replace("name");
        }
        if owner_changed(prior.owner.as_deref(), inputs.owner.as_deref()) {
            diff.update("owner");
        }

        let presence = |a: &StoreArgs| {
            (
                a.kafka.is_some(),
                a.snowflake.is_some(),
                a.postgres.is_some(),
            )
        };
        if presence(prior) != presence(inputs) {
            for property in ["kafka", "snowflake", "postgres"] {
                diff.replace(property);
            }
            return Ok(diff);
        }

        if let (Some(old), Some(new)) = (&prior.kafka, &inputs.kafka) {
            old.diff(new, &mut diff);
        }
        if let (Some(old), Some(new)) = (&prior.snowflake, &inputs.snowflake) {
            old.diff(new, &mut diff);
        }
        if let (Some(old), Some(new)) = (&prior.postgres, &inputs.postgres) {
            old.diff(new, &mut diff)?;
        }
        Ok(diff)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        inputs: StoreArgs,
        dry_run: bool,
    ) -> Result<CreateResponse<StoreState>> {
        let type_label = inputs.subtype()?.type_label();
        if dry_run {
            let now = now_rfc3339();
            return Ok(CreateResponse {
                id: inputs.name.clone(),
                state: StoreState {
                    current_owner: inputs.owner.clone(),
                    args: inputs,
                    store_type: type_label.to_string(),
                    state: String::new(),
                    created_at: now.clone(),
                    updated_at: now,
                },
            });
        }

        let inputs = inputs.normalized()?;
        let options = inputs.subtype()?.create_options().await?;
        tracing::debug!("Creating {} store {}", type_label, inputs.name);

        let session = ctx.connect_as(inputs.owner.as_deref()).await?;
        session
            .exec(options.into_statement(format!("CREATE STORE {}", quote_ident(&inputs.name))))
            .await?;

        let row = match wait_ready(ctx, &session, &inputs.name).await {
            Ok(row) => row,
            Err(err) => {
                let what = format!("store {}", inputs.name);
                cleanup(&session, drop_sql(&inputs.name), &what).await;
                return Err(match err {
                    ProviderError::Cancelled(_) => err,
                    other => ProviderError::partial(what, other),
                });
            }
        };

        let mut state = StoreState {
            args: inputs,
            store_type: type_label.to_string(),
            state: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
            current_owner: None,
        };
        state.refresh(row);
        tracing::info!("Store created: {} ({})", state.args.name, state.store_type);
        Ok(CreateResponse {
            id: state.args.name.clone(),
            state,
        })
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        mut state: StoreState,
    ) -> Result<Option<ReadResponse<StoreArgs, StoreState>>> {
        if id.is_empty() {
            return Ok(None);
        }
        let session = ctx.connect_as(state.args.owner.as_deref()).await?;
        let row = match catalog::lookup_store(&session, id).await {
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
        mut state: StoreState,
        inputs: StoreArgs,
        dry_run: bool,
    ) -> Result<StoreState> {
        if state.args.name != inputs.name {
            return Err(ProviderError::Unsupported(format!(
                "store {id} cannot be renamed in place"
            )));
        }
        let inputs = inputs.normalized()?;
        let options = match (state.args.subtype()?, inputs.subtype()?) {
            (Subtype::Kafka(old), Subtype::Kafka(new)) => old.update_options(new).await?,
            (Subtype::Snowflake(old), Subtype::Snowflake(new)) => old.update_options(new)?,
            (Subtype::Postgres(old), Subtype::Postgres(new)) => old.update_options(new),
            (old, new) => {
                return Err(ProviderError::Unsupported(format!(
                    "store {id}: changing store subtype from {} to {} not supported; requires replacement",
                    old.property(),
                    new.property()
                )));
            }
        };
        let prior_owner = state.args.owner.clone();
        let new_owner = inputs
            .owner
            .as_deref()
            .filter(|o| owner_changed(prior_owner.as_deref(), Some(o)))
            .map(str::to_string);

        if dry_run {
            state.args = StoreArgs {
                owner: new_owner.or(prior_owner),
                ..inputs
            };
            return Ok(state);
        }
        if options.is_empty() && new_owner.is_none() {
            return Ok(state);
        }

        let session = ctx.connect_as(prior_owner.as_deref()).await?;
        if !options.is_empty() {
            tracing::debug!("Updating store {} connection parameters", id);
            session
                .exec(options.into_statement(format!("UPDATE STORE {}", quote_ident(id))))
                .await?;
        }
        if let Some(owner) = &new_owner {
            session
                .exec(format!(
                    "ALTER STORE {} OWNER TO {};",
                    quote_ident(id),
                    quote_ident(owner)
                ))
                .await?;
            tracing::info!("Store {} owner changed to {}", id, owner);
        }

        let row = wait_ready(ctx, &session, id).await?;
        state.args = StoreArgs {
            owner: new_owner.or(prior_owner),
            ..inputs
        };
        state.refresh(row);
        Ok(state)
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, state: StoreState) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        let session = ctx.connect_as(state.args.owner.as_deref()).await?;
        ignore_not_found(session.exec(drop_sql(id)).await)?;

        let gone = poll_until(
            &ctx.cancel,
            ctx.poll.store_drop,
            PollMode::Deletion,
            || catalog::lookup_store(&session, id),
            |_| PollStatus::Pending,
        )
        .await;
        confirm_deleted(gone, &format!("store {id}"))?;
        tracing::info!("Store deleted: {}", id);
        Ok(())
    }
}
