//! Resource lifecycle contract
//!
//! Every resource kind implements [`Resource`] with typed inputs and state.
//! The blanket [`DynResource`] impl erases those types to JSON so kinds can
//! sit in one dispatch table.

use crate::context::ProviderContext;
use crate::diff::DiffResponse;
use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A property that failed input validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub property: String,
    pub reason: String,
}

impl CheckFailure {
    pub fn new(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse<A> {
    pub inputs: A,
    pub failures: Vec<CheckFailure>,
}

impl<A> CheckResponse<A> {
    pub fn new(inputs: A, failures: Vec<CheckFailure>) -> Self {
        Self { inputs, failures }
    }

    pub fn ok(inputs: A) -> Self {
        Self::new(inputs, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse<S> {
    pub id: String,
    pub state: S,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse<A, S> {
    pub id: String,
    pub inputs: A,
    pub state: S,
}

/// Output field whose value is derived from an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDependency {
    pub output: &'static str,
    pub input: &'static str,
}

impl FieldDependency {
    pub const fn new(output: &'static str, input: &'static str) -> Self {
        Self { output, input }
    }
}

/// Six-operation lifecycle of one resource kind.
#[async_trait]
pub trait Resource: Send + Sync {
    type Args: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    type State: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Type token the host addresses this kind by
    const TOKEN: &'static str;

    /// Input property paths holding secret material
    const SECRETS: &'static [&'static str] = &[];

    const WIRING: &'static [FieldDependency] = &[];

    async fn check(
        &self,
        ctx: &ProviderContext,
        inputs: Self::Args,
    ) -> Result<CheckResponse<Self::Args>>;

    fn diff(&self, state: &Self::State, inputs: &Self::Args) -> Result<DiffResponse>;

    async fn create(
        &self,
        ctx: &ProviderContext,
        inputs: Self::Args,
        dry_run: bool,
    ) -> Result<CreateResponse<Self::State>>;

    /// `Ok(None)` when the resource no longer exists remotely.
    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        state: Self::State,
    ) -> Result<Option<ReadResponse<Self::Args, Self::State>>>;

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        state: Self::State,
        inputs: Self::Args,
        dry_run: bool,
    ) -> Result<Self::State>;

    async fn delete(&self, ctx: &ProviderContext, id: &str, state: Self::State) -> Result<()>;
}

/// Type-erased [`Resource`] speaking JSON.
#[async_trait]
pub trait DynResource: Send + Sync {
    fn token(&self) -> &'static str;

    fn secrets(&self) -> &'static [&'static str];

    fn wiring(&self) -> &'static [FieldDependency];

    async fn check(&self, ctx: &ProviderContext, inputs: Value) -> Result<CheckResponse<Value>>;

    fn diff(&self, state: Value, inputs: Value) -> Result<DiffResponse>;

    async fn create(
        &self,
        ctx: &ProviderContext,
        inputs: Value,
        dry_run: bool,
    ) -> Result<CreateResponse<Value>>;

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        state: Value,
    ) -> Result<Option<ReadResponse<Value, Value>>>;

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        state: Value,
        inputs: Value,
        dry_run: bool,
    ) -> Result<Value>;

    async fn delete(&self, ctx: &ProviderContext, id: &str, state: Value) -> Result<()>;
}

/// Turn a deserialization error into a check failure on the offending
/// property where serde names it.
fn decode_failure(err: &serde_json::Error) -> CheckFailure {
    let msg = err.to_string();
    let property = msg
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
        .unwrap_or("")
        .to_string();
    let reason = if property.is_empty() {
        format!("invalid inputs: {msg}")
    } else {
        format!("{property} is required")
    };
    CheckFailure::new(property, reason)
}

#[async_trait]
impl<R> DynResource for R
where
    R: Resource + 'static,
{
    fn token(&self) -> &'static str {
        R::TOKEN
    }

    fn secrets(&self) -> &'static [&'static str] {
        R::SECRETS
    }

    fn wiring(&self) -> &'static [FieldDependency] {
        R::WIRING
    }

    async fn check(&self, ctx: &ProviderContext, inputs: Value) -> Result<CheckResponse<Value>> {
        let args: R::Args = match serde_json::from_value(inputs.clone()) {
            Ok(args) => args,
            Err(err) => return Ok(CheckResponse::new(inputs, vec![decode_failure(&err)])),
        };
        let checked = Resource::check(self, ctx, args).await?;
        Ok(CheckResponse::new(
            serde_json::to_value(&checked.inputs)?,
            checked.failures,
        ))
    }

    fn diff(&self, state: Value, inputs: Value) -> Result<DiffResponse> {
        let state: R::State = serde_json::from_value(state)?;
        let inputs: R::Args = serde_json::from_value(inputs)?;
        Resource::diff(self, &state, &inputs)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        inputs: Value,
        dry_run: bool,
    ) -> Result<CreateResponse<Value>> {
        let inputs: R::Args = serde_json::from_value(inputs)?;
        let created = Resource::create(self, ctx, inputs, dry_run).await?;
        Ok(CreateResponse {
            id: created.id,
            state: serde_json::to_value(&created.state)?,
        })
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        state: Value,
    ) -> Result<Option<ReadResponse<Value, Value>>> {
        let state: R::State = serde_json::from_value(state)?;
        match Resource::read(self, ctx, id, state).await? {
            Some(read) => Ok(Some(ReadResponse {
                id: read.id,
                inputs: serde_json::to_value(&read.inputs)?,
                state: serde_json::to_value(&read.state)?,
            })),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        state: Value,
        inputs: Value,
        dry_run: bool,
    ) -> Result<Value> {
        let state: R::State = serde_json::from_value(state)?;
        let inputs: R::Args = serde_json::from_value(inputs)?;
        let updated = Resource::update(self, ctx, id, state, inputs, dry_run).await?;
        Ok(serde_json::to_value(&updated)?)
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str, state: Value) -> Result<()> {
        let state: R::State = serde_json::from_value(state)?;
        Resource::delete(self, ctx, id, state).await
    }
}
