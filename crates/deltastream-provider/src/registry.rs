//! Resource registry and host-facing dispatch
//!
//! The host addresses resource kinds and functions by type token and speaks
//! JSON. [`Provider`] routes each lifecycle call to the matching controller.

use crate::context::ProviderContext;
use crate::diff::DiffResponse;
use crate::error::{ProviderError, Result};
use crate::functions;
use crate::resource::{CheckResponse, CreateResponse, DynResource, FieldDependency, ReadResponse};
use crate::resources::{Application, Database, DeltaStreamObject, Namespace, Query, Store};
use serde_json::Value;

/// Every resource kind the provider manages, in registration order.
pub static RESOURCES: &[&dyn DynResource] = &[
    &Database,
    &Namespace,
    &Store,
    &DeltaStreamObject,
    &Query,
    &Application,
];

/// Look up a controller by its type token.
pub fn resource(token: &str) -> Result<&'static dyn DynResource> {
    RESOURCES
        .iter()
        .copied()
        .find(|r| r.token() == token)
        .ok_or_else(|| ProviderError::invalid_input(format!("unknown resource type: {token}")))
}

/// Secret paths and wiring of one resource kind, as advertised to the host.
#[derive(Debug, Clone, Copy)]
pub struct ResourceInfo {
    pub token: &'static str,
    pub secrets: &'static [&'static str],
    pub wiring: &'static [FieldDependency],
}

/// Entry point the host plugin shim drives.
#[derive(Clone)]
pub struct Provider {
    ctx: ProviderContext,
}

impl Provider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    pub fn resources(&self) -> Vec<ResourceInfo> {
        RESOURCES
            .iter()
            .map(|r| ResourceInfo {
                token: r.token(),
                secrets: r.secrets(),
                wiring: r.wiring(),
            })
            .collect()
    }

    pub fn functions(&self) -> &'static [&'static str] {
        functions::FUNCTIONS
    }

    pub async fn check(&self, token: &str, inputs: Value) -> Result<CheckResponse<Value>> {
        let response = resource(token)?.check(&self.ctx, inputs).await?;
        if !response.failures.is_empty() {
            tracing::debug!("{} check reported {} failure(s)", token, response.failures.len());
        }
        Ok(response)
    }

    pub fn diff(&self, token: &str, state: Value, inputs: Value) -> Result<DiffResponse> {
        resource(token)?.diff(state, inputs)
    }

    pub async fn create(
        &self,
        token: &str,
        inputs: Value,
        dry_run: bool,
    ) -> Result<CreateResponse<Value>> {
        resource(token)?.create(&self.ctx, inputs, dry_run).await
    }

    pub async fn read(
        &self,
        token: &str,
        id: &str,
        state: Value,
    ) -> Result<Option<ReadResponse<Value, Value>>> {
        let read = resource(token)?.read(&self.ctx, id, state).await?;
        if read.is_none() {
            tracing::info!("{} {} no longer exists", token, id);
        }
        Ok(read)
    }

    pub async fn update(
        &self,
        token: &str,
        id: &str,
        state: Value,
        inputs: Value,
        dry_run: bool,
    ) -> Result<Value> {
        resource(token)?
            .update(&self.ctx, id, state, inputs, dry_run)
            .await
    }

    pub async fn delete(&self, token: &str, id: &str, state: Value) -> Result<()> {
        resource(token)?.delete(&self.ctx, id, state).await
    }

    pub async fn invoke(&self, token: &str, args: Value) -> Result<Value> {
        functions::invoke(&self.ctx, token, args).await
    }
}
