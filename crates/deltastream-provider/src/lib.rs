//! DeltaStream infrastructure-as-code provider
//!
//! Reconciles declared DeltaStream objects (databases, namespaces, stores,
//! relations, queries and applications) against the live catalog. Each kind
//! implements the same Check/Diff/Create/Read/Update/Delete lifecycle on top
//! of a shared connection, plan validation and readiness polling layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              host plugin shim (JSON)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                   Provider                       │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   resource controllers   │   functions    │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────────┐     │
//! │  │   plan   │ │ catalog  │ │     poll     │     │
//! │  └──────────┘ └──────────┘ └──────────────┘     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               deltastream-client                 │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod context;
pub mod diff;
pub mod error;
pub mod functions;
pub mod plan;
pub mod poll;
pub mod preview;
pub mod registry;
pub mod resource;
pub mod resources;

// Re-exports
pub use context::{PollSettings, PollSpec, ProviderContext};
pub use diff::{DiffKind, DiffResponse};
pub use error::{ProviderError, Result};
pub use registry::{Provider, ResourceInfo};
pub use resource::{
    CheckFailure, CheckResponse, CreateResponse, DynResource, FieldDependency, ReadResponse,
    Resource,
};
pub use resources::{
    Application, ApplicationArgs, ApplicationState, Database, DatabaseArgs, DatabaseState,
    DeltaStreamObject, KafkaInputs, Namespace, NamespaceArgs, NamespaceState, ObjectArgs,
    ObjectState, PostgresInputs, Query, QueryArgs, QueryState, SnowflakeInputs, Store, StoreArgs,
    StoreState,
};
