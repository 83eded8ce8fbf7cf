//! Plan/Describe validator
//!
//! `DESCRIBE <statement>` returns a statement kind and a JSON plan. The plan
//! is checked against the declared topology (target scope, sources, sinks)
//! before anything is created.

use crate::error::{ProviderError, Result};
use deltastream_client::{Session, quote_fqn};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;

pub const KIND_INSERT_INTO: &str = "INSERT_INTO";
pub const KIND_APPLICATION: &str = "APPLICATION";

static INSERT_INTO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*insert\s+into\b").expect("valid INSERT INTO pattern"));

/// One relation as resolved by the planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlannedRelation {
    #[serde(default)]
    pub fqn: String,
    #[serde(rename = "type", default)]
    pub relation_type: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub schema_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub store_name: String,
    #[serde(default)]
    pub is_virtual: bool,
}

impl PlannedRelation {
    /// `"db"."schema"."name"`, the form declared FQNs are compared against.
    pub fn quoted_fqn(&self) -> String {
        quote_fqn(&self.db_name, &self.schema_name, &self.name)
    }

    fn display_fqn(&self) -> String {
        if self.fqn.is_empty() {
            self.quoted_fqn()
        } else {
            self.fqn.clone()
        }
    }
}

/// Structural decomposition of a described statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatementPlan {
    /// Target of a CREATE STREAM/CHANGELOG/TABLE statement
    #[serde(default)]
    pub ddl: Option<PlannedRelation>,
    /// Relations declared inside an application body
    #[serde(default)]
    pub ddls: Vec<PlannedRelation>,
    #[serde(default)]
    pub sink: Option<PlannedRelation>,
    #[serde(default)]
    pub sinks: Vec<PlannedRelation>,
    #[serde(default)]
    pub sources: Vec<PlannedRelation>,
    #[serde(default)]
    pub statements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Described {
    pub kind: String,
    pub plan: StatementPlan,
}

/// A declared-versus-planned disagreement on one input property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanMismatch {
    pub property: String,
    pub reason: String,
}

impl PlanMismatch {
    pub fn new(property: &str, reason: impl Into<String>) -> Self {
        Self {
            property: property.to_string(),
            reason: reason.into(),
        }
    }
}

/// Collapse mismatches into a single validation error, or `Ok(())`.
pub fn ensure_no_mismatches(mismatches: &[PlanMismatch]) -> Result<()> {
    if mismatches.is_empty() {
        return Ok(());
    }
    let reasons: Vec<String> = mismatches
        .iter()
        .map(|m| format!("{}: {}", m.property, m.reason))
        .collect();
    Err(ProviderError::Validation(format!(
        "planning error: {}",
        reasons.join("; ")
    )))
}

pub fn parse_plan(json: &str) -> Result<StatementPlan> {
    serde_json::from_str(json)
        .map_err(|e| ProviderError::validation(format!("failed to parse plan json: {e}")))
}

/// Run `DESCRIBE <sql>` on the session.
pub async fn describe(session: &Session, sql: &str) -> Result<Described> {
    let row = session.query_row(format!("DESCRIBE {sql}")).await?;
    let kind = row.get_str_at(0)?;
    let plan = parse_plan(&row.get_opt_str_at(1)?.unwrap_or_default())?;
    tracing::debug!("Described statement as {}", kind);
    Ok(Described { kind, plan })
}

/// Map a CREATE_* statement kind to the relation type stored in state.
pub fn relation_type(kind: &str) -> Result<&'static str> {
    match kind.to_ascii_uppercase().as_str() {
        "CREATE_STREAM" => Ok("stream"),
        "CREATE_CHANGELOG" => Ok("changelog"),
        "CREATE_TABLE" => Ok("table"),
        _ => Err(ProviderError::validation(format!(
            "invalid relation type: {kind}"
        ))),
    }
}

pub fn is_insert_into(kind: &str, sql: &str) -> bool {
    kind == KIND_INSERT_INTO || INSERT_INTO_RE.is_match(sql)
}

fn declared_set(declared: &[String]) -> BTreeSet<String> {
    declared.iter().map(|d| d.trim().to_string()).collect()
}

/// Relation statements must be a stream, changelog or table DDL that creates
/// its object in the declared database/namespace and binds the declared
/// store. Every disagreement is reported.
pub fn validate_object_target(
    described: &Described,
    database: &str,
    namespace: &str,
    store: &str,
) -> Vec<PlanMismatch> {
    let mut mismatches = Vec::new();
    if relation_type(&described.kind).is_err() {
        mismatches.push(PlanMismatch::new(
            "sql",
            format!("invalid relation type: {}", described.kind),
        ));
    }
    let Some(ddl) = &described.plan.ddl else {
        mismatches.push(PlanMismatch::new("sql", "describe returned empty plan"));
        return mismatches;
    };
    if ddl.db_name != database {
        mismatches.push(PlanMismatch::new(
            "database",
            format!(
                "database mismatch: statement would create object in {} instead of {}",
                ddl.db_name, database
            ),
        ));
    }
    if ddl.schema_name != namespace {
        mismatches.push(PlanMismatch::new(
            "namespace",
            format!(
                "namespace mismatch: statement would create object in {} instead of {}",
                ddl.schema_name, namespace
            ),
        ));
    }
    if ddl.store_name != store {
        mismatches.push(PlanMismatch::new(
            "store",
            format!(
                "store mismatch: statement would use store {} instead of {}",
                ddl.store_name, store
            ),
        ));
    }
    mismatches
}

/// Both directions of source equality: every planned source is declared
/// and every declared source is planned.
fn validate_sources(
    planned: &[PlannedRelation],
    declared: &[String],
    property: &str,
) -> Vec<PlanMismatch> {
    let declared = declared_set(declared);
    let planned_fqns: BTreeSet<String> = planned.iter().map(PlannedRelation::quoted_fqn).collect();
    let mut mismatches = Vec::new();
    for src in planned {
        if !declared.contains(&src.quoted_fqn()) {
            mismatches.push(PlanMismatch::new(
                property,
                format!("missing source {}", src.display_fqn()),
            ));
        }
    }
    for d in &declared {
        if !planned_fqns.contains(d) {
            mismatches.push(PlanMismatch::new(
                property,
                format!("declared source {d} is not a source of the statement"),
            ));
        }
    }
    mismatches
}

/// `INSERT INTO ... SELECT ...`: single sink equality, two-way source
/// equality.
pub fn validate_query(
    described: &Described,
    sql: &str,
    sink: &str,
    sources: &[String],
) -> Vec<PlanMismatch> {
    let mut mismatches = Vec::new();
    if !is_insert_into(&described.kind, sql) {
        mismatches.push(PlanMismatch::new(
            "sql",
            format!(
                "only INSERT INTO ... SELECT ... queries are supported (got {})",
                described.kind
            ),
        ));
    }
    match &described.plan.sink {
        None => mismatches.push(PlanMismatch::new("sql", "describe returned no sink relation")),
        Some(planned) if planned.quoted_fqn() != sink.trim() => {
            mismatches.push(PlanMismatch::new(
                "sinkRelationFqn",
                format!(
                    "sink mismatch: statement writes to {} but {} was declared",
                    planned.display_fqn(),
                    sink.trim()
                ),
            ))
        }
        Some(_) => {}
    }
    mismatches.extend(validate_sources(
        &described.plan.sources,
        sources,
        "sourceRelationFqns",
    ));
    mismatches
}

/// `BEGIN APPLICATION ... END APPLICATION`: set equality over sinks and
/// sources, and no virtual relation declared as a source.
pub fn validate_application(
    described: &Described,
    sinks: &[String],
    sources: &[String],
) -> Vec<PlanMismatch> {
    if described.kind != KIND_APPLICATION {
        return vec![PlanMismatch::new(
            "sql",
            format!(
                "unsupported query kind: {} (only APPLICATION queries are supported)",
                described.kind
            ),
        )];
    }
    let plan = &described.plan;
    let mut mismatches = Vec::new();

    let declared_sinks = declared_set(sinks);
    let planned_sinks: BTreeSet<String> = plan.sinks.iter().map(PlannedRelation::quoted_fqn).collect();
    for sink in &plan.sinks {
        if !declared_sinks.contains(&sink.quoted_fqn()) {
            mismatches.push(PlanMismatch::new(
                "sinkRelationFqns",
                format!("missing sink {}", sink.display_fqn()),
            ));
        }
    }
    for declared in &declared_sinks {
        if !planned_sinks.contains(declared) {
            let planned: Vec<String> = plan.sinks.iter().map(PlannedRelation::display_fqn).collect();
            mismatches.push(PlanMismatch::new(
                "sinkRelationFqns",
                format!(
                    "declared sink {declared} not found in application sinks: [{}]",
                    planned.join(", ")
                ),
            ));
        }
    }

    mismatches.extend(validate_sources(&plan.sources, sources, "sourceRelationFqns"));

    let declared_sources = declared_set(sources);
    for ddl in plan.ddls.iter().filter(|d| d.is_virtual) {
        if declared_sources.contains(&ddl.quoted_fqn()) {
            mismatches.push(PlanMismatch::new(
                "sourceRelationFqns",
                format!(
                    "virtual relation {} cannot be declared as a source dependency",
                    ddl.display_fqn()
                ),
            ));
        }
    }
    mismatches
}

/// Result row of a creating statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateArtifact {
    pub kind: String,
    pub name: String,
    pub command: String,
    pub summary: String,
    /// `[database, namespace, name]` for relations
    pub path: Vec<String>,
}

/// Execute a creating statement and decode its artifact row.
pub async fn execute_create(session: &Session, sql: &str) -> Result<CreateArtifact> {
    let row = session.query_row(sql).await?;
    let path_json = row.get_opt_str_at(4)?.unwrap_or_default();
    let path = if path_json.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&path_json).map_err(|e| {
            ProviderError::Validation(format!("failed to parse object path '{path_json}': {e}"))
        })?
    };
    Ok(CreateArtifact {
        kind: row.get_opt_str_at(0)?.unwrap_or_default(),
        name: row.get_str_at(1)?,
        command: row.get_opt_str_at(2)?.unwrap_or_default(),
        summary: row.get_opt_str_at(3)?.unwrap_or_default(),
        path,
    })
}
