mod common;

use anyhow::Result;
use common::{FakeConnector, artifact, describe, planned, query_row};
use deltastream_provider::{
    Application, ApplicationArgs, ApplicationState, ProviderError, Query, QueryArgs, QueryState,
    Resource,
};
use serde_json::json;

const SINK: &str = r#""analytics"."public"."enriched""#;
const PAGEVIEWS: &str = r#""analytics"."public"."pageviews""#;
const USERS: &str = r#""analytics"."public"."users""#;
const SQL: &str = "INSERT INTO enriched SELECT * FROM pageviews p JOIN users u ON p.uid = u.id;";
const QUERY_LOOKUP: &str = r#""queries" where id"#;

fn args() -> QueryArgs {
    QueryArgs {
        source_relation_fqns: vec![PAGEVIEWS.into(), USERS.into()],
        sink_relation_fqn: SINK.into(),
        sql: SQL.into(),
        owner: None,
    }
}

fn insert_plan(sources: &[&str]) -> serde_json::Value {
    json!({
        "sink": planned("analytics", "public", "enriched"),
        "sources": sources
            .iter()
            .map(|name| planned("analytics", "public", name))
            .collect::<Vec<_>>(),
    })
}

fn script_launch(fake: &FakeConnector, sources: &[&str], states: &[&str]) {
    fake.on("DESCRIBE", vec![describe("INSERT_INTO", insert_plan(sources))]);
    fake.on("INSERT INTO", vec![artifact("query", "q-1")]);
    fake.on(
        QUERY_LOOKUP,
        states
            .iter()
            .map(|state| query_row("enriched_query", state))
            .collect(),
    );
}

#[tokio::test]
async fn test_create_waits_for_running() -> Result<()> {
    let fake = FakeConnector::new();
    script_launch(&fake, &["pageviews", "users"], &["starting", "starting", "running"]);

    let created = Query.create(&fake.ctx(), args(), false).await?;

    assert_eq!(created.id, "q-1");
    assert_eq!(created.state.query_id, "q-1");
    assert_eq!(created.state.state, "running");
    assert_eq!(created.state.query_version, Some(1));
    assert_eq!(created.state.query_name.as_deref(), Some("enriched_query"));
    assert_eq!(fake.count(QUERY_LOOKUP), 3);

    let statements = fake.statements();
    assert!(statements[0].starts_with("DESCRIBE INSERT INTO"));
    assert_eq!(statements[1], SQL);
    Ok(())
}

#[tokio::test]
async fn test_source_mismatch_fails_before_insert() {
    let fake = FakeConnector::new();
    script_launch(&fake, &["pageviews"], &["running"]);

    let err = Query.create(&fake.ctx(), args(), false).await.unwrap_err();

    assert!(matches!(err, ProviderError::Validation(_)));
    let message = err.to_string();
    assert!(message.contains("planning error"), "{message}");
    assert!(
        message.contains(&format!("declared source {USERS} is not a source of the statement")),
        "{message}"
    );
    assert_eq!(fake.statements().len(), 1);
    assert_eq!(fake.position(SQL), Some(0));
    assert_eq!(fake.count(QUERY_LOOKUP), 0);
}

#[tokio::test]
async fn test_undeclared_source_reported_by_check() -> Result<()> {
    let fake = FakeConnector::new();
    fake.on(
        "DESCRIBE",
        vec![describe(
            "INSERT_INTO",
            insert_plan(&["pageviews", "users", "sessions"]),
        )],
    );

    let checked = Query.check(&fake.ctx(), args()).await?;

    assert_eq!(checked.failures.len(), 1);
    assert_eq!(checked.failures[0].property, "sourceRelationFqns");
    assert_eq!(
        checked.failures[0].reason,
        "missing source analytics.public.sessions"
    );
    Ok(())
}

#[tokio::test]
async fn test_check_without_connection_skips_plan() -> Result<()> {
    let fake = FakeConnector::new();
    let mut config = common::config();
    config.api_key = None;
    let ctx = deltastream_provider::ProviderContext::new(config, std::sync::Arc::new(fake.clone()));

    let checked = Query.check(&ctx, args()).await?;

    assert!(checked.failures.is_empty());
    assert!(fake.statements().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_errored_query_is_terminated() {
    let fake = FakeConnector::new();
    script_launch(&fake, &["pageviews", "users"], &["starting", "errored"]);

    let err = Query.create(&fake.ctx(), args(), false).await.unwrap_err();

    match err {
        ProviderError::PartialFailure { what, source } => {
            assert_eq!(what, "query q-1");
            assert!(matches!(*source, ProviderError::Errored { ref state, .. } if state == "errored"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fake.count("TERMINATE QUERY q-1;"), 1);
}

#[tokio::test]
async fn test_preview_ids_are_stable() -> Result<()> {
    let fake = FakeConnector::new();

    let first = Query.create(&fake.ctx(), args(), true).await?;
    let second = Query.create(&fake.ctx(), args(), true).await?;
    let changed = Query
        .create(
            &fake.ctx(),
            QueryArgs {
                sql: "INSERT INTO enriched SELECT * FROM pageviews;".into(),
                ..args()
            },
            true,
        )
        .await?;

    assert_eq!(first.id, second.id);
    assert_ne!(first.id, changed.id);
    assert!(first.id.starts_with("preview-"));
    assert_eq!(first.state.state, "starting");
    assert!(fake.statements().is_empty());
    Ok(())
}

fn running_state() -> QueryState {
    QueryState {
        args: args(),
        query_id: "q-1".into(),
        query_name: Some("enriched_query".into()),
        query_version: Some(1),
        state: "running".into(),
        created_at: "2024-05-01T10:20:30Z".into(),
        updated_at: "2024-05-01T10:20:30Z".into(),
        current_owner: Some("sysadmin".into()),
    }
}

#[tokio::test]
async fn test_delete_terminates_running_query() -> Result<()> {
    let fake = FakeConnector::new();
    fake.on(
        QUERY_LOOKUP,
        vec![
            query_row("enriched_query", "terminate_requested"),
            query_row("enriched_query", "terminated"),
        ],
    );

    Query.delete(&fake.ctx(), "q-1", running_state()).await?;

    assert_eq!(fake.position("TERMINATE QUERY q-1;"), Some(0));
    assert_eq!(fake.count(QUERY_LOOKUP), 2);
    Ok(())
}

#[tokio::test]
async fn test_delete_skips_terminate_when_already_requested() -> Result<()> {
    let fake = FakeConnector::new();
    let state = QueryState {
        state: "terminate_requested".into(),
        ..running_state()
    };

    Query.delete(&fake.ctx(), "q-1", state).await?;

    assert_eq!(fake.count("TERMINATE QUERY"), 0);
    assert_eq!(fake.count(QUERY_LOOKUP), 1);
    Ok(())
}

#[tokio::test]
async fn test_owner_update_alters_query() -> Result<()> {
    let fake = FakeConnector::new();
    fake.on(QUERY_LOOKUP, vec![query_row("enriched_query", "running")]);
    let inputs = QueryArgs {
        owner: Some("analyst".into()),
        ..args()
    };

    let updated = Query
        .update(&fake.ctx(), "q-1", running_state(), inputs, false)
        .await?;

    assert_eq!(updated.args.owner.as_deref(), Some("analyst"));
    assert_eq!(fake.count(r#"ALTER QUERY q-1 OWNER TO "analyst";"#), 1);
    Ok(())
}

#[tokio::test]
async fn test_sql_change_cannot_update_in_place() {
    let fake = FakeConnector::new();
    let inputs = QueryArgs {
        sql: "INSERT INTO enriched SELECT * FROM pageviews;".into(),
        ..args()
    };

    let err = Query
        .update(&fake.ctx(), "q-1", running_state(), inputs, false)
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Unsupported(_)));
    assert!(fake.statements().is_empty());
}

#[tokio::test]
async fn test_application_rejects_virtual_source() -> Result<()> {
    let fake = FakeConnector::new();
    let mut virtual_rel = planned("analytics", "public", "staging");
    virtual_rel["is_virtual"] = json!(true);
    fake.on(
        "DESCRIBE",
        vec![describe(
            "APPLICATION",
            json!({
                "ddls": [virtual_rel.clone()],
                "sinks": [planned("analytics", "public", "enriched")],
                "sources": [planned("analytics", "public", "pageviews"), virtual_rel],
            }),
        )],
    );
    let inputs = ApplicationArgs {
        source_relation_fqns: vec![PAGEVIEWS.into(), r#""analytics"."public"."staging""#.into()],
        sink_relation_fqns: vec![SINK.into()],
        sql: "BEGIN APPLICATION app1 INSERT INTO enriched SELECT * FROM staging; END APPLICATION;"
            .into(),
        owner: None,
    };

    let err = Application
        .create(&fake.ctx(), inputs, false)
        .await
        .unwrap_err();

    assert!(
        err.to_string()
            .contains("virtual relation analytics.public.staging cannot be declared as a source dependency"),
        "{err}"
    );
    assert_eq!(fake.statements().len(), 1);
    Ok(())
}

const BY_REGION: &str = r#""analytics"."public"."by_region""#;
const BY_USER: &str = r#""analytics"."public"."by_user""#;
const APP_SQL: &str = "BEGIN APPLICATION rollups \
INSERT INTO by_region SELECT region, COUNT(*) FROM pageviews GROUP BY region; \
INSERT INTO by_user SELECT userid, COUNT(*) FROM pageviews GROUP BY userid; \
END APPLICATION;";

fn app_args() -> ApplicationArgs {
    ApplicationArgs {
        source_relation_fqns: vec![PAGEVIEWS.into()],
        sink_relation_fqns: vec![BY_USER.into(), BY_REGION.into()],
        sql: APP_SQL.into(),
        owner: None,
    }
}

fn app_plan(sinks: &[&str]) -> serde_json::Value {
    json!({
        "sinks": sinks
            .iter()
            .map(|name| planned("analytics", "public", name))
            .collect::<Vec<_>>(),
        "sources": [planned("analytics", "public", "pageviews")],
    })
}

#[tokio::test]
async fn test_application_create_with_multiple_sinks() -> Result<()> {
    let fake = FakeConnector::new();
    fake.on("DESCRIBE", vec![describe("APPLICATION", app_plan(&["by_region", "by_user"]))]);
    fake.on("BEGIN APPLICATION", vec![artifact("query", "a-1")]);
    fake.on(
        QUERY_LOOKUP,
        vec![query_row("rollups", "starting"), query_row("rollups", "running")],
    );

    let created = Application.create(&fake.ctx(), app_args(), false).await?;

    assert_eq!(created.id, "a-1");
    assert_eq!(created.state.application_id, "a-1");
    assert_eq!(created.state.state, "running");
    assert_eq!(created.state.query_name.as_deref(), Some("rollups"));
    assert_eq!(created.state.args.sink_relation_fqns, vec![BY_USER, BY_REGION]);
    assert_eq!(fake.statements()[1], APP_SQL);
    assert_eq!(fake.count(QUERY_LOOKUP), 2);
    Ok(())
}

#[tokio::test]
async fn test_application_sink_mismatch_fails_before_launch() {
    let fake = FakeConnector::new();
    fake.on("DESCRIBE", vec![describe("APPLICATION", app_plan(&["by_region", "by_device"]))]);

    let err = Application
        .create(&fake.ctx(), app_args(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Validation(_)), "{err:?}");
    let message = err.to_string();
    assert!(message.contains("missing sink analytics.public.by_device"), "{message}");
    assert!(
        message.contains(&format!("declared sink {BY_USER} not found in application sinks")),
        "{message}"
    );
    assert_eq!(fake.statements().len(), 1);
    assert_eq!(fake.count(QUERY_LOOKUP), 0);
}

#[tokio::test]
async fn test_application_owner_update() -> Result<()> {
    let fake = FakeConnector::new();
    fake.on(QUERY_LOOKUP, vec![query_row("rollups", "running")]);
    let state = ApplicationState {
        args: app_args(),
        application_id: "a-1".into(),
        query_name: Some("rollups".into()),
        query_version: Some(1),
        state: "running".into(),
        created_at: "2024-05-01T10:20:30Z".into(),
        updated_at: "2024-05-01T10:20:30Z".into(),
        current_owner: Some("sysadmin".into()),
    };
    let mut inputs = app_args();
    inputs.owner = Some("analyst".into());
    inputs.sink_relation_fqns.reverse();

    let updated = Application
        .update(&fake.ctx(), "a-1", state, inputs, false)
        .await?;

    assert_eq!(updated.args.owner.as_deref(), Some("analyst"));
    assert_eq!(fake.statements()[0], r#"ALTER QUERY a-1 OWNER TO "analyst";"#);
    Ok(())
}
