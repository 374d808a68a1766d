use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use doc_gateway::document::{Document, ID_FIELD};
use doc_gateway::filter::Query;
use doc_gateway::gateway::{Gateway, GatewayError, GatewayLimits, ReadParams, ReadResult};
use doc_gateway::intercept::{InterceptError, RequestContext};
use doc_gateway::policy::{CollectionPolicy, PolicyRegistry};
use doc_gateway::storage::{BackendError, CollectionRef, FindOptions, MemoryStore, StorageBackend, WriteResult};
use doc_gateway::types::Operation;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn limits() -> GatewayLimits {
    GatewayLimits {
        max_limit: Some(3),
        allow_empty_delete: true,
        default_connection: Some("memory://tests".to_string()),
        timeout: Duration::from_secs(5),
    }
}

fn registry(policies: Vec<CollectionPolicy>) -> PolicyRegistry {
    let mut builder = PolicyRegistry::builder();
    for policy in policies {
        builder.register(policy);
    }
    builder.build()
}

fn gateway(policies: Vec<CollectionPolicy>) -> (Gateway, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let gateway = Gateway::new(registry(policies), store.clone()).with_limits(limits());
    (gateway, store)
}

fn todos_policy() -> CollectionPolicy {
    CollectionPolicy::builder("demo", "todos")
        .allow_all()
        .with_user_filter("Username")
        .build()
        .unwrap()
}

fn target() -> CollectionRef {
    CollectionRef::new("memory://tests", "demo", "todos")
}

fn read_all() -> ReadParams {
    ReadParams::default()
}

fn titles(result: &ReadResult) -> Vec<Value> {
    result.documents().iter().map(|d| d["Title"].clone()).collect()
}

#[tokio::test]
async fn zero_policies_deny_every_operation() -> Result<()> {
    let (gateway, _) = gateway(vec![]);
    let ctx = RequestContext::for_user("alice");

    let read = gateway.read("demo", "todos", read_all(), &ctx).await;
    let add = gateway.add("demo", "todos", r#"{"Title": "x"}"#, &ctx).await;
    let update = gateway.update("demo", "todos", r#"{"_id": "1"}"#, &ctx).await;
    let delete = gateway.delete("demo", "todos", Some("{}"), "", &ctx).await;

    assert!(matches!(read, Err(GatewayError::AuthorizationDenied(_))));
    assert!(matches!(add, Err(GatewayError::AuthorizationDenied(_))));
    assert!(matches!(update, Err(GatewayError::AuthorizationDenied(_))));
    assert!(matches!(delete, Err(GatewayError::AuthorizationDenied(_))));
    Ok(())
}

#[tokio::test]
async fn alice_and_bob_see_only_their_own_todos() -> Result<()> {
    let (gateway, store) = gateway(vec![todos_policy()]);
    let alice = RequestContext::for_user("alice");
    let bob = RequestContext::for_user("bob");

    gateway.add("demo", "todos", r#"{"Title": "a1"}"#, &alice).await?;
    gateway.add("demo", "todos", r#"{"Title": "a2"}"#, &alice).await?;
    gateway.add("demo", "todos", r#"{"Title": "b1"}"#, &bob).await?;

    let result = gateway.read("demo", "todos", read_all(), &alice).await?;
    assert_eq!(titles(&result), vec![json!("a1"), json!("a2")]);

    let result = gateway.read("demo", "todos", read_all(), &bob).await?;
    assert_eq!(titles(&result), vec![json!("b1")]);

    // An explicit empty query behaves like no query
    let everything = ReadParams { query: Some("{}".to_string()), ..ReadParams::default() };
    let result = gateway.read("demo", "todos", everything.clone(), &alice).await?;
    assert_eq!(titles(&result), vec![json!("a1"), json!("a2")]);
    let result = gateway.read("demo", "todos", everything, &bob).await?;
    assert_eq!(titles(&result), vec![json!("b1")]);

    assert_eq!(store.snapshot(&target()).await.len(), 3);
    Ok(())
}

#[tokio::test]
async fn add_strips_client_identity() -> Result<()> {
    let (gateway, store) = gateway(vec![todos_policy()]);
    let alice = RequestContext::for_user("alice");

    let saved = gateway.add("demo", "todos", r#"{"_id": "client-chosen", "Title": "x"}"#, &alice).await?;

    assert_ne!(saved[ID_FIELD], json!("client-chosen"));
    let stored = store.snapshot(&target()).await;
    assert_eq!(stored[0][ID_FIELD], saved[ID_FIELD]);
    Ok(())
}

#[tokio::test]
async fn intercepts_cannot_smuggle_an_identity_into_add() -> Result<()> {
    let policy = CollectionPolicy::builder("demo", "notes")
        .allow_all()
        .before_add(|doc, _ctx| {
            doc.insert(ID_FIELD.to_string(), json!("smuggled"));
            Ok(())
        })
        .build()?;
    let (gateway, _) = gateway(vec![policy]);

    let saved = gateway.add("demo", "notes", r#"{"n": 1}"#, &RequestContext::anonymous()).await?;
    assert_ne!(saved[ID_FIELD], json!("smuggled"));
    Ok(())
}

#[tokio::test]
async fn hidden_records_are_never_updated() -> Result<()> {
    let (gateway, store) = gateway(vec![todos_policy()]);
    let alice = RequestContext::for_user("alice");
    let bob = RequestContext::for_user("bob");

    let saved = gateway.add("demo", "todos", r#"{"Title": "private"}"#, &alice).await?;
    let body = json!({"_id": saved[ID_FIELD], "Title": "hijacked"}).to_string();

    let err = gateway.update("demo", "todos", &body, &bob).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));

    let stored = store.snapshot(&target()).await;
    assert_eq!(stored[0]["Title"], json!("private"));
    assert_eq!(stored[0]["Username"], json!("alice"));
    Ok(())
}

#[tokio::test]
async fn hidden_records_are_never_deleted_even_with_an_empty_query() -> Result<()> {
    let (gateway, store) = gateway(vec![todos_policy()]);
    let alice = RequestContext::for_user("alice");
    let bob = RequestContext::for_user("bob");

    let saved = gateway.add("demo", "todos", r#"{"Title": "keep"}"#, &alice).await?;

    let by_id = json!({"_id": saved[ID_FIELD]}).to_string();
    let result = gateway.delete("demo", "todos", Some(&by_id), "", &bob).await?;
    assert_eq!(result.deleted, 0);

    let result = gateway.delete("demo", "todos", None, "{}", &bob).await?;
    assert_eq!(result.deleted, 0);

    assert_eq!(store.snapshot(&target()).await.len(), 1);

    let result = gateway.delete("demo", "todos", None, "{}", &alice).await?;
    assert_eq!(result.deleted, 1);
    Ok(())
}

#[tokio::test]
async fn delete_prefers_the_query_parameter_over_the_body() -> Result<()> {
    let policy = CollectionPolicy::builder("demo", "notes").allow_all().build()?;
    let (gateway, _) = gateway(vec![policy]);
    let ctx = RequestContext::anonymous();

    gateway.add("demo", "notes", r#"{"n": 1}"#, &ctx).await?;
    gateway.add("demo", "notes", r#"{"n": 2}"#, &ctx).await?;

    let result = gateway.delete("demo", "notes", Some(r#"{"n": 1}"#), r#"{"n": 2}"#, &ctx).await?;
    assert_eq!(result.deleted, 1);
    assert_eq!(Value::Object(result.query), json!({"n": 1}));

    // Blank parameter falls back to the body
    let result = gateway.delete("demo", "notes", Some("  "), r#"{"n": 2}"#, &ctx).await?;
    assert_eq!(result.deleted, 1);

    let err = gateway.delete("demo", "notes", None, "", &ctx).await.unwrap_err();
    assert!(matches!(err, GatewayError::MalformedInput(_)));
    Ok(())
}

#[tokio::test]
async fn empty_delete_can_be_disabled() -> Result<()> {
    let policy = CollectionPolicy::builder("demo", "notes").allow_all().build()?;
    let store = Arc::new(MemoryStore::new());
    let gateway = Gateway::new(registry(vec![policy]), store)
        .with_limits(GatewayLimits { allow_empty_delete: false, ..limits() });

    let err = gateway.delete("demo", "notes", Some("{}"), "", &RequestContext::anonymous()).await.unwrap_err();
    assert!(matches!(err, GatewayError::MalformedInput(_)));
    Ok(())
}

#[tokio::test]
async fn wildcard_and_specific_policies_combine() -> Result<()> {
    let read_anywhere = CollectionPolicy::builder("*", "todos").allow([Operation::Read]).build()?;
    let write_demo = CollectionPolicy::builder("demo", "todos")
        .allow([Operation::Add])
        .before_add(|doc, _ctx| {
            doc.insert("source".to_string(), json!("demo-policy"));
            Ok(())
        })
        .build()?;
    let (gateway, _) = gateway(vec![read_anywhere, write_demo]);
    let ctx = RequestContext::anonymous();

    let saved = gateway.add("demo", "todos", r#"{"Title": "x"}"#, &ctx).await?;
    assert_eq!(saved["source"], json!("demo-policy"));

    assert!(gateway.read("other", "todos", read_all(), &ctx).await?.documents().is_empty());
    let err = gateway.add("other", "todos", r#"{"Title": "y"}"#, &ctx).await.unwrap_err();
    assert!(matches!(err, GatewayError::AuthorizationDenied(_)));
    let err = gateway.delete("demo", "todos", Some("{}"), "", &ctx).await.unwrap_err();
    assert!(matches!(err, GatewayError::AuthorizationDenied(_)));
    Ok(())
}

#[tokio::test]
async fn inline_count_uses_the_filtered_query() -> Result<()> {
    let (gateway, _) = gateway(vec![todos_policy()]);
    let alice = RequestContext::for_user("alice");
    let bob = RequestContext::for_user("bob");

    for n in 0..5 {
        gateway.add("demo", "todos", &json!({"Title": format!("a{n}")}).to_string(), &alice).await?;
    }
    gateway.add("demo", "todos", r#"{"Title": "b"}"#, &bob).await?;

    let params = ReadParams {
        limit: Some("10".to_string()),
        inline_count: true,
        ..ReadParams::default()
    };
    match gateway.read("demo", "todos", params, &bob).await? {
        ReadResult::Counted { count, data } => {
            assert_eq!(count, 1);
            assert_eq!(data.len(), 1);
        }
        other => panic!("expected a counted result, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn read_applies_sort_skip_and_capped_limit() -> Result<()> {
    let policy = CollectionPolicy::builder("demo", "notes").allow_all().build()?;
    let (gateway, _) = gateway(vec![policy]);
    let ctx = RequestContext::anonymous();

    for n in [5, 2, 9, 1, 7, 3] {
        gateway.add("demo", "notes", &json!({"n": n}).to_string(), &ctx).await?;
    }

    let params = ReadParams {
        query: Some(r#"{"n": {"$gt": 1}}"#.to_string()),
        sort: Some(r#"{"n": -1}"#.to_string()),
        skip: Some("1".to_string()),
        limit: Some("100".to_string()),
        inline_count: false,
    };
    let result = gateway.read("demo", "notes", params, &ctx).await?;
    let ns: Vec<Value> = result.documents().iter().map(|d| d["n"].clone()).collect();
    // max_limit is 3
    assert_eq!(ns, vec![json!(7), json!(5), json!(3)]);

    let params = ReadParams {
        skip: Some("null".to_string()),
        limit: Some("0".to_string()),
        ..ReadParams::default()
    };
    assert_eq!(gateway.read("demo", "notes", params, &ctx).await?.documents().len(), 6);
    Ok(())
}

#[tokio::test]
async fn malformed_queries_are_rejected_before_the_backend() -> Result<()> {
    let policy = CollectionPolicy::builder("demo", "notes").allow_all().build()?;
    let (gateway, _) = gateway(vec![policy]);
    let ctx = RequestContext::anonymous();

    for query in [r#"{"n": {"$regex": "x"}}"#, "[1, 2]", "{oops"] {
        let params = ReadParams { query: Some(query.to_string()), ..ReadParams::default() };
        let err = gateway.read("demo", "notes", params, &ctx).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedInput(_)), "query {query} gave {err:?}");
    }

    let params = ReadParams { sort: Some(r#"{"n": "sideways"}"#.to_string()), ..ReadParams::default() };
    assert!(matches!(gateway.read("demo", "notes", params, &ctx).await, Err(GatewayError::MalformedInput(_))));
    Ok(())
}

#[tokio::test]
async fn failing_intercept_aborts_persistence() -> Result<()> {
    let policy = CollectionPolicy::builder("demo", "notes")
        .allow_all()
        .before_add(|doc, _ctx| match doc.get("title") {
            Some(Value::String(s)) if !s.is_empty() => Ok(()),
            _ => Err(InterceptError::rejected("title is required")),
        })
        .build()?;
    let (gateway, store) = gateway(vec![policy]);

    let err = gateway.add("demo", "notes", r#"{"body": "no title"}"#, &RequestContext::anonymous()).await.unwrap_err();
    assert!(matches!(err, GatewayError::InterceptFailure { operation: Operation::Add, .. }));
    assert!(store.snapshot(&CollectionRef::new("memory://tests", "demo", "notes")).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn intercepts_run_in_registration_order_across_policies() -> Result<()> {
    let first = CollectionPolicy::builder("*", "notes")
        .allow_all()
        .before_add(|doc, _ctx| {
            doc.insert("trail".to_string(), json!("first"));
            Ok(())
        })
        .before_add(|doc, _ctx| {
            let trail = doc.get("trail").and_then(Value::as_str).unwrap_or_default().to_string();
            doc.insert("trail".to_string(), json!(format!("{trail},second")));
            Ok(())
        })
        .build()?;
    let second = CollectionPolicy::builder("demo", "notes")
        .before_add(|doc, _ctx| {
            let trail = doc.get("trail").and_then(Value::as_str).unwrap_or_default().to_string();
            doc.insert("trail".to_string(), json!(format!("{trail},third")));
            Ok(())
        })
        .build()?;
    let (gateway, _) = gateway(vec![first, second]);

    let saved = gateway.add("demo", "notes", "{}", &RequestContext::anonymous()).await?;
    assert_eq!(saved["trail"], json!("first,second,third"));
    Ok(())
}

#[tokio::test]
async fn update_intercepts_cannot_retarget_the_identity() -> Result<()> {
    let policy = CollectionPolicy::builder("demo", "notes")
        .allow_all()
        .before_update(|doc, _ctx| {
            doc.insert(ID_FIELD.to_string(), json!("elsewhere"));
            Ok(())
        })
        .build()?;
    let (gateway, _) = gateway(vec![policy]);
    let ctx = RequestContext::anonymous();

    let saved = gateway.add("demo", "notes", r#"{"n": 1}"#, &ctx).await?;
    let body = json!({"_id": saved[ID_FIELD], "n": 2}).to_string();
    let err = gateway.update("demo", "notes", &body, &ctx).await.unwrap_err();
    assert!(matches!(err, GatewayError::InterceptFailure { operation: Operation::Update, .. }));
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct Todo {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Done", default)]
    done: bool,
}

#[tokio::test]
async fn typed_intercepts_preserve_untouched_fields() -> Result<()> {
    let policy = CollectionPolicy::typed::<Todo>("typed", "todos")
        .allow_all()
        .before_add(|todo, _ctx| {
            todo.title = todo.title.trim().to_string();
            Ok(())
        })
        .build()?;
    let (gateway, _) = gateway(vec![policy]);

    let body = r#"{"Title": "  padded  ", "Done": true, "Score": 1.50, "Tags": ["a", {"b": null}], "Note": null}"#;
    let saved = gateway.add("typed", "todos", body, &RequestContext::anonymous()).await?;

    let mut expected: Document = serde_json::from_str(body)?;
    expected.insert("Title".to_string(), json!("padded"));
    for (key, value) in &expected {
        assert_eq!(saved.get(key), Some(value), "field {key} changed");
    }
    Ok(())
}

#[tokio::test]
async fn typed_shape_mismatch_fails_the_operation() -> Result<()> {
    let policy = CollectionPolicy::typed::<Todo>("typed", "todos")
        .allow_all()
        .before_add(|_todo, _ctx| Ok(()))
        .build()?;
    let (gateway, _) = gateway(vec![policy]);

    let err = gateway.add("typed", "todos", r#"{"Done": "yes"}"#, &RequestContext::anonymous()).await.unwrap_err();
    match err {
        GatewayError::InterceptFailure { source: InterceptError::Shape { .. }, .. } => {}
        other => panic!("expected a shape failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn missing_connection_is_a_configuration_error() -> Result<()> {
    let policy = CollectionPolicy::builder("demo", "notes").allow_all().build()?;
    let store = Arc::new(MemoryStore::new());
    let gateway = Gateway::new(registry(vec![policy]), store)
        .with_limits(GatewayLimits { default_connection: None, ..limits() });

    let err = gateway.read("demo", "notes", read_all(), &RequestContext::anonymous()).await.unwrap_err();
    assert!(matches!(err, GatewayError::ConfigurationMissing(_)));

    let gateway = gateway.with_limits(GatewayLimits { default_connection: Some("::not a url::".to_string()), ..limits() });
    let err = gateway.read("demo", "notes", read_all(), &RequestContext::anonymous()).await.unwrap_err();
    assert!(matches!(err, GatewayError::ConfigurationMissing(_)));
    Ok(())
}

struct StalledBackend;

#[async_trait]
impl StorageBackend for StalledBackend {
    async fn find(&self, _: &CollectionRef, _: &Query, _: &FindOptions) -> Result<Vec<Document>, BackendError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }

    async fn count(&self, _: &CollectionRef, _: &Query) -> Result<u64, BackendError> {
        Ok(0)
    }

    async fn save(&self, _: &CollectionRef, _: Document) -> Result<Document, BackendError> {
        Err(BackendError::Unavailable("read-only".to_string()))
    }

    async fn update_one(&self, _: &CollectionRef, _: &Query, _: Document) -> Result<WriteResult, BackendError> {
        Ok(WriteResult::default())
    }

    async fn remove(&self, _: &CollectionRef, _: &Query) -> Result<WriteResult, BackendError> {
        Ok(WriteResult::default())
    }
}

#[tokio::test]
async fn backend_failures_and_timeouts_surface() -> Result<()> {
    let policy = CollectionPolicy::builder("demo", "notes").allow_all().build()?;
    let gateway = Gateway::new(registry(vec![policy]), Arc::new(StalledBackend))
        .with_limits(GatewayLimits { timeout: Duration::from_millis(50), ..limits() });
    let ctx = RequestContext::anonymous();

    let err = gateway.read("demo", "notes", read_all(), &ctx).await.unwrap_err();
    assert!(matches!(err, GatewayError::BackendFailure(BackendError::Timeout(50))));

    let err = gateway.add("demo", "notes", "{}", &ctx).await.unwrap_err();
    assert!(matches!(err, GatewayError::BackendFailure(BackendError::Unavailable(_))));
    Ok(())
}
