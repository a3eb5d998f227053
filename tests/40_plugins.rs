mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use campus_store::context::{self, TaskContext};
use campus_store::model::{EntitySchema, ModelRegistry, RegistryOptions};
use campus_store::plugins::{ActivityRecord, HookContext, PluginError, PluginOptions, PluginStage, SchemaPlugin};
use campus_store::store::{Document, DocumentStore, MemoryStore};
use common::{tenant, FailingStore, Harness};
use serde_json::{json, Value};

#[tokio::test]
async fn creator_is_stamped_from_the_ambient_actor() {
    let h = Harness::new();
    let posts = h.registry.model("Post").unwrap();

    let ctx = TaskContext::for_tenant(tenant("school-a")).with_actor("teacher-1");
    let created = context::run_with(ctx, posts.create_value(json!({ "title": "Sports day" }))).await.unwrap();
    assert_eq!(created["created_by"], json!("teacher-1"));

    let id = created["id"].as_str().unwrap().to_string();
    let updated = context::run_with(
        TaskContext::for_tenant(tenant("school-a")).with_actor("teacher-2"),
        posts.find_by_id_and_update(&id, json!({ "title": "Sports day (moved)", "created_by": "teacher-2" })),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(updated["title"], json!("Sports day (moved)"));
    assert_eq!(updated["created_by"], json!("teacher-1"));
}

#[tokio::test]
async fn notification_fires_on_create_only() {
    let h = Harness::new();
    let posts = h.registry.model("Post").unwrap();

    let created = context::run(Some(tenant("school-a")), posts.create_value(json!({ "title": "Exam dates" })))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    context::run(Some(tenant("school-a")), posts.find_by_id_and_update(&id, json!({ "body": "See board" })))
        .await
        .unwrap();

    let notifications = h.raw("notifications").await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["title"], json!("New post: Exam dates"));
    assert_eq!(notifications[0]["action"], json!("create"));
    assert_eq!(notifications[0]["entity_type"], json!("Post"));
    assert_eq!(notifications[0]["tenant"], json!("school-a"));
    assert_eq!(notifications[0]["read"], json!(false));
}

#[tokio::test]
async fn update_and_delete_rules_fire() {
    let h = Harness::new();
    let assignments = h.registry.model("Assignment").unwrap();

    let created = assignments.create_value(json!({ "title": "Essay" })).await.unwrap();
    let mut edited = created.clone();
    edited.insert("description".to_string(), json!("500 words"));
    assignments.save(edited).await.unwrap();

    let id = created["id"].as_str().unwrap().to_string();
    assignments.find_by_id_and_delete(&id).await.unwrap().unwrap();

    let notifications = h.raw("notifications").await;
    let actions: Vec<Value> = notifications.iter().map(|n| n["action"].clone()).collect();
    assert_eq!(actions, vec![json!("create"), json!("update"), json!("delete")]);
    assert_eq!(notifications[2]["title"], json!("Assignment withdrawn: Essay"));
}

#[tokio::test]
async fn audit_trail_is_shared_across_tenants() {
    let h = Harness::new();
    let classrooms = h.registry.model("Classroom").unwrap();

    for slug in ["school-a", "school-b"] {
        let ctx = TaskContext::for_tenant(tenant(slug)).with_actor("admin");
        context::run_with(ctx, classrooms.create_value(json!({ "name": "3B" }))).await.unwrap();
    }
    let updated = context::run(
        Some(tenant("school-a")),
        classrooms.find_one_and_update(json!({ "name": "3B" }), json!({ "level": 3 })),
    )
        .await
        .unwrap();
    assert!(updated.is_some());

    let records: Vec<ActivityRecord> = h
        .raw("activity_logs")
        .await
        .into_iter()
        .map(|d| serde_json::from_value(Value::Object(d)).unwrap())
        .collect();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.entity_type == "classroom"));
    assert_eq!(records[0].action_type, "create");
    assert_eq!(records[0].details, "Created classroom 3B");
    assert_eq!(records[0].performed_by.as_deref(), Some("admin"));
    assert_eq!(records[2].action_type, "update");

    // No tenant-prefixed audit collections exist
    let collections = h.store.list_collections().await.unwrap();
    assert!(!collections.iter().any(|c| c.ends_with("_activity_logs")));
}

#[tokio::test]
async fn deletes_are_audited() {
    let h = Harness::new();
    let inventory = h.registry.model("Inventory").unwrap();

    inventory.create_value(json!({ "id": "i1", "name": "Projector" })).await.unwrap();
    let removed = inventory.find_by_id_and_delete("i1").await.unwrap().unwrap();
    assert_eq!(removed["name"], json!("Projector"));
    assert_eq!(inventory.count_documents(json!({})).await.unwrap(), 0);

    let logs = h.raw("activity_logs").await;
    assert_eq!(logs.last().unwrap()["action_type"], json!("delete"));
    assert_eq!(logs.last().unwrap()["details"], json!("Deleted inventory Projector"));
}

#[tokio::test]
async fn side_effect_failures_do_not_fail_the_write() {
    let inner: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = Arc::new(FailingStore::new(inner, &["notifications", "activity_logs"]));
    let h = Harness::with_store(store, RegistryOptions::default());
    let absences = h.registry.model("Absence").unwrap();

    let created = context::run(Some(tenant("school-a")), absences.create_value(json!({ "date": "2026-04-01" })))
        .await
        .unwrap();
    assert_eq!(created["date"], json!("2026-04-01"));
    assert_eq!(h.raw("school-a_absences").await.len(), 1);
    assert!(h.raw("notifications").await.is_empty());
}

#[tokio::test]
async fn private_fields_never_leave_the_model() {
    let h = Harness::new();
    let users = h.registry.model("User").unwrap();

    let created = users
        .create_value(json!({ "id": "u1", "email": "ada@example.org", "password": "hash", "__v": 0 }))
        .await
        .unwrap();
    assert!(created.get("password").is_none());
    assert!(created.get("__v").is_none());
    assert_eq!(created["email"], json!("ada@example.org"));

    let found = users.find_by_id("u1").await.unwrap().unwrap();
    assert!(found.get("password").is_none());
    // Stored as written
    assert_eq!(h.raw("users").await[0]["password"], json!("hash"));
}

#[tokio::test]
async fn saving_a_read_document_keeps_private_fields() {
    let h = Harness::new();
    let users = h.registry.model("User").unwrap();
    users
        .create_value(json!({ "id": "u1", "email": "a@x", "password": "hash", "__v": 2 }))
        .await
        .unwrap();

    let mut found = users.find_by_id("u1").await.unwrap().unwrap();
    found.insert("role".to_string(), json!("teacher"));
    let saved = users.save(found).await.unwrap();
    assert!(saved.get("password").is_none());
    assert_eq!(saved["role"], json!("teacher"));

    let stored = h.raw("users").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["password"], json!("hash"));
    assert_eq!(stored[0]["__v"], json!(2));
    assert_eq!(stored[0]["role"], json!("teacher"));
}

struct Slow;

#[async_trait]
impl SchemaPlugin for Slow {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn stage(&self) -> PluginStage {
        PluginStage::Notification
    }

    async fn after_save(&self, _ctx: &HookContext<'_>, _doc: &Document, _is_new: bool) -> Result<(), PluginError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

struct Reject;

#[async_trait]
impl SchemaPlugin for Reject {
    fn name(&self) -> &'static str {
        "reject"
    }

    fn stage(&self) -> PluginStage {
        PluginStage::Creator
    }

    async fn before_save(
        &self,
        _ctx: &HookContext<'_>,
        doc: &mut Document,
        _previous: Option<&Document>,
    ) -> Result<(), PluginError> {
        match doc.get("title") {
            Some(Value::String(_)) => Ok(()),
            _ => Err(PluginError::Validation("title is required".to_string())),
        }
    }
}

#[tokio::test]
async fn slow_side_effects_time_out_and_invalid_documents_are_rejected() {
    let options = RegistryOptions {
        plugins: PluginOptions { hook_timeout: Duration::from_millis(50), ..Default::default() },
        ..Default::default()
    };
    let mut registry = ModelRegistry::new(Arc::new(MemoryStore::new()), options);
    registry
        .register(EntitySchema::builder("Notice").plugin(Arc::new(Slow)).plugin(Arc::new(Reject)).build())
        .unwrap();
    let registry = Arc::new(registry);
    let notices = registry.model("Notice").unwrap();

    let started = std::time::Instant::now();
    notices.create_value(json!({ "title": "Fire drill" })).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(notices.create_value(json!({ "body": "untitled" })).await.is_err());
    assert_eq!(notices.count_documents(json!({})).await.unwrap(), 1);
}
