mod common;

use std::sync::Arc;

use campus_store::context;
use campus_store::model::RegistryOptions;
use campus_store::tenant::TenantError;
use common::{tenant, Harness};
use serde_json::json;

#[tokio::test]
async fn tenants_get_distinct_collections() {
    let h = Harness::new();
    let a = context::run(Some(tenant("school-a")), h.registry.get_model("Absence")).await.unwrap();
    let b = context::run(Some(tenant("school-b")), h.registry.get_model("Absence")).await.unwrap();
    let default = h.registry.get_model("Absence").await.unwrap();

    assert_eq!(a.collection(), "school-a_absences");
    assert_eq!(b.collection(), "school-b_absences");
    assert_eq!(default.collection(), "absences");
    assert!(!Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn binding_is_cached_per_tenant() {
    let h = Harness::new();
    let (first, second) = context::run(Some(tenant("school-a")), async {
        let first = h.registry.get_model("Absence").await.unwrap();
        let second = h.registry.get_model("Absence").await.unwrap();
        (first, second)
    })
    .await;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.registry.compilations(), 1);
    assert_eq!(h.registry.cached_models().await, 1);
}

#[tokio::test]
async fn default_routing_is_stable() {
    let h = Harness::new();
    let first = h.registry.get_model("Classroom").await.unwrap();
    let second = context::run(None, h.registry.get_model("Classroom")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.collection(), "classrooms");
    assert_eq!(first.tenant(), None);
}

#[tokio::test]
async fn concurrent_schools_create_isolated_absences() {
    let h = Harness::new();
    let absences = h.registry.model("Absence").unwrap();

    let create = |slug: &'static str| {
        let absences = absences.clone();
        tokio::spawn(context::run(Some(tenant(slug)), async move {
            absences
                .create_value(json!({ "student": "s-1", "date": "2026-03-02", "reason": "flu" }))
                .await
                .unwrap()
        }))
    };
    let (a, b) = tokio::join!(create("school-a"), create("school-b"));
    a.unwrap();
    b.unwrap();

    let count_a = context::run(Some(tenant("school-a")), absences.count_documents(json!({}))).await.unwrap();
    let count_b = context::run(Some(tenant("school-b")), absences.count_documents(json!({}))).await.unwrap();
    let count_default = absences.count_documents(json!({})).await.unwrap();

    assert_eq!((count_a, count_b, count_default), (1, 1, 0));
    assert_eq!(h.raw("school-a_absences").await.len(), 1);
    assert_eq!(h.raw("school-b_absences").await.len(), 1);
}

#[tokio::test]
async fn one_handle_follows_the_calling_task() {
    let h = Harness::new();
    let classrooms = h.registry.model("classrooms").unwrap();
    assert_eq!(classrooms.entity(), "Classroom");

    let routed = context::run(Some(tenant("School-A")), classrooms.collection_name()).await.unwrap();
    assert_eq!(routed, "school-a_classrooms");
    assert_eq!(classrooms.collection_name().await.unwrap(), "classrooms");
}

#[tokio::test]
async fn slug_collisions_are_rejected() {
    let h = Harness::new();
    h.customers.register("My School", "My School").await.unwrap();

    let err = h.customers.register("My Other School", "my.school").await.unwrap_err();
    match err {
        TenantError::SlugCollision { prefix, existing, .. } => {
            assert_eq!(prefix, "my_school");
            assert_eq!(existing, "My School");
        }
        other => panic!("expected a slug collision, got {other:?}"),
    }
    assert_eq!(h.customers.list().await.unwrap().len(), 1);
    // The rejected slug does not resolve to the existing customer either
    assert!(matches!(h.customers.resolve("my.school").await, Err(TenantError::NotFound(_))));
}

#[tokio::test]
async fn unknown_and_inactive_tenants_do_not_resolve() {
    let h = Harness::new();
    assert!(matches!(h.customers.resolve("ghost").await, Err(TenantError::NotFound(_))));

    h.register("school-a").await;
    h.customers.set_active("school-a", false).await.unwrap();
    assert!(matches!(h.customers.resolve("school-a").await, Err(TenantError::Inactive(_))));

    h.customers.set_active("school-a", true).await.unwrap();
    assert_eq!(h.customers.resolve("school-a").await.unwrap(), tenant("school-a"));
}

#[tokio::test]
async fn idle_bindings_are_evicted_past_capacity() {
    let h = Harness::with_options(RegistryOptions { max_models: 2, ..Default::default() });
    for slug in ["t1", "t2", "t3", "t4"] {
        context::run(Some(tenant(slug)), h.registry.get_model("Absence")).await.unwrap();
    }
    assert!(h.registry.cached_models().await <= 2);
    assert_eq!(h.registry.compilations(), 4);

    // Data written through an evicted binding is still there after recompiling
    let absences = h.registry.model("Absence").unwrap();
    context::run(Some(tenant("t1")), absences.create_value(json!({ "date": "2026-01-05" }))).await.unwrap();
    for slug in ["t2", "t3", "t4"] {
        context::run(Some(tenant(slug)), h.registry.get_model("Absence")).await.unwrap();
    }
    let count = context::run(Some(tenant("t1")), absences.count_documents(json!({}))).await.unwrap();
    assert_eq!(count, 1);
}
