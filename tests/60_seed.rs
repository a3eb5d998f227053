mod common;

use campus_store::context;
use campus_store::seed::{seed_tenant, Fixtures, SeedError};
use campus_store::tenant::TenantError;
use common::{tenant, Harness};
use serde_json::json;

const FIXTURES: &str = r#"
- entity: User
  documents:
    - id: u1
      name: Ada
      email: ada@example.org
- entity: Classroom
  documents:
    - id: c1
      name: 3B
      teacher: u1
    - id: c2
      name: 4A
"#;

#[tokio::test]
async fn seeds_only_the_named_tenant_and_is_idempotent() {
    let h = Harness::new();
    h.register("school-a").await;
    let fixtures = Fixtures::parse(FIXTURES).unwrap();

    let report = seed_tenant(&h.registry, &h.customers, "school-a", &fixtures).await.unwrap();
    assert_eq!(report.tenant, "school-a");
    assert_eq!(report.entities[1].collection, "school-a_classrooms");
    assert_eq!(report.entities.iter().map(|e| e.inserted).sum::<usize>(), 3);

    let again = seed_tenant(&h.registry, &h.customers, "school-a", &fixtures).await.unwrap();
    assert!(again.entities.iter().all(|e| e.skipped && e.inserted == 0));

    let classrooms = h.registry.model("Classroom").unwrap();
    let seeded = context::run(Some(tenant("school-a")), classrooms.count_documents(json!({}))).await.unwrap();
    assert_eq!(seeded, 2);
    assert_eq!(classrooms.count_documents(json!({})).await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_tenant_is_not_seeded() {
    let h = Harness::new();
    let fixtures = Fixtures::parse(FIXTURES).unwrap();
    let err = seed_tenant(&h.registry, &h.customers, "ghost", &fixtures).await.unwrap_err();
    assert!(matches!(err, SeedError::Tenant(TenantError::NotFound(_))));
    assert!(h.store.list_collections().await.unwrap().iter().all(|c| !c.contains("ghost")));
}
