mod common;

use std::time::Duration;

use campus_store::context::{self, TaskContext};
use common::tenant;

#[tokio::test]
async fn concurrent_tasks_never_see_each_other() {
    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let slug = format!("school-{}", i % 4);
            tokio::spawn(context::run(Some(tenant(&slug)), async move {
                for _ in 0..5 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    assert_eq!(context::current_tenant(), Some(tenant(&slug)));
                }
                slug
            }))
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), format!("school-{}", i % 4));
    }
}

#[tokio::test]
async fn plain_spawn_does_not_inherit_but_context_spawn_does() {
    context::run(Some(tenant("school-a")), async {
        let plain = tokio::spawn(async { context::current_tenant() }).await.unwrap();
        assert_eq!(plain, None);

        let inherited = context::spawn(async { context::current_tenant() }).await.unwrap();
        assert_eq!(inherited, Some(tenant("school-a")));
    })
    .await;
}

#[tokio::test]
async fn actor_and_tenant_travel_together() {
    let ctx = TaskContext::for_tenant(tenant("school-a")).with_actor("teacher-7");
    let seen = context::run_with(ctx, async {
        tokio::task::yield_now().await;
        context::current()
    })
    .await;
    assert_eq!(seen.tenant, Some(tenant("school-a")));
    assert_eq!(seen.actor.as_deref(), Some("teacher-7"));
    assert_eq!(context::current(), TaskContext::default());
}
