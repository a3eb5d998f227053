//! Task-scoped ambient context.
//!
//! Every logical task (one HTTP request, one seeding run) carries at most one
//! tenant and at most one actor. Code running inside the task reads them with
//! [`current_tenant`] / [`current_actor`] instead of receiving them as
//! parameters. The slot is a Tokio task-local, so concurrently running tasks
//! never observe each other's values, and the value survives every `.await`
//! inside the task.

use std::future::Future;

use tokio::task::JoinHandle;

use crate::tenant::TenantId;

/// Identifier of the authenticated actor performing the current task
pub type ActorId = String;

/// The ambient values visible to code running inside one task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskContext {
    pub tenant: Option<TenantId>,
    pub actor: Option<ActorId>,
}

impl TaskContext {
    pub fn new(tenant: Option<TenantId>, actor: Option<ActorId>) -> Self {
        Self { tenant, actor }
    }

    pub fn for_tenant(tenant: TenantId) -> Self {
        Self { tenant: Some(tenant), actor: None }
    }

    pub fn with_actor(mut self, actor: impl Into<ActorId>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

tokio::task_local! {
    static CURRENT: TaskContext;
}

/// Run `task` with the tenant slot set to `tenant` for its whole extent.
///
/// The actor of the enclosing context (if any) stays visible. Nested calls
/// shadow the outer tenant for the inner extent only.
pub async fn run<F>(tenant: Option<TenantId>, task: F) -> F::Output
where
    F: Future,
{
    let ctx = TaskContext { tenant, actor: current_actor() };
    CURRENT.scope(ctx, task).await
}

/// Run `task` with both tenant and actor replaced
pub async fn run_with<F>(ctx: TaskContext, task: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(ctx, task).await
}

/// Run `task` as `actor`, keeping the current tenant
pub async fn with_actor<F>(actor: impl Into<ActorId>, task: F) -> F::Output
where
    F: Future,
{
    let ctx = TaskContext { tenant: current_tenant(), actor: Some(actor.into()) };
    CURRENT.scope(ctx, task).await
}

/// Snapshot of the ambient context; empty outside any `run`
pub fn current() -> TaskContext {
    CURRENT.try_with(|ctx| ctx.clone()).unwrap_or_default()
}

/// Active tenant, or `None` for the default/shared tenant. Never fails.
pub fn current_tenant() -> Option<TenantId> {
    CURRENT.try_with(|ctx| ctx.tenant.clone()).ok().flatten()
}

pub fn current_actor() -> Option<ActorId> {
    CURRENT.try_with(|ctx| ctx.actor.clone()).ok().flatten()
}

/// Spawn a Tokio task that inherits the caller's ambient context.
///
/// Task-locals do not cross `tokio::spawn`; plain `tokio::spawn` from inside
/// a tenant scope would run the child under the default tenant.
pub fn spawn<F>(task: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let ctx = current();
    tokio::spawn(CURRENT.scope(ctx, task))
}
