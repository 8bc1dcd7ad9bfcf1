//! The operation router: every host scoped request flows through
//! here. Authenticate happened at extraction; this applies
//! authorization, client acquisition, invocation and audit as
//! explicit pipeline stages.

use flotilla_client::entities::{
  audit::AuditOutcome,
  error::ErrorCode,
  host::Host,
  user::UserRole,
};

use crate::{
  audit,
  auth::OpContext,
  docker::DockerClient,
  error::{OpError, OpResult},
  permission::{Action, ActionClass, actions},
  resource,
  state::connections,
};

/// Whether the result of the operation lands in the audit log.
/// Mutations and sensitive reads always do.
pub fn audit_policy(action: &Action) -> bool {
  !matches!(action.class, ActionClass::Read)
}

/// Resolve + authorize the target host without touching the
/// daemon. Denied callers who cannot even read the host get
/// `resource.not_found` so the denial leaks no existence.
pub async fn authorized_host(
  ctx: &OpContext,
  host_id: Option<&str>,
  action: &'static Action,
) -> OpResult<Host> {
  let host = resource::host::resolve(host_id).await?;
  match crate::permission::authorize(
    &ctx.user,
    action,
    Some(&host),
  )
  .await
  {
    Ok(()) => Ok(host),
    Err(e) => Err(conceal_denied_host(ctx, &host, e).await),
  }
}

/// A denial against a host the user cannot read is reported as
/// not-found instead.
async fn conceal_denied_host(
  ctx: &OpContext,
  host: &Host,
  e: OpError,
) -> OpError {
  let can_read = crate::permission::authorize(
    &ctx.user,
    &actions::HOST_VIEW,
    Some(host),
  )
  .await
  .is_ok();
  if can_read {
    e.with_request_id(&ctx.request_id)
  } else {
    OpError::msg(
      ErrorCode::NotFound,
      format!("no host matching '{}'", host.id),
    )
    .with_request_id(&ctx.request_id)
  }
}

/// Run one unary operation against a host: authorize, acquire a
/// guarded client, invoke, record audit, map errors. The audit
/// record is written before the response leaves the handler.
pub async fn unary<T, F, Fut>(
  ctx: &OpContext,
  host_id: Option<&str>,
  action: &'static Action,
  resource_id: Option<&str>,
  details: serde_json::Value,
  f: F,
) -> OpResult<T>
where
  F: FnOnce(DockerClient) -> Fut,
  Fut: Future<Output = OpResult<T>>,
{
  let host = authorized_host(ctx, host_id, action).await?;

  let res = invoke(&host, f).await;

  if audit_policy(action) {
    let mut event =
      audit::event(action.tag, &ctx.user, &ctx.request_id)
        .host(&host)
        .client(ctx.client_addr.clone(), ctx.user_agent.clone())
        .details(details);
    if let Some(resource_id) = resource_id {
      event = event.resource(action.resource, resource_id);
    }
    if res.is_err() {
      event = event.outcome(AuditOutcome::Failure);
    }
    event.record().await;
  }

  res.map_err(|e| e.with_request_id(&ctx.request_id))
}

/// Acquire through the pool / breaker and invoke.
pub async fn invoke<T, F, Fut>(host: &Host, f: F) -> OpResult<T>
where
  F: FnOnce(DockerClient) -> Fut,
  Fut: Future<Output = OpResult<T>>,
{
  let guard = connections().acquire(host).await?;
  guard.run(f).await
}

/// Host-free admin gate for registry level operations.
pub async fn require(
  ctx: &OpContext,
  action: &'static Action,
) -> OpResult<()> {
  crate::permission::authorize(&ctx.user, action, None)
    .await
    .map_err(|e| e.with_request_id(&ctx.request_id))
}

/// Convenience gate for admin-only surfaces.
pub fn require_admin(ctx: &OpContext) -> OpResult<()> {
  if ctx.user.role == UserRole::Admin {
    Ok(())
  } else {
    Err(
      OpError::msg(
        ErrorCode::InsufficientRole,
        "this operation requires the admin role",
      )
      .with_request_id(&ctx.request_id),
    )
  }
}
