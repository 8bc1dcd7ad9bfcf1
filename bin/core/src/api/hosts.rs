use anyhow::Context;
use axum::{
  Json, Router,
  extract::Path,
  routing::{get, post},
};
use database::mungos::{
  find::find_collect,
  mongodb::bson::{doc, oid::ObjectId},
};
use flotilla_client::entities::{
  NoData,
  host::{
    CreateHostBody, Host, HostPermission, HostTestReport,
    SetHostPermissionBody, UpdateHostBody,
  },
};

use crate::{
  audit,
  auth::OpContext,
  error::OpResult,
  monitor, operation,
  permission::actions,
  resource,
  state::{connections, db_client},
};

pub fn router() -> Router {
  Router::new()
    .route("/", get(list).post(create))
    .route("/{id}", get(get_one).put(update).delete(remove))
    .route("/{id}/test", post(test))
    .route(
      "/{id}/permissions",
      get(list_permissions).post(set_permission),
    )
    .route("/{id}/breaker/reset", post(reset_breaker))
}

#[instrument("ListHosts", skip(ctx))]
async fn list(ctx: OpContext) -> OpResult<Json<Vec<Host>>> {
  let hosts = resource::host::list().await?;
  // In restricted mode viewers only see hosts they hold a
  // permission on; the filter is a no-op otherwise.
  let mut visible = Vec::with_capacity(hosts.len());
  for host in hosts {
    if crate::permission::authorize(
      &ctx.user,
      &actions::HOST_VIEW,
      Some(&host),
    )
    .await
    .is_ok()
    {
      visible.push(host);
    }
  }
  Ok(Json(visible))
}

#[instrument("GetHost", skip(ctx))]
async fn get_one(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<Host>> {
  let host = operation::authorized_host(
    &ctx,
    Some(&id),
    &actions::HOST_VIEW,
  )
  .await?;
  Ok(Json(host))
}

#[instrument("CreateHost", skip(ctx, body))]
async fn create(
  ctx: OpContext,
  Json(body): Json<CreateHostBody>,
) -> OpResult<Json<Host>> {
  operation::require(&ctx, &actions::HOST_CREATE).await?;
  let host = resource::host::create(body).await?;

  audit::event(actions::HOST_CREATE.tag, &ctx.user, &ctx.request_id)
    .host(&host)
    .resource("host", &host.id)
    .details(serde_json::json!({
      "name": host.name,
      "transport": host.transport,
    }))
    .client(ctx.client_addr.clone(), ctx.user_agent.clone())
    .record()
    .await;

  Ok(Json(host))
}

#[instrument("UpdateHost", skip(ctx, body))]
async fn update(
  ctx: OpContext,
  Path(id): Path<String>,
  Json(body): Json<UpdateHostBody>,
) -> OpResult<Json<Host>> {
  operation::require(&ctx, &actions::HOST_UPDATE).await?;
  let host = resource::host::update(&id, body).await?;

  audit::event(actions::HOST_UPDATE.tag, &ctx.user, &ctx.request_id)
    .host(&host)
    .resource("host", &host.id)
    .client(ctx.client_addr.clone(), ctx.user_agent.clone())
    .record()
    .await;

  Ok(Json(host))
}

#[instrument("DeleteHost", skip(ctx))]
async fn remove(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<Host>> {
  operation::require(&ctx, &actions::HOST_REMOVE).await?;
  let host = resource::host::delete(&id).await?;

  audit::event(actions::HOST_REMOVE.tag, &ctx.user, &ctx.request_id)
    .resource("host", &host.id)
    .details(serde_json::json!({ "name": host.name }))
    .client(ctx.client_addr.clone(), ctx.user_agent.clone())
    .record()
    .await;

  Ok(Json(host))
}

/// On-demand reachability probe, bypassing the monitor schedule.
#[instrument("TestHost", skip(ctx))]
async fn test(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<HostTestReport>> {
  let host = operation::authorized_host(
    &ctx,
    Some(&id),
    &actions::HOST_TEST,
  )
  .await?;

  let started = std::time::Instant::now();
  let res = operation::invoke(&host, |docker| async move {
    docker.ping().await?;
    docker.version().await
  })
  .await;
  let latency_ms = started.elapsed().as_millis() as u64;

  // Feed the result back into status bookkeeping right away.
  monitor::probe_host(&host).await;

  let report = match res {
    Ok(version) => HostTestReport {
      reachable: true,
      version: version
        .get("Version")
        .and_then(|version| version.as_str())
        .map(String::from),
      message: None,
      latency_ms,
    },
    Err(e) => HostTestReport {
      reachable: false,
      version: None,
      message: Some(e.message()),
      latency_ms,
    },
  };
  Ok(Json(report))
}

#[instrument("ListHostPermissions", skip(ctx))]
async fn list_permissions(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<Vec<HostPermission>>> {
  operation::require(&ctx, &actions::HOST_PERMISSION_SET).await?;
  let host = resource::host::get(&id).await?;
  let permissions = find_collect(
    &db_client().host_permissions,
    doc! { "host_id": &host.id },
    None,
  )
  .await
  .context("failed to list host permissions")?;
  Ok(Json(permissions))
}

#[instrument("SetHostPermission", skip(ctx, body))]
async fn set_permission(
  ctx: OpContext,
  Path(id): Path<String>,
  Json(body): Json<SetHostPermissionBody>,
) -> OpResult<Json<HostPermission>> {
  operation::require(&ctx, &actions::HOST_PERMISSION_SET).await?;
  let host = resource::host::get(&id).await?;
  // Ensure the grantee exists before writing the grant.
  let user = crate::auth::get_user(&body.user_id).await?;

  db_client()
    .host_permissions
    .update_one(
      doc! { "user_id": &user.id, "host_id": &host.id },
      doc! {
        "$set": { "level": body.level.to_string() },
        "$setOnInsert": {
          "_id": ObjectId::new().to_hex(),
          "user_id": &user.id,
          "host_id": &host.id,
        },
      },
    )
    .upsert(true)
    .await
    .context("failed to store host permission")?;

  audit::event(
    actions::HOST_PERMISSION_SET.tag,
    &ctx.user,
    &ctx.request_id,
  )
  .host(&host)
  .resource("user", &user.id)
  .details(serde_json::json!({ "level": body.level }))
  .client(ctx.client_addr.clone(), ctx.user_agent.clone())
  .record()
  .await;

  let permission = db_client()
    .host_permissions
    .find_one(doc! { "user_id": &user.id, "host_id": &host.id })
    .await
    .context("failed to read back host permission")?
    .context("host permission disappeared after upsert")?;
  Ok(Json(permission))
}

/// Admin override for a stuck breaker.
#[instrument("ResetHostBreaker", skip(ctx))]
async fn reset_breaker(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<NoData>> {
  let host = operation::authorized_host(
    &ctx,
    Some(&id),
    &actions::HOST_BREAKER_RESET,
  )
  .await?;
  connections().force_reset_breaker(&host.id).await;

  audit::event(
    actions::HOST_BREAKER_RESET.tag,
    &ctx.user,
    &ctx.request_id,
  )
  .host(&host)
  .client(ctx.client_addr.clone(), ctx.user_agent.clone())
  .record()
  .await;

  Ok(Json(NoData {}))
}
