use axum::{
  Json, Router,
  extract::{Path, Query},
  routing::{get, post},
};
use flotilla_client::entities::{
  NoData,
  docker::{ContainerListItem, CreateContainerBody},
};
use serde::Deserialize;

use crate::{
  auth::OpContext, error::OpResult, operation,
  permission::actions,
};

use super::HostQuery;

pub fn router() -> Router {
  Router::new()
    .route("/", get(list).post(create))
    .route("/{id}", get(inspect).delete(remove))
    .route("/{id}/start", post(start))
    .route("/{id}/stop", post(stop))
    .route("/{id}/restart", post(restart))
}

#[instrument("ListContainers", skip(ctx))]
async fn list(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<Vec<ContainerListItem>>> {
  let host_id = query.host_id.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONTAINER_LIST,
    None,
    serde_json::Value::Null,
    |docker| async move {
      let mut containers = docker.list_containers().await?;
      for container in &mut containers {
        container.host_id = host_id.clone();
      }
      Ok(containers)
    },
  )
  .await
  .map(Json)
}

#[instrument("InspectContainer", skip(ctx))]
async fn inspect(
  ctx: OpContext,
  Path(id): Path<String>,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<serde_json::Value>> {
  let container = id.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONTAINER_INSPECT,
    Some(&id),
    serde_json::Value::Null,
    |docker| async move {
      docker.inspect_container(&container).await
    },
  )
  .await
  .map(Json)
}

#[instrument("CreateContainer", skip(ctx, body))]
async fn create(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
  Json(body): Json<CreateContainerBody>,
) -> OpResult<Json<serde_json::Value>> {
  let details = serde_json::json!({
    "name": body.name,
    "image": body.image,
  });
  let name = body.name.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONTAINER_CREATE,
    Some(&name),
    details,
    |docker| async move {
      let id = docker.create_container(&body).await?;
      Ok(serde_json::json!({ "id": id }))
    },
  )
  .await
  .map(Json)
}

#[instrument("StartContainer", skip(ctx))]
async fn start(
  ctx: OpContext,
  Path(id): Path<String>,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<NoData>> {
  let container = id.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONTAINER_START,
    Some(&id),
    serde_json::Value::Null,
    |docker| async move {
      docker.start_container(&container).await
    },
  )
  .await
  .map(|_| Json(NoData {}))
}

#[instrument("StopContainer", skip(ctx))]
async fn stop(
  ctx: OpContext,
  Path(id): Path<String>,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<NoData>> {
  let container = id.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONTAINER_STOP,
    Some(&id),
    serde_json::Value::Null,
    |docker| async move { docker.stop_container(&container).await },
  )
  .await
  .map(|_| Json(NoData {}))
}

#[instrument("RestartContainer", skip(ctx))]
async fn restart(
  ctx: OpContext,
  Path(id): Path<String>,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<NoData>> {
  let container = id.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONTAINER_RESTART,
    Some(&id),
    serde_json::Value::Null,
    |docker| async move {
      docker.restart_container(&container).await
    },
  )
  .await
  .map(|_| Json(NoData {}))
}

#[derive(Debug, Deserialize)]
struct RemoveQuery {
  host_id: Option<String>,
  #[serde(default)]
  force: bool,
}

#[instrument("RemoveContainer", skip(ctx))]
async fn remove(
  ctx: OpContext,
  Path(id): Path<String>,
  Query(query): Query<RemoveQuery>,
) -> OpResult<Json<NoData>> {
  let container = id.clone();
  let force = query.force;
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONTAINER_REMOVE,
    Some(&id),
    serde_json::json!({ "force": force }),
    |docker| async move {
      docker.remove_container(&container, force).await
    },
  )
  .await
  .map(|_| Json(NoData {}))
}
