use axum::{
  Json, Router,
  extract::{Path, Query},
  routing::get,
};
use flotilla_client::entities::{
  NoData,
  docker::{CreateVolumeBody, VolumeListItem},
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
    .route("/{name}", axum::routing::delete(remove))
}

#[instrument("ListVolumes", skip(ctx))]
async fn list(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<Vec<VolumeListItem>>> {
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::VOLUME_LIST,
    None,
    serde_json::Value::Null,
    |docker| async move { docker.list_volumes().await },
  )
  .await
  .map(Json)
}

#[instrument("CreateVolume", skip(ctx, body))]
async fn create(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
  Json(body): Json<CreateVolumeBody>,
) -> OpResult<Json<VolumeListItem>> {
  let name = body.name.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::VOLUME_CREATE,
    Some(&name),
    serde_json::json!({ "name": name }),
    |docker| async move { docker.create_volume(&body).await },
  )
  .await
  .map(Json)
}

#[derive(Debug, Deserialize)]
struct RemoveQuery {
  host_id: Option<String>,
  #[serde(default)]
  force: bool,
}

#[instrument("RemoveVolume", skip(ctx))]
async fn remove(
  ctx: OpContext,
  Path(name): Path<String>,
  Query(query): Query<RemoveQuery>,
) -> OpResult<Json<NoData>> {
  let volume = name.clone();
  let force = query.force;
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::VOLUME_REMOVE,
    Some(&name),
    serde_json::Value::Null,
    |docker| async move {
      docker.remove_volume(&volume, force).await
    },
  )
  .await
  .map(|_| Json(NoData {}))
}
