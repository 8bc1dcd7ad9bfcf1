use axum::{
  Json, Router,
  extract::{Path, Query},
  routing::{get, post},
};
use flotilla_client::entities::{
  NoData,
  docker::{ImageListItem, PullImageBody},
};
use serde::Deserialize;

use crate::{
  auth::OpContext, error::OpResult, operation,
  permission::actions,
};

use super::HostQuery;

pub fn router() -> Router {
  Router::new()
    .route("/", get(list))
    .route("/pull", post(pull))
    .route("/{id}", axum::routing::delete(remove))
}

#[instrument("ListImages", skip(ctx))]
async fn list(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<Vec<ImageListItem>>> {
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::IMAGE_LIST,
    None,
    serde_json::Value::Null,
    |docker| async move { docker.list_images().await },
  )
  .await
  .map(Json)
}

#[instrument("PullImage", skip(ctx))]
async fn pull(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
  Json(body): Json<PullImageBody>,
) -> OpResult<Json<NoData>> {
  let image = body.image.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::IMAGE_PULL,
    Some(&body.image),
    serde_json::json!({ "image": body.image }),
    |docker| async move { docker.pull_image(&image).await },
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

#[instrument("RemoveImage", skip(ctx))]
async fn remove(
  ctx: OpContext,
  Path(id): Path<String>,
  Query(query): Query<RemoveQuery>,
) -> OpResult<Json<NoData>> {
  let image = id.clone();
  let force = query.force;
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::IMAGE_REMOVE,
    Some(&id),
    serde_json::json!({ "force": force }),
    |docker| async move { docker.remove_image(&image, force).await },
  )
  .await
  .map(|_| Json(NoData {}))
}
