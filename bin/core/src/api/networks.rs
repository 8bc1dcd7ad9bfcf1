use axum::{
  Json, Router,
  extract::{Path, Query},
  routing::get,
};
use flotilla_client::entities::{
  NoData,
  docker::{CreateNetworkBody, NetworkListItem},
};

use crate::{
  auth::OpContext, error::OpResult, operation,
  permission::actions,
};

use super::HostQuery;

pub fn router() -> Router {
  Router::new()
    .route("/", get(list).post(create))
    .route("/{id}", axum::routing::delete(remove))
}

#[instrument("ListNetworks", skip(ctx))]
async fn list(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<Vec<NetworkListItem>>> {
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::NETWORK_LIST,
    None,
    serde_json::Value::Null,
    |docker| async move { docker.list_networks().await },
  )
  .await
  .map(Json)
}

#[instrument("CreateNetwork", skip(ctx, body))]
async fn create(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
  Json(body): Json<CreateNetworkBody>,
) -> OpResult<Json<serde_json::Value>> {
  let name = body.name.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::NETWORK_CREATE,
    Some(&name),
    serde_json::json!({ "name": name }),
    |docker| async move {
      let id = docker.create_network(&body).await?;
      Ok(serde_json::json!({ "id": id }))
    },
  )
  .await
  .map(Json)
}

#[instrument("RemoveNetwork", skip(ctx))]
async fn remove(
  ctx: OpContext,
  Path(id): Path<String>,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<NoData>> {
  let network = id.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::NETWORK_REMOVE,
    Some(&id),
    serde_json::Value::Null,
    |docker| async move { docker.remove_network(&network).await },
  )
  .await
  .map(|_| Json(NoData {}))
}
