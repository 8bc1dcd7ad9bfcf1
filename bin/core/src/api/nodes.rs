use axum::{
  Json, Router,
  extract::{Path, Query},
  routing::get,
};
use flotilla_client::entities::docker::NodeListItem;

use crate::{
  auth::OpContext, error::OpResult, operation,
  permission::actions,
};

use super::HostQuery;

pub fn router() -> Router {
  Router::new()
    .route("/", get(list))
    .route("/{id}", get(inspect))
}

#[instrument("ListNodes", skip(ctx))]
async fn list(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<Vec<NodeListItem>>> {
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::NODE_LIST,
    None,
    serde_json::Value::Null,
    |docker| async move { docker.list_nodes().await },
  )
  .await
  .map(Json)
}

#[instrument("InspectNode", skip(ctx))]
async fn inspect(
  ctx: OpContext,
  Path(id): Path<String>,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<NodeListItem>> {
  let node = id.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::NODE_INSPECT,
    Some(&id),
    serde_json::Value::Null,
    |docker| async move { docker.inspect_node(&node).await },
  )
  .await
  .map(Json)
}
