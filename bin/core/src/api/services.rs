use axum::{
  Json, Router,
  extract::{Path, Query},
  routing::{get, post},
};
use flotilla_client::entities::{
  NoData,
  docker::{ScaleServiceBody, ServiceListItem},
};

use crate::{
  auth::OpContext, error::OpResult, operation,
  permission::actions,
};

use super::HostQuery;

pub fn router() -> Router {
  Router::new()
    .route("/", get(list))
    .route("/{id}", get(inspect))
    .route("/{id}/scale", post(scale))
}

#[instrument("ListServices", skip(ctx))]
async fn list(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<Vec<ServiceListItem>>> {
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::SERVICE_LIST,
    None,
    serde_json::Value::Null,
    |docker| async move { docker.list_services().await },
  )
  .await
  .map(Json)
}

#[instrument("InspectService", skip(ctx))]
async fn inspect(
  ctx: OpContext,
  Path(id): Path<String>,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<serde_json::Value>> {
  let service = id.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::SERVICE_INSPECT,
    Some(&id),
    serde_json::Value::Null,
    |docker| async move { docker.inspect_service(&service).await },
  )
  .await
  .map(Json)
}

/// Scaling is the general service update path with the replica
/// count swapped in.
#[instrument("ScaleService", skip(ctx))]
async fn scale(
  ctx: OpContext,
  Path(id): Path<String>,
  Query(query): Query<HostQuery>,
  Json(body): Json<ScaleServiceBody>,
) -> OpResult<Json<NoData>> {
  let service = id.clone();
  let replicas = body.replicas;
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::SERVICE_SCALE,
    Some(&id),
    serde_json::json!({ "replicas": replicas }),
    |docker| async move {
      docker.scale_service(&service, replicas).await
    },
  )
  .await
  .map(|_| Json(NoData {}))
}
