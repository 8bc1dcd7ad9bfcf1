use axum::{
  Json, Router,
  extract::Query,
  routing::{get, post},
};
use flotilla_client::entities::docker::{PruneBody, PruneReport};

use crate::{
  auth::OpContext, error::OpResult, operation,
  permission::actions,
};

use super::HostQuery;

pub fn router() -> Router {
  Router::new()
    .route("/info", get(info))
    .route("/version", get(version))
    .route("/df", get(df))
    .route("/prune", post(prune))
}

#[instrument("SystemInfo", skip(ctx))]
async fn info(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<serde_json::Value>> {
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::SYSTEM_INFO,
    None,
    serde_json::Value::Null,
    |docker| async move { docker.info().await },
  )
  .await
  .map(Json)
}

#[instrument("SystemVersion", skip(ctx))]
async fn version(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<serde_json::Value>> {
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::SYSTEM_VERSION,
    None,
    serde_json::Value::Null,
    |docker| async move { docker.version().await },
  )
  .await
  .map(Json)
}

#[instrument("SystemDf", skip(ctx))]
async fn df(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<serde_json::Value>> {
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::SYSTEM_DF,
    None,
    serde_json::Value::Null,
    |docker| async move { docker.df().await },
  )
  .await
  .map(Json)
}

#[instrument("SystemPrune", skip(ctx))]
async fn prune(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
  Json(body): Json<PruneBody>,
) -> OpResult<Json<PruneReport>> {
  let target = body.target;
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::SYSTEM_PRUNE,
    None,
    serde_json::json!({ "target": target }),
    |docker| async move { docker.prune(target).await },
  )
  .await
  .map(Json)
}
