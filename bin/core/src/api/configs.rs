use axum::{Json, Router, extract::Query, routing::get};
use flotilla_client::entities::docker::ConfigListItem;

use crate::{
  auth::OpContext, error::OpResult, operation,
  permission::actions,
};

use super::HostQuery;

pub fn router() -> Router {
  Router::new().route("/", get(list))
}

#[instrument("ListConfigs", skip(ctx))]
async fn list(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<Vec<ConfigListItem>>> {
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONFIG_LIST,
    None,
    serde_json::Value::Null,
    |docker| async move { docker.list_configs().await },
  )
  .await
  .map(Json)
}
