use axum::{Json, Router, extract::Query, routing::get};
use flotilla_client::entities::docker::SecretListItem;

use crate::{
  auth::OpContext, error::OpResult, operation,
  permission::actions,
};

use super::HostQuery;

pub fn router() -> Router {
  Router::new().route("/", get(list))
}

/// Secret names are policy-sensitive, the listing lands in the
/// audit log.
#[instrument("ListSecrets", skip(ctx))]
async fn list(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
) -> OpResult<Json<Vec<SecretListItem>>> {
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::SECRET_LIST,
    None,
    serde_json::Value::Null,
    |docker| async move { docker.list_secrets().await },
  )
  .await
  .map(Json)
}
