use anyhow::Context;
use axum::{Json, extract::Query};
use database::mungos::{
  find::find_collect,
  mongodb::{bson::doc, options::FindOptions},
};
use flotilla_client::entities::audit::{AuditEvent, AuditQuery};

use crate::{
  auth::OpContext, error::OpResult, operation,
  permission::actions, state::db_client,
};

const MAX_PAGE: i64 = 500;

/// Read surface over the append-only audit log.
#[instrument("ListAuditEvents", skip(ctx))]
pub async fn list(
  ctx: OpContext,
  Query(query): Query<AuditQuery>,
) -> OpResult<Json<Vec<AuditEvent>>> {
  operation::require(&ctx, &actions::AUDIT_VIEW).await?;

  let mut filter = doc! {};
  if let Some(user_id) = &query.user_id {
    filter.insert("user_id", user_id);
  }
  if let Some(host_id) = &query.host_id {
    filter.insert("host_id", host_id);
  }
  if let Some(action) = &query.action {
    filter.insert(
      "action",
      doc! { "$regex": format!("^{}", regex_escape(action)) },
    );
  }
  let limit = query.limit.unwrap_or(100).clamp(1, MAX_PAGE);

  let events = find_collect(
    &db_client().audit_events,
    filter,
    FindOptions::builder()
      .sort(doc! { "timestamp": -1 })
      .limit(limit)
      .build(),
  )
  .await
  .context("failed to list audit events")?;
  Ok(Json(events))
}

fn regex_escape(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  for c in input.chars() {
    if !c.is_alphanumeric() && c != '_' {
      out.push('\\');
    }
    out.push(c);
  }
  out
}
