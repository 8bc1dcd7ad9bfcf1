use std::collections::BTreeMap;

use anyhow::Context;
use axum::{
  Json, Router,
  extract::{Path, Query},
  routing::{get, post},
};
use database::mungos::{
  find::find_collect, mongodb::bson::doc,
};
use flotilla_client::entities::{
  NoData,
  docker::{SwarmMemberHost, SwarmOverview},
  error::ErrorCode,
  host::{Host, HostKind},
};
use serde::Deserialize;

use crate::{
  auth::OpContext,
  error::{OpError, OpResult},
  operation,
  permission::actions,
  state::db_client,
};

use super::HostQuery;

pub fn router() -> Router {
  Router::new()
    .route("/", get(list))
    .route("/init", post(init))
    .route("/leave", post(leave))
    .route("/{id}", get(get_one))
}

/// Logical swarm view: every group of hosts sharing a swarm id.
#[instrument("ListSwarms", skip(ctx))]
async fn list(
  ctx: OpContext,
) -> OpResult<Json<Vec<SwarmOverview>>> {
  operation::require(&ctx, &actions::SWARM_VIEW).await?;
  let hosts = swarm_hosts(None).await?;
  let mut by_swarm: BTreeMap<String, Vec<Host>> = BTreeMap::new();
  for host in hosts {
    if let Some(swarm_id) = host.swarm_id.clone() {
      by_swarm.entry(swarm_id).or_default().push(host);
    }
  }
  let overviews = by_swarm
    .into_iter()
    .map(|(swarm_id, hosts)| overview_from_hosts(swarm_id, hosts))
    .collect();
  Ok(Json(overviews))
}

/// Aggregate detail: membership from the registry, node and
/// service listings from a reachable manager.
#[instrument("GetSwarm", skip(ctx))]
async fn get_one(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<SwarmOverview>> {
  operation::require(&ctx, &actions::SWARM_VIEW).await?;
  let hosts = swarm_hosts(Some(&id)).await?;
  if hosts.is_empty() {
    return Err(
      OpError::msg(
        ErrorCode::NotFound,
        format!("no swarm matching '{id}'"),
      )
      .with_request_id(&ctx.request_id),
    );
  }
  let mut overview = overview_from_hosts(id, hosts.clone());

  // Prefer the leader, then any manager, for the cluster view.
  let mut managers: Vec<&Host> = hosts
    .iter()
    .filter(|host| host.kind == HostKind::SwarmManager)
    .collect();
  managers.sort_by_key(|host| !host.leader);

  let mut last_err = None;
  for manager in managers {
    let res = operation::invoke(manager, |docker| async move {
      let (nodes, services) = tokio::try_join!(
        docker.list_nodes(),
        docker.list_services(),
      )?;
      Ok((nodes, services))
    })
    .await;
    match res {
      Ok((nodes, services)) => {
        overview.nodes = nodes;
        overview.services = services;
        last_err = None;
        break;
      }
      Err(e) => last_err = Some(e),
    }
  }
  if let Some(e) = last_err {
    overview.err = Some(e.message());
  }

  Ok(Json(overview))
}

#[derive(Debug, Deserialize)]
struct InitBody {
  #[serde(default)]
  advertise_addr: Option<String>,
}

#[instrument("SwarmInit", skip(ctx))]
async fn init(
  ctx: OpContext,
  Query(query): Query<HostQuery>,
  Json(body): Json<InitBody>,
) -> OpResult<Json<serde_json::Value>> {
  let advertise_addr = body.advertise_addr.clone();
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::SWARM_INIT,
    None,
    serde_json::json!({ "advertise_addr": body.advertise_addr }),
    |docker| async move {
      let node_id = docker.swarm_init(advertise_addr).await?;
      Ok(serde_json::json!({ "node_id": node_id }))
    },
  )
  .await
  .map(Json)
}

#[derive(Debug, Deserialize)]
struct LeaveQuery {
  host_id: Option<String>,
  #[serde(default)]
  force: bool,
}

#[instrument("SwarmLeave", skip(ctx))]
async fn leave(
  ctx: OpContext,
  Query(query): Query<LeaveQuery>,
) -> OpResult<Json<NoData>> {
  let force = query.force;
  operation::unary(
    &ctx,
    query.host_id.as_deref(),
    &actions::SWARM_LEAVE,
    None,
    serde_json::json!({ "force": force }),
    |docker| async move { docker.swarm_leave(force).await },
  )
  .await
  .map(|_| Json(NoData {}))
}

async fn swarm_hosts(
  swarm_id: Option<&str>,
) -> OpResult<Vec<Host>> {
  let filter = match swarm_id {
    Some(swarm_id) => doc! { "swarm_id": swarm_id },
    None => doc! { "swarm_id": { "$ne": null } },
  };
  find_collect(&db_client().hosts, filter, None)
    .await
    .context("failed to list swarm hosts")
    .map_err(Into::into)
}

fn overview_from_hosts(
  swarm_id: String,
  hosts: Vec<Host>,
) -> SwarmOverview {
  let managers = hosts
    .iter()
    .filter(|host| host.kind == HostKind::SwarmManager)
    .count();
  let workers = hosts.len() - managers;
  SwarmOverview {
    swarm_id,
    managers,
    workers,
    hosts: hosts
      .into_iter()
      .map(|host| SwarmMemberHost {
        host_id: host.id,
        name: host.name,
        status: host.status,
        leader: host.leader,
      })
      .collect(),
    nodes: Vec::new(),
    services: Vec::new(),
    err: None,
  }
}
