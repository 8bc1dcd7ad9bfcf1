use std::time::Duration;

use axum::Json;
use flotilla_client::entities::{
  docker::{ContainerState, DashboardHostEntry, DashboardSummary},
  host::{Host, HostStatus},
};
use futures_util::future::join_all;

use crate::{
  auth::OpContext,
  error::OpResult,
  operation,
  permission::actions,
  resource,
  state::{host_status_cache, stream_registry},
};

const DASHBOARD_LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Cross-host summary for the landing view: host health from the
/// monitor cache, container counts live from reachable daemons.
#[instrument("Dashboard", skip(ctx))]
pub async fn summary(
  ctx: OpContext,
) -> OpResult<Json<DashboardSummary>> {
  operation::require(&ctx, &actions::DASHBOARD_VIEW).await?;

  let hosts = resource::host::list().await?;
  let mut visible = Vec::with_capacity(hosts.len());
  for host in hosts {
    if crate::permission::authorize(
      &ctx.user,
      &actions::HOST_VIEW,
      Some(&host),
    )
    .await
    .is_ok()
    {
      visible.push(host);
    }
  }

  let entries =
    join_all(visible.iter().map(host_entry)).await;

  let mut summary = DashboardSummary {
    hosts_total: entries.len(),
    ..Default::default()
  };
  for entry in entries {
    if entry.status == HostStatus::Healthy {
      summary.hosts_healthy += 1;
    }
    summary.containers_running += entry.containers_running;
    summary.containers_total += entry.containers_total;
    summary.hosts.push(entry);
  }
  summary.streams = stream_registry().metrics();
  Ok(Json(summary))
}

async fn host_entry(host: &Host) -> DashboardHostEntry {
  let cached = host_status_cache().get(&host.id).await;
  let status = cached
    .as_ref()
    .map(|cached| cached.status)
    .unwrap_or(host.status);
  let mut entry = DashboardHostEntry {
    host_id: host.id.clone(),
    name: host.name.clone(),
    status,
    containers_running: 0,
    containers_total: 0,
    err: cached.as_ref().and_then(|cached| cached.err.clone()),
  };
  if status != HostStatus::Healthy || !host.is_active {
    return entry;
  }
  let listed = tokio::time::timeout(
    DASHBOARD_LIST_TIMEOUT,
    operation::invoke(host, |docker| async move {
      docker.list_containers().await
    }),
  )
  .await;
  match listed {
    Ok(Ok(containers)) => {
      entry.containers_total = containers.len();
      entry.containers_running = containers
        .iter()
        .filter(|container| {
          container.state == ContainerState::Running
        })
        .count();
    }
    Ok(Err(e)) => entry.err = Some(e.message()),
    Err(_) => {
      entry.err =
        Some(String::from("container listing timed out"));
    }
  }
  entry
}
