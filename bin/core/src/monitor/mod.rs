use std::{sync::Arc, time::Duration};

use flotilla_client::entities::{
  error::ErrorCode,
  host::{Host, HostStatus},
};
use futures_util::future::join_all;

use crate::{
  config::core_config,
  connection::unavailable_status,
  resource,
  state::{CachedHostStatus, connections, host_status_cache},
};

/// Background health loop: probe every active host with `Ping` on
/// the configured interval, drive breaker transitions and keep
/// `Host.status` plus the in-memory status cache current. Probes
/// never block `acquire`.
pub fn spawn_monitor_loop() {
  let interval =
    Duration::from_secs(core_config().probe_interval_seconds);
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(
      tokio::time::MissedTickBehavior::Delay,
    );
    loop {
      ticker.tick().await;
      refresh_all_hosts().await;
    }
  });
}

async fn refresh_all_hosts() {
  let hosts = match resource::host::list_active().await {
    Ok(hosts) => hosts,
    Err(e) => {
      error!("Failed to list hosts for health probe | {e:#}");
      return;
    }
  };
  let futures = hosts.into_iter().map(|host| async move {
    probe_host(&host).await;
  });
  join_all(futures).await;
}

pub async fn probe_host(host: &Host) {
  let outcome = probe(host).await;

  let (status, swarm_id, manager, leader, version, err) =
    match outcome {
      Ok(probe) => (
        HostStatus::Healthy,
        probe.swarm_id,
        probe.manager,
        probe.leader,
        probe.version,
        None,
      ),
      Err(e) => {
        let status = match e.code {
          ErrorCode::HostUnavailable => HostStatus::Unreachable,
          ErrorCode::DockerConnection
          | ErrorCode::DockerTimeout
          | ErrorCode::CredentialUnavailable => {
            match connections().breaker_status(&host.id).await {
              Some(state) => unavailable_status(state),
              None => HostStatus::Unreachable,
            }
          }
          _ => HostStatus::Unhealthy,
        };
        (status, None, None, None, None, Some(e.message()))
      }
    };

  if let Err(e) = resource::host::update_status(
    &host.id,
    status,
    swarm_id.clone(),
    manager,
    leader,
  )
  .await
  {
    error!(
      "Failed to persist host status | host: {} | {e:#}",
      host.name
    );
  }

  host_status_cache()
    .insert(
      host.id.clone(),
      Arc::new(CachedHostStatus {
        id: host.id.clone(),
        status,
        version,
        swarm_id,
        leader: leader.unwrap_or_default(),
        err,
      }),
    )
    .await;
}

struct ProbeReport {
  version: Option<String>,
  swarm_id: Option<String>,
  manager: Option<bool>,
  leader: Option<bool>,
}

async fn probe(
  host: &Host,
) -> Result<ProbeReport, crate::error::OpError> {
  crate::operation::invoke(host, |docker| async move {
    docker.ping().await?;

    let version = docker
      .version()
      .await
      .ok()
      .and_then(|version| {
        version
          .get("Version")
          .and_then(|version| version.as_str())
          .map(String::from)
      });

    let membership = docker.swarm_membership().await.ok().flatten();
    let (swarm_id, manager, leader) = match membership {
      Some(membership) => {
        let leader = if membership.manager {
          docker
            .inspect_node(&membership.node_id)
            .await
            .ok()
            .map(|node| node.leader)
        } else {
          Some(false)
        };
        (
          Some(membership.swarm_id),
          Some(membership.manager),
          leader,
        )
      }
      None => (None, None, None),
    };

    Ok(ProbeReport {
      version,
      swarm_id,
      manager,
      leader,
    })
  })
  .await
}
