use std::sync::Arc;

use axum::{
  extract::{Path, Query, WebSocketUpgrade},
  response::Response,
};
use bollard::container::LogOutput;
use flotilla_client::{
  entities::{host::Host, random_string, rfc3339_timestamp},
  ws::{LogFramePayload, LogStreamKind, WsFrame},
};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::{
  audit,
  auth::OpContext,
  config::{StreamManagerKind, core_config},
  docker,
  error::OpResult,
  operation,
  permission::actions,
  state::stream_registry,
  stream::{
    self, Frame, FrameStream, StreamKind, StreamScope, Subscription,
    self_monitor::SelfMonitor,
  },
};

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
  pub host_id: Option<String>,
  pub follow: Option<bool>,
  pub tail: Option<u64>,
  pub timestamps: Option<bool>,
}

#[instrument("ConnectContainerLogs", skip(ctx, ws))]
pub async fn container_logs(
  ctx: OpContext,
  Path(container): Path<String>,
  Query(query): Query<LogsQuery>,
  ws: WebSocketUpgrade,
) -> Result<Response, crate::error::OpError> {
  let host = operation::authorized_host(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONTAINER_LOGS_VIEW,
  )
  .await?;

  audit::event(
    actions::CONTAINER_LOGS_VIEW.tag,
    &ctx.user,
    &ctx.request_id,
  )
  .host(&host)
  .resource("container", &container)
  .client(ctx.client_addr.clone(), ctx.user_agent.clone())
  .record()
  .await;

  Ok(ws.on_upgrade(async move |socket| {
    match subscribe_container_logs(&host, &container, &query).await
    {
      Ok(subscription) => {
        super::run_subscription_socket(socket, ctx, subscription)
          .await
      }
      Err(e) => {
        super::fail_socket(
          socket,
          e.code,
          e.message(),
          super::ws_fatal(e.code),
        )
        .await
      }
    }
  }))
}

async fn subscribe_container_logs(
  host: &Host,
  container: &str,
  query: &LogsQuery,
) -> OpResult<Subscription> {
  let follow = query.follow.unwrap_or(true);
  let timestamps = query.timestamps.unwrap_or(false);

  let scope = StreamScope {
    kind: StreamKind::Logs,
    host_id: host.id.clone(),
    resource_id: container.to_string(),
    fingerprint: scope_fingerprint(&[
      ("follow", &follow.to_string()),
      ("timestamps", &timestamps.to_string()),
    ]),
  };

  let host = host.clone();
  let container = container.to_string();
  let ring_capacity = core_config().log_ring_capacity;
  stream_registry()
    .subscribe(scope, query.tail.map(|tail| tail as usize), || {
      open_container_log_origin(
        host,
        container,
        follow,
        timestamps,
        ring_capacity,
      )
    })
    .await
}

/// Build the single origin log stream for a scope. The daemon is
/// asked for enough history to warm the full ring; subscribers
/// replay their own slice of it.
async fn open_container_log_origin(
  host: Host,
  container: String,
  follow: bool,
  timestamps: bool,
  ring_capacity: usize,
) -> OpResult<FrameStream> {
  let monitor = SelfMonitor::from_config();
  let filter_self =
    is_self_container(&host, &container, &monitor).await;
  if filter_self {
    debug!(
      "log stream targets the control plane itself, self-monitor filter active | container: {container}"
    );
  }

  let container_name = container.clone();
  let stream = operation::invoke(&host, |docker| async move {
    Ok(docker.container_logs(
      &container_name,
      follow,
      Some(ring_capacity as u64),
      timestamps,
    ))
  })
  .await?;

  let stream = stream.filter_map(move |item| {
    let monitor = monitor.clone();
    async move {
      match item {
        Ok(output) => {
          let frame = render_log_frame(output)?;
          if filter_self && !monitor.keep_line(&frame) {
            return None;
          }
          Some(Ok(Arc::from(frame.as_str())))
        }
        Err(e) => Some(Err(docker::docker_error(e).source)),
      }
    }
  });
  Ok(Box::pin(stream))
}

async fn is_self_container(
  host: &Host,
  container: &str,
  monitor: &SelfMonitor,
) -> bool {
  let container = container.to_string();
  let inspect = operation::invoke(host, |docker| async move {
    docker.inspect_container(&container).await
  })
  .await;
  let Ok(inspect) = inspect else {
    return false;
  };
  let name = inspect
    .get("Name")
    .and_then(|name| name.as_str())
    .map(|name| name.trim_start_matches('/').to_string())
    .unwrap_or_default();
  let labels = inspect
    .pointer("/Config/Labels")
    .and_then(|labels| {
      serde_json::from_value(labels.clone()).ok()
    })
    .unwrap_or_default();
  monitor.is_self_container(&name, &labels)
}

fn render_log_frame(output: LogOutput) -> Option<String> {
  let (kind, message) = match output {
    LogOutput::StdOut { message } => {
      (LogStreamKind::Stdout, message)
    }
    LogOutput::Console { message } => {
      (LogStreamKind::Stdout, message)
    }
    LogOutput::StdErr { message } => {
      (LogStreamKind::Stderr, message)
    }
    LogOutput::StdIn { .. } => return None,
  };
  let line = String::from_utf8_lossy(&message)
    .trim_end_matches(['\r', '\n'])
    .to_string();
  let frame = WsFrame::Log {
    timestamp: rfc3339_timestamp(),
    payload: LogFramePayload {
      line,
      stream: kind,
    },
  };
  Some(frame.to_json())
}

/// Swarm service logs: the daemon fans task logs in for us; the
/// registry fans them out to subscribers.
#[instrument("ConnectServiceLogs", skip(ctx, ws))]
pub async fn service_logs(
  ctx: OpContext,
  Path(service): Path<String>,
  Query(query): Query<LogsQuery>,
  ws: WebSocketUpgrade,
) -> Result<Response, crate::error::OpError> {
  let host = operation::authorized_host(
    &ctx,
    query.host_id.as_deref(),
    &actions::SERVICE_LOGS_VIEW,
  )
  .await?;

  audit::event(
    actions::SERVICE_LOGS_VIEW.tag,
    &ctx.user,
    &ctx.request_id,
  )
  .host(&host)
  .resource("service", &service)
  .client(ctx.client_addr.clone(), ctx.user_agent.clone())
  .record()
  .await;

  Ok(ws.on_upgrade(async move |socket| {
    let follow = query.follow.unwrap_or(true);
    let timestamps = query.timestamps.unwrap_or(false);
    let scope = StreamScope {
      kind: StreamKind::Logs,
      host_id: host.id.clone(),
      resource_id: format!("service/{service}"),
      fingerprint: scope_fingerprint(&[
        ("follow", &follow.to_string()),
        ("timestamps", &timestamps.to_string()),
      ]),
    };
    let ring_capacity = core_config().log_ring_capacity;
    let origin_host = host.clone();
    let origin_service = service.clone();
    let subscription = stream_registry()
      .subscribe(
        scope,
        query.tail.map(|tail| tail as usize),
        || async move {
          let stream = operation::invoke(
            &origin_host,
            |docker| async move {
              Ok(docker.service_logs(
                &origin_service,
                follow,
                Some(ring_capacity as u64),
                timestamps,
              ))
            },
          )
          .await?;
          let stream = stream.filter_map(|item| async move {
            match item {
              Ok(output) => {
                render_log_frame(output).map(|frame| {
                  Ok(Arc::from(frame.as_str()) as Frame)
                })
              }
              Err(e) => {
                Some(Err(docker::docker_error(e).source))
              }
            }
          });
          Ok(Box::pin(stream) as FrameStream)
        },
      )
      .await;
    match subscription {
      Ok(subscription) => {
        super::run_subscription_socket(socket, ctx, subscription)
          .await
      }
      Err(e) => {
        super::fail_socket(
          socket,
          e.code,
          e.message(),
          super::ws_fatal(e.code),
        )
        .await
      }
    }
  }))
}

/// Scope fingerprint, made unique per client when the dedicated
/// stream manager strategy is selected.
pub(crate) fn scope_fingerprint(
  params: &[(&str, &str)],
) -> String {
  let mut fingerprint = stream::fingerprint(params);
  if core_config().stream_manager == StreamManagerKind::Dedicated {
    fingerprint.push('-');
    fingerprint.push_str(&random_string(8));
  }
  fingerprint
}
