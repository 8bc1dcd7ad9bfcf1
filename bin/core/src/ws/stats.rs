use std::sync::Arc;

use axum::{
  extract::{Path, Query, WebSocketUpgrade},
  response::Response,
};
use flotilla_client::{
  entities::rfc3339_timestamp, ws::WsFrame,
};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::{
  auth::OpContext,
  docker,
  operation,
  permission::actions,
  state::stream_registry,
  stream::{Frame, FrameStream, StreamKind, StreamScope},
};

use super::logs::scope_fingerprint;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
  pub host_id: Option<String>,
}

#[instrument("ConnectContainerStats", skip(ctx, ws))]
pub async fn container_stats(
  ctx: OpContext,
  Path(container): Path<String>,
  Query(query): Query<StatsQuery>,
  ws: WebSocketUpgrade,
) -> Result<Response, crate::error::OpError> {
  let host = operation::authorized_host(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONTAINER_STATS_VIEW,
  )
  .await?;

  Ok(ws.on_upgrade(async move |socket| {
    let scope = StreamScope {
      kind: StreamKind::Stats,
      host_id: host.id.clone(),
      resource_id: container.clone(),
      fingerprint: scope_fingerprint(&[]),
    };
    let origin_host = host.clone();
    let origin_container = container.clone();
    let subscription = stream_registry()
      // Stats are periodic samples; replaying history would only
      // deliver stale gauges.
      .subscribe(scope, Some(1), || async move {
        let stream = operation::invoke(
          &origin_host,
          |docker| async move {
            Ok(docker.container_stats(&origin_container))
          },
        )
        .await?;
        let stream = stream.filter_map(|item| async move {
          match item {
            Ok(stats) => {
              let payload =
                serde_json::to_value(&stats).ok()?;
              let frame = WsFrame::Stats {
                timestamp: rfc3339_timestamp(),
                payload,
              }
              .to_json();
              Some(Ok(Arc::from(frame.as_str()) as Frame))
            }
            Err(e) => {
              Some(Err(docker::docker_error(e).source))
            }
          }
        });
        Ok(Box::pin(stream) as FrameStream)
      })
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
