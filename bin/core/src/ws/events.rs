use std::sync::Arc;

use axum::{
  extract::{Query, WebSocketUpgrade},
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
pub struct EventsQuery {
  pub host_id: Option<String>,
}

/// Daemon-wide event feed for one host.
#[instrument("ConnectEvents", skip(ctx, ws))]
pub async fn events(
  ctx: OpContext,
  Query(query): Query<EventsQuery>,
  ws: WebSocketUpgrade,
) -> Result<Response, crate::error::OpError> {
  let host = operation::authorized_host(
    &ctx,
    query.host_id.as_deref(),
    &actions::EVENTS_VIEW,
  )
  .await?;

  Ok(ws.on_upgrade(async move |socket| {
    let scope = StreamScope {
      kind: StreamKind::Events,
      host_id: host.id.clone(),
      resource_id: String::from("daemon"),
      fingerprint: scope_fingerprint(&[]),
    };
    let origin_host = host.clone();
    let subscription = stream_registry()
      .subscribe(scope, None, || async move {
        let stream = operation::invoke(
          &origin_host,
          |docker| async move { Ok(docker.daemon_events()) },
        )
        .await?;
        let stream = stream.filter_map(|item| async move {
          match item {
            Ok(event) => {
              let payload =
                serde_json::to_value(&event).ok()?;
              let frame = WsFrame::Event {
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
