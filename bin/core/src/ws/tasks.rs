use std::time::Duration;

use axum::{
  extract::{
    Path, WebSocketUpgrade,
    ws::{self},
  },
  response::Response,
};
use flotilla_client::{
  entities::rfc3339_timestamp, ws::WsFrame,
};
use futures_util::StreamExt;

use crate::{
  auth::OpContext, config::core_config, state::task_channel,
};

/// Progress feed for long-running server-side tasks, currently
/// wizard probes and commits. Frames stop when the task publishes
/// its terminal event.
#[instrument("ConnectTaskProgress", skip(ctx, ws))]
pub async fn task_progress(
  ctx: OpContext,
  Path(task_id): Path<String>,
  ws: WebSocketUpgrade,
) -> Result<Response, crate::error::OpError> {
  // Progress frames carry no resource payloads, any
  // authenticated user may watch a task they know the id of.
  let _ = &ctx;

  Ok(ws.on_upgrade(async move |socket| {
    let sender = task_channel(&task_id).await;
    let mut events = sender.subscribe();

    let config = core_config();
    let heartbeat =
      Duration::from_secs(config.ws_heartbeat_seconds);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    if !super::send_frame(&mut ws_sender, &WsFrame::connected())
      .await
    {
      return;
    }

    let mut heartbeat_interval = tokio::time::interval(heartbeat);
    heartbeat_interval.tick().await;

    loop {
      tokio::select! {
        event = events.recv() => match event {
          Ok(payload) => {
            let done = payload
              .get("done")
              .and_then(|done| done.as_bool())
              .unwrap_or(false);
            let frame = WsFrame::Event {
              timestamp: rfc3339_timestamp(),
              payload,
            };
            if !super::send_frame(&mut ws_sender, &frame).await {
              break;
            }
            if done {
              let _ = super::close_with(
                &mut ws_sender,
                1000,
                "task finished",
              )
              .await;
              break;
            }
          }
          Err(
            tokio::sync::broadcast::error::RecvError::Lagged(_),
          ) => continue,
          Err(_) => break,
        },
        msg = ws_receiver.next() => match msg {
          Some(Ok(ws::Message::Close(_))) | None => break,
          Some(Err(_)) => break,
          Some(Ok(_)) => {}
        },
        _ = heartbeat_interval.tick() => {
          if !super::send_frame(
            &mut ws_sender,
            &WsFrame::heartbeat(),
          )
          .await
          {
            break;
          }
        }
      }
    }
  }))
}
