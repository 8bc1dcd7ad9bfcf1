use std::time::Duration;

use axum::{
  Router,
  extract::ws::{self, WebSocket},
  routing::get,
};
use flotilla_client::{
  entities::error::ErrorCode,
  ws::{CLOSE_ORIGIN_ENDED, CLOSE_SLOW_CONSUMER, WsFrame},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};

use crate::{
  auth::OpContext,
  config::core_config,
  stream::{EndReason, StreamItem, Subscription},
};

mod events;
mod exec;
mod logs;
mod stats;
mod tasks;

pub fn router() -> Router {
  Router::new()
    .route("/containers/{id}/logs", get(logs::container_logs))
    .route("/containers/{id}/stats", get(stats::container_stats))
    .route("/containers/{id}/exec", get(exec::container_exec))
    .route("/services/{id}/logs", get(logs::service_logs))
    .route("/events", get(events::events))
    .route("/tasks/{id}", get(tasks::task_progress))
}

pub(crate) type WsSender = SplitSink<WebSocket, ws::Message>;

pub(crate) async fn send_frame(
  sender: &mut WsSender,
  frame: &WsFrame,
) -> bool {
  sender
    .send(ws::Message::text(frame.to_json()))
    .await
    .is_ok()
}

pub(crate) async fn close_with(
  sender: &mut WsSender,
  code: u16,
  reason: &str,
) {
  let _ = sender
    .send(ws::Message::Close(Some(ws::CloseFrame {
      code,
      reason: reason.to_string().into(),
    })))
    .await;
}

/// Whether a pre-stream failure means the client should not
/// bother reconnecting.
pub(crate) fn ws_fatal(code: ErrorCode) -> bool {
  matches!(
    code,
    ErrorCode::InvalidCredentials
      | ErrorCode::TokenInvalid
      | ErrorCode::Revoked
      | ErrorCode::InsufficientRole
      | ErrorCode::HostDenied
      | ErrorCode::NotFound
      | ErrorCode::HostNotFound
      | ErrorCode::ValidationInvalid
      | ErrorCode::MissingField
  )
}

/// Deliver a structured error frame, then close. `fatal` tells the
/// client whether reconnecting is pointless.
pub(crate) async fn fail_socket(
  socket: WebSocket,
  code: ErrorCode,
  message: String,
  fatal: bool,
) {
  let (mut sender, _receiver) = socket.split();
  let _ = send_frame(
    &mut sender,
    &WsFrame::error(code, message, fatal),
  )
  .await;
  close_with(&mut sender, code.ws_close_code(), code.as_str())
    .await;
}

/// Drive one subscription-backed socket to completion: frames out
/// in origin order, heartbeats on the configured cadence, closed
/// when the client goes away, goes quiet, or the stream ends.
///
/// Closing the socket drops the subscription synchronously, which
/// detaches from the shared stream and may arm its linger timer.
pub(crate) async fn run_subscription_socket(
  socket: WebSocket,
  ctx: OpContext,
  mut subscription: Subscription,
) {
  let config = core_config();
  let heartbeat =
    Duration::from_secs(config.ws_heartbeat_seconds);
  let pong_timeout =
    Duration::from_secs(config.ws_pong_timeout_seconds);

  let (mut sender, mut receiver) = socket.split();

  if !send_frame(&mut sender, &WsFrame::connected()).await {
    return;
  }

  let mut heartbeat_interval = tokio::time::interval(heartbeat);
  // The first tick fires immediately, skip it.
  heartbeat_interval.tick().await;
  let mut awaiting_pong: Option<tokio::time::Instant> = None;

  loop {
    let pong_deadline = async {
      match awaiting_pong {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
      }
    };

    tokio::select! {
      item = subscription.next() => match item {
        StreamItem::Frame(frame) => {
          if sender
            .send(ws::Message::text(frame.as_ref()))
            .await
            .is_err()
          {
            break;
          }
        }
        StreamItem::End(EndReason::SlowConsumer) => {
          let _ = send_frame(
            &mut sender,
            &WsFrame::error(
              ErrorCode::SlowConsumer,
              "subscriber queue overflowed, frames were dropped",
              false,
            ),
          )
          .await;
          close_with(
            &mut sender,
            CLOSE_SLOW_CONSUMER,
            ErrorCode::SlowConsumer.as_str(),
          )
          .await;
          break;
        }
        StreamItem::End(EndReason::OriginClosed) => {
          let _ = send_frame(
            &mut sender,
            &WsFrame::disconnected(Some(String::from(
              "stream closed by origin",
            ))),
          )
          .await;
          close_with(
            &mut sender,
            CLOSE_ORIGIN_ENDED,
            ErrorCode::ClosedByOrigin.as_str(),
          )
          .await;
          break;
        }
      },

      msg = receiver.next() => match msg {
        Some(Ok(ws::Message::Pong(_))) => {
          awaiting_pong = None;
        }
        Some(Ok(ws::Message::Close(_))) | None => break,
        Some(Err(_)) => break,
        // Inbound text/binary is ignored on read-only streams.
        Some(Ok(_)) => {}
      },

      _ = heartbeat_interval.tick() => {
        // An access token expiring mid-stream does not terminate
        // the socket; an explicit revoke (user deactivated) does.
        match crate::auth::get_user(&ctx.user.id).await {
          Ok(user) if user.active => {}
          _ => {
            let _ = send_frame(
              &mut sender,
              &WsFrame::error(
                ErrorCode::Revoked,
                "session revoked",
                true,
              ),
            )
            .await;
            close_with(
              &mut sender,
              ErrorCode::Revoked.ws_close_code(),
              ErrorCode::Revoked.as_str(),
            )
            .await;
            break;
          }
        }
        if send_frame(&mut sender, &WsFrame::heartbeat()).await {
          let _ =
            sender.send(ws::Message::Ping(Vec::new().into())).await;
          awaiting_pong =
            Some(tokio::time::Instant::now() + pong_timeout);
        } else {
          break;
        }
      }

      _ = pong_deadline => {
        debug!("closing idle websocket, no pong in {pong_timeout:?}");
        close_with(&mut sender, 1001, "heartbeat timeout").await;
        break;
      }
    }
  }

  // Synchronous detach; the last subscriber arms the linger.
  subscription.close();
}
