use std::time::Duration;

use axum::{
  extract::{
    Path, Query, WebSocketUpgrade,
    ws::{self, WebSocket},
  },
  response::Response,
};
use bollard::container::LogOutput;
use flotilla_client::{
  entities::error::ErrorCode,
  ws::{ExecControl, WsFrame},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::{
  audit,
  auth::OpContext,
  config::core_config,
  docker::{DockerClient, ExecSession},
  operation,
  permission::actions,
};

#[derive(Debug, Deserialize)]
pub struct ExecQuery {
  pub host_id: Option<String>,
  pub cmd: Option<String>,
  pub workdir: Option<String>,
}

/// Interactive PTY into a container. Unlike logs/stats this is a
/// dedicated per-client stream, never shared.
#[instrument("ConnectContainerExec", skip(ctx, ws))]
pub async fn container_exec(
  ctx: OpContext,
  Path(container): Path<String>,
  Query(query): Query<ExecQuery>,
  ws: WebSocketUpgrade,
) -> Result<Response, crate::error::OpError> {
  let host = operation::authorized_host(
    &ctx,
    query.host_id.as_deref(),
    &actions::CONTAINER_EXEC,
  )
  .await?;

  let cmd = query.cmd.as_deref().unwrap_or("/bin/sh");
  let cmd_parts = shlex::split(cmd).ok_or_else(|| {
    crate::error::OpError::msg(
      ErrorCode::ValidationInvalid,
      "cmd is not parseable as a shell command",
    )
    .with_request_id(&ctx.request_id)
  })?;

  audit::event(
    actions::CONTAINER_EXEC.tag,
    &ctx.user,
    &ctx.request_id,
  )
  .host(&host)
  .resource("container", &container)
  .client(ctx.client_addr.clone(), ctx.user_agent.clone())
  .details(serde_json::json!({ "cmd": cmd }))
  .record()
  .await;

  let workdir = query.workdir.clone();
  Ok(ws.on_upgrade(async move |socket| {
    let guard = match crate::state::connections()
      .acquire(&host)
      .await
    {
      Ok(guard) => guard,
      Err(e) => {
        super::fail_socket(
          socket,
          e.code,
          e.message(),
          super::ws_fatal(e.code),
        )
        .await;
        return;
      }
    };

    let mut docker_for_resize: Option<DockerClient> = None;
    let session = guard
      .run(|docker| {
        docker_for_resize = Some(docker.clone());
        async move {
          docker
            .container_exec(&container, cmd_parts, workdir)
            .await
        }
      })
      .await;

    match session {
      Ok(session) => {
        run_exec_socket(
          socket,
          session,
          docker_for_resize.expect("set before the exec ran"),
        )
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

/// Bridge the attached PTY: binary frames out, stdin bytes in,
/// resize control frames applied out of band. Closing the socket
/// drops the exec stream and stdin sink immediately.
async fn run_exec_socket(
  socket: WebSocket,
  session: ExecSession,
  docker: DockerClient,
) {
  let config = core_config();
  let heartbeat =
    Duration::from_secs(config.ws_heartbeat_seconds);
  let pong_timeout =
    Duration::from_secs(config.ws_pong_timeout_seconds);

  let ExecSession {
    exec_id,
    mut output,
    mut input,
  } = session;

  let (mut sender, mut receiver) = socket.split();
  if !super::send_frame(&mut sender, &WsFrame::connected()).await {
    return;
  }

  let mut heartbeat_interval = tokio::time::interval(heartbeat);
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
      chunk = output.next() => match chunk {
        Some(Ok(output)) => {
          let bytes = match output {
            LogOutput::StdOut { message }
            | LogOutput::StdErr { message }
            | LogOutput::Console { message } => message,
            LogOutput::StdIn { .. } => continue,
          };
          if sender
            .send(ws::Message::Binary(bytes))
            .await
            .is_err()
          {
            break;
          }
        }
        Some(Err(e)) => {
          let _ = super::send_frame(
            &mut sender,
            &WsFrame::error(
              ErrorCode::DockerOperation,
              format!("exec stream failed | {e}"),
              true,
            ),
          )
          .await;
          break;
        }
        None => {
          let _ = super::send_frame(
            &mut sender,
            &WsFrame::disconnected(Some(String::from(
              "exec finished",
            ))),
          )
          .await;
          let _ = super::close_with(&mut sender, 1000, "").await;
          break;
        }
      },

      msg = receiver.next() => match msg {
        Some(Ok(ws::Message::Binary(bytes))) => {
          if input.write_all(&bytes).await.is_err() {
            break;
          }
          let _ = input.flush().await;
        }
        Some(Ok(ws::Message::Text(text))) => {
          // Resize control frames are JSON; anything else is
          // keystrokes.
          match serde_json::from_str::<ExecControl>(&text) {
            Ok(ExecControl::Resize { rows, cols }) => {
              if let Err(e) =
                docker.resize_exec(&exec_id, rows, cols).await
              {
                debug!("failed to resize exec pty | {e:#}");
              }
            }
            Err(_) => {
              if input.write_all(text.as_bytes()).await.is_err() {
                break;
              }
              let _ = input.flush().await;
            }
          }
        }
        Some(Ok(ws::Message::Pong(_))) => {
          awaiting_pong = None;
        }
        Some(Ok(ws::Message::Close(_))) | None => break,
        Some(Err(_)) => break,
        Some(Ok(_)) => {}
      },

      _ = heartbeat_interval.tick() => {
        if super::send_frame(&mut sender, &WsFrame::heartbeat())
          .await
        {
          let _ =
            sender.send(ws::Message::Ping(Vec::new().into())).await;
          awaiting_pong =
            Some(tokio::time::Instant::now() + pong_timeout);
        } else {
          break;
        }
      }

      _ = pong_deadline => {
        super::close_with(&mut sender, 1001, "heartbeat timeout")
          .await;
        break;
      }
    }
  }
}
