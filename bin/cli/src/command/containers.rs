use anyhow::Context;
use bytes::Bytes;
use colored::Colorize;
use flotilla_client::{
  FlotillaClient,
  entities::docker::ContainerListItem,
  ws::{LogStreamKind, WsFrame},
};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio_tungstenite::tungstenite;

use crate::{
  args::{ContainersCommand, OutputFormat},
  output,
};

use super::session;

pub async fn handle(
  command: &ContainersCommand,
  format: OutputFormat,
  host: Option<&str>,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let client = session(context_override).await?;
  match command {
    ContainersCommand::Ls => {
      let containers = client.list_containers(host).await?;
      output::print(format, &containers, containers_table)?;
    }
    ContainersCommand::Start { container } => {
      client.start_container(container, host).await?;
      println!("started {container}");
    }
    ContainersCommand::Stop { container } => {
      client.stop_container(container, host).await?;
      println!("stopped {container}");
    }
    ContainersCommand::Restart { container } => {
      client.restart_container(container, host).await?;
      println!("restarted {container}");
    }
    ContainersCommand::Logs {
      container,
      tail,
      no_follow,
      timestamps,
    } => {
      stream_logs(
        &client,
        container,
        host,
        *tail,
        !*no_follow,
        *timestamps,
      )
      .await?
    }
    ContainersCommand::Stats { container } => {
      stream_stats(&client, container, host).await?
    }
    ContainersCommand::Exec {
      container,
      cmd,
      workdir,
    } => {
      exec(&client, container, host, cmd, workdir.as_deref())
        .await?
    }
  }
  Ok(())
}

fn containers_table(
  containers: &Vec<ContainerListItem>,
) -> comfy_table::Table {
  let mut table = output::table(&[
    "NAME", "ID", "IMAGE", "STATE", "STATUS", "PORTS",
  ]);
  for container in containers {
    table.add_row(vec![
      container.name.clone(),
      container.id.chars().take(12).collect(),
      container.image.clone(),
      container.state.to_string(),
      container.status.clone(),
      container.ports.join(", "),
    ]);
  }
  table
}

async fn stream_logs(
  client: &FlotillaClient,
  container: &str,
  host: Option<&str>,
  tail: u64,
  follow: bool,
  timestamps: bool,
) -> anyhow::Result<()> {
  let mut socket = client
    .container_logs_socket(container, host, follow, tail, timestamps)
    .await?;

  while let Some(msg) = socket.next().await {
    match msg {
      Ok(tungstenite::Message::Text(text)) => {
        match serde_json::from_str::<WsFrame>(&text) {
          Ok(WsFrame::Log { payload, .. }) => {
            match payload.stream {
              LogStreamKind::Stdout => {
                println!("{}", payload.line)
              }
              LogStreamKind::Stderr => {
                eprintln!("{}", payload.line.red())
              }
            }
          }
          Ok(WsFrame::Error { code, message, .. }) => {
            eprintln!("{} {code} | {message}", "error:".red());
          }
          Ok(WsFrame::Disconnected { .. }) => break,
          Ok(_) => {}
          Err(_) => println!("{text}"),
        }
      }
      Ok(tungstenite::Message::Ping(payload)) => {
        let _ = socket
          .send(tungstenite::Message::Pong(payload))
          .await;
      }
      Ok(tungstenite::Message::Close(_)) => break,
      Err(e) => {
        return Err(
          anyhow::Error::from(e).context("log stream failed"),
        );
      }
      _ => {}
    }
  }
  Ok(())
}

async fn stream_stats(
  client: &FlotillaClient,
  container: &str,
  host: Option<&str>,
) -> anyhow::Result<()> {
  let mut socket =
    client.container_stats_socket(container, host).await?;

  while let Some(msg) = socket.next().await {
    match msg {
      Ok(tungstenite::Message::Text(text)) => {
        match serde_json::from_str::<WsFrame>(&text) {
          Ok(WsFrame::Stats { payload, .. }) => {
            println!(
              "{}",
              serde_json::to_string(&payload)
                .unwrap_or_default()
            );
          }
          Ok(WsFrame::Error { code, message, .. }) => {
            eprintln!("{} {code} | {message}", "error:".red());
          }
          Ok(WsFrame::Disconnected { .. }) => break,
          _ => {}
        }
      }
      Ok(tungstenite::Message::Ping(payload)) => {
        let _ = socket
          .send(tungstenite::Message::Pong(payload))
          .await;
      }
      Ok(tungstenite::Message::Close(_)) => break,
      Err(e) => {
        return Err(
          anyhow::Error::from(e).context("stats stream failed"),
        );
      }
      _ => {}
    }
  }
  Ok(())
}

/// Interactive PTY bridge: local terminal in raw mode, stdin and
/// resizes forwarded up, PTY bytes forwarded down.
async fn exec(
  client: &FlotillaClient,
  container: &str,
  host: Option<&str>,
  cmd: &str,
  workdir: Option<&str>,
) -> anyhow::Result<()> {
  // Need to forward multiple sources into ws write
  let (write_tx, mut write_rx) =
    tokio::sync::mpsc::channel::<tungstenite::Message>(1024);

  // Subscribe to SIGWINCH for resize messages
  let mut sigwinch = tokio::signal::unix::signal(
    tokio::signal::unix::SignalKind::window_change(),
  )
  .context("failed to register SIGWINCH handler")?;

  // Send first resize message, bailing if it fails to get the size.
  write_tx.send(resize_message()?).await?;

  let forward_resize = async {
    while sigwinch.recv().await.is_some() {
      if let Ok(resize_message) = resize_message()
        && write_tx.send(resize_message).await.is_err()
      {
        break;
      }
    }
  };

  let forward_stdin = async {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 8192];
    loop {
      let n = match stdin.read(&mut buf).await {
        Ok(0) => break, // EOF
        Ok(n) => n,
        Err(_) => break,
      };
      // Check for disconnect sequence (alt + q)
      if buf[..n] == [197, 147] {
        break;
      }
      let bytes = Bytes::copy_from_slice(&buf[..n]);
      if write_tx
        .send(tungstenite::Message::Binary(bytes))
        .await
        .is_err()
      {
        break;
      };
    }
  };

  let (mut ws_write, mut ws_read) = client
    .container_exec_socket(container, host, cmd, workdir)
    .await?
    .split();

  let forward_write = async {
    while let Some(msg) = write_rx.recv().await {
      if let Err(e) = ws_write.send(msg).await {
        return Some(anyhow::Error::from(e));
      };
    }
    None
  };

  let forward_read = async {
    let mut stdout = tokio::io::stdout();
    loop {
      match ws_read.next().await {
        Some(Ok(tungstenite::Message::Binary(bytes))) => {
          if let Err(e) =
            tokio::io::copy(&mut bytes.as_ref(), &mut stdout)
              .await
              .context("Failed to copy bytes to stdout")
          {
            return Some(e);
          }
          let _ = stdout.flush().await;
        }
        Some(Ok(tungstenite::Message::Text(text))) => {
          // Control frames (heartbeat, errors) arrive as JSON.
          if let Ok(WsFrame::Error { code, message, .. }) =
            serde_json::from_str::<WsFrame>(&text)
          {
            return Some(anyhow::anyhow!("{code} | {message}"));
          }
        }
        Some(Ok(tungstenite::Message::Close(_))) => break,
        Some(Err(e)) => {
          return Some(
            anyhow::Error::from(e).context("Websocket read error"),
          );
        }
        None => break,
        _ => {}
      }
    }
    None
  };

  let guard = RawModeGuard::enable_raw_mode()?;

  tokio::select! {
    _ = forward_resize => drop(guard),
    _ = forward_stdin => drop(guard),
    e = forward_write => {
      drop(guard);
      if let Some(e) = e {
        eprintln!("\nFailed to forward stdin | {e:#}");
      }
    },
    e = forward_read => {
      drop(guard);
      if let Some(e) = e {
        eprintln!("\nFailed to forward stdout | {e:#}");
      }
    },
  };

  println!("\n\n{} {}", "connection".bold(), "closed".red().bold());

  // It doesn't seem to exit by itself after the raw mode stuff.
  std::process::exit(0)
}

fn resize_message() -> anyhow::Result<tungstenite::Message> {
  let (cols, rows) = crossterm::terminal::size()
    .context("Failed to get terminal size")?;
  Ok(tungstenite::Message::text(format!(
    r#"{{"type":"resize","rows":{rows},"cols":{cols}}}"#
  )))
}

struct RawModeGuard;

impl RawModeGuard {
  fn enable_raw_mode() -> anyhow::Result<Self> {
    crossterm::terminal::enable_raw_mode()
      .context("Failed to enable terminal raw mode")?;
    Ok(Self)
  }
}
impl Drop for RawModeGuard {
  fn drop(&mut self) {
    if let Err(e) = crossterm::terminal::disable_raw_mode() {
      eprintln!("Failed to disable terminal raw mode | {e:?}");
    }
  }
}
