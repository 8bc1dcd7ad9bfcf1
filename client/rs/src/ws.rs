//! Websocket frame schema shared by core and clients, plus the
//! client-side connectors used by the CLI.

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::{
  MaybeTlsStream, WebSocketStream, connect_async,
};

use crate::entities::{error::ErrorCode, rfc3339_timestamp};

/// Close code sent when a subscriber's queue overflowed.
pub const CLOSE_SLOW_CONSUMER: u16 = 4408;
/// Close code sent on authentication failures.
pub const CLOSE_UNAUTHORIZED: u16 = 4401;
/// Close code sent when the origin stream ended.
pub const CLOSE_ORIGIN_ENDED: u16 = 1011;

/// Outbound control messages. PTY output travels as raw binary
/// frames instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsFrame {
  Connected {
    timestamp: String,
  },
  Log {
    timestamp: String,
    payload: LogFramePayload,
  },
  Stats {
    timestamp: String,
    payload: serde_json::Value,
  },
  Event {
    timestamp: String,
    payload: serde_json::Value,
  },
  Heartbeat {
    timestamp: String,
  },
  Error {
    timestamp: String,
    code: ErrorCode,
    message: String,
    /// Whether the client should attempt to reconnect.
    reconnect: bool,
    /// `true` means do-not-reconnect.
    fatal: bool,
  },
  Disconnected {
    timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
  },
}

impl WsFrame {
  pub fn connected() -> WsFrame {
    WsFrame::Connected {
      timestamp: rfc3339_timestamp(),
    }
  }

  pub fn heartbeat() -> WsFrame {
    WsFrame::Heartbeat {
      timestamp: rfc3339_timestamp(),
    }
  }

  pub fn error(
    code: ErrorCode,
    message: impl Into<String>,
    fatal: bool,
  ) -> WsFrame {
    WsFrame::Error {
      timestamp: rfc3339_timestamp(),
      code,
      message: message.into(),
      reconnect: !fatal,
      fatal,
    }
  }

  pub fn disconnected(reason: Option<String>) -> WsFrame {
    WsFrame::Disconnected {
      timestamp: rfc3339_timestamp(),
      reason,
    }
  }

  pub fn to_json(&self) -> String {
    serde_json::to_string(self)
      .expect("ws frame serialization cannot fail")
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFramePayload {
  pub line: String,
  pub stream: LogStreamKind,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogStreamKind {
  Stdout,
  Stderr,
}

/// Text control frames accepted on an exec socket. Anything not
/// parsing as one of these is treated as stdin bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecControl {
  Resize { rows: u16, cols: u16 },
}

pub type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Rewrite an http(s) API address into the ws(s) scheme.
pub fn ws_url(address: &str, path_and_query: &str) -> anyhow::Result<String> {
  let address = address.trim_end_matches('/');
  let base = if let Some(rest) = address.strip_prefix("https://") {
    format!("wss://{rest}")
  } else if let Some(rest) = address.strip_prefix("http://") {
    format!("ws://{rest}")
  } else {
    return Err(anyhow!(
      "address must start with http:// or https://, got {address}"
    ));
  };
  Ok(format!("{base}{path_and_query}"))
}

pub async fn connect(url: &str) -> anyhow::Result<WsConnection> {
  let (socket, _) = connect_async(url)
    .await
    .context("failed to open websocket connection")?;
  Ok(socket)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frames_tag_on_type() {
    let frame = WsFrame::error(
      ErrorCode::SlowConsumer,
      "subscriber queue overflow",
      true,
    );
    let json: serde_json::Value =
      serde_json::from_str(&frame.to_json()).unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["code"], "stream.slow_consumer");
    assert_eq!(json["fatal"], true);
    assert_eq!(json["reconnect"], false);
  }

  #[test]
  fn resize_control_parses() {
    let control: ExecControl =
      serde_json::from_str(r#"{"type":"resize","rows":40,"cols":120}"#)
        .unwrap();
    let ExecControl::Resize { rows, cols } = control;
    assert_eq!((rows, cols), (40, 120));
  }

  #[test]
  fn ws_url_switches_scheme() {
    assert_eq!(
      ws_url("http://localhost:9120", "/ws/events?token=t").unwrap(),
      "ws://localhost:9120/ws/events?token=t"
    );
    assert_eq!(
      ws_url("https://flotilla.example/", "/ws/events").unwrap(),
      "wss://flotilla.example/ws/events"
    );
    assert!(ws_url("ftp://nope", "/x").is_err());
  }
}
