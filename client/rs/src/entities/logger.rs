use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
  /// Minimum level emitted to the configured sinks.
  #[serde(default)]
  pub level: LogLevel,
  #[serde(default)]
  pub stdio: StdioLogMode,
  /// Use the multi-line pretty formatter on stdio.
  #[serde(default)]
  pub pretty: bool,
  /// Include the emitting target in stdio lines.
  #[serde(default)]
  pub location: bool,
  #[serde(default = "default_ansi")]
  pub ansi: bool,
  /// When set, spans are exported over OTLP http.
  #[serde(default)]
  pub otlp_endpoint: String,
  #[serde(default = "default_service_name")]
  pub opentelemetry_service_name: String,
  #[serde(default = "default_scope_name")]
  pub opentelemetry_scope_name: String,
}

fn default_ansi() -> bool {
  true
}

fn default_service_name() -> String {
  String::from("Flotilla")
}

fn default_scope_name() -> String {
  String::from("flotilla-core")
}

impl Default for LogConfig {
  fn default() -> Self {
    LogConfig {
      level: Default::default(),
      stdio: Default::default(),
      pretty: false,
      location: false,
      ansi: default_ansi(),
      otlp_endpoint: Default::default(),
      opentelemetry_service_name: default_service_name(),
      opentelemetry_scope_name: default_scope_name(),
    }
  }
}

#[derive(
  Debug, Clone, Copy, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
  Trace,
  Debug,
  #[default]
  Info,
  Warn,
  Error,
}

impl From<LogLevel> for tracing::Level {
  fn from(value: LogLevel) -> Self {
    match value {
      LogLevel::Trace => tracing::Level::TRACE,
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Error => tracing::Level::ERROR,
    }
  }
}

#[derive(
  Debug, Clone, Copy, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}
