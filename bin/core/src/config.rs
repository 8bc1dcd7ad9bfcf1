use std::sync::OnceLock;

use axum::http::HeaderValue;
use database::DatabaseConfig;
use flotilla_client::entities::logger::{
  LogConfig, LogLevel, StdioLogMode,
};
use serde::Deserialize;
use strum::Display;
use tower_http::cors::CorsLayer;

/// Environment overrides, parsed once at startup.
#[derive(Deserialize, Default)]
pub struct Env {
  pub flotilla_port: Option<u16>,
  pub flotilla_bind_ip: Option<String>,

  pub flotilla_database_uri: Option<String>,
  pub flotilla_database_db_name: Option<String>,

  pub flotilla_jwt_secret: Option<String>,
  pub flotilla_access_token_ttl_minutes: Option<u64>,
  pub flotilla_refresh_token_ttl_days: Option<u64>,
  pub flotilla_vault_key: Option<String>,

  pub flotilla_probe_interval_seconds: Option<u64>,
  pub flotilla_probe_timeout_seconds: Option<u64>,
  pub flotilla_docker_timeout_seconds: Option<u64>,
  pub flotilla_ssh_dial_timeout_seconds: Option<u64>,
  pub flotilla_wizard_probe_timeout_seconds: Option<u64>,

  pub flotilla_breaker_failure_threshold: Option<u32>,
  pub flotilla_breaker_cooldown_seconds: Option<u64>,

  pub flotilla_auth_rate_limit_disabled: Option<bool>,
  pub flotilla_auth_rate_limit_max_attempts: Option<u32>,
  pub flotilla_auth_rate_limit_window_seconds: Option<u64>,

  pub flotilla_cors_allowed_origins: Option<Vec<String>>,

  pub flotilla_log_ring_capacity: Option<usize>,
  pub flotilla_subscriber_queue_capacity: Option<usize>,
  pub flotilla_stream_linger_seconds: Option<u64>,
  pub flotilla_ws_heartbeat_seconds: Option<u64>,
  pub flotilla_ws_pong_timeout_seconds: Option<u64>,

  pub flotilla_audit_retention_days: Option<u64>,
  pub flotilla_audit_queue_capacity: Option<usize>,

  pub flotilla_permission_mode: Option<PermissionMode>,
  pub flotilla_stream_manager: Option<StreamManagerKind>,

  pub flotilla_self_monitor_disabled: Option<bool>,
  pub flotilla_self_monitor_label: Option<String>,
  pub flotilla_self_monitor_name_pattern: Option<String>,
  pub flotilla_self_monitor_line_marker: Option<String>,

  pub flotilla_init_admin_username: Option<String>,
  pub flotilla_init_admin_password: Option<String>,
  pub flotilla_first_host_name: Option<String>,
  pub flotilla_first_host_address: Option<String>,

  pub flotilla_logging_level: Option<LogLevel>,
  pub flotilla_logging_stdio: Option<StdioLogMode>,
  pub flotilla_logging_pretty: Option<bool>,
  pub flotilla_logging_otlp_endpoint: Option<String>,
  pub flotilla_otel_service_name: Option<String>,
}

/// Selects the permission service implementation at startup.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Display, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PermissionMode {
  /// Role table as-is: every authenticated user may read.
  #[default]
  Standard,
  /// Viewers additionally need an explicit host permission to
  /// read host scoped resources.
  Restricted,
}

/// Selects the stream manager implementation at startup.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Display, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StreamManagerKind {
  /// Fan many subscribers out over one origin stream per scope.
  #[default]
  Shared,
  /// One dedicated origin stream per client socket.
  Dedicated,
}

#[derive(Debug, Clone)]
pub struct SelfMonitorConfig {
  pub disabled: bool,
  /// Containers carrying this label are treated as our own.
  pub label: String,
  /// Container name pattern treated as our own.
  pub name_pattern: String,
  /// Log lines containing this marker are filtered on self streams.
  pub line_marker: String,
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
  pub port: u16,
  pub bind_ip: String,
  pub database: DatabaseConfig,
  pub jwt_secret: String,
  pub access_token_ttl_minutes: u64,
  pub refresh_token_ttl_days: u64,
  pub vault_key: String,
  pub probe_interval_seconds: u64,
  pub probe_timeout_seconds: u64,
  pub docker_timeout_seconds: u64,
  pub ssh_dial_timeout_seconds: u64,
  pub wizard_probe_timeout_seconds: u64,
  pub breaker_failure_threshold: u32,
  pub breaker_cooldown_seconds: u64,
  pub auth_rate_limit_disabled: bool,
  pub auth_rate_limit_max_attempts: u32,
  pub auth_rate_limit_window_seconds: u64,
  pub cors_allowed_origins: Vec<String>,
  pub log_ring_capacity: usize,
  pub subscriber_queue_capacity: usize,
  pub stream_linger_seconds: u64,
  pub ws_heartbeat_seconds: u64,
  pub ws_pong_timeout_seconds: u64,
  /// 0 keeps audit events forever.
  pub audit_retention_days: u64,
  pub audit_queue_capacity: usize,
  pub permission_mode: PermissionMode,
  pub stream_manager: StreamManagerKind,
  pub self_monitor: SelfMonitorConfig,
  pub init_admin_username: Option<String>,
  pub init_admin_password: String,
  pub first_host_name: Option<String>,
  pub first_host_address: Option<String>,
  pub logging: LogConfig,
}

pub fn core_config() -> &'static CoreConfig {
  static CORE_CONFIG: OnceLock<CoreConfig> = OnceLock::new();
  CORE_CONFIG.get_or_init(|| {
    let env: Env = match envy::from_env() {
      Ok(env) => env,
      Err(e) => {
        panic!("Failed to parse Flotilla Core environment | {e:?}");
      }
    };
    CoreConfig {
      port: env.flotilla_port.unwrap_or(9120),
      bind_ip: env
        .flotilla_bind_ip
        .unwrap_or_else(|| String::from("0.0.0.0")),
      database: DatabaseConfig {
        uri: env
          .flotilla_database_uri
          .unwrap_or_else(|| DatabaseConfig::default().uri),
        db_name: env
          .flotilla_database_db_name
          .unwrap_or_else(|| DatabaseConfig::default().db_name),
        ..Default::default()
      },
      jwt_secret: env.flotilla_jwt_secret.unwrap_or_default(),
      access_token_ttl_minutes: env
        .flotilla_access_token_ttl_minutes
        .unwrap_or(30),
      refresh_token_ttl_days: env
        .flotilla_refresh_token_ttl_days
        .unwrap_or(7),
      vault_key: env.flotilla_vault_key.unwrap_or_default(),
      probe_interval_seconds: env
        .flotilla_probe_interval_seconds
        .unwrap_or(30),
      probe_timeout_seconds: env
        .flotilla_probe_timeout_seconds
        .unwrap_or(5),
      docker_timeout_seconds: env
        .flotilla_docker_timeout_seconds
        .unwrap_or(30),
      ssh_dial_timeout_seconds: env
        .flotilla_ssh_dial_timeout_seconds
        .unwrap_or(15),
      wizard_probe_timeout_seconds: env
        .flotilla_wizard_probe_timeout_seconds
        .unwrap_or(20),
      breaker_failure_threshold: env
        .flotilla_breaker_failure_threshold
        .unwrap_or(5),
      breaker_cooldown_seconds: env
        .flotilla_breaker_cooldown_seconds
        .unwrap_or(30),
      auth_rate_limit_disabled: env
        .flotilla_auth_rate_limit_disabled
        .unwrap_or(false),
      auth_rate_limit_max_attempts: env
        .flotilla_auth_rate_limit_max_attempts
        .unwrap_or(10),
      auth_rate_limit_window_seconds: env
        .flotilla_auth_rate_limit_window_seconds
        .unwrap_or(300),
      cors_allowed_origins: env
        .flotilla_cors_allowed_origins
        .unwrap_or_default(),
      log_ring_capacity: env
        .flotilla_log_ring_capacity
        .unwrap_or(1_000),
      subscriber_queue_capacity: env
        .flotilla_subscriber_queue_capacity
        .unwrap_or(256),
      stream_linger_seconds: env
        .flotilla_stream_linger_seconds
        .unwrap_or(5),
      ws_heartbeat_seconds: env
        .flotilla_ws_heartbeat_seconds
        .unwrap_or(30),
      ws_pong_timeout_seconds: env
        .flotilla_ws_pong_timeout_seconds
        .unwrap_or(10),
      audit_retention_days: env
        .flotilla_audit_retention_days
        .unwrap_or(0),
      audit_queue_capacity: env
        .flotilla_audit_queue_capacity
        .unwrap_or(1_024),
      permission_mode: env
        .flotilla_permission_mode
        .unwrap_or_default(),
      stream_manager: env
        .flotilla_stream_manager
        .unwrap_or_default(),
      self_monitor: SelfMonitorConfig {
        disabled: env
          .flotilla_self_monitor_disabled
          .unwrap_or(false),
        label: env
          .flotilla_self_monitor_label
          .unwrap_or_else(|| String::from("io.flotilla.self")),
        name_pattern: env
          .flotilla_self_monitor_name_pattern
          .unwrap_or_else(|| String::from("flotilla*")),
        line_marker: env
          .flotilla_self_monitor_line_marker
          .unwrap_or_else(|| String::from("flotilla_core")),
      },
      init_admin_username: env.flotilla_init_admin_username,
      init_admin_password: env
        .flotilla_init_admin_password
        .unwrap_or_default(),
      first_host_name: env.flotilla_first_host_name,
      first_host_address: env.flotilla_first_host_address,
      logging: LogConfig {
        level: env.flotilla_logging_level.unwrap_or_default(),
        stdio: env.flotilla_logging_stdio.unwrap_or_default(),
        pretty: env.flotilla_logging_pretty.unwrap_or(false),
        otlp_endpoint: env
          .flotilla_logging_otlp_endpoint
          .unwrap_or_default(),
        opentelemetry_service_name: env
          .flotilla_otel_service_name
          .unwrap_or_else(|| String::from("Flotilla")),
        ..Default::default()
      },
    }
  })
}

/// Allows all origins when `cors_allowed_origins` is empty,
/// otherwise only the configured ones.
pub fn cors_layer() -> CorsLayer {
  let config = core_config();
  let allowed_origins = if config.cors_allowed_origins.is_empty() {
    vec![HeaderValue::from_static("*")]
  } else {
    config
      .cors_allowed_origins
      .iter()
      .filter_map(|origin| {
        HeaderValue::from_str(origin)
          .inspect_err(|e| {
            warn!("Invalid CORS allowed origin: {origin} | {e:?}")
          })
          .ok()
      })
      .collect()
  };
  CorsLayer::new()
    .allow_origin(allowed_origins)
    .allow_methods(tower_http::cors::Any)
    .allow_headers(tower_http::cors::Any)
}
