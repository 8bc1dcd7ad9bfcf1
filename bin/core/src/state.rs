use std::sync::{Arc, OnceLock};

use anyhow::{Context, anyhow};
use cache::CloneCache;
use flotilla_client::entities::host::HostStatus;
use rate_limit::RateLimiter;
use tokio::sync::broadcast;
use vault::CredentialCipher;

use crate::{
  audit::AuditRecorder,
  auth::jwt::JwtClient,
  config::core_config,
  connection::Connections,
  permission::PermissionService,
  stream::StreamRegistry,
};

static DB_CLIENT: OnceLock<database::Client> = OnceLock::new();

pub fn db_client() -> &'static database::Client {
  DB_CLIENT.get().unwrap_or_else(|| {
    error!(
      "FATAL: db_client accessed before initialized | Ensure init_db_client() is called during startup | Exiting..."
    );
    std::process::exit(1)
  })
}

/// Must be called in app startup sequence.
pub async fn init_db_client() {
  let init = async {
    let client = database::Client::new(&core_config().database)
      .await
      .context("failed to initialize database client")?;
    DB_CLIENT.set(client).map_err(|_| {
      anyhow!(
        "db_client initialized more than once - this should not happen"
      )
    })?;
    anyhow::Ok(())
  }
  .await;
  if let Err(e) = init {
    error!(
      "FATAL: Failed to initialize database::Client | {e:#} | Exiting..."
    );
    std::process::exit(1)
  }
}

pub fn jwt_client() -> &'static JwtClient {
  static JWT_CLIENT: OnceLock<JwtClient> = OnceLock::new();
  JWT_CLIENT.get_or_init(|| match JwtClient::new(core_config()) {
    Ok(client) => client,
    Err(e) => {
      error!(
        "FATAL: Failed to initialize JwtClient | {e:#} | Exiting..."
      );
      std::process::exit(1)
    }
  })
}

/// None when no encryption key is configured. Every credential
/// operation fails with `host.credential_unavailable` in that case.
pub fn credential_cipher() -> Option<&'static CredentialCipher> {
  static CIPHER: OnceLock<Option<CredentialCipher>> = OnceLock::new();
  CIPHER
    .get_or_init(|| {
      let key = &core_config().vault_key;
      if key.is_empty() {
        warn!(
          "FLOTILLA_VAULT_KEY is not set | hosts with stored credentials will be unavailable"
        );
        return None;
      }
      match CredentialCipher::new(key) {
        Ok(cipher) => Some(cipher),
        Err(e) => {
          error!("Failed to initialize credential cipher | {e:#}");
          None
        }
      }
    })
    .as_ref()
}

/// host id => pooled client + breaker
pub fn connections() -> &'static Connections {
  static CONNECTIONS: OnceLock<Connections> = OnceLock::new();
  CONNECTIONS.get_or_init(Connections::new)
}

pub fn stream_registry() -> &'static StreamRegistry {
  static STREAM_REGISTRY: OnceLock<StreamRegistry> = OnceLock::new();
  STREAM_REGISTRY.get_or_init(StreamRegistry::from_config)
}

pub fn audit_recorder() -> &'static AuditRecorder {
  static AUDIT_RECORDER: OnceLock<AuditRecorder> = OnceLock::new();
  AUDIT_RECORDER.get_or_init(AuditRecorder::spawn)
}

pub fn auth_rate_limiter() -> &'static RateLimiter {
  static AUTH_RATE_LIMITER: OnceLock<Arc<RateLimiter>> =
    OnceLock::new();
  AUTH_RATE_LIMITER.get_or_init(|| {
    let config = core_config();
    if config.auth_rate_limit_disabled {
      warn!("Auth rate limiting is disabled")
    }
    RateLimiter::new(
      config.auth_rate_limit_disabled,
      config.auth_rate_limit_max_attempts as usize,
      config.auth_rate_limit_window_seconds,
    )
  })
}

pub fn permission_service() -> &'static dyn PermissionService {
  static SERVICE: OnceLock<Box<dyn PermissionService>> =
    OnceLock::new();
  SERVICE
    .get_or_init(|| {
      crate::permission::service_from_config(core_config())
    })
    .as_ref()
}

#[derive(Default, Clone, Debug)]
pub struct CachedHostStatus {
  pub id: String,
  pub status: HostStatus,
  /// Daemon version reported by the last successful probe.
  pub version: Option<String>,
  pub swarm_id: Option<String>,
  pub leader: bool,
  /// Store the error from reaching the daemon
  pub err: Option<String>,
}

pub type HostStatusCache =
  CloneCache<String, Arc<CachedHostStatus>>;

pub fn host_status_cache() -> &'static HostStatusCache {
  static HOST_STATUS_CACHE: OnceLock<HostStatusCache> =
    OnceLock::new();
  HOST_STATUS_CACHE.get_or_init(Default::default)
}

/// Host registry change feed. The connection manager subscribes
/// and invalidates pooled clients.
#[derive(Debug, Clone)]
pub enum HostChange {
  Updated(String),
  Removed(String),
}

pub fn host_events() -> &'static broadcast::Sender<HostChange> {
  static HOST_EVENTS: OnceLock<broadcast::Sender<HostChange>> =
    OnceLock::new();
  HOST_EVENTS.get_or_init(|| broadcast::channel(64).0)
}

/// task id (wizard id, pull id) => progress frame feed for
/// `/ws/tasks/{id}` subscribers.
pub type TaskProgressCache =
  CloneCache<String, broadcast::Sender<serde_json::Value>>;

pub fn task_progress() -> &'static TaskProgressCache {
  static TASK_PROGRESS: OnceLock<TaskProgressCache> =
    OnceLock::new();
  TASK_PROGRESS.get_or_init(Default::default)
}

/// Progress feed for one task id, created on first use.
pub async fn task_channel(
  task_id: &str,
) -> broadcast::Sender<serde_json::Value> {
  task_progress()
    .get_or_insert_with(&task_id.to_string(), || {
      broadcast::channel(64).0
    })
    .await
}
