use std::{collections::HashMap, sync::Arc};

use flotilla_client::entities::{
  error::ErrorCode,
  host::{Host, HostStatus},
};
use tokio::sync::RwLock;

use crate::{
  docker::DockerClient,
  error::{OpError, OpResult},
  state::{HostChange, host_events},
};

pub mod breaker;

use breaker::Breaker;

/// The (adapter + breaker) pair kept for one host.
pub struct PooledClient {
  pub host_id: String,
  pub client: DockerClient,
  pub breaker: Arc<Breaker>,
}

/// Owns every live Docker client, keyed by host id. The pool map
/// is guarded by one RwLock; `acquire` stays on the read path
/// unless a miss requires construction. Breakers survive pool
/// invalidation so reconnect storms cannot bypass an open breaker.
pub struct Connections {
  pool: RwLock<HashMap<String, Arc<PooledClient>>>,
  breakers: RwLock<HashMap<String, Arc<Breaker>>>,
}

impl Connections {
  pub fn new() -> Connections {
    Connections {
      pool: RwLock::new(HashMap::new()),
      breakers: RwLock::new(HashMap::new()),
    }
  }

  /// Listen for host registry changes and drop stale clients.
  pub fn spawn_invalidator(&'static self) {
    let mut events = host_events().subscribe();
    tokio::spawn(async move {
      loop {
        match events.recv().await {
          Ok(HostChange::Updated(host_id)) => {
            self.invalidate(&host_id).await;
          }
          Ok(HostChange::Removed(host_id)) => {
            self.close(&host_id).await;
          }
          Err(
            tokio::sync::broadcast::error::RecvError::Lagged(_),
          ) => {
            // Missed updates, flush everything to be safe.
            self.close_all().await;
          }
          Err(_) => break,
        }
      }
    });
  }

  async fn breaker_for(&self, host_id: &str) -> Arc<Breaker> {
    if let Some(breaker) = self.breakers.read().await.get(host_id) {
      return breaker.clone();
    }
    let mut breakers = self.breakers.write().await;
    breakers
      .entry(host_id.to_string())
      .or_insert_with(|| Arc::new(Breaker::from_config()))
      .clone()
  }

  /// Hand out a guarded client for the host, constructing one on
  /// a pool miss. Fails fast with `host.unavailable` while the
  /// host's breaker is open.
  pub async fn acquire(&self, host: &Host) -> OpResult<OpGuard> {
    if !host.is_active {
      return Err(OpError::msg(
        ErrorCode::HostInactive,
        format!("host {} is deactivated", host.name),
      ));
    }

    let breaker = self.breaker_for(&host.id).await;
    if !breaker.try_acquire() {
      return Err(OpError::msg(
        ErrorCode::HostUnavailable,
        format!(
          "host {} is unavailable, its circuit breaker is open",
          host.name
        ),
      ));
    }

    if let Some(pooled) = self.pool.read().await.get(&host.id) {
      return Ok(OpGuard::new(pooled.clone()));
    }

    // Double-checked under the write lock so at most one
    // PooledClient ever exists per host.
    let mut pool = self.pool.write().await;
    if let Some(pooled) = pool.get(&host.id) {
      return Ok(OpGuard::new(pooled.clone()));
    }
    let client = match DockerClient::connect(host).await {
      Ok(client) => client,
      Err(e) => {
        if breaker_relevant(e.code) {
          breaker.record_failure();
        } else {
          breaker.release_probe();
        }
        return Err(e);
      }
    };
    let pooled = Arc::new(PooledClient {
      host_id: host.id.clone(),
      client,
      breaker: breaker.clone(),
    });
    pool.insert(host.id.clone(), pooled.clone());
    Ok(OpGuard::new(pooled))
  }

  /// Force a rebuild on the next acquire.
  pub async fn invalidate(&self, host_id: &str) {
    self.pool.write().await.remove(host_id);
  }

  /// Full teardown including breaker state.
  pub async fn close(&self, host_id: &str) {
    self.pool.write().await.remove(host_id);
    self.breakers.write().await.remove(host_id);
  }

  pub async fn close_all(&self) {
    self.pool.write().await.clear();
    self.breakers.write().await.clear();
  }

  pub async fn force_reset_breaker(&self, host_id: &str) {
    self.breaker_for(host_id).await.force_reset();
  }

  /// Breaker-derived availability for status surfaces.
  pub async fn breaker_status(
    &self,
    host_id: &str,
  ) -> Option<breaker::BreakerState> {
    self
      .breakers
      .read()
      .await
      .get(host_id)
      .map(|breaker| breaker.state())
  }
}

/// One admitted guarded call. Consuming `run` reports the outcome
/// to the breaker; dropping unused just releases the half-open
/// probe slot.
pub struct OpGuard {
  pooled: Arc<PooledClient>,
  reported: bool,
}

impl OpGuard {
  fn new(pooled: Arc<PooledClient>) -> OpGuard {
    OpGuard {
      pooled,
      reported: false,
    }
  }

  pub fn host_id(&self) -> &str {
    &self.pooled.host_id
  }

  pub async fn run<T, F, Fut>(mut self, f: F) -> OpResult<T>
  where
    F: FnOnce(DockerClient) -> Fut,
    Fut: Future<Output = OpResult<T>>,
  {
    let res = f(self.pooled.client.clone()).await;
    self.reported = true;
    match &res {
      Ok(_) => self.pooled.breaker.record_success(),
      Err(e) if breaker_relevant(e.code) => {
        self.pooled.breaker.record_failure();
        // The transport is suspect, rebuild on next acquire.
        crate::state::connections()
          .invalidate(&self.pooled.host_id)
          .await;
      }
      // The daemon answered, just not the way the caller hoped.
      Err(_) => self.pooled.breaker.record_success(),
    }
    res
  }
}

impl Drop for OpGuard {
  fn drop(&mut self) {
    if !self.reported {
      self.pooled.breaker.release_probe();
    }
  }
}

/// Only transport-level failures trip the breaker.
fn breaker_relevant(code: ErrorCode) -> bool {
  matches!(
    code,
    ErrorCode::DockerConnection | ErrorCode::DockerTimeout
  )
}

/// Map breaker state onto the host status reported while the
/// daemon cannot be reached.
pub fn unavailable_status(state: breaker::BreakerState) -> HostStatus {
  match state {
    breaker::BreakerState::Open => HostStatus::Unreachable,
    _ => HostStatus::Unhealthy,
  }
}
