//! # Flotilla client
//!
//! Typed client for the flotilla control plane, used by the CLI and
//! anything else speaking to the REST + websocket surface.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use flotilla_client::FlotillaClient;
//!
//! let (client, tokens) = FlotillaClient::login(
//!   "http://localhost:9120",
//!   "admin@localhost",
//!   "changeme123",
//! )
//! .await?;
//! let hosts = client.list_hosts().await?;
//! # Ok(()) }
//! ```

use anyhow::Context;
use serde::{Serialize, de::DeserializeOwned};

use crate::entities::{
  NoData,
  audit::{AuditEvent, AuditQuery},
  docker::*,
  error::{ApiError, ErrorEnvelope},
  host::*,
  token::{LogoutBody, RefreshBody, TokenPair},
  user::{CreateUserBody, UpdateUserBody, User},
  wizard::*,
};

pub mod entities;
pub mod ws;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
  #[error("{} | {}", error.code, error.message)]
  Api {
    status: u16,
    request_id: String,
    error: ApiError,
  },
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

impl ClientError {
  /// Whether the server rejected our credentials / token.
  pub fn is_auth(&self) -> bool {
    matches!(self, ClientError::Api { status, .. } if *status == 401)
  }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Clone)]
pub struct FlotillaClient {
  address: String,
  token: String,
  http: reqwest::Client,
}

impl FlotillaClient {
  pub fn new(
    address: impl Into<String>,
    access_token: impl Into<String>,
  ) -> FlotillaClient {
    FlotillaClient {
      address: address.into().trim_end_matches('/').to_string(),
      token: access_token.into(),
      http: Default::default(),
    }
  }

  /// Login with handle + password, returning an authenticated
  /// client alongside the token pair for storage.
  pub async fn login(
    address: impl Into<String>,
    username: &str,
    password: &str,
  ) -> Result<(FlotillaClient, TokenPair)> {
    let mut client = FlotillaClient::new(address, "");
    let res = client
      .http
      .post(client.url("/auth/login"))
      .form(&[("username", username), ("password", password)])
      .send()
      .await
      .context("failed to reach the flotilla server")?;
    let tokens: TokenPair = handle_response(res).await?;
    client.token = tokens.access_token.clone();
    Ok((client, tokens))
  }

  pub async fn refresh(
    &mut self,
    refresh_token: &str,
  ) -> Result<TokenPair> {
    let tokens: TokenPair = self
      .post(
        "/auth/refresh",
        &RefreshBody {
          refresh_token: refresh_token.to_string(),
        },
      )
      .await?;
    self.token = tokens.access_token.clone();
    Ok(tokens)
  }

  pub async fn logout(&self, refresh_token: &str) -> Result<NoData> {
    self
      .post(
        "/auth/logout",
        &LogoutBody {
          refresh_token: refresh_token.to_string(),
        },
      )
      .await
  }

  pub fn address(&self) -> &str {
    &self.address
  }

  pub fn access_token(&self) -> &str {
    &self.token
  }

  // ==========
  //   USERS
  // ==========

  pub async fn me(&self) -> Result<User> {
    self.get("/users/me", &[]).await
  }

  pub async fn list_users(&self) -> Result<Vec<User>> {
    self.get("/users", &[]).await
  }

  pub async fn create_user(
    &self,
    body: &CreateUserBody,
  ) -> Result<User> {
    self.post("/users", body).await
  }

  pub async fn update_user(
    &self,
    id: &str,
    body: &UpdateUserBody,
  ) -> Result<User> {
    self.put(&format!("/users/{id}"), body).await
  }

  pub async fn delete_user(&self, id: &str) -> Result<NoData> {
    self.delete(&format!("/users/{id}")).await
  }

  // ==========
  //   HOSTS
  // ==========

  pub async fn list_hosts(&self) -> Result<Vec<Host>> {
    self.get("/hosts", &[]).await
  }

  pub async fn get_host(&self, id: &str) -> Result<Host> {
    self.get(&format!("/hosts/{id}"), &[]).await
  }

  pub async fn create_host(
    &self,
    body: &CreateHostBody,
  ) -> Result<Host> {
    self.post("/hosts", body).await
  }

  pub async fn update_host(
    &self,
    id: &str,
    body: &UpdateHostBody,
  ) -> Result<Host> {
    self.put(&format!("/hosts/{id}"), body).await
  }

  pub async fn delete_host(&self, id: &str) -> Result<NoData> {
    self.delete(&format!("/hosts/{id}")).await
  }

  pub async fn test_host(&self, id: &str) -> Result<HostTestReport> {
    self.post(&format!("/hosts/{id}/test"), &NoData {}).await
  }

  pub async fn list_host_permissions(
    &self,
    id: &str,
  ) -> Result<Vec<HostPermission>> {
    self.get(&format!("/hosts/{id}/permissions"), &[]).await
  }

  pub async fn set_host_permission(
    &self,
    id: &str,
    body: &SetHostPermissionBody,
  ) -> Result<HostPermission> {
    self.post(&format!("/hosts/{id}/permissions"), body).await
  }

  // ==============
  //   CONTAINERS
  // ==============

  pub async fn list_containers(
    &self,
    host_id: Option<&str>,
  ) -> Result<Vec<ContainerListItem>> {
    self.get("/containers", &host_query(host_id)).await
  }

  pub async fn inspect_container(
    &self,
    id: &str,
    host_id: Option<&str>,
  ) -> Result<serde_json::Value> {
    self
      .get(&format!("/containers/{id}"), &host_query(host_id))
      .await
  }

  pub async fn create_container(
    &self,
    body: &CreateContainerBody,
    host_id: Option<&str>,
  ) -> Result<ContainerListItem> {
    self
      .post_query("/containers", body, &host_query(host_id))
      .await
  }

  pub async fn start_container(
    &self,
    id: &str,
    host_id: Option<&str>,
  ) -> Result<NoData> {
    self
      .post_query(
        &format!("/containers/{id}/start"),
        &NoData {},
        &host_query(host_id),
      )
      .await
  }

  pub async fn stop_container(
    &self,
    id: &str,
    host_id: Option<&str>,
  ) -> Result<NoData> {
    self
      .post_query(
        &format!("/containers/{id}/stop"),
        &NoData {},
        &host_query(host_id),
      )
      .await
  }

  pub async fn restart_container(
    &self,
    id: &str,
    host_id: Option<&str>,
  ) -> Result<NoData> {
    self
      .post_query(
        &format!("/containers/{id}/restart"),
        &NoData {},
        &host_query(host_id),
      )
      .await
  }

  pub async fn remove_container(
    &self,
    id: &str,
    host_id: Option<&str>,
  ) -> Result<NoData> {
    self
      .delete_query(
        &format!("/containers/{id}"),
        &host_query(host_id),
      )
      .await
  }

  // ==========
  //   IMAGES
  // ==========

  pub async fn list_images(
    &self,
    host_id: Option<&str>,
  ) -> Result<Vec<ImageListItem>> {
    self.get("/images", &host_query(host_id)).await
  }

  pub async fn pull_image(
    &self,
    image: &str,
    host_id: Option<&str>,
  ) -> Result<NoData> {
    self
      .post_query(
        "/images/pull",
        &PullImageBody {
          image: image.to_string(),
        },
        &host_query(host_id),
      )
      .await
  }

  pub async fn remove_image(
    &self,
    id: &str,
    host_id: Option<&str>,
    force: bool,
  ) -> Result<NoData> {
    let mut query = host_query(host_id);
    query.push(("force", force.to_string()));
    self
      .delete_query(&format!("/images/{id}"), &query)
      .await
  }

  // =======================
  //   VOLUMES / NETWORKS
  // =======================

  pub async fn list_volumes(
    &self,
    host_id: Option<&str>,
  ) -> Result<Vec<VolumeListItem>> {
    self.get("/volumes", &host_query(host_id)).await
  }

  pub async fn list_networks(
    &self,
    host_id: Option<&str>,
  ) -> Result<Vec<NetworkListItem>> {
    self.get("/networks", &host_query(host_id)).await
  }

  // ===================
  //   SWARM RESOURCES
  // ===================

  pub async fn list_services(
    &self,
    host_id: Option<&str>,
  ) -> Result<Vec<ServiceListItem>> {
    self.get("/services", &host_query(host_id)).await
  }

  pub async fn inspect_service(
    &self,
    id: &str,
    host_id: Option<&str>,
  ) -> Result<serde_json::Value> {
    self
      .get(&format!("/services/{id}"), &host_query(host_id))
      .await
  }

  pub async fn scale_service(
    &self,
    id: &str,
    replicas: u64,
    host_id: Option<&str>,
  ) -> Result<NoData> {
    self
      .post_query(
        &format!("/services/{id}/scale"),
        &ScaleServiceBody { replicas },
        &host_query(host_id),
      )
      .await
  }

  pub async fn list_nodes(
    &self,
    host_id: Option<&str>,
  ) -> Result<Vec<NodeListItem>> {
    self.get("/nodes", &host_query(host_id)).await
  }

  pub async fn list_secrets(
    &self,
    host_id: Option<&str>,
  ) -> Result<Vec<SecretListItem>> {
    self.get("/secrets", &host_query(host_id)).await
  }

  pub async fn list_configs(
    &self,
    host_id: Option<&str>,
  ) -> Result<Vec<ConfigListItem>> {
    self.get("/configs", &host_query(host_id)).await
  }

  pub async fn list_swarms(&self) -> Result<Vec<SwarmOverview>> {
    self.get("/swarms", &[]).await
  }

  pub async fn get_swarm(&self, id: &str) -> Result<SwarmOverview> {
    self.get(&format!("/swarms/{id}"), &[]).await
  }

  // ==========
  //   SYSTEM
  // ==========

  pub async fn system_info(
    &self,
    host_id: Option<&str>,
  ) -> Result<serde_json::Value> {
    self.get("/system/info", &host_query(host_id)).await
  }

  pub async fn system_version(
    &self,
    host_id: Option<&str>,
  ) -> Result<serde_json::Value> {
    self.get("/system/version", &host_query(host_id)).await
  }

  pub async fn system_df(
    &self,
    host_id: Option<&str>,
  ) -> Result<serde_json::Value> {
    self.get("/system/df", &host_query(host_id)).await
  }

  pub async fn system_prune(
    &self,
    target: PruneTarget,
    host_id: Option<&str>,
  ) -> Result<PruneReport> {
    self
      .post_query(
        "/system/prune",
        &PruneBody { target },
        &host_query(host_id),
      )
      .await
  }

  pub async fn dashboard(&self) -> Result<DashboardSummary> {
    self.get("/dashboard", &[]).await
  }

  pub async fn list_audit(
    &self,
    query: &AuditQuery,
  ) -> Result<Vec<AuditEvent>> {
    let mut params = Vec::new();
    if let Some(user_id) = &query.user_id {
      params.push(("user_id", user_id.clone()));
    }
    if let Some(host_id) = &query.host_id {
      params.push(("host_id", host_id.clone()));
    }
    if let Some(action) = &query.action {
      params.push(("action", action.clone()));
    }
    if let Some(limit) = query.limit {
      params.push(("limit", limit.to_string()));
    }
    self.get("/audit", &params).await
  }

  // ===========
  //   WIZARDS
  // ===========

  pub async fn start_wizard(
    &self,
    body: &StartWizardBody,
  ) -> Result<WizardInstance> {
    self.post("/wizards/start", body).await
  }

  pub async fn get_wizard(&self, id: &str) -> Result<WizardInstance> {
    self.get(&format!("/wizards/{id}"), &[]).await
  }

  pub async fn update_wizard_step(
    &self,
    id: &str,
    state: serde_json::Value,
  ) -> Result<WizardInstance> {
    self
      .put(
        &format!("/wizards/{id}/step"),
        &UpdateWizardStepBody { state },
      )
      .await
  }

  pub async fn wizard_next(&self, id: &str) -> Result<WizardInstance> {
    self.post(&format!("/wizards/{id}/next"), &NoData {}).await
  }

  pub async fn wizard_previous(
    &self,
    id: &str,
  ) -> Result<WizardInstance> {
    self
      .post(&format!("/wizards/{id}/previous"), &NoData {})
      .await
  }

  pub async fn wizard_test(
    &self,
    id: &str,
    test_kind: WizardTestKind,
  ) -> Result<WizardTestReport> {
    self
      .post(
        &format!("/wizards/{id}/test"),
        &TestWizardBody { test_kind },
      )
      .await
  }

  pub async fn wizard_complete(
    &self,
    id: &str,
  ) -> Result<WizardInstance> {
    self
      .post(&format!("/wizards/{id}/complete"), &NoData {})
      .await
  }

  pub async fn wizard_cancel(
    &self,
    id: &str,
  ) -> Result<WizardInstance> {
    self
      .post(&format!("/wizards/{id}/cancel"), &NoData {})
      .await
  }

  pub async fn generate_ssh_key(&self) -> Result<GeneratedSshKey> {
    self
      .post("/wizards/generate-ssh-key", &NoData {})
      .await
  }

  // ==============
  //   WEBSOCKETS
  // ==============

  pub async fn container_logs_socket(
    &self,
    container: &str,
    host_id: Option<&str>,
    follow: bool,
    tail: u64,
    timestamps: bool,
  ) -> Result<ws::WsConnection> {
    let mut path = format!(
      "/ws/containers/{container}/logs?token={}&follow={follow}&tail={tail}&timestamps={timestamps}",
      urlencoding::encode(&self.token),
    );
    if let Some(host_id) = host_id {
      path.push_str(&format!("&host_id={host_id}"));
    }
    let url = ws::ws_url(&self.address, &path)?;
    Ok(ws::connect(&url).await?)
  }

  pub async fn container_stats_socket(
    &self,
    container: &str,
    host_id: Option<&str>,
  ) -> Result<ws::WsConnection> {
    let mut path = format!(
      "/ws/containers/{container}/stats?token={}",
      urlencoding::encode(&self.token),
    );
    if let Some(host_id) = host_id {
      path.push_str(&format!("&host_id={host_id}"));
    }
    let url = ws::ws_url(&self.address, &path)?;
    Ok(ws::connect(&url).await?)
  }

  pub async fn container_exec_socket(
    &self,
    container: &str,
    host_id: Option<&str>,
    cmd: &str,
    workdir: Option<&str>,
  ) -> Result<ws::WsConnection> {
    let mut path = format!(
      "/ws/containers/{container}/exec?token={}&cmd={}",
      urlencoding::encode(&self.token),
      urlencoding::encode(cmd),
    );
    if let Some(workdir) = workdir {
      path
        .push_str(&format!("&workdir={}", urlencoding::encode(workdir)));
    }
    if let Some(host_id) = host_id {
      path.push_str(&format!("&host_id={host_id}"));
    }
    let url = ws::ws_url(&self.address, &path)?;
    Ok(ws::connect(&url).await?)
  }

  pub async fn events_socket(
    &self,
    host_id: Option<&str>,
  ) -> Result<ws::WsConnection> {
    let mut path = format!(
      "/ws/events?token={}",
      urlencoding::encode(&self.token),
    );
    if let Some(host_id) = host_id {
      path.push_str(&format!("&host_id={host_id}"));
    }
    let url = ws::ws_url(&self.address, &path)?;
    Ok(ws::connect(&url).await?)
  }

  // ===========
  //   HELPERS
  // ===========

  fn url(&self, path: &str) -> String {
    format!("{}/api/v1{path}", self.address)
  }

  async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T> {
    let res = self
      .http
      .get(self.url(path))
      .bearer_auth(&self.token)
      .query(query)
      .send()
      .await
      .context("failed to reach the flotilla server")?;
    handle_response(res).await
  }

  async fn post<T: DeserializeOwned, B: Serialize>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T> {
    self.post_query(path, body, &[]).await
  }

  async fn post_query<T: DeserializeOwned, B: Serialize>(
    &self,
    path: &str,
    body: &B,
    query: &[(&str, String)],
  ) -> Result<T> {
    let res = self
      .http
      .post(self.url(path))
      .bearer_auth(&self.token)
      .query(query)
      .json(body)
      .send()
      .await
      .context("failed to reach the flotilla server")?;
    handle_response(res).await
  }

  async fn put<T: DeserializeOwned, B: Serialize>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T> {
    let res = self
      .http
      .put(self.url(path))
      .bearer_auth(&self.token)
      .json(body)
      .send()
      .await
      .context("failed to reach the flotilla server")?;
    handle_response(res).await
  }

  async fn delete<T: DeserializeOwned>(
    &self,
    path: &str,
  ) -> Result<T> {
    self.delete_query(path, &[]).await
  }

  async fn delete_query<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T> {
    let res = self
      .http
      .delete(self.url(path))
      .bearer_auth(&self.token)
      .query(query)
      .send()
      .await
      .context("failed to reach the flotilla server")?;
    handle_response(res).await
  }
}

fn host_query(host_id: Option<&str>) -> Vec<(&'static str, String)> {
  match host_id {
    Some(host_id) => vec![("host_id", host_id.to_string())],
    None => Vec::new(),
  }
}

async fn handle_response<T: DeserializeOwned>(
  res: reqwest::Response,
) -> Result<T> {
  let status = res.status();
  if status.is_success() {
    let body = res
      .bytes()
      .await
      .context("failed to read response body")?;
    return serde_json::from_slice(&body)
      .with_context(|| {
        format!(
          "failed to parse response body | {}",
          String::from_utf8_lossy(&body)
        )
      })
      .map_err(Into::into);
  }
  let body = res
    .bytes()
    .await
    .context("failed to read error response body")?;
  let envelope: ErrorEnvelope = serde_json::from_slice(&body)
    .with_context(|| {
      format!(
        "server returned {status} with unparseable body | {}",
        String::from_utf8_lossy(&body)
      )
    })?;
  Err(ClientError::Api {
    status: status.as_u16(),
    request_id: envelope.request_id,
    error: envelope.error,
  })
}
