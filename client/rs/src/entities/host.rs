use serde::{Deserialize, Serialize};
use strum::Display;

use super::MongoId;

/// A Docker daemon reachable through one of the three transports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub name: String,
  #[serde(default)]
  pub kind: HostKind,
  #[serde(default)]
  pub transport: HostTransport,
  /// Socket path, `tcp://host:port` or `ssh://user@host[:port]`.
  #[serde(default)]
  pub address: String,
  /// At most one host carries this flag, and it must be active.
  #[serde(default)]
  pub is_default: bool,
  #[serde(default = "default_active")]
  pub is_active: bool,
  #[serde(default)]
  pub status: HostStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_check: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub swarm_id: Option<String>,
  #[serde(default)]
  pub leader: bool,
  #[serde(default)]
  pub tags: Vec<String>,
  /// Skip server certificate verification on tcp transports.
  #[serde(default)]
  pub insecure_tls: bool,
  #[serde(default)]
  pub created_at: i64,
  #[serde(default)]
  pub updated_at: i64,
}

fn default_active() -> bool {
  true
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HostKind {
  #[default]
  Standalone,
  SwarmManager,
  SwarmWorker,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HostTransport {
  #[default]
  Local,
  Tcp,
  Ssh,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HostStatus {
  #[default]
  Pending,
  Healthy,
  Unhealthy,
  Unreachable,
  SetupPending,
}

/// Encrypted credential row. Plaintext only exists inside the
/// vault cipher call frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCredential {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub host_id: String,
  pub kind: CredentialKind,
  pub ciphertext: String,
  pub key_version: i32,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CredentialKind {
  TlsCert,
  TlsKey,
  TlsCa,
  SshPrivateKey,
  SshPassphrase,
  Password,
}

/// Grants one user elevated access to one host beyond their
/// global role's default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostPermission {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub user_id: String,
  pub host_id: String,
  pub level: PermissionLevel,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PermissionLevel {
  #[default]
  View,
  Operate,
  Admin,
}

/// Plaintext credential material accepted on host create / update,
/// encrypted into the vault before the request returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostCredentialsInput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tls_cert: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tls_key: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tls_ca: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ssh_private_key: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ssh_passphrase: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
}

impl HostCredentialsInput {
  pub fn is_empty(&self) -> bool {
    self.tls_cert.is_none()
      && self.tls_key.is_none()
      && self.tls_ca.is_none()
      && self.ssh_private_key.is_none()
      && self.ssh_passphrase.is_none()
      && self.password.is_none()
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateHostBody {
  pub name: String,
  #[serde(default)]
  pub transport: HostTransport,
  pub address: String,
  #[serde(default)]
  pub is_default: bool,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub insecure_tls: bool,
  #[serde(default)]
  pub credentials: HostCredentialsInput,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateHostBody {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_default: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tags: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub insecure_tls: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub credentials: Option<HostCredentialsInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetHostPermissionBody {
  pub user_id: String,
  pub level: PermissionLevel,
}

/// Result of an on-demand `POST /hosts/{id}/test` probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostTestReport {
  pub reachable: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn statuses_serialize_kebab_case() {
    assert_eq!(
      serde_json::to_string(&HostStatus::SetupPending).unwrap(),
      "\"setup-pending\""
    );
    assert_eq!(HostStatus::SetupPending.to_string(), "setup-pending");
  }

  #[test]
  fn permission_levels_are_ordered() {
    assert!(PermissionLevel::View < PermissionLevel::Operate);
    assert!(PermissionLevel::Operate < PermissionLevel::Admin);
  }
}
