use serde::{Deserialize, Serialize};
use strum::Display;

use super::MongoId;

/// A resumable server-side state machine provisioning a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardInstance {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub user_id: String,
  pub kind: WizardKind,
  /// Current step index, always within `[0, total_steps - 1]`.
  pub step: u32,
  pub total_steps: u32,
  pub status: WizardStatus,
  /// Opaque step state. Updated by whole-blob replacement so readers
  /// never observe a partial merge.
  #[serde(default)]
  pub state: serde_json::Value,
  /// Populated on commit with the created resource id.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resource_id: Option<String>,
  #[serde(default)]
  pub created_at: i64,
  #[serde(default)]
  pub updated_at: i64,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WizardKind {
  SshHostSetup,
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
pub enum WizardStatus {
  #[default]
  InProgress,
  Completed,
  Cancelled,
  Failed,
}

impl WizardStatus {
  pub fn is_terminal(self) -> bool {
    !matches!(self, WizardStatus::InProgress)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWizardBody {
  pub wizard_type: WizardKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub initial: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateWizardStepBody {
  /// Full replacement state blob.
  pub state: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestWizardBody {
  pub test_kind: WizardTestKind,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WizardTestKind {
  Ssh,
  Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardTestReport {
  pub test_kind: WizardTestKind,
  pub passed: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

/// Typed view over the ssh-host-setup state blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshSetupState {
  /// `ssh://user@host[:port]`
  #[serde(default)]
  pub host_url: String,
  #[serde(default)]
  pub host_name: String,
  #[serde(default)]
  pub is_default: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub auth_method: Option<SshAuthMethod>,
  /// OpenSSH private key, generated or uploaded.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub private_key: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub passphrase: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
  /// Public line of the generated key, for the operator to install.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_key: Option<String>,
  #[serde(default)]
  pub ssh_probe_passed: bool,
  #[serde(default)]
  pub docker_probe_passed: bool,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SshAuthMethod {
  NewKey,
  ExistingKey,
  Password,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSshKey {
  /// OpenSSH-encoded ed25519 private key. Never persisted.
  pub private_key: String,
  pub public_key: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wizard_kind_uses_snake_case() {
    assert_eq!(
      serde_json::to_string(&WizardKind::SshHostSetup).unwrap(),
      "\"ssh_host_setup\""
    );
  }

  #[test]
  fn terminal_statuses() {
    assert!(!WizardStatus::InProgress.is_terminal());
    assert!(WizardStatus::Completed.is_terminal());
    assert!(WizardStatus::Cancelled.is_terminal());
    assert!(WizardStatus::Failed.is_terminal());
  }

  #[test]
  fn ssh_state_round_trips_through_blob() {
    let state = SshSetupState {
      host_url: String::from("ssh://ops@build-host"),
      auth_method: Some(SshAuthMethod::NewKey),
      ..Default::default()
    };
    let blob = serde_json::to_value(&state).unwrap();
    let parsed: SshSetupState =
      serde_json::from_value(blob).unwrap();
    assert_eq!(parsed.host_url, "ssh://ops@build-host");
    assert_eq!(parsed.auth_method, Some(SshAuthMethod::NewKey));
  }
}
