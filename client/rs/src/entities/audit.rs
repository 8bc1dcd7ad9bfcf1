use serde::{Deserialize, Serialize};
use strum::Display;

use super::MongoId;

/// Append-only record of an operator action. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub user_id: String,
  #[serde(default)]
  pub username: String,
  /// Dotted action tag, eg `container.create`.
  pub action: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resource_kind: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resource_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub host_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub client_addr: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_agent: Option<String>,
  #[serde(default)]
  pub request_id: String,
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub details: serde_json::Value,
  pub outcome: AuditOutcome,
  pub timestamp: i64,
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
pub enum AuditOutcome {
  #[default]
  Success,
  Failure,
}

/// Query filters accepted by `GET /audit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub host_id: Option<String>,
  /// Action tag prefix, eg `container.`
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub action: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub limit: Option<i64>,
}
