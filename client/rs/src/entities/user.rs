use serde::{Deserialize, Serialize};
use strum::Display;

use super::MongoId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub username: String,
  /// bcrypt verifier. Cleared before the entity leaves the API.
  #[serde(default)]
  pub password_hash: String,
  #[serde(default)]
  pub role: UserRole,
  #[serde(default = "default_active")]
  pub active: bool,
  #[serde(default)]
  pub created_at: i64,
  #[serde(default)]
  pub updated_at: i64,
}

fn default_active() -> bool {
  true
}

impl User {
  /// Strip the password verifier before handing the entity
  /// to a caller.
  pub fn sanitize(&mut self) {
    self.password_hash.clear();
  }

  pub fn is_admin(&self) -> bool {
    self.role == UserRole::Admin
  }
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
  Hash,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
  #[default]
  Viewer,
  Operator,
  Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserBody {
  pub username: String,
  pub password: String,
  #[serde(default)]
  pub role: UserRole,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserBody {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub role: Option<UserRole>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn roles_are_ordered_by_privilege() {
    assert!(UserRole::Viewer < UserRole::Operator);
    assert!(UserRole::Operator < UserRole::Admin);
  }

  #[test]
  fn sanitize_clears_the_verifier() {
    let mut user = User {
      password_hash: String::from("$2b$12$abc"),
      ..Default::default()
    };
    user.sanitize();
    assert!(user.password_hash.is_empty());
  }
}
