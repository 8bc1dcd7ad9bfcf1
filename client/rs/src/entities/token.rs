use serde::{Deserialize, Serialize};

/// Server side refresh token. The opaque token string itself is the
/// document id. Once `revoked` flips true it never validates again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
  #[serde(rename = "_id")]
  pub id: String,
  pub user_id: String,
  pub issued_at: i64,
  pub expires_at: i64,
  #[serde(default)]
  pub revoked: bool,
  /// Previous token in the rotation chain, if any.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
  pub access_token: String,
  pub refresh_token: String,
  pub token_type: String,
}

impl TokenPair {
  pub fn bearer(access_token: String, refresh_token: String) -> Self {
    TokenPair {
      access_token,
      refresh_token,
      token_type: String::from("bearer"),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshBody {
  pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutBody {
  pub refresh_token: String,
}
