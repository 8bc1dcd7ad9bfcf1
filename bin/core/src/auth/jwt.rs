use anyhow::Context;
use flotilla_client::entities::{random_string, user::UserRole};
use jsonwebtoken::{
  DecodingKey, EncodingKey, Header, Validation, decode, encode,
  errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{
  config::CoreConfig,
  error::{OpError, OpResult},
};
use flotilla_client::entities::error::ErrorCode;

#[derive(Serialize, Deserialize, Clone)]
pub struct JwtClaims {
  /// User id
  pub sub: String,
  pub role: UserRole,
  /// Unix seconds
  pub iat: u64,
  pub exp: u64,
}

pub struct JwtClient {
  header: Header,
  validation: Validation,
  encoding_key: EncodingKey,
  decoding_key: DecodingKey,
  ttl_seconds: u64,
}

impl JwtClient {
  pub fn new(config: &CoreConfig) -> anyhow::Result<JwtClient> {
    let secret = if config.jwt_secret.is_empty() {
      warn!(
        "FLOTILLA_JWT_SECRET is not set | using a random secret, all access tokens are invalidated on restart"
      );
      random_string(40)
    } else {
      config.jwt_secret.clone()
    };
    Ok(JwtClient {
      header: Header::default(),
      validation: Validation::new(Default::default()),
      encoding_key: EncodingKey::from_secret(secret.as_bytes()),
      decoding_key: DecodingKey::from_secret(secret.as_bytes()),
      ttl_seconds: config
        .access_token_ttl_minutes
        .checked_mul(60)
        .context("access token ttl overflows")?,
    })
  }

  pub fn encode(
    &self,
    user_id: &str,
    role: UserRole,
  ) -> anyhow::Result<String> {
    let iat = unix_seconds();
    let claims = JwtClaims {
      sub: user_id.to_string(),
      role,
      iat,
      exp: iat + self.ttl_seconds,
    };
    encode(&self.header, &claims, &self.encoding_key)
      .context("Failed at signing claims")
  }

  pub fn decode(&self, jwt: &str) -> OpResult<JwtClaims> {
    decode::<JwtClaims>(jwt, &self.decoding_key, &self.validation)
      .map(|res| res.claims)
      .map_err(|e| {
        let code = match e.kind() {
          ErrorKind::ExpiredSignature => ErrorCode::TokenExpired,
          _ => ErrorCode::TokenInvalid,
        };
        OpError::new(code, e)
      })
  }
}

fn unix_seconds() -> u64 {
  (async_timing_util::unix_timestamp_ms() / 1000) as u64
}

#[cfg(test)]
mod tests {
  use super::*;

  fn test_client() -> JwtClient {
    let config = CoreConfig {
      jwt_secret: String::from("test-secret-test-secret"),
      ..test_config()
    };
    JwtClient::new(&config).unwrap()
  }

  fn test_config() -> CoreConfig {
    // Only the jwt fields matter here.
    crate::config::CoreConfig {
      port: 0,
      bind_ip: String::new(),
      database: Default::default(),
      jwt_secret: String::new(),
      access_token_ttl_minutes: 30,
      refresh_token_ttl_days: 7,
      vault_key: String::new(),
      probe_interval_seconds: 30,
      probe_timeout_seconds: 5,
      docker_timeout_seconds: 30,
      ssh_dial_timeout_seconds: 15,
      wizard_probe_timeout_seconds: 20,
      breaker_failure_threshold: 5,
      breaker_cooldown_seconds: 30,
      auth_rate_limit_disabled: true,
      auth_rate_limit_max_attempts: 10,
      auth_rate_limit_window_seconds: 300,
      cors_allowed_origins: Default::default(),
      log_ring_capacity: 1000,
      subscriber_queue_capacity: 256,
      stream_linger_seconds: 5,
      ws_heartbeat_seconds: 30,
      ws_pong_timeout_seconds: 10,
      audit_retention_days: 0,
      audit_queue_capacity: 1024,
      permission_mode: Default::default(),
      stream_manager: Default::default(),
      self_monitor: crate::config::SelfMonitorConfig {
        disabled: false,
        label: String::from("io.flotilla.self"),
        name_pattern: String::from("flotilla*"),
        line_marker: String::from("flotilla_core"),
      },
      init_admin_username: None,
      init_admin_password: String::new(),
      first_host_name: None,
      first_host_address: None,
      logging: Default::default(),
    }
  }

  #[test]
  fn encode_decode_round_trip() {
    let client = test_client();
    let jwt = client.encode("u1", UserRole::Operator).unwrap();
    let claims = client.decode(&jwt).unwrap();
    assert_eq!(claims.sub, "u1");
    assert_eq!(claims.role, UserRole::Operator);
    assert_eq!(claims.exp - claims.iat, 30 * 60);
  }

  #[test]
  fn garbage_token_is_invalid() {
    let client = test_client();
    let err = client.decode("not.a.jwt").unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenInvalid);
  }

  #[test]
  fn foreign_signature_is_invalid() {
    let client = test_client();
    let other = JwtClient::new(&CoreConfig {
      jwt_secret: String::from("other-secret-other-secret"),
      ..test_config()
    })
    .unwrap();
    let jwt = other.encode("u1", UserRole::Viewer).unwrap();
    let err = client.decode(&jwt).unwrap_err();
    assert_eq!(err.code, ErrorCode::TokenInvalid);
  }
}
