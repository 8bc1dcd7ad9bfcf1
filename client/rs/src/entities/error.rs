use serde::{Deserialize, Serialize, de};

/// The closed set of error kinds crossing the API boundary.
/// The dotted codes are stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
  InvalidCredentials,
  TokenExpired,
  TokenInvalid,
  Revoked,
  RateLimited,
  InsufficientRole,
  HostDenied,
  ValidationInvalid,
  MissingField,
  NotFound,
  Conflict,
  HostNotFound,
  HostInactive,
  HostUnavailable,
  CredentialUnavailable,
  DockerConnection,
  DockerOperation,
  DockerTimeout,
  SlowConsumer,
  ClosedByOrigin,
  WizardInvalidStep,
  WizardProbeFailed,
  WizardCommitFailed,
  Unexpected,
}

impl ErrorCode {
  pub fn as_str(self) -> &'static str {
    match self {
      ErrorCode::InvalidCredentials => "auth.invalid_credentials",
      ErrorCode::TokenExpired => "auth.token_expired",
      ErrorCode::TokenInvalid => "auth.token_invalid",
      ErrorCode::Revoked => "auth.revoked",
      ErrorCode::RateLimited => "auth.rate_limited",
      ErrorCode::InsufficientRole => "authz.insufficient_role",
      ErrorCode::HostDenied => "authz.host_denied",
      ErrorCode::ValidationInvalid => "validation.invalid",
      ErrorCode::MissingField => "validation.missing_field",
      ErrorCode::NotFound => "resource.not_found",
      ErrorCode::Conflict => "resource.conflict",
      ErrorCode::HostNotFound => "host.not_found",
      ErrorCode::HostInactive => "host.inactive",
      ErrorCode::HostUnavailable => "host.unavailable",
      ErrorCode::CredentialUnavailable => {
        "host.credential_unavailable"
      }
      ErrorCode::DockerConnection => "docker.connection",
      ErrorCode::DockerOperation => "docker.operation",
      ErrorCode::DockerTimeout => "docker.timeout",
      ErrorCode::SlowConsumer => "stream.slow_consumer",
      ErrorCode::ClosedByOrigin => "stream.closed_by_origin",
      ErrorCode::WizardInvalidStep => "wizard.invalid_step",
      ErrorCode::WizardProbeFailed => "wizard.probe_failed",
      ErrorCode::WizardCommitFailed => "wizard.commit_failed",
      ErrorCode::Unexpected => "internal.unexpected",
    }
  }

  pub fn from_str(code: &str) -> Option<ErrorCode> {
    let code = match code {
      "auth.invalid_credentials" => ErrorCode::InvalidCredentials,
      "auth.token_expired" => ErrorCode::TokenExpired,
      "auth.token_invalid" => ErrorCode::TokenInvalid,
      "auth.revoked" => ErrorCode::Revoked,
      "auth.rate_limited" => ErrorCode::RateLimited,
      "authz.insufficient_role" => ErrorCode::InsufficientRole,
      "authz.host_denied" => ErrorCode::HostDenied,
      "validation.invalid" => ErrorCode::ValidationInvalid,
      "validation.missing_field" => ErrorCode::MissingField,
      "resource.not_found" => ErrorCode::NotFound,
      "resource.conflict" => ErrorCode::Conflict,
      "host.not_found" => ErrorCode::HostNotFound,
      "host.inactive" => ErrorCode::HostInactive,
      "host.unavailable" => ErrorCode::HostUnavailable,
      "host.credential_unavailable" => {
        ErrorCode::CredentialUnavailable
      }
      "docker.connection" => ErrorCode::DockerConnection,
      "docker.operation" => ErrorCode::DockerOperation,
      "docker.timeout" => ErrorCode::DockerTimeout,
      "stream.slow_consumer" => ErrorCode::SlowConsumer,
      "stream.closed_by_origin" => ErrorCode::ClosedByOrigin,
      "wizard.invalid_step" => ErrorCode::WizardInvalidStep,
      "wizard.probe_failed" => ErrorCode::WizardProbeFailed,
      "wizard.commit_failed" => ErrorCode::WizardCommitFailed,
      "internal.unexpected" => ErrorCode::Unexpected,
      _ => return None,
    };
    Some(code)
  }

  pub fn http_status(self) -> u16 {
    match self {
      ErrorCode::InvalidCredentials
      | ErrorCode::TokenExpired
      | ErrorCode::TokenInvalid
      | ErrorCode::Revoked => 401,
      ErrorCode::RateLimited => 429,
      ErrorCode::InsufficientRole | ErrorCode::HostDenied => 403,
      ErrorCode::ValidationInvalid | ErrorCode::MissingField => 400,
      ErrorCode::NotFound | ErrorCode::HostNotFound => 404,
      ErrorCode::Conflict | ErrorCode::WizardInvalidStep => 409,
      ErrorCode::HostInactive
      | ErrorCode::HostUnavailable
      | ErrorCode::CredentialUnavailable => 503,
      ErrorCode::DockerConnection | ErrorCode::DockerOperation => {
        502
      }
      ErrorCode::DockerTimeout => 504,
      ErrorCode::SlowConsumer | ErrorCode::ClosedByOrigin => 500,
      ErrorCode::WizardProbeFailed
      | ErrorCode::WizardCommitFailed => 422,
      ErrorCode::Unexpected => 500,
    }
  }

  /// Close code used when the kind terminates a websocket.
  pub fn ws_close_code(self) -> u16 {
    match self {
      ErrorCode::SlowConsumer => 4408,
      ErrorCode::InvalidCredentials
      | ErrorCode::TokenExpired
      | ErrorCode::TokenInvalid
      | ErrorCode::Revoked => 4401,
      ErrorCode::ClosedByOrigin => 1011,
      _ => 1011,
    }
  }
}

impl std::fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Serialize for ErrorCode {
  fn serialize<S: serde::Serializer>(
    &self,
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for ErrorCode {
  fn deserialize<D: serde::Deserializer<'de>>(
    deserializer: D,
  ) -> Result<ErrorCode, D::Error> {
    let code = String::deserialize(deserializer)?;
    ErrorCode::from_str(&code).ok_or_else(|| {
      de::Error::custom(format!("unknown error code '{code}'"))
    })
  }
}

/// The `error` member of the response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
  pub code: ErrorCode,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
  pub error: ApiError,
  pub status: String,
  pub request_id: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn codes_round_trip_through_strings() {
    for code in [
      ErrorCode::InvalidCredentials,
      ErrorCode::Revoked,
      ErrorCode::HostUnavailable,
      ErrorCode::DockerTimeout,
      ErrorCode::SlowConsumer,
      ErrorCode::WizardCommitFailed,
      ErrorCode::Unexpected,
    ] {
      assert_eq!(ErrorCode::from_str(code.as_str()), Some(code));
    }
    assert_eq!(ErrorCode::from_str("bogus.code"), None);
  }

  #[test]
  fn status_mapping_follows_the_contract() {
    assert_eq!(ErrorCode::InvalidCredentials.http_status(), 401);
    assert_eq!(ErrorCode::Revoked.http_status(), 401);
    assert_eq!(ErrorCode::HostDenied.http_status(), 403);
    assert_eq!(ErrorCode::MissingField.http_status(), 400);
    assert_eq!(ErrorCode::NotFound.http_status(), 404);
    assert_eq!(ErrorCode::Conflict.http_status(), 409);
    assert_eq!(ErrorCode::HostUnavailable.http_status(), 503);
    assert_eq!(ErrorCode::DockerConnection.http_status(), 502);
    assert_eq!(ErrorCode::DockerTimeout.http_status(), 504);
    assert_eq!(ErrorCode::WizardInvalidStep.http_status(), 409);
    assert_eq!(ErrorCode::WizardProbeFailed.http_status(), 422);
  }

  #[test]
  fn envelope_serializes_with_dotted_code() {
    let envelope = ErrorEnvelope {
      error: ApiError {
        code: ErrorCode::HostUnavailable,
        message: String::from("breaker open"),
        details: None,
        field: None,
      },
      status: String::from("error"),
      request_id: String::from("req-1"),
    };
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["error"]["code"], "host.unavailable");
    assert_eq!(json["status"], "error");
    assert!(json["error"].get("details").is_none());
  }
}
