use axum::{
  Json,
  http::{HeaderName, HeaderValue, StatusCode},
  response::{IntoResponse, Response},
};
use flotilla_client::entities::error::{
  ApiError, ErrorCode, ErrorEnvelope,
};
use uuid::Uuid;

pub type OpResult<T> = Result<T, OpError>;

/// Error crossing an operation boundary. Carries one of the stable
/// error kinds plus the internal cause chain for the logs.
#[derive(Debug)]
pub struct OpError {
  pub code: ErrorCode,
  pub source: anyhow::Error,
  pub field: Option<String>,
  pub request_id: Option<String>,
}

impl OpError {
  pub fn new(
    code: ErrorCode,
    source: impl Into<anyhow::Error>,
  ) -> OpError {
    OpError {
      code,
      source: source.into(),
      field: None,
      request_id: None,
    }
  }

  pub fn msg(code: ErrorCode, message: impl Into<String>) -> OpError {
    OpError::new(code, anyhow::Error::msg(message.into()))
  }

  pub fn field(mut self, field: impl Into<String>) -> OpError {
    self.field = Some(field.into());
    self
  }

  pub fn with_request_id(
    mut self,
    request_id: impl Into<String>,
  ) -> OpError {
    self.request_id = Some(request_id.into());
    self
  }

  /// Full `{:#}`-style message from the cause chain.
  pub fn message(&self) -> String {
    format!("{:#}", self.source)
  }
}

impl std::fmt::Display for OpError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} | {:#}", self.code, self.source)
  }
}

impl std::error::Error for OpError {}

impl From<anyhow::Error> for OpError {
  fn from(source: anyhow::Error) -> OpError {
    OpError::new(ErrorCode::Unexpected, source)
  }
}

/// Attach an error kind to any fallible expression.
pub trait WithCode<T> {
  fn code(self, code: ErrorCode) -> OpResult<T>;
}

impl<T, E: Into<anyhow::Error>> WithCode<T> for Result<T, E> {
  fn code(self, code: ErrorCode) -> OpResult<T> {
    self.map_err(|e| OpError::new(code, e))
  }
}

impl IntoResponse for OpError {
  fn into_response(self) -> Response {
    let request_id = self
      .request_id
      .unwrap_or_else(|| Uuid::new_v4().to_string());
    if self.code == ErrorCode::Unexpected {
      error!("{request_id} | {:#}", self.source);
    } else {
      debug!("{request_id} | {} | {:#}", self.code, self.source);
    }
    let status = StatusCode::from_u16(self.code.http_status())
      .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let envelope = ErrorEnvelope {
      error: ApiError {
        code: self.code,
        message: format!("{:#}", self.source),
        details: None,
        field: self.field,
      },
      status: String::from("error"),
      request_id: request_id.clone(),
    };
    let mut response = (status, Json(envelope)).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
      response
        .headers_mut()
        .insert(HeaderName::from_static("x-request-id"), value);
    }
    response
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn anyhow_defaults_to_unexpected() {
    let err: OpError = anyhow::anyhow!("boom").into();
    assert_eq!(err.code, ErrorCode::Unexpected);
  }

  #[test]
  fn with_code_rewrites_kind() {
    let res: OpResult<()> =
      Err(anyhow::anyhow!("no such host")).code(ErrorCode::HostNotFound);
    assert_eq!(res.unwrap_err().code, ErrorCode::HostNotFound);
  }
}
