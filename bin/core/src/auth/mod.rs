use axum::{
  extract::{ConnectInfo, FromRequestParts},
  http::{HeaderMap, request::Parts},
};
use database::mungos::mongodb::bson::doc;
use flotilla_client::entities::{error::ErrorCode, user::User};
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

use crate::{
  error::{OpError, OpResult, WithCode},
  state::{db_client, jwt_client},
};

pub mod jwt;
pub mod local;

/// Authenticated request context, extracted on every protected
/// route. Carries the request id that ties the response envelope
/// and the audit trail together.
#[derive(Debug, Clone)]
pub struct OpContext {
  pub user: User,
  pub request_id: String,
  pub client_addr: Option<String>,
  pub client_ip: Option<IpAddr>,
  pub user_agent: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for OpContext {
  type Rejection = OpError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    let request_id = request_id_from_headers(&parts.headers);
    let token =
      extract_token(&parts.headers, parts.uri.query()).ok_or_else(
        || {
          OpError::msg(
            ErrorCode::TokenInvalid,
            "no bearer token in Authorization header or token query parameter",
          )
          .with_request_id(&request_id)
        },
      )?;
    let user = authenticate_token(&token)
      .await
      .map_err(|e| e.with_request_id(&request_id))?;
    let client_addr = parts
      .extensions
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| addr.to_string());
    let client_ip = parts
      .extensions
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| addr.ip());
    let user_agent = parts
      .headers
      .get("user-agent")
      .and_then(|value| value.to_str().ok())
      .map(String::from);
    Ok(OpContext {
      user,
      request_id,
      client_addr,
      client_ip,
      user_agent,
    })
  }
}

pub fn request_id_from_headers(headers: &HeaderMap) -> String {
  headers
    .get("x-request-id")
    .and_then(|value| value.to_str().ok())
    .map(String::from)
    .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Bearer token from the Authorization header, falling back to the
/// `token` query parameter used by the websocket surface.
fn extract_token(
  headers: &HeaderMap,
  query: Option<&str>,
) -> Option<String> {
  if let Some(auth) = headers.get("authorization")
    && let Ok(auth) = auth.to_str()
    && let Some(token) = auth.strip_prefix("Bearer ")
  {
    return Some(token.to_string());
  }
  let query = query?;
  url::form_urlencoded::parse(query.as_bytes())
    .find(|(key, _)| key == "token")
    .map(|(_, value)| value.into_owned())
}

/// Verify an access token and load its user.
pub async fn authenticate_token(token: &str) -> OpResult<User> {
  let claims = jwt_client().decode(token)?;
  let user = get_user(&claims.sub).await.map_err(|e| {
    OpError::new(ErrorCode::TokenInvalid, e.source)
  })?;
  if !user.active {
    return Err(OpError::msg(
      ErrorCode::Revoked,
      "user is deactivated",
    ));
  }
  Ok(user)
}

pub async fn get_user(user_id: &str) -> OpResult<User> {
  db_client()
    .users
    .find_one(doc! { "_id": user_id })
    .await
    .code(ErrorCode::Unexpected)?
    .ok_or_else(|| {
      OpError::msg(
        ErrorCode::NotFound,
        format!("no user with id {user_id}"),
      )
    })
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::HeaderValue;

  #[test]
  fn token_from_bearer_header() {
    let mut headers = HeaderMap::new();
    headers.insert(
      "authorization",
      HeaderValue::from_static("Bearer abc123"),
    );
    assert_eq!(
      extract_token(&headers, None),
      Some(String::from("abc123"))
    );
  }

  #[test]
  fn token_from_query_param() {
    let headers = HeaderMap::new();
    assert_eq!(
      extract_token(&headers, Some("follow=true&token=abc%2F1")),
      Some(String::from("abc/1"))
    );
    assert_eq!(extract_token(&headers, Some("follow=true")), None);
    assert_eq!(extract_token(&headers, None), None);
  }

  #[test]
  fn header_takes_precedence() {
    let mut headers = HeaderMap::new();
    headers.insert(
      "authorization",
      HeaderValue::from_static("Bearer from-header"),
    );
    assert_eq!(
      extract_token(&headers, Some("token=from-query")),
      Some(String::from("from-header"))
    );
  }
}
