use std::net::{IpAddr, SocketAddr};

use axum::{
  Form, Json, Router,
  extract::ConnectInfo,
  http::HeaderMap,
  routing::post,
};
use flotilla_client::entities::{
  NoData,
  token::{LogoutBody, RefreshBody, TokenPair},
};
use serde::Deserialize;

use crate::{
  auth::{local, local::AuthMeta, request_id_from_headers},
  error::OpResult,
};

pub fn router() -> Router {
  Router::new()
    .route("/login", post(login))
    .route("/refresh", post(refresh))
    .route("/logout", post(logout))
}

#[derive(Deserialize)]
struct LoginForm {
  username: String,
  password: String,
}

async fn login(
  headers: HeaderMap,
  ConnectInfo(addr): ConnectInfo<SocketAddr>,
  Form(form): Form<LoginForm>,
) -> OpResult<Json<TokenPair>> {
  let meta = auth_meta(&headers, addr);
  let request_id = meta.request_id.clone();
  local::login(form.username, form.password, meta)
    .await
    .map(Json)
    .map_err(|e| e.with_request_id(request_id))
}

async fn refresh(
  headers: HeaderMap,
  ConnectInfo(addr): ConnectInfo<SocketAddr>,
  Json(body): Json<RefreshBody>,
) -> OpResult<Json<TokenPair>> {
  let meta = auth_meta(&headers, addr);
  let request_id = meta.request_id.clone();
  local::refresh(body.refresh_token, meta)
    .await
    .map(Json)
    .map_err(|e| e.with_request_id(request_id))
}

async fn logout(
  headers: HeaderMap,
  ConnectInfo(addr): ConnectInfo<SocketAddr>,
  Json(body): Json<LogoutBody>,
) -> OpResult<Json<NoData>> {
  let meta = auth_meta(&headers, addr);
  let request_id = meta.request_id.clone();
  local::logout(body.refresh_token, meta)
    .await
    .map(|_| Json(NoData {}))
    .map_err(|e| e.with_request_id(request_id))
}

fn auth_meta(headers: &HeaderMap, addr: SocketAddr) -> AuthMeta {
  AuthMeta {
    request_id: request_id_from_headers(headers),
    client_ip: Some(client_ip(headers, addr)),
    client_addr: Some(addr.to_string()),
    user_agent: headers
      .get("user-agent")
      .and_then(|value| value.to_str().ok())
      .map(String::from),
  }
}

/// Rate limiting keys on the originating client, so prefer the
/// reverse proxy headers over the socket peer.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> IpAddr {
  if let Some(forwarded) = headers.get("x-forwarded-for")
    && let Ok(forwarded) = forwarded.to_str()
    && let Some(ip) = forwarded.split(',').next()
    && let Ok(ip) = ip.trim().parse()
  {
    return ip;
  }
  if let Some(real_ip) = headers.get("x-real-ip")
    && let Ok(real_ip) = real_ip.to_str()
    && let Ok(ip) = real_ip.trim().parse()
  {
    return ip;
  }
  addr.ip()
}
