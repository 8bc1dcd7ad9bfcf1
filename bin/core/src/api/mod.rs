use axum::{
  Router,
  http::{HeaderName, HeaderValue},
  routing::get,
};
use serde::Deserialize;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::cors_layer;

pub mod auth;
pub mod hosts;
pub mod users;
pub mod wizards;

mod audit;
mod configs;
mod containers;
mod dashboard;
mod images;
mod networks;
mod nodes;
mod secrets;
mod services;
mod swarms;
mod system;
mod volumes;

/// Target host selector shared by all per-host resource routes.
/// Falls back to the default host when absent.
#[derive(Debug, Clone, Deserialize)]
pub struct HostQuery {
  pub host_id: Option<String>,
}

pub fn app() -> Router {
  Router::new()
    .route("/version", get(|| async { env!("CARGO_PKG_VERSION") }))
    .nest("/api/v1", api_router())
    .nest("/ws", crate::ws::router())
    .layer(cors_layer())
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("x-content-type-options"),
      HeaderValue::from_static("nosniff"),
    ))
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("x-frame-options"),
      HeaderValue::from_static("DENY"),
    ))
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("referrer-policy"),
      HeaderValue::from_static("strict-origin-when-cross-origin"),
    ))
}

fn api_router() -> Router {
  Router::new()
    .nest("/auth", auth::router())
    .nest("/users", users::router())
    .nest("/hosts", hosts::router())
    .nest("/swarms", swarms::router())
    .nest("/containers", containers::router())
    .nest("/images", images::router())
    .nest("/volumes", volumes::router())
    .nest("/networks", networks::router())
    .nest("/services", services::router())
    .nest("/nodes", nodes::router())
    .nest("/secrets", secrets::router())
    .nest("/configs", configs::router())
    .nest("/system", system::router())
    .nest("/wizards", wizards::router())
    .route("/dashboard", get(dashboard::summary))
    .route("/audit", get(audit::list))
}
