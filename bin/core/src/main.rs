#[macro_use]
extern crate tracing;

use std::net::SocketAddr;

use anyhow::Context;

mod api;
mod audit;
mod auth;
mod config;
mod connection;
mod credentials;
mod docker;
mod error;
mod monitor;
mod operation;
mod permission;
mod resource;
mod startup;
mod state;
mod stream;
mod wizard;
mod ws;

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = config::core_config();
  logger::init(&config.logging)?;

  info!("Flotilla Core version: v{}", env!("CARGO_PKG_VERSION"));
  info!("permission mode: {}", config.permission_mode);
  info!("stream manager: {}", config.stream_manager);

  state::init_db_client().await;

  // Fail fast on bad auth / crypto configuration.
  state::jwt_client();
  state::credential_cipher();

  startup::on_startup().await;

  state::connections().spawn_invalidator();
  monitor::spawn_monitor_loop();
  audit::spawn_retention_loop();

  let socket_addr: SocketAddr = format!(
    "{}:{}",
    config.bind_ip, config.port
  )
  .parse()
  .context("failed to parse bind address")?;

  info!("Flotilla Core listening on {socket_addr}");

  let listener = tokio::net::TcpListener::bind(socket_addr)
    .await
    .context("failed to bind port")?;
  axum::serve(
    listener,
    api::app()
      .into_make_service_with_connect_info::<SocketAddr>(),
  )
  .await
  .context("server crashed")?;

  Ok(())
}

fn main() -> anyhow::Result<()> {
  let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .context("failed to build tokio runtime")?;
  runtime.block_on(app())
}
