use anyhow::Context;
use database::mungos::mongodb::bson::{
  Document, doc, oid::ObjectId,
};
use flotilla_client::entities::{
  flotilla_timestamp,
  host::{CreateHostBody, HostTransport},
  user::{User, UserRole},
};

use crate::{config::core_config, resource, state::db_client};

/// Run after the db client is up: seed the init admin and the
/// first host when configured, clean up interrupted wizards.
pub async fn on_startup() {
  tokio::join!(
    ensure_init_admin(),
    ensure_first_host(),
    fail_interrupted_wizards(),
  );
}

/// Create the configured admin user if no users exist yet.
async fn ensure_init_admin() {
  let config = core_config();
  let Some(username) = &config.init_admin_username else {
    return;
  };
  let db = db_client();
  let Ok(None) = db
    .users
    .find_one(Document::new())
    .await
    .inspect_err(|e| {
      error!(
        "Failed to initialize admin user | Failed to query db | {e:?}"
      )
    })
  else {
    return;
  };

  if config.init_admin_password.is_empty() {
    error!(
      "FLOTILLA_INIT_ADMIN_USERNAME is set without FLOTILLA_INIT_ADMIN_PASSWORD, skipping admin init"
    );
    return;
  }

  info!("Creating init admin user...");
  let init = async {
    validations::validate_username(username)?;
    validations::validate_password(&config.init_admin_password)?;
    let password_hash =
      database::hash_password(&config.init_admin_password)?;
    let now = flotilla_timestamp();
    let user = User {
      id: ObjectId::new().to_hex(),
      username: username.clone(),
      password_hash,
      role: UserRole::Admin,
      active: true,
      created_at: now,
      updated_at: now,
    };
    db.users
      .insert_one(&user)
      .await
      .context("failed to insert admin user")?;
    anyhow::Ok(())
  }
  .await;
  match init {
    Ok(()) => info!("Successfully created init admin user."),
    Err(e) => error!("Failed to create init admin user | {e:#}"),
  }
}

/// Ensure a first (default, local) host exists with the
/// configured address.
async fn ensure_first_host() {
  let config = core_config();
  if config.first_host_name.is_none()
    && config.first_host_address.is_none()
  {
    return;
  }
  let db = db_client();
  let Ok(None) = db
    .hosts
    .find_one(Document::new())
    .await
    .inspect_err(|e| {
      error!(
        "Failed to initialize first host | Failed to query db | {e:?}"
      )
    })
  else {
    return;
  };

  let name = config
    .first_host_name
    .clone()
    .unwrap_or_else(|| String::from("Local"));
  let address = config
    .first_host_address
    .clone()
    .unwrap_or_else(|| String::from("/var/run/docker.sock"));

  match resource::host::create(CreateHostBody {
    name,
    transport: HostTransport::Local,
    address,
    is_default: true,
    ..Default::default()
  })
  .await
  {
    Ok(host) => {
      info!("Created first host '{}' ({})", host.name, host.id)
    }
    Err(e) => error!("Failed to create first host | {e:#}"),
  }
}

/// Wizards cannot survive the process that was driving a commit.
/// Anything left in-progress with a commit underway stays
/// resumable; nothing to do beyond logging here, but interrupted
/// instances older than 30 days are failed out to keep the
/// collection tidy.
async fn fail_interrupted_wizards() {
  let cutoff =
    flotilla_timestamp() - 30 * 24 * 60 * 60 * 1_000;
  match db_client()
    .wizards
    .update_many(
      doc! {
        "status": "in-progress",
        "updated_at": { "$lt": cutoff },
      },
      doc! { "$set": {
        "status": "failed",
        "updated_at": flotilla_timestamp(),
      } },
    )
    .await
  {
    Ok(res) if res.modified_count > 0 => {
      info!(
        "marked {} stale wizard instances as failed",
        res.modified_count
      );
    }
    Ok(_) => {}
    Err(e) => {
      error!("failed to clean up stale wizard instances | {e:#}")
    }
  }
}
