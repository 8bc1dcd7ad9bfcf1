//! Host registry: durable directory of Docker hosts and their
//! encrypted credentials.

use anyhow::Context;
use database::mungos::{
  find::find_collect,
  mongodb::bson::{Bson, doc, oid::ObjectId},
};
use flotilla_client::entities::{
  error::ErrorCode,
  flotilla_timestamp,
  host::{
    CreateHostBody, CredentialKind, Host, HostCredentialsInput,
    HostStatus, HostTransport, UpdateHostBody,
  },
};

use crate::{
  credentials,
  error::{OpError, OpResult, WithCode},
  state::{HostChange, db_client, host_events},
};

/// Look a host up by id, falling back to its display name.
pub async fn get(id_or_name: &str) -> OpResult<Host> {
  let hosts = &db_client().hosts;
  let host = hosts
    .find_one(doc! { "_id": id_or_name })
    .await
    .context("failed to query hosts")?;
  if let Some(host) = host {
    return Ok(host);
  }
  hosts
    .find_one(doc! { "name": id_or_name })
    .await
    .context("failed to query hosts")?
    .ok_or_else(|| {
      OpError::msg(
        ErrorCode::HostNotFound,
        format!("no host matching '{id_or_name}'"),
      )
    })
}

pub async fn default_host() -> OpResult<Host> {
  db_client()
    .hosts
    .find_one(doc! { "is_default": true })
    .await
    .context("failed to query hosts")?
    .ok_or_else(|| {
      OpError::msg(
        ErrorCode::HostNotFound,
        "no host_id given and no default host is configured",
      )
    })
}

/// Resolve the target host for a request: explicit `host_id`
/// query parameter, otherwise the default host.
pub async fn resolve(host_id: Option<&str>) -> OpResult<Host> {
  match host_id {
    Some(host_id) => get(host_id).await,
    None => default_host().await,
  }
}

pub async fn list() -> OpResult<Vec<Host>> {
  find_collect(&db_client().hosts, None, None)
    .await
    .context("failed to list hosts")
    .map_err(Into::into)
}

pub async fn list_active() -> OpResult<Vec<Host>> {
  find_collect(&db_client().hosts, doc! { "is_active": true }, None)
    .await
    .context("failed to list active hosts")
    .map_err(Into::into)
}

pub async fn create(body: CreateHostBody) -> OpResult<Host> {
  validations::validate_resource_name(&body.name)
    .code(ErrorCode::ValidationInvalid)
    .map_err(|e| e.field("name"))?;
  validations::validate_host_address(&body.address)
    .code(ErrorCode::ValidationInvalid)
    .map_err(|e| e.field("address"))?;
  validate_credentials(
    body.transport,
    &body.credentials,
    body.insecure_tls,
  )?;

  if db_client()
    .hosts
    .find_one(doc! { "name": &body.name })
    .await
    .context("failed to query hosts")?
    .is_some()
  {
    return Err(OpError::msg(
      ErrorCode::Conflict,
      format!("a host named '{}' already exists", body.name),
    ));
  }

  let now = flotilla_timestamp();
  let host = Host {
    id: ObjectId::new().to_hex(),
    name: body.name,
    kind: Default::default(),
    transport: body.transport,
    address: body.address,
    is_default: body.is_default,
    is_active: true,
    status: HostStatus::Pending,
    last_check: None,
    swarm_id: None,
    leader: false,
    tags: body.tags,
    insecure_tls: body.insecure_tls,
    created_at: now,
    updated_at: now,
  };

  db_client()
    .hosts
    .insert_one(&host)
    .await
    .context("failed to create host")?;

  if let Err(e) =
    store_credentials(&host.id, &body.credentials).await
  {
    // Do not leave a host behind that can never connect.
    let _ = db_client()
      .hosts
      .delete_one(doc! { "_id": &host.id })
      .await;
    return Err(e);
  }

  if host.is_default {
    ensure_single_default(&host.id).await?;
  }

  let _ = host_events().send(HostChange::Updated(host.id.clone()));
  Ok(host)
}

pub async fn update(
  id: &str,
  body: UpdateHostBody,
) -> OpResult<Host> {
  let host = get(id).await?;

  let mut set = doc! { "updated_at": flotilla_timestamp() };
  if let Some(name) = &body.name {
    validations::validate_resource_name(name)
      .code(ErrorCode::ValidationInvalid)
      .map_err(|e| e.field("name"))?;
    set.insert("name", name);
  }
  if let Some(address) = &body.address {
    validations::validate_host_address(address)
      .code(ErrorCode::ValidationInvalid)
      .map_err(|e| e.field("address"))?;
    set.insert("address", address);
  }
  if let Some(is_active) = body.is_active {
    if !is_active && host.is_default {
      return Err(OpError::msg(
        ErrorCode::ValidationInvalid,
        "the default host cannot be deactivated",
      ));
    }
    set.insert("is_active", is_active);
  }
  if let Some(tags) = &body.tags {
    set.insert("tags", tags);
  }
  if let Some(insecure_tls) = body.insecure_tls {
    set.insert("insecure_tls", insecure_tls);
  }
  if let Some(is_default) = body.is_default {
    if is_default
      && !body.is_active.unwrap_or(host.is_active)
    {
      return Err(OpError::msg(
        ErrorCode::ValidationInvalid,
        "the default host must be active",
      ));
    }
    set.insert("is_default", is_default);
  }

  if let Some(creds) = &body.credentials
    && !creds.is_empty()
  {
    validate_credentials(
      host.transport,
      creds,
      body.insecure_tls.unwrap_or(host.insecure_tls),
    )?;
    store_credentials(&host.id, creds).await?;
  }

  db_client()
    .hosts
    .update_one(doc! { "_id": &host.id }, doc! { "$set": set })
    .await
    .context("failed to update host")?;

  if body.is_default == Some(true) {
    ensure_single_default(&host.id).await?;
  }

  let _ = host_events().send(HostChange::Updated(host.id.clone()));
  get(&host.id).await
}

pub async fn delete(id: &str) -> OpResult<Host> {
  let host = get(id).await?;
  let db = db_client();
  db.hosts
    .delete_one(doc! { "_id": &host.id })
    .await
    .context("failed to delete host")?;
  credentials::delete_for_host(&host.id).await?;
  db.host_permissions
    .delete_many(doc! { "host_id": &host.id })
    .await
    .context("failed to delete host permissions")?;
  crate::state::host_status_cache().remove(&host.id).await;
  let _ = host_events().send(HostChange::Removed(host.id.clone()));
  Ok(host)
}

/// Monitor write path: status fields only, never config.
pub async fn update_status(
  host_id: &str,
  status: HostStatus,
  swarm_id: Option<String>,
  kind_manager: Option<bool>,
  leader: Option<bool>,
) -> OpResult<()> {
  let mut set = doc! {
    "status": status.to_string(),
    "last_check": flotilla_timestamp(),
  };
  match &swarm_id {
    Some(swarm_id) => {
      set.insert("swarm_id", swarm_id);
    }
    None if status == HostStatus::Healthy => {
      set.insert("swarm_id", Bson::Null);
    }
    None => {}
  }
  if let Some(manager) = kind_manager {
    let kind = if manager {
      "swarm-manager"
    } else {
      "swarm-worker"
    };
    set.insert("kind", kind);
  } else if status == HostStatus::Healthy && swarm_id.is_none() {
    set.insert("kind", "standalone");
  }
  if let Some(leader) = leader {
    set.insert("leader", leader);
  }
  db_client()
    .hosts
    .update_one(doc! { "_id": host_id }, doc! { "$set": set })
    .await
    .context("failed to update host status")?;
  Ok(())
}

/// Exactly one default host: clearing the flag everywhere else
/// after setting it keeps the window to a single update.
async fn ensure_single_default(host_id: &str) -> OpResult<()> {
  db_client()
    .hosts
    .update_many(
      doc! { "_id": { "$ne": host_id }, "is_default": true },
      doc! { "$set": { "is_default": false } },
    )
    .await
    .context("failed to clear previous default host")?;
  Ok(())
}

fn validate_credentials(
  transport: HostTransport,
  creds: &HostCredentialsInput,
  insecure_tls: bool,
) -> OpResult<()> {
  match transport {
    HostTransport::Local => {
      if !creds.is_empty() {
        return Err(OpError::msg(
          ErrorCode::ValidationInvalid,
          "local hosts take no credentials",
        ));
      }
    }
    HostTransport::Tcp => {
      // With verification explicitly disabled the daemon may run
      // plain tcp and the triple becomes optional.
      if !insecure_tls
        && (creds.tls_cert.is_none()
          || creds.tls_key.is_none()
          || creds.tls_ca.is_none())
      {
        return Err(
          OpError::msg(
            ErrorCode::MissingField,
            "tcp hosts require tls_cert, tls_key and tls_ca",
          )
          .field("credentials"),
        );
      }
    }
    HostTransport::Ssh => {
      let has_key = creds.ssh_private_key.is_some();
      let has_password = creds.password.is_some();
      if has_key == has_password {
        return Err(
          OpError::msg(
            ErrorCode::ValidationInvalid,
            "ssh hosts require exactly one of ssh_private_key or password",
          )
          .field("credentials"),
        );
      }
      if creds.ssh_passphrase.is_some() && !has_key {
        return Err(
          OpError::msg(
            ErrorCode::ValidationInvalid,
            "ssh_passphrase requires ssh_private_key",
          )
          .field("credentials"),
        );
      }
    }
  }
  Ok(())
}

async fn store_credentials(
  host_id: &str,
  creds: &HostCredentialsInput,
) -> OpResult<()> {
  let pairs = [
    (CredentialKind::TlsCert, &creds.tls_cert),
    (CredentialKind::TlsKey, &creds.tls_key),
    (CredentialKind::TlsCa, &creds.tls_ca),
    (CredentialKind::SshPrivateKey, &creds.ssh_private_key),
    (CredentialKind::SshPassphrase, &creds.ssh_passphrase),
    (CredentialKind::Password, &creds.password),
  ];
  for (kind, value) in pairs {
    if let Some(value) = value {
      credentials::put(host_id, kind, value).await?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ssh_creds() -> HostCredentialsInput {
    HostCredentialsInput {
      ssh_private_key: Some(String::from("key")),
      ..Default::default()
    }
  }

  #[test]
  fn local_hosts_take_no_credentials() {
    assert!(
      validate_credentials(
        HostTransport::Local,
        &Default::default(),
        false,
      )
      .is_ok()
    );
    assert!(
      validate_credentials(
        HostTransport::Local,
        &ssh_creds(),
        false,
      )
      .is_err()
    );
  }

  #[test]
  fn tcp_hosts_require_the_full_tls_triple() {
    let err = validate_credentials(
      HostTransport::Tcp,
      &HostCredentialsInput {
        tls_cert: Some(String::from("cert")),
        tls_key: Some(String::from("key")),
        ..Default::default()
      },
      false,
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingField);

    assert!(
      validate_credentials(
        HostTransport::Tcp,
        &HostCredentialsInput {
          tls_cert: Some(String::from("cert")),
          tls_key: Some(String::from("key")),
          tls_ca: Some(String::from("ca")),
          ..Default::default()
        },
        false,
      )
      .is_ok()
    );

    // Disabled verification makes the triple optional.
    assert!(
      validate_credentials(
        HostTransport::Tcp,
        &Default::default(),
        true,
      )
      .is_ok()
    );
  }

  #[test]
  fn ssh_hosts_take_exactly_one_auth_method() {
    assert!(
      validate_credentials(HostTransport::Ssh, &ssh_creds(), false)
        .is_ok()
    );
    assert!(
      validate_credentials(
        HostTransport::Ssh,
        &HostCredentialsInput {
          password: Some(String::from("pw")),
          ..Default::default()
        },
        false,
      )
      .is_ok()
    );
    // Neither
    assert!(
      validate_credentials(
        HostTransport::Ssh,
        &Default::default(),
        false,
      )
      .is_err()
    );
    // Both
    assert!(
      validate_credentials(
        HostTransport::Ssh,
        &HostCredentialsInput {
          password: Some(String::from("pw")),
          ..ssh_creds()
        },
        false,
      )
      .is_err()
    );
  }
}
