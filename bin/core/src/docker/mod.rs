use std::{sync::Arc, time::Duration};

use anyhow::Context;
use bollard::{
  Docker, query_parameters, query_parameters::DataUsageOptions,
};
use flotilla_client::entities::{
  docker::{PruneReport, PruneTarget},
  error::ErrorCode,
  host::{CredentialKind, Host, HostTransport},
};

use crate::{
  config::core_config,
  credentials,
  error::{OpError, OpResult},
};

pub mod ssh;

mod container;
mod image;
mod network;
mod swarm;
mod volume;

pub use container::ExecSession;

/// One connected Docker daemon. Cheap to clone; the ssh tunnel (if
/// any) is shared and torn down when the last clone drops.
#[derive(Clone)]
pub struct DockerClient {
  docker: Docker,
  _tunnel: Option<Arc<ssh::SshTunnel>>,
}

impl DockerClient {
  /// Build a client for the host's transport. Credential material
  /// is pulled from the vault and only exists on the stack here.
  pub async fn connect(host: &Host) -> OpResult<DockerClient> {
    let timeout = core_config().docker_timeout_seconds;
    match host.transport {
      HostTransport::Local => {
        let path = host
          .address
          .strip_prefix("unix://")
          .unwrap_or(&host.address);
        let docker = Docker::connect_with_unix(
          path,
          timeout,
          bollard::API_DEFAULT_VERSION,
        )
        .map_err(connect_error)?;
        Ok(DockerClient {
          docker,
          _tunnel: None,
        })
      }
      HostTransport::Tcp => connect_tls(host, timeout).await,
      HostTransport::Ssh => connect_ssh(host, timeout).await,
    }
  }

  /// Liveness probe with the short probe timeout.
  pub async fn ping(&self) -> OpResult<()> {
    let timeout =
      Duration::from_secs(core_config().probe_timeout_seconds);
    tokio::time::timeout(timeout, self.docker.ping())
      .await
      .map_err(|_| {
        OpError::msg(ErrorCode::DockerTimeout, "ping timed out")
      })?
      .map_err(docker_error)?;
    Ok(())
  }

  pub async fn version(&self) -> OpResult<serde_json::Value> {
    let version =
      self.docker.version().await.map_err(docker_error)?;
    serde_json::to_value(version)
      .context("failed to serialize daemon version")
      .map_err(Into::into)
  }

  pub async fn info(&self) -> OpResult<serde_json::Value> {
    let info = self.docker.info().await.map_err(docker_error)?;
    serde_json::to_value(info)
      .context("failed to serialize daemon info")
      .map_err(Into::into)
  }

  /// Swarm membership as reported by the daemon itself.
  pub async fn swarm_membership(
    &self,
  ) -> OpResult<Option<SwarmMembership>> {
    let info = self.docker.info().await.map_err(docker_error)?;
    let Some(swarm) = info.swarm else {
      return Ok(None);
    };
    let Some(cluster) = swarm.cluster else {
      return Ok(None);
    };
    let Some(swarm_id) = cluster.id else {
      return Ok(None);
    };
    Ok(Some(SwarmMembership {
      swarm_id,
      node_id: swarm.node_id.unwrap_or_default(),
      manager: swarm.control_available.unwrap_or_default(),
    }))
  }

  pub async fn df(&self) -> OpResult<serde_json::Value> {
    let usage = self
      .docker
      .df(Option::<DataUsageOptions>::None)
      .await
      .map_err(docker_error)?;
    serde_json::to_value(usage)
      .context("failed to serialize disk usage")
      .map_err(Into::into)
  }

  /// Daemon-wide event stream.
  pub fn daemon_events(
    &self,
  ) -> impl futures_util::Stream<
    Item = Result<
      bollard::models::EventMessage,
      bollard::errors::Error,
    >,
  > + use<> {
    self
      .docker()
      .events(Option::<query_parameters::EventsOptions>::None)
  }

  /// Prune unused resources. `All` runs every pruner and sums
  /// the reclaimed space.
  pub async fn prune(
    &self,
    target: PruneTarget,
  ) -> OpResult<PruneReport> {
    let mut report = PruneReport::default();
    let docker = self.docker();
    if matches!(target, PruneTarget::Containers | PruneTarget::All) {
      let res = docker
        .prune_containers(
          Option::<query_parameters::PruneContainersOptions>::None,
        )
        .await
        .map_err(docker_error)?;
      report.containers_deleted =
        res.containers_deleted.unwrap_or_default().len() as u64;
      report.space_reclaimed +=
        res.space_reclaimed.unwrap_or_default();
    }
    if matches!(target, PruneTarget::Images | PruneTarget::All) {
      let res = docker
        .prune_images(
          Option::<query_parameters::PruneImagesOptions>::None,
        )
        .await
        .map_err(docker_error)?;
      report.images_deleted =
        res.images_deleted.unwrap_or_default().len() as u64;
      report.space_reclaimed +=
        res.space_reclaimed.unwrap_or_default();
    }
    if matches!(target, PruneTarget::Networks | PruneTarget::All) {
      let res = docker
        .prune_networks(
          Option::<query_parameters::PruneNetworksOptions>::None,
        )
        .await
        .map_err(docker_error)?;
      report.networks_deleted =
        res.networks_deleted.unwrap_or_default().len() as u64;
    }
    if matches!(target, PruneTarget::Volumes | PruneTarget::All) {
      let res = docker
        .prune_volumes(
          Option::<query_parameters::PruneVolumesOptions>::None,
        )
        .await
        .map_err(docker_error)?;
      report.volumes_deleted =
        res.volumes_deleted.unwrap_or_default().len() as u64;
      report.space_reclaimed +=
        res.space_reclaimed.unwrap_or_default();
    }
    Ok(report)
  }

  fn docker(&self) -> &Docker {
    &self.docker
  }
}

#[derive(Debug, Clone)]
pub struct SwarmMembership {
  pub swarm_id: String,
  pub node_id: String,
  pub manager: bool,
}

async fn connect_tls(
  host: &Host,
  timeout: u64,
) -> OpResult<DockerClient> {
  let cert =
    credentials::get_optional(&host.id, CredentialKind::TlsCert)
      .await?;
  let (cert, key, ca) = match cert {
    Some(cert) => (
      cert,
      credentials::get(&host.id, CredentialKind::TlsKey).await?,
      credentials::get(&host.id, CredentialKind::TlsCa).await?,
    ),
    // Verification explicitly disabled and no client material
    // stored: plain tcp daemon.
    None if host.insecure_tls => {
      let docker = Docker::connect_with_http(
        &host.address,
        timeout,
        bollard::API_DEFAULT_VERSION,
      )
      .map_err(connect_error)?;
      return Ok(DockerClient {
        docker,
        _tunnel: None,
      });
    }
    None => {
      return Err(OpError::msg(
        ErrorCode::CredentialUnavailable,
        format!("host {} has no stored tls-cert credential", host.id),
      ));
    }
  };

  // bollard takes the TLS material as files. They live in a
  // 0700 scratch directory for the duration of the connect call.
  let dir = std::env::temp_dir()
    .join("flotilla-tls")
    .join(&host.id);
  write_secret_file(&dir, "key.pem", &key)?;
  write_secret_file(&dir, "cert.pem", &cert)?;
  write_secret_file(&dir, "ca.pem", &ca)?;

  let docker = Docker::connect_with_ssl(
    &host.address,
    &dir.join("key.pem"),
    &dir.join("cert.pem"),
    &dir.join("ca.pem"),
    timeout,
    bollard::API_DEFAULT_VERSION,
  )
  .map_err(connect_error);

  if let Err(e) = std::fs::remove_dir_all(&dir) {
    warn!(
      "failed to clean up TLS scratch dir {} | {e:?}",
      dir.display()
    );
  }

  Ok(DockerClient {
    docker: docker?,
    _tunnel: None,
  })
}

fn write_secret_file(
  dir: &std::path::Path,
  name: &str,
  contents: &str,
) -> OpResult<()> {
  use std::os::unix::fs::PermissionsExt;
  std::fs::create_dir_all(dir)
    .with_context(|| {
      format!("failed to create TLS scratch dir {}", dir.display())
    })?;
  std::fs::set_permissions(
    dir,
    std::fs::Permissions::from_mode(0o700),
  )
  .context("failed to restrict TLS scratch dir permissions")?;
  let path = dir.join(name);
  std::fs::write(&path, contents).with_context(|| {
    format!("failed to write TLS material to {}", path.display())
  })?;
  std::fs::set_permissions(
    &path,
    std::fs::Permissions::from_mode(0o600),
  )
  .context("failed to restrict TLS file permissions")?;
  Ok(())
}

async fn connect_ssh(
  host: &Host,
  timeout: u64,
) -> OpResult<DockerClient> {
  let target = ssh::SshTarget::parse(&host.address)
    .map_err(|e| OpError::new(ErrorCode::ValidationInvalid, e))?;
  let auth = ssh_auth_from_vault(&host.id).await?;
  let tunnel = ssh::SshTunnel::open(
    &target,
    &auth,
    Duration::from_secs(core_config().ssh_dial_timeout_seconds),
  )
  .await
  .map_err(|e| OpError::new(ErrorCode::DockerConnection, e))?;
  let docker = Docker::connect_with_http(
    &tunnel.docker_address(),
    timeout,
    bollard::API_DEFAULT_VERSION,
  )
  .map_err(connect_error)?;
  Ok(DockerClient {
    docker,
    _tunnel: Some(Arc::new(tunnel)),
  })
}

/// SSH hosts own exactly one of {private key, password}.
pub async fn ssh_auth_from_vault(
  host_id: &str,
) -> OpResult<ssh::SshAuth> {
  if let Some(private_key) =
    credentials::get_optional(host_id, CredentialKind::SshPrivateKey)
      .await?
  {
    let passphrase = credentials::get_optional(
      host_id,
      CredentialKind::SshPassphrase,
    )
    .await?;
    return Ok(ssh::SshAuth::Key {
      private_key,
      passphrase,
    });
  }
  if let Some(password) =
    credentials::get_optional(host_id, CredentialKind::Password)
      .await?
  {
    return Ok(ssh::SshAuth::Password(password));
  }
  Err(OpError::msg(
    ErrorCode::CredentialUnavailable,
    format!("host {host_id} has no ssh credential"),
  ))
}

fn connect_error(e: bollard::errors::Error) -> OpError {
  OpError::new(ErrorCode::DockerConnection, e)
}

/// Classify daemon errors into the stable kind set at the adapter
/// boundary.
pub fn docker_error(e: bollard::errors::Error) -> OpError {
  use bollard::errors::Error;
  match &e {
    Error::DockerResponseServerError {
      status_code,
      message,
    } => {
      let code = match *status_code {
        404 => ErrorCode::NotFound,
        409 => ErrorCode::Conflict,
        _ => ErrorCode::DockerOperation,
      };
      OpError::msg(code, message.clone())
    }
    Error::RequestTimeoutError => {
      OpError::new(ErrorCode::DockerTimeout, e)
    }
    Error::JsonDataError { .. } => {
      OpError::new(ErrorCode::DockerOperation, e)
    }
    _ => OpError::new(ErrorCode::DockerConnection, e),
  }
}
