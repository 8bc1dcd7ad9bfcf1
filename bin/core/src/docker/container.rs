use std::collections::HashMap;

use anyhow::Context;
use bollard::{
  container::LogOutput,
  exec::{CreateExecOptions, ResizeExecOptions, StartExecResults},
  models::{
    ContainerCreateBody, HostConfig, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
  },
  query_parameters::{
    InspectContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, RestartContainerOptions,
    StartContainerOptions, StatsOptions, StopContainerOptions,
  },
};
use futures_util::Stream;
use flotilla_client::entities::docker::{
  ContainerListItem, ContainerState, CreateContainerBody,
  RestartPolicyKind,
};

use crate::error::{OpError, OpResult};
use flotilla_client::entities::error::ErrorCode;

use super::{DockerClient, docker_error};

impl DockerClient {
  pub async fn list_containers(
    &self,
  ) -> OpResult<Vec<ContainerListItem>> {
    let containers = self
      .docker()
      .list_containers(Some(ListContainersOptions {
        all: true,
        ..Default::default()
      }))
      .await
      .map_err(docker_error)?
      .into_iter()
      .map(convert_container_summary)
      .collect();
    Ok(containers)
  }

  pub async fn inspect_container(
    &self,
    name: &str,
  ) -> OpResult<serde_json::Value> {
    let container = self
      .docker()
      .inspect_container(
        name,
        Option::<InspectContainerOptions>::None,
      )
      .await
      .map_err(docker_error)?;
    serde_json::to_value(container)
      .context("failed to serialize container inspect")
      .map_err(Into::into)
  }

  /// Create from the enumerated option set. Returns the new
  /// container id.
  pub async fn create_container(
    &self,
    body: &CreateContainerBody,
  ) -> OpResult<String> {
    let config = container_create_body(body)?;
    let res = self
      .docker()
      .create_container(
        Some(bollard::query_parameters::CreateContainerOptions {
          name: Some(body.name.clone()),
          ..Default::default()
        }),
        config,
      )
      .await
      .map_err(docker_error)?;
    Ok(res.id)
  }

  pub async fn start_container(&self, name: &str) -> OpResult<()> {
    self
      .docker()
      .start_container(name, None::<StartContainerOptions>)
      .await
      .map_err(docker_error)?;
    Ok(())
  }

  pub async fn stop_container(&self, name: &str) -> OpResult<()> {
    self
      .docker()
      .stop_container(name, None::<StopContainerOptions>)
      .await
      .map_err(docker_error)?;
    Ok(())
  }

  pub async fn restart_container(&self, name: &str) -> OpResult<()> {
    self
      .docker()
      .restart_container(name, None::<RestartContainerOptions>)
      .await
      .map_err(docker_error)?;
    Ok(())
  }

  pub async fn remove_container(
    &self,
    name: &str,
    force: bool,
  ) -> OpResult<()> {
    self
      .docker()
      .remove_container(
        name,
        Some(RemoveContainerOptions {
          force,
          ..Default::default()
        }),
      )
      .await
      .map_err(docker_error)?;
    Ok(())
  }

  /// Raw daemon log stream. `tail` of None replays everything the
  /// daemon has, 0 skips history entirely.
  pub fn container_logs(
    &self,
    name: &str,
    follow: bool,
    tail: Option<u64>,
    timestamps: bool,
  ) -> impl Stream<Item = Result<LogOutput, bollard::errors::Error>>
  + use<> {
    let tail = match tail {
      Some(tail) => tail.to_string(),
      None => String::from("all"),
    };
    self.docker().logs(
      name,
      Some(LogsOptions {
        follow,
        stdout: true,
        stderr: true,
        timestamps,
        tail,
        ..Default::default()
      }),
    )
  }

  pub fn container_stats(
    &self,
    name: &str,
  ) -> impl Stream<
    Item = Result<
      bollard::models::ContainerStatsResponse,
      bollard::errors::Error,
    >,
  > + use<> {
    self.docker().stats(
      name,
      Some(StatsOptions {
        stream: true,
        ..Default::default()
      }),
    )
  }

  /// Create + attach an interactive PTY exec.
  pub async fn container_exec(
    &self,
    container: &str,
    cmd: Vec<String>,
    workdir: Option<String>,
  ) -> OpResult<ExecSession> {
    let exec = self
      .docker()
      .create_exec(
        container,
        CreateExecOptions {
          attach_stdin: Some(true),
          attach_stdout: Some(true),
          attach_stderr: Some(true),
          tty: Some(true),
          cmd: Some(cmd),
          working_dir: workdir,
          ..Default::default()
        },
      )
      .await
      .map_err(docker_error)?;
    let started = self
      .docker()
      .start_exec(&exec.id, None)
      .await
      .map_err(docker_error)?;
    match started {
      StartExecResults::Attached { output, input } => {
        Ok(ExecSession {
          exec_id: exec.id,
          output,
          input,
        })
      }
      StartExecResults::Detached => Err(OpError::msg(
        ErrorCode::DockerOperation,
        "exec unexpectedly started detached",
      )),
    }
  }

  pub async fn resize_exec(
    &self,
    exec_id: &str,
    rows: u16,
    cols: u16,
  ) -> OpResult<()> {
    self
      .docker()
      .resize_exec(
        exec_id,
        ResizeExecOptions {
          height: rows,
          width: cols,
        },
      )
      .await
      .map_err(docker_error)?;
    Ok(())
  }
}

/// Attached exec PTY: daemon output stream + stdin sink.
pub struct ExecSession {
  pub exec_id: String,
  pub output: std::pin::Pin<
    Box<
      dyn Stream<Item = Result<LogOutput, bollard::errors::Error>>
        + Send,
    >,
  >,
  pub input: std::pin::Pin<Box<dyn tokio::io::AsyncWrite + Send>>,
}

fn container_create_body(
  body: &CreateContainerBody,
) -> OpResult<ContainerCreateBody> {
  if body.image.is_empty() {
    return Err(
      OpError::msg(ErrorCode::MissingField, "image is required")
        .field("image"),
    );
  }

  let mut exposed_ports: HashMap<String, HashMap<(), ()>> =
    HashMap::new();
  let mut port_bindings: HashMap<
    String,
    Option<Vec<PortBinding>>,
  > = HashMap::new();
  for port in &body.ports {
    let key = format!("{}/{}", port.container_port, port.protocol);
    exposed_ports.insert(key.clone(), HashMap::new());
    port_bindings.insert(
      key,
      Some(vec![PortBinding {
        host_ip: None,
        host_port: port.host_port.map(|p| p.to_string()),
      }]),
    );
  }

  let binds = body
    .volumes
    .iter()
    .map(|volume| {
      if volume.read_only {
        format!("{}:{}:ro", volume.source, volume.target)
      } else {
        format!("{}:{}", volume.source, volume.target)
      }
    })
    .collect::<Vec<_>>();

  let restart_policy = RestartPolicy {
    name: Some(match body.restart {
      RestartPolicyKind::No => RestartPolicyNameEnum::NO,
      RestartPolicyKind::Always => RestartPolicyNameEnum::ALWAYS,
      RestartPolicyKind::UnlessStopped => {
        RestartPolicyNameEnum::UNLESS_STOPPED
      }
      RestartPolicyKind::OnFailure => {
        RestartPolicyNameEnum::ON_FAILURE
      }
    }),
    maximum_retry_count: None,
  };

  Ok(ContainerCreateBody {
    image: Some(body.image.clone()),
    cmd: body.command.clone(),
    env: if body.env.is_empty() {
      None
    } else {
      Some(body.env.clone())
    },
    labels: if body.labels.is_empty() {
      None
    } else {
      Some(body.labels.clone())
    },
    exposed_ports: if exposed_ports.is_empty() {
      None
    } else {
      Some(exposed_ports)
    },
    host_config: Some(HostConfig {
      binds: if binds.is_empty() { None } else { Some(binds) },
      port_bindings: if port_bindings.is_empty() {
        None
      } else {
        Some(port_bindings)
      },
      restart_policy: Some(restart_policy),
      network_mode: body.network.clone(),
      ..Default::default()
    }),
    ..Default::default()
  })
}

fn convert_container_summary(
  container: bollard::models::ContainerSummary,
) -> ContainerListItem {
  let name = container
    .names
    .unwrap_or_default()
    .first()
    .map(|name| name.trim_start_matches('/').to_string())
    .unwrap_or_default();
  let ports = container
    .ports
    .unwrap_or_default()
    .into_iter()
    .map(|port| {
      let proto = port
        .typ
        .map(|typ| typ.to_string())
        .unwrap_or_else(|| String::from("tcp"));
      match port.public_port {
        Some(public) => {
          format!("{public}:{}/{proto}", port.private_port)
        }
        None => format!("{}/{proto}", port.private_port),
      }
    })
    .collect();
  ContainerListItem {
    id: container.id.unwrap_or_default(),
    name,
    image: container.image.unwrap_or_default(),
    state: container
      .state
      .map(|state| parse_container_state(&state.to_string()))
      .unwrap_or_default(),
    status: container.status.unwrap_or_default(),
    created: container.created.unwrap_or_default(),
    ports,
    labels: container.labels.unwrap_or_default(),
    host_id: None,
  }
}

fn parse_container_state(state: &str) -> ContainerState {
  match state.to_lowercase().as_str() {
    "created" => ContainerState::Created,
    "running" => ContainerState::Running,
    "paused" => ContainerState::Paused,
    "restarting" => ContainerState::Restarting,
    "removing" => ContainerState::Removing,
    "exited" => ContainerState::Exited,
    "dead" => ContainerState::Dead,
    _ => ContainerState::Unknown,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use flotilla_client::entities::docker::{
    PortMapping, PortProtocol, VolumeMapping,
  };

  #[test]
  fn create_body_requires_image() {
    let err = container_create_body(&CreateContainerBody {
      name: String::from("web"),
      ..Default::default()
    })
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingField);
  }

  #[test]
  fn create_body_maps_ports_and_volumes() {
    let body = container_create_body(&CreateContainerBody {
      name: String::from("web"),
      image: String::from("nginx:alpine"),
      ports: vec![PortMapping {
        container_port: 80,
        host_port: Some(8080),
        protocol: PortProtocol::Tcp,
      }],
      volumes: vec![VolumeMapping {
        source: String::from("site"),
        target: String::from("/usr/share/nginx/html"),
        read_only: true,
      }],
      restart: RestartPolicyKind::UnlessStopped,
      ..Default::default()
    })
    .unwrap();
    assert!(
      body.exposed_ports.as_ref().unwrap().contains_key("80/tcp")
    );
    let host_config = body.host_config.unwrap();
    assert_eq!(
      host_config.binds.unwrap(),
      vec![String::from("site:/usr/share/nginx/html:ro")]
    );
    assert_eq!(
      host_config.restart_policy.unwrap().name,
      Some(RestartPolicyNameEnum::UNLESS_STOPPED)
    );
  }

  #[test]
  fn container_states_parse() {
    assert_eq!(
      parse_container_state("running"),
      ContainerState::Running
    );
    assert_eq!(parse_container_state("EXITED"), ContainerState::Exited);
    assert_eq!(
      parse_container_state("weird"),
      ContainerState::Unknown
    );
  }
}
