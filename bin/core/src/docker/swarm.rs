use anyhow::Context;
use bollard::query_parameters::{
  InspectServiceOptions, ListConfigsOptions, ListNodesOptions,
  ListSecretsOptions, ListServicesOptions, UpdateServiceOptions,
};
use flotilla_client::entities::{
  docker::{
    ConfigListItem, NodeListItem, SecretListItem, ServiceListItem,
  },
  error::ErrorCode,
};

use crate::error::{OpError, OpResult};

use super::{DockerClient, docker_error};

impl DockerClient {
  pub async fn list_services(
    &self,
  ) -> OpResult<Vec<ServiceListItem>> {
    let services = self
      .docker()
      .list_services(Option::<ListServicesOptions>::None)
      .await
      .map_err(docker_error)?
      .into_iter()
      .map(convert_service_list_item)
      .collect();
    Ok(services)
  }

  pub async fn inspect_service(
    &self,
    name: &str,
  ) -> OpResult<serde_json::Value> {
    let service = self
      .docker()
      .inspect_service(
        name,
        Some(InspectServiceOptions {
          insert_defaults: true,
        }),
      )
      .await
      .map_err(docker_error)?;
    serde_json::to_value(service)
      .context("failed to serialize service inspect")
      .map_err(Into::into)
  }

  /// Scaling is a plain service update: re-submit the current spec
  /// with the replica count swapped.
  pub async fn scale_service(
    &self,
    name: &str,
    replicas: u64,
  ) -> OpResult<()> {
    let service = self
      .docker()
      .inspect_service(
        name,
        Some(InspectServiceOptions {
          insert_defaults: false,
        }),
      )
      .await
      .map_err(docker_error)?;
    let version = service
      .version
      .and_then(|version| version.index)
      .ok_or_else(|| {
        OpError::msg(
          ErrorCode::DockerOperation,
          "service has no version index",
        )
      })?;
    let mut spec = service.spec.ok_or_else(|| {
      OpError::msg(
        ErrorCode::DockerOperation,
        "service has no spec",
      )
    })?;
    let Some(mode) = spec.mode.as_mut() else {
      return Err(OpError::msg(
        ErrorCode::ValidationInvalid,
        "service has no scheduling mode",
      ));
    };
    let Some(replicated) = mode.replicated.as_mut() else {
      return Err(OpError::msg(
        ErrorCode::ValidationInvalid,
        "only replicated services can be scaled",
      ));
    };
    replicated.replicas = Some(replicas as i64);

    self
      .docker()
      .update_service(
        name,
        spec,
        UpdateServiceOptions {
          version: version as i64,
          ..Default::default()
        },
        None,
      )
      .await
      .map_err(docker_error)?;
    Ok(())
  }

  pub async fn list_nodes(&self) -> OpResult<Vec<NodeListItem>> {
    let nodes = self
      .docker()
      .list_nodes(Option::<ListNodesOptions>::None)
      .await
      .map_err(docker_error)?
      .into_iter()
      .map(convert_node_list_item)
      .collect();
    Ok(nodes)
  }

  pub async fn inspect_node(
    &self,
    id: &str,
  ) -> OpResult<NodeListItem> {
    let node = self
      .docker()
      .inspect_node(id)
      .await
      .map_err(docker_error)?;
    Ok(convert_node_list_item(node))
  }

  pub async fn list_secrets(&self) -> OpResult<Vec<SecretListItem>> {
    let secrets = self
      .docker()
      .list_secrets(Option::<ListSecretsOptions>::None)
      .await
      .map_err(docker_error)?
      .into_iter()
      .map(|secret| SecretListItem {
        id: secret.id.unwrap_or_default(),
        name: secret
          .spec
          .and_then(|spec| spec.name)
          .unwrap_or_default(),
        created_at: secret.created_at,
      })
      .collect();
    Ok(secrets)
  }

  pub async fn list_configs(&self) -> OpResult<Vec<ConfigListItem>> {
    let configs = self
      .docker()
      .list_configs(Option::<ListConfigsOptions>::None)
      .await
      .map_err(docker_error)?
      .into_iter()
      .map(|config| ConfigListItem {
        id: config.id.unwrap_or_default(),
        name: config
          .spec
          .and_then(|spec| spec.name)
          .unwrap_or_default(),
        created_at: config.created_at,
      })
      .collect();
    Ok(configs)
  }
}

impl DockerClient {
  /// Daemon-side fan-in over all task logs of the service.
  pub fn service_logs(
    &self,
    service: &str,
    follow: bool,
    tail: Option<u64>,
    timestamps: bool,
  ) -> impl futures_util::Stream<
    Item = Result<
      bollard::container::LogOutput,
      bollard::errors::Error,
    >,
  > + use<> {
    let tail = match tail {
      Some(tail) => tail.to_string(),
      None => String::from("all"),
    };
    self.docker().service_logs(
      service,
      Some(bollard::query_parameters::ServiceLogsOptions {
        follow,
        stdout: true,
        stderr: true,
        timestamps,
        tail,
        ..Default::default()
      }),
    )
  }

  pub async fn swarm_init(
    &self,
    advertise_addr: Option<String>,
  ) -> OpResult<String> {
    self
      .docker()
      .init_swarm(bollard::models::SwarmInitRequest {
        listen_addr: Some(String::from("0.0.0.0:2377")),
        advertise_addr,
        ..Default::default()
      })
      .await
      .map_err(docker_error)
  }

  pub async fn swarm_leave(&self, force: bool) -> OpResult<()> {
    self
      .docker()
      .leave_swarm(Some(
        bollard::query_parameters::LeaveSwarmOptions { force },
      ))
      .await
      .map_err(docker_error)?;
    Ok(())
  }
}

fn convert_service_list_item(
  service: bollard::models::Service,
) -> ServiceListItem {
  let (name, image, replicas) = service
    .spec
    .map(|spec| {
      (
        spec.name.unwrap_or_default(),
        spec.task_template.and_then(|template| {
          template.container_spec.and_then(|spec| spec.image)
        }),
        spec.mode.and_then(|mode| {
          mode
            .replicated
            .and_then(|replicated| replicated.replicas)
        }),
      )
    })
    .unwrap_or_default();
  let (running_tasks, desired_tasks) = service
    .service_status
    .map(|status| (status.running_tasks, status.desired_tasks))
    .unzip();
  ServiceListItem {
    id: service.id.unwrap_or_default(),
    name,
    image,
    replicas: replicas.map(|replicas| replicas as u64),
    running_tasks: running_tasks.map(|tasks| tasks as i64),
    desired_tasks: desired_tasks.map(|tasks| tasks as i64),
  }
}

fn convert_node_list_item(
  node: bollard::models::Node,
) -> NodeListItem {
  NodeListItem {
    id: node.id.unwrap_or_default(),
    hostname: node
      .description
      .as_ref()
      .and_then(|description| description.hostname.clone())
      .unwrap_or_default(),
    role: node
      .spec
      .as_ref()
      .and_then(|spec| spec.role.as_ref())
      .map(|role| role.to_string())
      .unwrap_or_default(),
    availability: node
      .spec
      .as_ref()
      .and_then(|spec| spec.availability.as_ref())
      .map(|availability| availability.to_string())
      .unwrap_or_default(),
    state: node
      .status
      .as_ref()
      .and_then(|status| status.state.as_ref())
      .map(|state| state.to_string())
      .unwrap_or_default(),
    leader: node
      .manager_status
      .as_ref()
      .and_then(|status| status.leader)
      .unwrap_or_default(),
    engine_version: node
      .description
      .and_then(|description| description.engine)
      .and_then(|engine| engine.engine_version),
  }
}
