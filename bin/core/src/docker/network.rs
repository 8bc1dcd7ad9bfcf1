use bollard::{
  models::NetworkCreateRequest,
  query_parameters::ListNetworksOptions,
};
use flotilla_client::entities::docker::{
  CreateNetworkBody, NetworkListItem,
};

use crate::error::OpResult;

use super::{DockerClient, docker_error};

impl DockerClient {
  pub async fn list_networks(
    &self,
  ) -> OpResult<Vec<NetworkListItem>> {
    let networks = self
      .docker()
      .list_networks(Option::<ListNetworksOptions>::None)
      .await
      .map_err(docker_error)?
      .into_iter()
      .map(|network| NetworkListItem {
        id: network.id.unwrap_or_default(),
        name: network.name.unwrap_or_default(),
        driver: network.driver.unwrap_or_default(),
        scope: network.scope.unwrap_or_default(),
        attachable: network.attachable.unwrap_or_default(),
      })
      .collect();
    Ok(networks)
  }

  pub async fn create_network(
    &self,
    body: &CreateNetworkBody,
  ) -> OpResult<String> {
    let res = self
      .docker()
      .create_network(NetworkCreateRequest {
        name: body.name.clone(),
        driver: body.driver.clone(),
        attachable: Some(body.attachable),
        labels: if body.labels.is_empty() {
          None
        } else {
          Some(body.labels.clone())
        },
        ..Default::default()
      })
      .await
      .map_err(docker_error)?;
    Ok(res.id)
  }

  pub async fn remove_network(&self, name: &str) -> OpResult<()> {
    self
      .docker()
      .remove_network(name)
      .await
      .map_err(docker_error)?;
    Ok(())
  }
}
