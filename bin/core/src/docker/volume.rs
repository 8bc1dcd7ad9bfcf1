use bollard::{
  models::VolumeCreateOptions,
  query_parameters::{ListVolumesOptions, RemoveVolumeOptions},
};
use flotilla_client::entities::docker::{
  CreateVolumeBody, VolumeListItem,
};

use crate::error::OpResult;

use super::{DockerClient, docker_error};

impl DockerClient {
  pub async fn list_volumes(&self) -> OpResult<Vec<VolumeListItem>> {
    let volumes = self
      .docker()
      .list_volumes(Option::<ListVolumesOptions>::None)
      .await
      .map_err(docker_error)?
      .volumes
      .unwrap_or_default()
      .into_iter()
      .map(|volume| VolumeListItem {
        name: volume.name,
        driver: volume.driver,
        mountpoint: volume.mountpoint,
        created_at: volume.created_at,
      })
      .collect();
    Ok(volumes)
  }

  pub async fn create_volume(
    &self,
    body: &CreateVolumeBody,
  ) -> OpResult<VolumeListItem> {
    let volume = self
      .docker()
      .create_volume(VolumeCreateOptions {
        name: Some(body.name.clone()),
        driver: body.driver.clone(),
        labels: if body.labels.is_empty() {
          None
        } else {
          Some(body.labels.clone())
        },
        ..Default::default()
      })
      .await
      .map_err(docker_error)?;
    Ok(VolumeListItem {
      name: volume.name,
      driver: volume.driver,
      mountpoint: volume.mountpoint,
      created_at: volume.created_at,
    })
  }

  pub async fn remove_volume(
    &self,
    name: &str,
    force: bool,
  ) -> OpResult<()> {
    self
      .docker()
      .remove_volume(
        name,
        Some(RemoveVolumeOptions { force }),
      )
      .await
      .map_err(docker_error)?;
    Ok(())
  }
}
