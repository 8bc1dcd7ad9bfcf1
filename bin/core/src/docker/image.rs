use bollard::query_parameters::{
  CreateImageOptions, ListImagesOptions, RemoveImageOptions,
};
use flotilla_client::entities::docker::ImageListItem;
use futures_util::TryStreamExt;

use crate::error::OpResult;

use super::{DockerClient, docker_error};

impl DockerClient {
  pub async fn list_images(&self) -> OpResult<Vec<ImageListItem>> {
    let images = self
      .docker()
      .list_images(Option::<ListImagesOptions>::None)
      .await
      .map_err(docker_error)?
      .into_iter()
      .map(|image| ImageListItem {
        id: image.id,
        tags: image.repo_tags,
        size: image.size,
        created: image.created,
      })
      .collect();
    Ok(images)
  }

  /// Pull an image, draining the progress stream to completion.
  pub async fn pull_image(&self, image: &str) -> OpResult<()> {
    let mut stream = self.docker().create_image(
      Some(CreateImageOptions {
        from_image: Some(image.to_string()),
        ..Default::default()
      }),
      None,
      None,
    );
    while stream
      .try_next()
      .await
      .map_err(docker_error)?
      .is_some()
    {}
    Ok(())
  }

  pub async fn remove_image(
    &self,
    name: &str,
    force: bool,
  ) -> OpResult<()> {
    self
      .docker()
      .remove_image(
        name,
        Some(RemoveImageOptions {
          force,
          ..Default::default()
        }),
        None,
      )
      .await
      .map_err(docker_error)?;
    Ok(())
  }
}
