use anyhow::bail;
use flotilla_client::entities::docker::{
  ConfigListItem, ImageListItem, NodeListItem, PruneTarget,
  SecretListItem, ServiceListItem,
};

use crate::{
  args::{
    ConfigsCommand, ImagesCommand, NodesCommand, OutputFormat,
    SecretsCommand, ServicesCommand, SystemCommand,
  },
  output,
};

use super::session;

pub async fn images(
  command: &ImagesCommand,
  format: OutputFormat,
  host: Option<&str>,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let client = session(context_override).await?;
  match command {
    ImagesCommand::Ls => {
      let images = client.list_images(host).await?;
      output::print(format, &images, images_table)?;
    }
    ImagesCommand::Pull { image } => {
      println!("pulling {image}...");
      client.pull_image(image, host).await?;
      println!("pulled {image}");
    }
    ImagesCommand::Rm { image, force } => {
      client.remove_image(image, host, *force).await?;
      println!("removed {image}");
    }
  }
  Ok(())
}

pub async fn services(
  command: &ServicesCommand,
  format: OutputFormat,
  host: Option<&str>,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let client = session(context_override).await?;
  match command {
    ServicesCommand::Ls => {
      let services = client.list_services(host).await?;
      output::print(format, &services, services_table)?;
    }
    ServicesCommand::Get { service } => {
      let service = client.inspect_service(service, host).await?;
      output::print_value(format, &service)?;
    }
    ServicesCommand::Scale { service, replicas } => {
      scale(service, *replicas, host, context_override).await?;
    }
  }
  Ok(())
}

/// `flo scale` and `flo services scale` share this path: scaling
/// is just a service update.
pub async fn scale(
  service: &str,
  replicas: u64,
  host: Option<&str>,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let client = session(context_override).await?;
  client.scale_service(service, replicas, host).await?;
  println!("scaled {service} to {replicas} replicas");
  Ok(())
}

pub async fn nodes(
  command: &NodesCommand,
  format: OutputFormat,
  host: Option<&str>,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let client = session(context_override).await?;
  match command {
    NodesCommand::Ls => {
      let nodes = client.list_nodes(host).await?;
      output::print(format, &nodes, nodes_table)?;
    }
    NodesCommand::Get { node } => {
      let nodes = client.list_nodes(host).await?;
      let node = nodes
        .into_iter()
        .find(|item| item.id == *node || item.hostname == *node);
      match node {
        Some(node) => {
          output::print(format, &node, |node| {
            nodes_table(&vec![node.clone()])
          })?;
        }
        None => bail!("no node matching '{node}'"),
      }
    }
  }
  Ok(())
}

pub async fn secrets(
  command: &SecretsCommand,
  format: OutputFormat,
  host: Option<&str>,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let client = session(context_override).await?;
  match command {
    SecretsCommand::Ls => {
      let secrets = client.list_secrets(host).await?;
      output::print(format, &secrets, secrets_table)?;
    }
  }
  Ok(())
}

pub async fn configs(
  command: &ConfigsCommand,
  format: OutputFormat,
  host: Option<&str>,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let client = session(context_override).await?;
  match command {
    ConfigsCommand::Ls => {
      let configs = client.list_configs(host).await?;
      output::print(format, &configs, configs_table)?;
    }
  }
  Ok(())
}

pub async fn system(
  command: &SystemCommand,
  format: OutputFormat,
  host: Option<&str>,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let client = session(context_override).await?;
  match command {
    SystemCommand::Info => {
      let info = client.system_info(host).await?;
      output::print_value(format, &info)?;
    }
    SystemCommand::Version => {
      let version = client.system_version(host).await?;
      output::print_value(format, &version)?;
    }
    SystemCommand::Df => {
      let df = client.system_df(host).await?;
      output::print_value(format, &df)?;
    }
    SystemCommand::Prune { target } => {
      let target = match target.as_str() {
        "containers" => PruneTarget::Containers,
        "images" => PruneTarget::Images,
        "networks" => PruneTarget::Networks,
        "volumes" => PruneTarget::Volumes,
        "all" => PruneTarget::All,
        other => bail!(
          "unknown prune target '{other}', expected containers, images, networks, volumes or all"
        ),
      };
      let report = client.system_prune(target, host).await?;
      println!(
        "pruned {} containers, {} images, {} networks, {} volumes ({} bytes reclaimed)",
        report.containers_deleted,
        report.images_deleted,
        report.networks_deleted,
        report.volumes_deleted,
        report.space_reclaimed,
      );
    }
  }
  Ok(())
}

fn images_table(
  images: &Vec<ImageListItem>,
) -> comfy_table::Table {
  let mut table = output::table(&["TAGS", "ID", "SIZE"]);
  for image in images {
    table.add_row(vec![
      image.tags.join(", "),
      image.id.chars().take(19).collect(),
      human_size(image.size),
    ]);
  }
  table
}

fn services_table(
  services: &Vec<ServiceListItem>,
) -> comfy_table::Table {
  let mut table =
    output::table(&["NAME", "ID", "IMAGE", "REPLICAS"]);
  for service in services {
    let replicas = match (
      service.running_tasks,
      service.desired_tasks.or(service.replicas.map(|r| r as i64)),
    ) {
      (Some(running), Some(desired)) => {
        format!("{running}/{desired}")
      }
      (None, Some(desired)) => format!("-/{desired}"),
      _ => String::from("-"),
    };
    table.add_row(vec![
      service.name.clone(),
      service.id.chars().take(12).collect(),
      service.image.clone().unwrap_or_default(),
      replicas,
    ]);
  }
  table
}

fn nodes_table(nodes: &Vec<NodeListItem>) -> comfy_table::Table {
  let mut table = output::table(&[
    "HOSTNAME", "ID", "ROLE", "AVAILABILITY", "STATE", "LEADER",
    "ENGINE",
  ]);
  for node in nodes {
    table.add_row(vec![
      node.hostname.clone(),
      node.id.chars().take(12).collect(),
      node.role.clone(),
      node.availability.clone(),
      node.state.clone(),
      if node.leader { "*" } else { "" }.to_string(),
      node.engine_version.clone().unwrap_or_default(),
    ]);
  }
  table
}

fn secrets_table(
  secrets: &Vec<SecretListItem>,
) -> comfy_table::Table {
  let mut table = output::table(&["NAME", "ID", "CREATED"]);
  for secret in secrets {
    table.add_row(vec![
      secret.name.clone(),
      secret.id.chars().take(12).collect(),
      secret.created_at.clone().unwrap_or_default(),
    ]);
  }
  table
}

fn configs_table(
  configs: &Vec<ConfigListItem>,
) -> comfy_table::Table {
  let mut table = output::table(&["NAME", "ID", "CREATED"]);
  for config in configs {
    table.add_row(vec![
      config.name.clone(),
      config.id.chars().take(12).collect(),
      config.created_at.clone().unwrap_or_default(),
    ]);
  }
  table
}

fn human_size(size: i64) -> String {
  const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
  let mut size = size as f64;
  let mut unit = 0;
  while size >= 1024.0 && unit < UNITS.len() - 1 {
    size /= 1024.0;
    unit += 1;
  }
  format!("{size:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn human_sizes() {
    assert_eq!(human_size(512), "512.0 B");
    assert_eq!(human_size(2048), "2.0 KB");
    assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
  }
}
