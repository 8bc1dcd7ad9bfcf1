use anyhow::{Context, bail};
use flotilla_client::entities::host::{
  CreateHostBody, Host, HostCredentialsInput, HostTransport,
};

use crate::{
  args::{HostsCommand, OutputFormat},
  output,
};

use super::session;

pub async fn handle(
  command: &HostsCommand,
  format: OutputFormat,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let client = session(context_override).await?;
  match command {
    HostsCommand::List => {
      let hosts = client.list_hosts().await?;
      output::print(format, &hosts, hosts_table)?;
    }
    HostsCommand::Get { host } => {
      let host = client.get_host(host).await?;
      output::print(format, &host, |host| {
        hosts_table(&vec![host.clone()])
      })?;
    }
    HostsCommand::Test { host } => {
      let report = client.test_host(host).await?;
      if report.reachable {
        println!(
          "reachable ({} ms){}",
          report.latency_ms,
          report
            .version
            .map(|version| format!(", docker v{version}"))
            .unwrap_or_default()
        );
      } else {
        println!(
          "unreachable: {}",
          report
            .message
            .unwrap_or_else(|| String::from("unknown error"))
        );
      }
    }
    HostsCommand::Add {
      name,
      address,
      transport,
      default,
      tls_cert,
      tls_key,
      tls_ca,
      ssh_key,
      password,
    } => {
      let transport = match transport.as_str() {
        "local" => HostTransport::Local,
        "tcp" => HostTransport::Tcp,
        "ssh" => HostTransport::Ssh,
        other => {
          bail!(
            "unknown transport '{other}', expected local, tcp or ssh"
          )
        }
      };
      let credentials = HostCredentialsInput {
        tls_cert: read_pem(tls_cert.as_deref())?,
        tls_key: read_pem(tls_key.as_deref())?,
        tls_ca: read_pem(tls_ca.as_deref())?,
        ssh_private_key: read_pem(ssh_key.as_deref())?,
        password: if *password {
          Some(super::prompt_secret("SSH password")?)
        } else {
          None
        },
        ..Default::default()
      };
      let host = client
        .create_host(&CreateHostBody {
          name: name.clone(),
          transport,
          address: address.clone(),
          is_default: *default,
          credentials,
          ..Default::default()
        })
        .await?;
      println!("created host '{}' ({})", host.name, host.id);
    }
    HostsCommand::Remove { host } => {
      client.delete_host(host).await?;
      println!("removed host '{host}'");
    }
  }
  Ok(())
}

fn read_pem(
  path: Option<&std::path::Path>,
) -> anyhow::Result<Option<String>> {
  match path {
    Some(path) => std::fs::read_to_string(path)
      .with_context(|| {
        format!("failed to read {}", path.display())
      })
      .map(Some),
    None => Ok(None),
  }
}

fn hosts_table(hosts: &Vec<Host>) -> comfy_table::Table {
  let mut table = output::table(&[
    "NAME", "ID", "TRANSPORT", "STATUS", "DEFAULT", "SWARM",
  ]);
  for host in hosts {
    table.add_row(vec![
      host.name.clone(),
      host.id.clone(),
      host.transport.to_string(),
      host.status.to_string(),
      if host.is_default { "*" } else { "" }.to_string(),
      host.swarm_id.clone().unwrap_or_default(),
    ]);
  }
  table
}
