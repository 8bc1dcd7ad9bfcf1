use clap::Parser;
use colored::Colorize;

mod args;
mod command;
mod context;
mod output;

use args::{Cli, Command};

#[tokio::main]
async fn main() {
  dotenvy::dotenv().ok();

  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(e) => {
      // Help / version print cleanly and exit 0; real usage
      // errors exit 1.
      let _ = e.print();
      std::process::exit(if e.use_stderr() { 1 } else { 0 });
    }
  };

  if let Err(e) = run(&cli).await {
    eprintln!("{} {e:#}", "error:".red().bold());
    std::process::exit(command::exit_code(&e));
  }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
  let format = cli.output;
  let host = cli.host.as_deref();
  let context = cli.context.as_deref();

  match &cli.command {
    Command::Auth(command) => {
      command::auth::handle(command, context).await
    }
    Command::Config(command) => command::config::handle(command),
    Command::Hosts(command) => {
      command::hosts::handle(command, format, context).await
    }
    Command::Containers(command) => {
      command::containers::handle(command, format, host, context)
        .await
    }
    Command::Images(command) => {
      command::resources::images(command, format, host, context)
        .await
    }
    Command::Services(command) => {
      command::resources::services(command, format, host, context)
        .await
    }
    Command::Nodes(command) => {
      command::resources::nodes(command, format, host, context)
        .await
    }
    Command::Secrets(command) => {
      command::resources::secrets(command, format, host, context)
        .await
    }
    Command::Configs(command) => {
      command::resources::configs(command, format, host, context)
        .await
    }
    Command::System(command) => {
      command::resources::system(command, format, host, context)
        .await
    }
    Command::Scale { service, replicas } => {
      command::resources::scale(service, *replicas, host, context)
        .await
    }
  }
}
