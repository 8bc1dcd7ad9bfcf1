use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
  name = "flo",
  about = "Operate flotilla-managed Docker hosts from the terminal",
  version
)]
pub struct Cli {
  #[command(subcommand)]
  pub command: Command,

  /// Output format for list / get commands.
  #[arg(short, long, global = true, default_value = "table")]
  pub output: OutputFormat,

  /// Target host id or name. Falls back to the server's default
  /// host.
  #[arg(long, global = true)]
  pub host: Option<String>,

  /// Context to use for this invocation instead of the current
  /// one.
  #[arg(long, global = true)]
  pub context: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
  Table,
  Json,
  Yaml,
}

#[derive(Subcommand)]
pub enum Command {
  /// Login, logout and identity
  #[command(subcommand)]
  Auth(AuthCommand),
  /// Manage CLI contexts
  #[command(subcommand)]
  Config(ConfigCommand),
  /// Manage registered hosts
  #[command(subcommand)]
  Hosts(HostsCommand),
  /// Operate containers on a host
  #[command(subcommand)]
  Containers(ContainersCommand),
  /// Manage images on a host
  #[command(subcommand)]
  Images(ImagesCommand),
  /// Swarm services
  #[command(subcommand)]
  Services(ServicesCommand),
  /// Swarm nodes
  #[command(subcommand)]
  Nodes(NodesCommand),
  /// Swarm secrets
  #[command(subcommand)]
  Secrets(SecretsCommand),
  /// Swarm configs
  #[command(subcommand)]
  Configs(ConfigsCommand),
  /// Daemon-level info and maintenance
  #[command(subcommand)]
  System(SystemCommand),
  /// Scale a service (shorthand for `services scale`)
  Scale {
    service: String,
    replicas: u64,
  },
}

#[derive(Subcommand)]
pub enum AuthCommand {
  /// Authenticate against the current context
  Login {
    #[arg(long)]
    username: Option<String>,
  },
  /// Revoke the current session
  Logout,
  /// Show the authenticated user
  Whoami,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Print the CLI configuration
  View,
  /// Add or replace a context
  AddContext {
    name: String,
    /// Server address, eg http://localhost:9120
    #[arg(long)]
    address: String,
  },
  /// Switch the current context
  UseContext { name: String },
  /// Remove a context
  RemoveContext { name: String },
  /// Print the current context name
  CurrentContext,
}

#[derive(Subcommand)]
pub enum HostsCommand {
  /// List registered hosts
  List,
  /// Show one host
  Get { host: String },
  /// Probe a host's daemon on demand
  Test { host: String },
  /// Register a host
  Add {
    name: String,
    /// Socket path, tcp://host:port or ssh://user@host
    #[arg(long)]
    address: String,
    /// local, tcp or ssh
    #[arg(long, default_value = "local")]
    transport: String,
    #[arg(long)]
    default: bool,
    /// PEM file with the client certificate (tcp)
    #[arg(long)]
    tls_cert: Option<std::path::PathBuf>,
    /// PEM file with the client key (tcp)
    #[arg(long)]
    tls_key: Option<std::path::PathBuf>,
    /// PEM file with the daemon CA (tcp)
    #[arg(long)]
    tls_ca: Option<std::path::PathBuf>,
    /// OpenSSH private key file (ssh)
    #[arg(long)]
    ssh_key: Option<std::path::PathBuf>,
    /// Prompt for an ssh password instead of a key (ssh)
    #[arg(long)]
    password: bool,
  },
  /// Remove a host
  Remove { host: String },
}

#[derive(Subcommand)]
pub enum ContainersCommand {
  /// List containers
  Ls,
  /// Start a container
  Start { container: String },
  /// Stop a container
  Stop { container: String },
  /// Restart a container
  Restart { container: String },
  /// Stream container logs
  Logs {
    container: String,
    #[arg(long, default_value_t = 100)]
    tail: u64,
    #[arg(long)]
    no_follow: bool,
    #[arg(long)]
    timestamps: bool,
  },
  /// Stream live resource stats
  Stats { container: String },
  /// Open an interactive shell in a container
  Exec {
    container: String,
    /// Command to run
    #[arg(long, default_value = "/bin/sh")]
    cmd: String,
    #[arg(long)]
    workdir: Option<String>,
  },
}

#[derive(Subcommand)]
pub enum ImagesCommand {
  /// List images
  Ls,
  /// Pull an image
  Pull { image: String },
  /// Remove an image
  Rm {
    image: String,
    #[arg(long)]
    force: bool,
  },
}

#[derive(Subcommand)]
pub enum ServicesCommand {
  /// List services
  Ls,
  /// Inspect a service
  Get { service: String },
  /// Set a service's replica count
  Scale { service: String, replicas: u64 },
}

#[derive(Subcommand)]
pub enum NodesCommand {
  /// List swarm nodes
  Ls,
  /// Inspect a node
  Get { node: String },
}

#[derive(Subcommand)]
pub enum SecretsCommand {
  /// List swarm secrets
  Ls,
}

#[derive(Subcommand)]
pub enum ConfigsCommand {
  /// List swarm configs
  Ls,
}

#[derive(Subcommand)]
pub enum SystemCommand {
  /// Daemon info
  Info,
  /// Daemon version
  Version,
  /// Disk usage
  Df,
  /// Prune unused resources
  Prune {
    /// containers, images, networks, volumes or all
    #[arg(default_value = "all")]
    target: String,
  },
}
