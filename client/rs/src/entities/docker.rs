use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::host::HostStatus;

/// Slim view over a daemon container, as returned by list calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerListItem {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub image: String,
  #[serde(default)]
  pub state: ContainerState,
  /// Human status line from the daemon, eg `Up 2 hours`.
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub created: i64,
  #[serde(default)]
  pub ports: Vec<String>,
  #[serde(default)]
  pub labels: HashMap<String, String>,
  /// Which host the container was listed from.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub host_id: Option<String>,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContainerState {
  Created,
  Running,
  Paused,
  Restarting,
  Removing,
  Exited,
  Dead,
  #[default]
  Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageListItem {
  pub id: String,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub size: i64,
  #[serde(default)]
  pub created: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeListItem {
  pub name: String,
  #[serde(default)]
  pub driver: String,
  #[serde(default)]
  pub mountpoint: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkListItem {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub driver: String,
  #[serde(default)]
  pub scope: String,
  #[serde(default)]
  pub attachable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceListItem {
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
  /// Desired replicas for replicated services.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub replicas: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub running_tasks: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub desired_tasks: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeListItem {
  pub id: String,
  #[serde(default)]
  pub hostname: String,
  #[serde(default)]
  pub role: String,
  #[serde(default)]
  pub availability: String,
  #[serde(default)]
  pub state: String,
  #[serde(default)]
  pub leader: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub engine_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretListItem {
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigListItem {
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
}

/// Enumerated creation options. Open maps from the daemon API are
/// deliberately not exposed; everything here is validated at the
/// boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateContainerBody {
  pub name: String,
  pub image: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub command: Option<Vec<String>>,
  #[serde(default)]
  pub env: Vec<String>,
  #[serde(default)]
  pub labels: HashMap<String, String>,
  #[serde(default)]
  pub ports: Vec<PortMapping>,
  #[serde(default)]
  pub volumes: Vec<VolumeMapping>,
  #[serde(default)]
  pub restart: RestartPolicyKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub network: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
  pub container_port: u16,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub host_port: Option<u16>,
  #[serde(default)]
  pub protocol: PortProtocol,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PortProtocol {
  #[default]
  Tcp,
  Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMapping {
  /// Volume name or absolute host path.
  pub source: String,
  pub target: String,
  #[serde(default)]
  pub read_only: bool,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RestartPolicyKind {
  #[default]
  No,
  Always,
  UnlessStopped,
  OnFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVolumeBody {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub driver: Option<String>,
  #[serde(default)]
  pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNetworkBody {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub driver: Option<String>,
  #[serde(default)]
  pub attachable: bool,
  #[serde(default)]
  pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullImageBody {
  /// `name[:tag]`
  pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleServiceBody {
  pub replicas: u64,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Display,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PruneTarget {
  Containers,
  Images,
  Networks,
  Volumes,
  All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneBody {
  pub target: PruneTarget,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneReport {
  #[serde(default)]
  pub containers_deleted: u64,
  #[serde(default)]
  pub images_deleted: u64,
  #[serde(default)]
  pub networks_deleted: u64,
  #[serde(default)]
  pub volumes_deleted: u64,
  #[serde(default)]
  pub space_reclaimed: i64,
}

/// Per-host entry of the dashboard aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardHostEntry {
  pub host_id: String,
  pub name: String,
  pub status: HostStatus,
  #[serde(default)]
  pub containers_running: usize,
  #[serde(default)]
  pub containers_total: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub err: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardSummary {
  pub hosts: Vec<DashboardHostEntry>,
  #[serde(default)]
  pub hosts_healthy: usize,
  #[serde(default)]
  pub hosts_total: usize,
  #[serde(default)]
  pub containers_running: usize,
  #[serde(default)]
  pub containers_total: usize,
  /// Streaming subsystem gauges.
  #[serde(default)]
  pub streams: StreamMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamMetrics {
  #[serde(default)]
  pub active_streams: usize,
  #[serde(default)]
  pub subscribers: usize,
  #[serde(default)]
  pub slow_consumer_drops: u64,
  #[serde(default)]
  pub frames_forwarded: u64,
}

/// Aggregate view over the hosts sharing one swarm id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmOverview {
  pub swarm_id: String,
  pub hosts: Vec<SwarmMemberHost>,
  #[serde(default)]
  pub managers: usize,
  #[serde(default)]
  pub workers: usize,
  #[serde(default)]
  pub nodes: Vec<NodeListItem>,
  #[serde(default)]
  pub services: Vec<ServiceListItem>,
  /// Set when no manager host was reachable for the node /
  /// service listings.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub err: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmMemberHost {
  pub host_id: String,
  pub name: String,
  pub status: HostStatus,
  pub leader: bool,
}
