//! Authorization policy: role table + per-host overrides.
//!
//! Decisions are made per request and never cached across
//! requests. Per-host permissions only ever widen access, a
//! global admin cannot be narrowed.

use anyhow::Context;
use database::mungos::mongodb::bson::doc;
use flotilla_client::entities::{
  error::ErrorCode,
  host::{Host, PermissionLevel},
  user::{User, UserRole},
};
use futures_util::future::BoxFuture;

use crate::{
  config::{CoreConfig, PermissionMode},
  error::{OpError, OpResult},
  state::db_client,
};

/// What an operation does, for policy purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
  /// Plain read of daemon or registry state.
  Read,
  /// Read that is policy-sensitive and always audited.
  SensitiveRead,
  /// Mutates containers / volumes / networks / services.
  Mutate,
  /// Pull or remove images.
  Image,
  /// Host management, system prune, swarm init / leave.
  HostAdmin,
  /// User management.
  UserAdmin,
}

#[derive(Debug, Clone, Copy)]
pub struct Action {
  pub tag: &'static str,
  pub class: ActionClass,
  pub resource: &'static str,
}

macro_rules! action {
  ($name:ident, $tag:literal, $class:ident, $resource:literal) => {
    pub const $name: Action = Action {
      tag: $tag,
      class: ActionClass::$class,
      resource: $resource,
    };
  };
}

/// The closed set of operations the router exposes.
pub mod actions {
  use super::{Action, ActionClass};

  // Listing reveals the workload inventory, keep it on the
  // audited read path.
  action!(
    CONTAINER_LIST,
    "container.list",
    SensitiveRead,
    "container"
  );
  action!(
    CONTAINER_INSPECT,
    "container.inspect",
    Read,
    "container"
  );
  action!(
    CONTAINER_CREATE,
    "container.create",
    Mutate,
    "container"
  );
  action!(CONTAINER_START, "container.start", Mutate, "container");
  action!(CONTAINER_STOP, "container.stop", Mutate, "container");
  action!(
    CONTAINER_RESTART,
    "container.restart",
    Mutate,
    "container"
  );
  action!(
    CONTAINER_REMOVE,
    "container.remove",
    Mutate,
    "container"
  );
  action!(
    CONTAINER_LOGS_VIEW,
    "container.logs.view",
    SensitiveRead,
    "container"
  );
  action!(
    CONTAINER_STATS_VIEW,
    "container.stats.view",
    Read,
    "container"
  );
  action!(
    CONTAINER_EXEC,
    "container.exec",
    Mutate,
    "container"
  );
  action!(IMAGE_LIST, "image.list", Read, "image");
  action!(IMAGE_PULL, "image.pull", Image, "image");
  action!(IMAGE_REMOVE, "image.remove", Image, "image");
  action!(VOLUME_LIST, "volume.list", Read, "volume");
  action!(VOLUME_CREATE, "volume.create", Mutate, "volume");
  action!(VOLUME_REMOVE, "volume.remove", Mutate, "volume");
  action!(NETWORK_LIST, "network.list", Read, "network");
  action!(NETWORK_CREATE, "network.create", Mutate, "network");
  action!(NETWORK_REMOVE, "network.remove", Mutate, "network");
  action!(SERVICE_LIST, "service.list", Read, "service");
  action!(SERVICE_INSPECT, "service.inspect", Read, "service");
  action!(SERVICE_SCALE, "service.scale", Mutate, "service");
  action!(
    SERVICE_LOGS_VIEW,
    "service.logs.view",
    SensitiveRead,
    "service"
  );
  action!(NODE_LIST, "node.list", Read, "node");
  action!(NODE_INSPECT, "node.inspect", Read, "node");
  action!(SECRET_LIST, "secret.list", SensitiveRead, "secret");
  action!(CONFIG_LIST, "config.list", Read, "config");
  action!(SYSTEM_INFO, "system.info", Read, "system");
  action!(SYSTEM_VERSION, "system.version", Read, "system");
  action!(SYSTEM_DF, "system.df", Read, "system");
  action!(SYSTEM_PRUNE, "system.prune", HostAdmin, "system");
  action!(EVENTS_VIEW, "events.view", Read, "system");
  action!(SWARM_VIEW, "swarm.view", Read, "swarm");
  action!(SWARM_INIT, "swarm.init", HostAdmin, "swarm");
  action!(SWARM_LEAVE, "swarm.leave", HostAdmin, "swarm");
  action!(HOST_LIST, "host.list", Read, "host");
  action!(HOST_VIEW, "host.view", Read, "host");
  action!(HOST_CREATE, "host.create", UserAdmin, "host");
  action!(HOST_UPDATE, "host.update", UserAdmin, "host");
  action!(HOST_REMOVE, "host.remove", UserAdmin, "host");
  action!(HOST_TEST, "host.test", Read, "host");
  action!(
    HOST_BREAKER_RESET,
    "host.breaker.reset",
    HostAdmin,
    "host"
  );
  action!(
    HOST_PERMISSION_SET,
    "host.permission.set",
    UserAdmin,
    "host"
  );
  action!(USER_LIST, "user.list", UserAdmin, "user");
  action!(USER_CREATE, "user.create", UserAdmin, "user");
  action!(USER_UPDATE, "user.update", UserAdmin, "user");
  action!(USER_REMOVE, "user.remove", UserAdmin, "user");
  action!(AUDIT_VIEW, "audit.view", UserAdmin, "audit");
  action!(WIZARD_RUN, "wizard.run", UserAdmin, "wizard");
  action!(DASHBOARD_VIEW, "dashboard.view", Read, "dashboard");
}

pub trait PermissionService: Send + Sync {
  fn decide<'a>(
    &'a self,
    user: &'a User,
    action: &'a Action,
    host: Option<&'a Host>,
  ) -> BoxFuture<'a, OpResult<()>>;
}

pub fn service_from_config(
  config: &CoreConfig,
) -> Box<dyn PermissionService> {
  match config.permission_mode {
    PermissionMode::Standard => Box::new(StandardPermissions),
    PermissionMode::Restricted => Box::new(RestrictedPermissions),
  }
}

/// Role table as specified: viewers read, operators mutate and
/// manage images, admins do everything.
pub struct StandardPermissions;

impl PermissionService for StandardPermissions {
  fn decide<'a>(
    &'a self,
    user: &'a User,
    action: &'a Action,
    host: Option<&'a Host>,
  ) -> BoxFuture<'a, OpResult<()>> {
    Box::pin(async move {
      decide_common(user, action, host, false).await
    })
  }
}

/// Like [StandardPermissions], except viewers must hold an
/// explicit permission on a host to read host scoped resources.
pub struct RestrictedPermissions;

impl PermissionService for RestrictedPermissions {
  fn decide<'a>(
    &'a self,
    user: &'a User,
    action: &'a Action,
    host: Option<&'a Host>,
  ) -> BoxFuture<'a, OpResult<()>> {
    Box::pin(async move {
      decide_common(user, action, host, true).await
    })
  }
}

async fn decide_common(
  user: &User,
  action: &Action,
  host: Option<&Host>,
  restrict_reads: bool,
) -> OpResult<()> {
  if user.is_admin() {
    return Ok(());
  }

  if allowed_by_role(user.role, action.class) {
    let needs_explicit_grant = restrict_reads
      && user.role == UserRole::Viewer
      && host.is_some()
      && matches!(
        action.class,
        ActionClass::Read | ActionClass::SensitiveRead
      );
    if !needs_explicit_grant {
      return Ok(());
    }
  }

  // Per-host overrides can widen what the role denies.
  if let Some(host) = host {
    let level = host_override_level(&user.id, &host.id).await?;
    if let Some(level) = level
      && allowed_by_override(level, action.class)
    {
      return Ok(());
    }
    return Err(OpError::msg(
      ErrorCode::HostDenied,
      format!(
        "user '{}' is not permitted to {} on host '{}'",
        user.username, action.tag, host.name
      ),
    ));
  }

  Err(OpError::msg(
    ErrorCode::InsufficientRole,
    format!(
      "role '{}' is not permitted to {}",
      user.role, action.tag
    ),
  ))
}

fn allowed_by_role(role: UserRole, class: ActionClass) -> bool {
  match class {
    ActionClass::Read | ActionClass::SensitiveRead => true,
    ActionClass::Mutate | ActionClass::Image => {
      role >= UserRole::Operator
    }
    ActionClass::HostAdmin | ActionClass::UserAdmin => {
      role >= UserRole::Admin
    }
  }
}

fn allowed_by_override(
  level: PermissionLevel,
  class: ActionClass,
) -> bool {
  match class {
    ActionClass::Read | ActionClass::SensitiveRead => true,
    ActionClass::Mutate | ActionClass::Image => {
      level >= PermissionLevel::Operate
    }
    ActionClass::HostAdmin => level >= PermissionLevel::Admin,
    // Never widened by host grants.
    ActionClass::UserAdmin => false,
  }
}

async fn host_override_level(
  user_id: &str,
  host_id: &str,
) -> OpResult<Option<PermissionLevel>> {
  let permission = db_client()
    .host_permissions
    .find_one(doc! { "user_id": user_id, "host_id": host_id })
    .await
    .context("failed to query host permissions")?;
  Ok(permission.map(|permission| permission.level))
}

/// Authorize through the startup-selected implementation.
pub async fn authorize(
  user: &User,
  action: &Action,
  host: Option<&Host>,
) -> OpResult<()> {
  crate::state::permission_service()
    .decide(user, action, host)
    .await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn role_table_matches_the_contract() {
    use ActionClass::*;
    // viewer: read only
    assert!(allowed_by_role(UserRole::Viewer, Read));
    assert!(allowed_by_role(UserRole::Viewer, SensitiveRead));
    assert!(!allowed_by_role(UserRole::Viewer, Mutate));
    assert!(!allowed_by_role(UserRole::Viewer, Image));
    assert!(!allowed_by_role(UserRole::Viewer, HostAdmin));
    // operator: read + mutate + images
    assert!(allowed_by_role(UserRole::Operator, Mutate));
    assert!(allowed_by_role(UserRole::Operator, Image));
    assert!(!allowed_by_role(UserRole::Operator, HostAdmin));
    assert!(!allowed_by_role(UserRole::Operator, UserAdmin));
    // admin: everything
    assert!(allowed_by_role(UserRole::Admin, HostAdmin));
    assert!(allowed_by_role(UserRole::Admin, UserAdmin));
  }

  #[test]
  fn overrides_widen_but_never_grant_user_admin() {
    use ActionClass::*;
    assert!(allowed_by_override(PermissionLevel::View, Read));
    assert!(!allowed_by_override(PermissionLevel::View, Mutate));
    assert!(allowed_by_override(PermissionLevel::Operate, Mutate));
    assert!(allowed_by_override(PermissionLevel::Operate, Image));
    assert!(
      !allowed_by_override(PermissionLevel::Operate, HostAdmin)
    );
    assert!(allowed_by_override(PermissionLevel::Admin, HostAdmin));
    assert!(
      !allowed_by_override(PermissionLevel::Admin, UserAdmin)
    );
  }

  #[test]
  fn action_tags_are_dotted() {
    for action in [
      actions::CONTAINER_CREATE,
      actions::CONTAINER_LOGS_VIEW,
      actions::SYSTEM_PRUNE,
      actions::SWARM_INIT,
    ] {
      assert!(
        validations::StringValidator::default()
          .matches(validations::StringValidatorMatches::ActionTag)
          .validate(action.tag)
          .is_ok(),
        "bad action tag {}",
        action.tag
      );
    }
  }
}
