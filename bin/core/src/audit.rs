use database::mungos::mongodb::bson::{doc, oid::ObjectId};
use flotilla_client::entities::{
  audit::{AuditEvent, AuditOutcome},
  flotilla_timestamp,
  host::Host,
  user::User,
};
use tokio::sync::mpsc;

use crate::{config::core_config, state::db_client};

/// Append-only recorder. Writes drain through a bounded queue so
/// they never block the recorded operation; on overflow the write
/// degrades to an awaited insert. Recorder failures are logged and
/// never surface to the client.
pub struct AuditRecorder {
  tx: mpsc::Sender<AuditEvent>,
}

impl AuditRecorder {
  pub fn spawn() -> AuditRecorder {
    let (tx, mut rx) =
      mpsc::channel::<AuditEvent>(core_config().audit_queue_capacity);
    tokio::spawn(async move {
      while let Some(event) = rx.recv().await {
        insert(event).await;
      }
    });
    AuditRecorder { tx }
  }

  pub async fn record(&self, event: AuditEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) =
      self.tx.try_send(event)
    {
      insert(event).await;
    }
  }
}

async fn insert(event: AuditEvent) {
  if let Err(e) = db_client().audit_events.insert_one(&event).await {
    warn!(
      "failed to record audit event | action: {} | user: {} | {e:#}",
      event.action, event.user_id
    );
  }
}

/// Daily cleanup honoring `audit_retention_days`. 0 keeps
/// everything and the task is not spawned.
pub fn spawn_retention_loop() {
  let retention_days = core_config().audit_retention_days;
  if retention_days == 0 {
    return;
  }
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(
      std::time::Duration::from_secs(24 * 60 * 60),
    );
    loop {
      interval.tick().await;
      let cutoff = flotilla_timestamp()
        - (retention_days as i64) * 24 * 60 * 60 * 1_000;
      match db_client()
        .audit_events
        .delete_many(doc! { "timestamp": { "$lt": cutoff } })
        .await
      {
        Ok(res) if res.deleted_count > 0 => {
          info!(
            "audit retention removed {} events older than {retention_days} days",
            res.deleted_count
          );
        }
        Ok(_) => {}
        Err(e) => {
          error!("audit retention pass failed | {e:#}");
        }
      }
    }
  });
}

pub struct EventBuilder {
  event: AuditEvent,
}

/// Start an audit event for the given action tag.
pub fn event(
  action: impl Into<String>,
  user: &User,
  request_id: impl Into<String>,
) -> EventBuilder {
  EventBuilder {
    event: AuditEvent {
      id: ObjectId::new().to_hex(),
      user_id: user.id.clone(),
      username: user.username.clone(),
      action: action.into(),
      resource_kind: None,
      resource_id: None,
      host_id: None,
      client_addr: None,
      user_agent: None,
      request_id: request_id.into(),
      details: serde_json::Value::Null,
      outcome: AuditOutcome::Success,
      timestamp: flotilla_timestamp(),
    },
  }
}

impl EventBuilder {
  pub fn host(mut self, host: &Host) -> EventBuilder {
    self.event.host_id = Some(host.id.clone());
    self
  }

  pub fn host_id(
    mut self,
    host_id: impl Into<Option<String>>,
  ) -> EventBuilder {
    self.event.host_id = host_id.into();
    self
  }

  pub fn resource(
    mut self,
    kind: impl Into<String>,
    id: impl Into<String>,
  ) -> EventBuilder {
    self.event.resource_kind = Some(kind.into());
    self.event.resource_id = Some(id.into());
    self
  }

  pub fn client(
    mut self,
    client_addr: Option<String>,
    user_agent: Option<String>,
  ) -> EventBuilder {
    self.event.client_addr = client_addr;
    self.event.user_agent = user_agent;
    self
  }

  pub fn details(mut self, details: serde_json::Value) -> EventBuilder {
    self.event.details = details;
    self
  }

  pub fn outcome(mut self, outcome: AuditOutcome) -> EventBuilder {
    self.event.outcome = outcome;
    self
  }

  pub async fn record(self) {
    crate::state::audit_recorder().record(self.event).await
  }
}
