//! Persistent multi-step wizard engine. Instances survive
//! restarts in the store; step state is replaced whole so readers
//! never observe a partial merge.

use anyhow::Context;
use database::mungos::mongodb::bson::{doc, oid::ObjectId, to_bson};
use flotilla_client::entities::{
  error::ErrorCode,
  flotilla_timestamp,
  wizard::{
    GeneratedSshKey, StartWizardBody, WizardInstance, WizardKind,
    WizardStatus, WizardTestKind, WizardTestReport,
  },
};

use crate::{
  audit,
  auth::OpContext,
  error::{OpError, OpResult},
  state::{db_client, task_channel},
};

pub mod ssh_setup;

pub async fn start(
  ctx: &OpContext,
  body: StartWizardBody,
) -> OpResult<WizardInstance> {
  let total_steps = match body.wizard_type {
    WizardKind::SshHostSetup => ssh_setup::TOTAL_STEPS,
  };
  let now = flotilla_timestamp();
  let instance = WizardInstance {
    id: ObjectId::new().to_hex(),
    user_id: ctx.user.id.clone(),
    kind: body.wizard_type,
    step: 0,
    total_steps,
    status: WizardStatus::InProgress,
    state: body
      .initial
      .unwrap_or(serde_json::Value::Object(Default::default())),
    resource_id: None,
    created_at: now,
    updated_at: now,
  };
  db_client()
    .wizards
    .insert_one(&instance)
    .await
    .context("failed to create wizard instance")?;

  audit::event("wizard.start", &ctx.user, &ctx.request_id)
    .resource("wizard", &instance.id)
    .details(serde_json::json!({ "kind": instance.kind }))
    .client(ctx.client_addr.clone(), ctx.user_agent.clone())
    .record()
    .await;

  Ok(instance)
}

pub async fn get(
  ctx: &OpContext,
  id: &str,
) -> OpResult<WizardInstance> {
  load_owned(ctx, id).await
}

/// Replace the whole state blob in one update. Readers either see
/// the previous blob or this one, never a mix.
pub async fn update_step(
  ctx: &OpContext,
  id: &str,
  state: serde_json::Value,
) -> OpResult<WizardInstance> {
  let instance = load_in_progress(ctx, id).await?;
  let state_bson =
    to_bson(&state).context("failed to encode wizard state")?;
  db_client()
    .wizards
    .update_one(
      doc! { "_id": &instance.id },
      doc! { "$set": {
        "state": state_bson,
        "updated_at": flotilla_timestamp(),
      } },
    )
    .await
    .context("failed to update wizard state")?;
  load_owned(ctx, id).await
}

pub async fn next(
  ctx: &OpContext,
  id: &str,
) -> OpResult<WizardInstance> {
  let instance = load_in_progress(ctx, id).await?;
  if instance.step + 1 >= instance.total_steps {
    return Err(OpError::msg(
      ErrorCode::WizardInvalidStep,
      "already at the last step, use complete",
    ));
  }
  // The current step must validate before moving past it.
  validate_step(&instance, instance.step)?;
  set_step(&instance.id, instance.step + 1).await?;
  load_owned(ctx, id).await
}

pub async fn previous(
  ctx: &OpContext,
  id: &str,
) -> OpResult<WizardInstance> {
  let instance = load_in_progress(ctx, id).await?;
  if instance.step == 0 {
    return Err(OpError::msg(
      ErrorCode::WizardInvalidStep,
      "already at the first step",
    ));
  }
  set_step(&instance.id, instance.step - 1).await?;
  load_owned(ctx, id).await
}

/// Out-of-band probe with the gathered credentials. Idempotent
/// and reentrant; never advances the step.
pub async fn test(
  ctx: &OpContext,
  id: &str,
  test_kind: WizardTestKind,
) -> OpResult<WizardTestReport> {
  let instance = load_in_progress(ctx, id).await?;
  publish_progress(
    &instance.id,
    &format!("{test_kind} probe started"),
    false,
  )
  .await;

  let res = match instance.kind {
    WizardKind::SshHostSetup => {
      ssh_setup::run_test(&instance, test_kind).await
    }
  };

  match res {
    Ok(updated_state) => {
      let state_bson = to_bson(&updated_state)
        .context("failed to encode wizard state")?;
      db_client()
        .wizards
        .update_one(
          doc! { "_id": &instance.id },
          doc! { "$set": {
            "state": state_bson,
            "updated_at": flotilla_timestamp(),
          } },
        )
        .await
        .context("failed to store probe result")?;
      publish_progress(
        &instance.id,
        &format!("{test_kind} probe passed"),
        false,
      )
      .await;
      Ok(WizardTestReport {
        test_kind,
        passed: true,
        message: None,
      })
    }
    Err(e) => {
      publish_progress(
        &instance.id,
        &format!("{test_kind} probe failed: {}", e.message()),
        false,
      )
      .await;
      Err(e)
    }
  }
}

/// Commit the wizard: create the target resource transactionally
/// and finish the instance. A failed commit rolls back any
/// partial writes and leaves the instance resumable.
pub async fn complete(
  ctx: &OpContext,
  id: &str,
) -> OpResult<WizardInstance> {
  let instance = load_in_progress(ctx, id).await?;
  for step in 0..instance.total_steps {
    validate_step(&instance, step)?;
  }

  let resource_id = match instance.kind {
    WizardKind::SshHostSetup => {
      ssh_setup::commit(ctx, &instance).await?
    }
  };

  db_client()
    .wizards
    .update_one(
      doc! { "_id": &instance.id },
      doc! { "$set": {
        "status": WizardStatus::Completed.to_string(),
        "resource_id": &resource_id,
        "updated_at": flotilla_timestamp(),
      } },
    )
    .await
    .context("failed to finish wizard instance")?;

  publish_progress(&instance.id, "completed", true).await;

  audit::event("wizard.complete", &ctx.user, &ctx.request_id)
    .resource("wizard", &instance.id)
    .host_id(Some(resource_id))
    .client(ctx.client_addr.clone(), ctx.user_agent.clone())
    .record()
    .await;

  load_owned(ctx, id).await
}

pub async fn cancel(
  ctx: &OpContext,
  id: &str,
) -> OpResult<WizardInstance> {
  let instance = load_in_progress(ctx, id).await?;
  db_client()
    .wizards
    .update_one(
      doc! { "_id": &instance.id },
      doc! { "$set": {
        "status": WizardStatus::Cancelled.to_string(),
        "updated_at": flotilla_timestamp(),
      } },
    )
    .await
    .context("failed to cancel wizard instance")?;
  publish_progress(&instance.id, "cancelled", true).await;

  audit::event("wizard.cancel", &ctx.user, &ctx.request_id)
    .resource("wizard", &instance.id)
    .client(ctx.client_addr.clone(), ctx.user_agent.clone())
    .record()
    .await;

  load_owned(ctx, id).await
}

/// Fresh ed25519 keypair for the authentication step. Nothing is
/// persisted; the key only lives in the wizard state the client
/// submits.
pub fn generate_ssh_key() -> OpResult<GeneratedSshKey> {
  ssh_setup::generate_key()
}

fn validate_step(
  instance: &WizardInstance,
  step: u32,
) -> OpResult<()> {
  match instance.kind {
    WizardKind::SshHostSetup => {
      let state = ssh_setup::parse_state(&instance.state)?;
      ssh_setup::validate_step(step, &state)
    }
  }
}

async fn set_step(id: &str, step: u32) -> OpResult<()> {
  db_client()
    .wizards
    .update_one(
      doc! { "_id": id },
      doc! { "$set": {
        "step": step,
        "updated_at": flotilla_timestamp(),
      } },
    )
    .await
    .context("failed to move wizard step")?;
  Ok(())
}

/// Owner-scoped load. Foreign instances read as not-found so ids
/// leak nothing.
async fn load_owned(
  ctx: &OpContext,
  id: &str,
) -> OpResult<WizardInstance> {
  let instance = db_client()
    .wizards
    .find_one(doc! { "_id": id })
    .await
    .context("failed to query wizard instances")?;
  match instance {
    Some(instance)
      if instance.user_id == ctx.user.id
        || ctx.user.is_admin() =>
    {
      Ok(instance)
    }
    _ => Err(
      OpError::msg(
        ErrorCode::NotFound,
        format!("no wizard instance matching '{id}'"),
      )
      .with_request_id(&ctx.request_id),
    ),
  }
}

async fn load_in_progress(
  ctx: &OpContext,
  id: &str,
) -> OpResult<WizardInstance> {
  let instance = load_owned(ctx, id).await?;
  if instance.status.is_terminal() {
    return Err(OpError::msg(
      ErrorCode::WizardInvalidStep,
      format!("wizard instance is {}", instance.status),
    ));
  }
  Ok(instance)
}

async fn publish_progress(id: &str, message: &str, done: bool) {
  let channel = task_channel(id).await;
  let _ = channel.send(serde_json::json!({
    "task_id": id,
    "message": message,
    "done": done,
  }));
}
