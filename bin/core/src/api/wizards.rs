use axum::{
  Json, Router,
  extract::Path,
  routing::{get, post, put},
};
use flotilla_client::entities::wizard::{
  GeneratedSshKey, StartWizardBody, TestWizardBody,
  UpdateWizardStepBody, WizardInstance, WizardTestReport,
};

use crate::{
  auth::OpContext, error::OpResult, operation,
  permission::actions, wizard,
};

pub fn router() -> Router {
  Router::new()
    .route("/start", post(start))
    .route("/generate-ssh-key", post(generate_ssh_key))
    .route("/{id}", get(get_one))
    .route("/{id}/step", put(update_step))
    .route("/{id}/next", post(next))
    .route("/{id}/previous", post(previous))
    .route("/{id}/test", post(test))
    .route("/{id}/complete", post(complete))
    .route("/{id}/cancel", post(cancel))
}

#[instrument("StartWizard", skip(ctx))]
async fn start(
  ctx: OpContext,
  Json(body): Json<StartWizardBody>,
) -> OpResult<Json<WizardInstance>> {
  operation::require(&ctx, &actions::WIZARD_RUN).await?;
  wizard::start(&ctx, body).await.map(Json)
}

#[instrument("GetWizard", skip(ctx))]
async fn get_one(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<WizardInstance>> {
  operation::require(&ctx, &actions::WIZARD_RUN).await?;
  wizard::get(&ctx, &id).await.map(Json)
}

#[instrument("UpdateWizardStep", skip(ctx, body))]
async fn update_step(
  ctx: OpContext,
  Path(id): Path<String>,
  Json(body): Json<UpdateWizardStepBody>,
) -> OpResult<Json<WizardInstance>> {
  operation::require(&ctx, &actions::WIZARD_RUN).await?;
  wizard::update_step(&ctx, &id, body.state).await.map(Json)
}

#[instrument("WizardNext", skip(ctx))]
async fn next(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<WizardInstance>> {
  operation::require(&ctx, &actions::WIZARD_RUN).await?;
  wizard::next(&ctx, &id).await.map(Json)
}

#[instrument("WizardPrevious", skip(ctx))]
async fn previous(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<WizardInstance>> {
  operation::require(&ctx, &actions::WIZARD_RUN).await?;
  wizard::previous(&ctx, &id).await.map(Json)
}

#[instrument("WizardTest", skip(ctx))]
async fn test(
  ctx: OpContext,
  Path(id): Path<String>,
  Json(body): Json<TestWizardBody>,
) -> OpResult<Json<WizardTestReport>> {
  operation::require(&ctx, &actions::WIZARD_RUN).await?;
  wizard::test(&ctx, &id, body.test_kind).await.map(Json)
}

#[instrument("WizardComplete", skip(ctx))]
async fn complete(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<WizardInstance>> {
  operation::require(&ctx, &actions::WIZARD_RUN).await?;
  wizard::complete(&ctx, &id).await.map(Json)
}

#[instrument("WizardCancel", skip(ctx))]
async fn cancel(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<WizardInstance>> {
  operation::require(&ctx, &actions::WIZARD_RUN).await?;
  wizard::cancel(&ctx, &id).await.map(Json)
}

/// Helper for the authentication step: a fresh keypair that is
/// never persisted server-side.
#[instrument("GenerateSshKey", skip(ctx))]
async fn generate_ssh_key(
  ctx: OpContext,
) -> OpResult<Json<GeneratedSshKey>> {
  operation::require(&ctx, &actions::WIZARD_RUN).await?;
  wizard::generate_ssh_key().map(Json)
}
