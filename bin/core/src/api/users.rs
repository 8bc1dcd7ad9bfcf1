use anyhow::Context;
use axum::{Json, Router, extract::Path, routing::get};
use database::mungos::{
  find::find_collect,
  mongodb::bson::{doc, oid::ObjectId},
};
use flotilla_client::entities::{
  NoData,
  error::ErrorCode,
  flotilla_timestamp,
  user::{CreateUserBody, UpdateUserBody, User},
};

use crate::{
  audit,
  auth::OpContext,
  error::{OpError, OpResult, WithCode},
  operation,
  permission::actions,
  state::db_client,
};

pub fn router() -> Router {
  Router::new()
    .route("/", get(list).post(create))
    .route("/me", get(me))
    .route("/{id}", get(get_one).put(update).delete(remove))
}

async fn me(ctx: OpContext) -> Json<User> {
  let mut user = ctx.user;
  user.sanitize();
  Json(user)
}

#[instrument("ListUsers", skip(ctx))]
async fn list(ctx: OpContext) -> OpResult<Json<Vec<User>>> {
  operation::require(&ctx, &actions::USER_LIST).await?;
  let mut users =
    find_collect(&db_client().users, None, None)
      .await
      .context("failed to list users")?;
  for user in &mut users {
    user.sanitize();
  }
  Ok(Json(users))
}

#[instrument("GetUser", skip(ctx))]
async fn get_one(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<User>> {
  operation::require(&ctx, &actions::USER_LIST).await?;
  let mut user = crate::auth::get_user(&id).await?;
  user.sanitize();
  Ok(Json(user))
}

#[instrument("CreateUser", skip(ctx, body))]
async fn create(
  ctx: OpContext,
  Json(body): Json<CreateUserBody>,
) -> OpResult<Json<User>> {
  operation::require(&ctx, &actions::USER_CREATE).await?;

  let CreateUserBody {
    username,
    password,
    role,
  } = body;

  validations::validate_username(&username)
    .code(ErrorCode::ValidationInvalid)
    .map_err(|e| e.field("username"))?;
  validations::validate_password(&password)
    .code(ErrorCode::ValidationInvalid)
    .map_err(|e| e.field("password"))?;

  if db_client()
    .users
    .find_one(doc! { "username": &username })
    .await
    .context("failed to query users")?
    .is_some()
  {
    return Err(OpError::msg(
      ErrorCode::Conflict,
      "username already taken",
    ));
  }

  let password_hash = tokio::task::spawn_blocking(move || {
    database::hash_password(password)
  })
  .await
  .context("password hashing task panicked")??;

  let now = flotilla_timestamp();
  let mut user = User {
    id: ObjectId::new().to_hex(),
    username,
    password_hash,
    role,
    active: true,
    created_at: now,
    updated_at: now,
  };
  db_client()
    .users
    .insert_one(&user)
    .await
    .context("failed to create user")?;

  audit::event("user.create", &ctx.user, &ctx.request_id)
    .resource("user", &user.id)
    .details(serde_json::json!({
      "username": user.username,
      "role": user.role,
    }))
    .client(ctx.client_addr.clone(), ctx.user_agent.clone())
    .record()
    .await;

  user.sanitize();
  Ok(Json(user))
}

#[instrument("UpdateUser", skip(ctx, body))]
async fn update(
  ctx: OpContext,
  Path(id): Path<String>,
  Json(body): Json<UpdateUserBody>,
) -> OpResult<Json<User>> {
  operation::require(&ctx, &actions::USER_UPDATE).await?;
  let user = crate::auth::get_user(&id).await?;

  let mut set = doc! { "updated_at": flotilla_timestamp() };
  if let Some(password) = body.password {
    validations::validate_password(&password)
      .code(ErrorCode::ValidationInvalid)
      .map_err(|e| e.field("password"))?;
    let hash = tokio::task::spawn_blocking(move || {
      database::hash_password(password)
    })
    .await
    .context("password hashing task panicked")??;
    set.insert("password_hash", hash);
  }
  if let Some(role) = body.role {
    set.insert("role", role.to_string());
  }
  if let Some(active) = body.active {
    set.insert("active", active);
  }

  db_client()
    .users
    .update_one(doc! { "_id": &user.id }, doc! { "$set": set })
    .await
    .context("failed to update user")?;

  audit::event("user.update", &ctx.user, &ctx.request_id)
    .resource("user", &user.id)
    .client(ctx.client_addr.clone(), ctx.user_agent.clone())
    .record()
    .await;

  let mut user = crate::auth::get_user(&id).await?;
  user.sanitize();
  Ok(Json(user))
}

/// Users are only deleted once they hold no live refresh tokens.
#[instrument("DeleteUser", skip(ctx))]
async fn remove(
  ctx: OpContext,
  Path(id): Path<String>,
) -> OpResult<Json<NoData>> {
  operation::require(&ctx, &actions::USER_REMOVE).await?;
  let user = crate::auth::get_user(&id).await?;

  let live_tokens = db_client()
    .refresh_tokens
    .count_documents(doc! {
      "user_id": &user.id,
      "revoked": false,
      "expires_at": { "$gt": flotilla_timestamp() },
    })
    .await
    .context("failed to count refresh tokens")?;
  if live_tokens > 0 {
    return Err(OpError::msg(
      ErrorCode::Conflict,
      "user still holds non-revoked refresh tokens, revoke them first",
    ));
  }

  db_client()
    .users
    .delete_one(doc! { "_id": &user.id })
    .await
    .context("failed to delete user")?;
  db_client()
    .host_permissions
    .delete_many(doc! { "user_id": &user.id })
    .await
    .context("failed to delete user host permissions")?;

  audit::event("user.remove", &ctx.user, &ctx.request_id)
    .resource("user", &user.id)
    .details(serde_json::json!({ "username": user.username }))
    .client(ctx.client_addr.clone(), ctx.user_agent.clone())
    .record()
    .await;

  Ok(Json(NoData {}))
}
