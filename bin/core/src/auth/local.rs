use std::net::IpAddr;

use anyhow::Context;
use database::mungos::mongodb::bson::doc;
use flotilla_client::entities::{
  error::ErrorCode,
  flotilla_timestamp, random_string,
  token::{RefreshToken, TokenPair},
  user::User,
};

use crate::{
  audit,
  config::core_config,
  error::{OpError, OpResult, WithCode},
  state::{auth_rate_limiter, db_client, jwt_client},
};

/// Request metadata threaded through the auth flows for rate
/// limiting and the audit trail.
pub struct AuthMeta {
  pub request_id: String,
  pub client_ip: Option<IpAddr>,
  pub client_addr: Option<String>,
  pub user_agent: Option<String>,
}

const REFRESH_TOKEN_LENGTH: usize = 64;

#[instrument("Login", skip_all, fields(username = %username))]
pub async fn login(
  username: String,
  password: String,
  meta: AuthMeta,
) -> OpResult<TokenPair> {
  check_rate_limit(&meta).await?;

  validations::validate_username(&username)
    .code(ErrorCode::ValidationInvalid)
    .map_err(|e| e.field("username"))?;

  let res = login_inner(&username, &password, &meta).await;
  if res.is_err()
    && let Some(ip) = &meta.client_ip
  {
    auth_rate_limiter().record_failure(ip).await;
  }
  res
}

async fn login_inner(
  username: &str,
  password: &str,
  meta: &AuthMeta,
) -> OpResult<TokenPair> {
  let user = db_client()
    .users
    .find_one(doc! { "username": username })
    .await
    .context("failed at db query for users")?
    .ok_or_else(|| {
      OpError::msg(ErrorCode::InvalidCredentials, "invalid credentials")
    })?;

  if !user.active {
    return Err(OpError::msg(
      ErrorCode::InvalidCredentials,
      "invalid credentials",
    ));
  }

  // bcrypt is deliberately slow, keep it off the runtime workers.
  let password = password.to_string();
  let hash = user.password_hash.clone();
  let verified = tokio::task::spawn_blocking(move || {
    database::verify_password(password, &hash)
  })
  .await
  .context("password verification task panicked")??;

  if !verified {
    return Err(OpError::msg(
      ErrorCode::InvalidCredentials,
      "invalid credentials",
    ));
  }

  let pair = mint_token_pair(&user, None).await?;

  audit::event("auth.login", &user, &meta.request_id)
    .client(meta.client_addr.clone(), meta.user_agent.clone())
    .record()
    .await;

  Ok(pair)
}

#[instrument("RefreshSession", skip_all)]
pub async fn refresh(
  refresh_token: String,
  meta: AuthMeta,
) -> OpResult<TokenPair> {
  check_rate_limit(&meta).await?;

  let res = refresh_inner(&refresh_token, &meta).await;
  if res.is_err()
    && let Some(ip) = &meta.client_ip
  {
    auth_rate_limiter().record_failure(ip).await;
  }
  res
}

async fn refresh_inner(
  refresh_token: &str,
  meta: &AuthMeta,
) -> OpResult<TokenPair> {
  let db = db_client();

  // Revoke-and-fetch in one step so a token can never be
  // redeemed twice.
  let token = db
    .refresh_tokens
    .find_one_and_update(
      doc! { "_id": refresh_token, "revoked": false },
      doc! { "$set": { "revoked": true } },
    )
    .await
    .context("failed to rotate refresh token")?;

  let Some(token) = token else {
    let exists = db
      .refresh_tokens
      .find_one(doc! { "_id": refresh_token })
      .await
      .context("failed to query refresh tokens")?
      .is_some();
    let (code, msg) = if exists {
      (ErrorCode::Revoked, "refresh token has been revoked")
    } else {
      (ErrorCode::TokenInvalid, "unknown refresh token")
    };
    return Err(OpError::msg(code, msg));
  };

  if flotilla_timestamp() > token.expires_at {
    return Err(OpError::msg(
      ErrorCode::TokenExpired,
      "refresh token has expired",
    ));
  }

  let user = crate::auth::get_user(&token.user_id)
    .await
    .map_err(|e| OpError::new(ErrorCode::Revoked, e.source))?;
  if !user.active {
    return Err(OpError::msg(
      ErrorCode::Revoked,
      "user is deactivated",
    ));
  }

  let pair = mint_token_pair(&user, Some(token.id)).await?;

  audit::event("auth.refresh", &user, &meta.request_id)
    .client(meta.client_addr.clone(), meta.user_agent.clone())
    .record()
    .await;

  Ok(pair)
}

#[instrument("Logout", skip_all)]
pub async fn logout(
  refresh_token: String,
  meta: AuthMeta,
) -> OpResult<()> {
  let db = db_client();
  let token = db
    .refresh_tokens
    .find_one_and_update(
      doc! { "_id": &refresh_token, "revoked": false },
      doc! { "$set": { "revoked": true } },
    )
    .await
    .context("failed to revoke refresh token")?;

  match token {
    Some(token) => {
      if let Ok(user) = crate::auth::get_user(&token.user_id).await {
        audit::event("auth.logout", &user, &meta.request_id)
          .client(meta.client_addr.clone(), meta.user_agent.clone())
          .record()
          .await;
      }
      Ok(())
    }
    None => {
      let exists = db
        .refresh_tokens
        .find_one(doc! { "_id": &refresh_token })
        .await
        .context("failed to query refresh tokens")?
        .is_some();
      if exists {
        // Already revoked, logout is idempotent.
        Ok(())
      } else {
        Err(OpError::msg(
          ErrorCode::TokenInvalid,
          "unknown refresh token",
        ))
      }
    }
  }
}

async fn mint_token_pair(
  user: &User,
  parent: Option<String>,
) -> OpResult<TokenPair> {
  let access = jwt_client()
    .encode(&user.id, user.role)
    .context("Failed to generate access token")?;

  let now = flotilla_timestamp();
  let refresh = RefreshToken {
    id: random_string(REFRESH_TOKEN_LENGTH),
    user_id: user.id.clone(),
    issued_at: now,
    expires_at: now
      + (core_config().refresh_token_ttl_days as i64)
        * 24
        * 60
        * 60
        * 1_000,
    revoked: false,
    parent,
  };
  db_client()
    .refresh_tokens
    .insert_one(&refresh)
    .await
    .context("failed to store refresh token")?;

  Ok(TokenPair::bearer(access, refresh.id))
}

async fn check_rate_limit(meta: &AuthMeta) -> OpResult<()> {
  if let Some(ip) = &meta.client_ip
    && auth_rate_limiter().violated(ip).await
  {
    return Err(OpError::msg(
      ErrorCode::RateLimited,
      format!(
        "Too many attempts. Try again in {:?}",
        auth_rate_limiter().window()
      ),
    ));
  }
  Ok(())
}
