//! Storage-bound side of the credential vault: (host, kind) ->
//! ciphertext rows, en/decrypted through the process-wide cipher.

use anyhow::Context;
use database::mungos::mongodb::bson::{doc, oid::ObjectId};
use flotilla_client::entities::{
  error::ErrorCode,
  host::{CredentialKind, HostCredential},
};
use vault::CredentialCipher;

use crate::{
  error::{OpError, OpResult},
  state::{credential_cipher, db_client},
};

fn cipher() -> OpResult<&'static CredentialCipher> {
  credential_cipher().ok_or_else(|| {
    OpError::msg(
      ErrorCode::CredentialUnavailable,
      "credential encryption key is not configured",
    )
  })
}

pub async fn put(
  host_id: &str,
  kind: CredentialKind,
  plaintext: &str,
) -> OpResult<()> {
  let ciphertext = cipher()?.encrypt(plaintext).map_err(|e| {
    OpError::new(ErrorCode::CredentialUnavailable, e)
  })?;
  let row = HostCredential {
    id: ObjectId::new().to_hex(),
    host_id: host_id.to_string(),
    kind,
    ciphertext,
    key_version: vault::KEY_VERSION,
  };
  db_client()
    .host_credentials
    .update_one(
      doc! { "host_id": host_id, "kind": kind.to_string() },
      doc! { "$set": {
        "ciphertext": &row.ciphertext,
        "key_version": row.key_version,
      }, "$setOnInsert": {
        "_id": &row.id,
        "host_id": &row.host_id,
        "kind": kind.to_string(),
      } },
    )
    .upsert(true)
    .await
    .context("failed to store host credential")
    .map_err(|e| OpError::new(ErrorCode::Unexpected, e))?;
  Ok(())
}

pub async fn get(
  host_id: &str,
  kind: CredentialKind,
) -> OpResult<String> {
  get_optional(host_id, kind).await?.ok_or_else(|| {
    OpError::msg(
      ErrorCode::CredentialUnavailable,
      format!("host {host_id} has no stored {kind} credential"),
    )
  })
}

pub async fn get_optional(
  host_id: &str,
  kind: CredentialKind,
) -> OpResult<Option<String>> {
  let row = db_client()
    .host_credentials
    .find_one(doc! { "host_id": host_id, "kind": kind.to_string() })
    .await
    .context("failed to query host credentials")
    .map_err(|e| OpError::new(ErrorCode::Unexpected, e))?;
  let Some(row) = row else {
    return Ok(None);
  };
  let plaintext =
    cipher()?.decrypt(&row.ciphertext).map_err(|e| {
      OpError::new(ErrorCode::CredentialUnavailable, e)
    })?;
  Ok(Some(plaintext))
}

/// Remove every credential stored for the host.
pub async fn delete_for_host(host_id: &str) -> OpResult<()> {
  db_client()
    .host_credentials
    .delete_many(doc! { "host_id": host_id })
    .await
    .context("failed to delete host credentials")
    .map_err(|e| OpError::new(ErrorCode::Unexpected, e))?;
  Ok(())
}
