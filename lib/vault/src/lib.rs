//! Authenticated symmetric encryption for host credentials.
//!
//! The only place credential plaintext is allowed to materialize is
//! inside calls into this crate and the transport constructors that
//! consume the result. Everything at rest is AES-256-GCM ciphertext.

use aes_gcm::{
  Aes256Gcm, Key, Nonce,
  aead::{Aead, KeyInit},
};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Current ciphertext layout version. Bump when the wire
/// format below changes.
pub const KEY_VERSION: i32 = 1;

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
  #[error("credential encryption key is not configured")]
  MissingKey,
  #[error("credential encryption key must not be empty")]
  InvalidKey,
  #[error("failed to encrypt credential")]
  Encrypt,
  #[error(
    "failed to decrypt credential, ciphertext failed authentication or key mismatch"
  )]
  Decrypt,
  #[error("stored ciphertext is malformed")]
  Malformed,
}

/// AES-256-GCM cipher under a process-wide key.
///
/// The key is either 64 hex characters (decoded to the raw 32 bytes)
/// or an arbitrary passphrase run through SHA-256.
pub struct CredentialCipher {
  cipher: Aes256Gcm,
}

impl CredentialCipher {
  pub fn new(key: &str) -> Result<CredentialCipher, VaultError> {
    if key.is_empty() {
      return Err(VaultError::InvalidKey);
    }
    let key_bytes: [u8; 32] = match hex::decode(key) {
      Ok(bytes) if bytes.len() == 32 => {
        bytes.try_into().map_err(|_| VaultError::InvalidKey)?
      }
      _ => Sha256::digest(key.as_bytes()).into(),
    };
    let cipher =
      Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    Ok(CredentialCipher { cipher })
  }

  /// Encrypt plaintext into the stored representation:
  /// `hex(nonce) + hex(ciphertext || tag)`.
  pub fn encrypt(
    &self,
    plaintext: &str,
  ) -> Result<String, VaultError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);
    let ciphertext = self
      .cipher
      .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
      .map_err(|_| VaultError::Encrypt)?;
    let mut out = hex::encode(nonce);
    out.push_str(&hex::encode(ciphertext));
    Ok(out)
  }

  pub fn decrypt(
    &self,
    stored: &str,
  ) -> Result<String, VaultError> {
    let bytes =
      hex::decode(stored).map_err(|_| VaultError::Malformed)?;
    if bytes.len() <= NONCE_LEN {
      return Err(VaultError::Malformed);
    }
    let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
    let plaintext = self
      .cipher
      .decrypt(Nonce::from_slice(nonce), ciphertext)
      .map_err(|_| VaultError::Decrypt)?;
    String::from_utf8(plaintext).map_err(|_| VaultError::Decrypt)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trip() {
    let cipher = CredentialCipher::new("test-passphrase").unwrap();
    let stored = cipher.encrypt("-----BEGIN KEY-----").unwrap();
    assert_ne!(stored, "-----BEGIN KEY-----");
    assert_eq!(cipher.decrypt(&stored).unwrap(), "-----BEGIN KEY-----");
  }

  #[test]
  fn nonce_makes_ciphertext_unique() {
    let cipher = CredentialCipher::new("test-passphrase").unwrap();
    let a = cipher.encrypt("secret").unwrap();
    let b = cipher.encrypt("secret").unwrap();
    assert_ne!(a, b);
  }

  #[test]
  fn hex_key_accepted() {
    let key = "a".repeat(64);
    let cipher = CredentialCipher::new(&key).unwrap();
    let stored = cipher.encrypt("x").unwrap();
    assert_eq!(cipher.decrypt(&stored).unwrap(), "x");
  }

  #[test]
  fn tampered_ciphertext_rejected() {
    let cipher = CredentialCipher::new("test-passphrase").unwrap();
    let mut stored = cipher.encrypt("secret").unwrap();
    // Flip a nibble inside the ciphertext body
    let flipped = if stored.ends_with('0') { '1' } else { '0' };
    stored.pop();
    stored.push(flipped);
    assert!(matches!(
      cipher.decrypt(&stored),
      Err(VaultError::Decrypt)
    ));
  }

  #[test]
  fn wrong_key_rejected() {
    let cipher = CredentialCipher::new("key-one").unwrap();
    let other = CredentialCipher::new("key-two").unwrap();
    let stored = cipher.encrypt("secret").unwrap();
    assert!(matches!(
      other.decrypt(&stored),
      Err(VaultError::Decrypt)
    ));
  }

  #[test]
  fn malformed_input_rejected() {
    let cipher = CredentialCipher::new("test-passphrase").unwrap();
    assert!(matches!(
      cipher.decrypt("not-hex"),
      Err(VaultError::Malformed)
    ));
    assert!(matches!(
      cipher.decrypt("abcd"),
      Err(VaultError::Malformed)
    ));
  }

  #[test]
  fn empty_key_rejected() {
    assert!(matches!(
      CredentialCipher::new(""),
      Err(VaultError::InvalidKey)
    ));
  }
}
