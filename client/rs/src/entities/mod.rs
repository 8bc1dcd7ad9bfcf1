use rand::Rng;
use serde::{Deserialize, Serialize};

pub mod audit;
pub mod docker;
pub mod error;
pub mod host;
pub mod logger;
pub mod token;
pub mod user;
pub mod wizard;

/// Hex string id minted by the store layer, stored under `_id`.
pub type MongoId = String;

/// Unix timestamp in milliseconds.
pub fn flotilla_timestamp() -> i64 {
  async_timing_util::unix_timestamp_ms() as i64
}

/// RFC3339 timestamp with millisecond precision, UTC.
pub fn rfc3339_timestamp() -> String {
  chrono::Utc::now()
    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn random_string(length: usize) -> String {
  rand::rng()
    .sample_iter(&rand::distr::Alphanumeric)
    .take(length)
    .map(char::from)
    .collect()
}

pub fn optional_string(string: &str) -> Option<String> {
  if string.is_empty() {
    None
  } else {
    Some(string.to_string())
  }
}

/// Standard success body for operations without a richer response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoData {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn random_string_has_requested_length() {
    assert_eq!(random_string(40).len(), 40);
    assert_ne!(random_string(40), random_string(40));
  }

  #[test]
  fn optional_string_maps_empty_to_none() {
    assert_eq!(optional_string(""), None);
    assert_eq!(optional_string("x"), Some(String::from("x")));
  }
}
