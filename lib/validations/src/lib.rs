//! # Input Validation Module
//!
//! Validation functions for operator supplied inputs, so invalid
//! data is rejected at the API boundary before it reaches the
//! store or a Docker daemon.

use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use regex::Regex;

/// Options to validate input strings to have certain properties.
#[derive(Default)]
pub struct StringValidator {
  /// Specify the minimum length of string.
  /// Setting `0` will effectively skip this validation.
  pub min_length: usize,
  /// Specify max length of string, or None to allow arbitrary length.
  pub max_length: Option<usize>,
  /// Skip the control character check.
  /// Most values should not contain these by default.
  pub skip_control_check: bool,
  /// Specify a pattern to validate the string contents.
  pub matches: Option<StringValidatorMatches>,
}

impl StringValidator {
  pub fn min_length(mut self, min_length: usize) -> Self {
    self.min_length = min_length;
    self
  }

  pub fn max_length(mut self, max_length: usize) -> Self {
    self.max_length = Some(max_length);
    self
  }

  pub fn matches(mut self, matches: StringValidatorMatches) -> Self {
    self.matches = Some(matches);
    self
  }

  /// Returns Ok if input passes validations, otherwise includes
  /// error with failure reason.
  pub fn validate(&self, input: &str) -> anyhow::Result<()> {
    let len = input.len();

    if len < self.min_length {
      return Err(anyhow!(
        "Input too short. Must be at least {} characters.",
        self.min_length
      ));
    }

    if let Some(max_length) = self.max_length
      && len > max_length
    {
      return Err(anyhow!(
        "Input too long. Must be at most {max_length} characters."
      ));
    }

    if !self.skip_control_check {
      validate_no_control_chars(input)?;
    }

    if let Some(matches) = &self.matches {
      matches.validate(input)?;
    }

    Ok(())
  }
}

pub enum StringValidatorMatches {
  /// Login handles: word characters, `.`, `-`, `@`.
  Username,
  /// Display names for hosts and similar resources.
  ResourceName,
  /// Dotted action tags, eg `container.create`.
  ActionTag,
}

impl StringValidatorMatches {
  fn validate(&self, input: &str) -> anyhow::Result<()> {
    match self {
      StringValidatorMatches::Username => {
        static USERNAME: OnceLock<Regex> = OnceLock::new();
        let regex = USERNAME.get_or_init(|| {
          Regex::new(r"^[\w.\-@]+$")
            .expect("invalid username regex")
        });
        if !regex.is_match(input) {
          return Err(anyhow!(
            "Usernames may only contain letters, numbers, '.', '-', '_' and '@'"
          ));
        }
      }
      StringValidatorMatches::ResourceName => {
        static NAME: OnceLock<Regex> = OnceLock::new();
        let regex = NAME.get_or_init(|| {
          Regex::new(r"^[\w][\w.\- ]*$")
            .expect("invalid resource name regex")
        });
        if !regex.is_match(input) {
          return Err(anyhow!(
            "Names must start with a word character and may only contain letters, numbers, '.', '-', '_' and spaces"
          ));
        }
      }
      StringValidatorMatches::ActionTag => {
        static TAG: OnceLock<Regex> = OnceLock::new();
        let regex = TAG.get_or_init(|| {
          Regex::new(r"^[a-z][a-z_]*(\.[a-z][a-z_]*)*$")
            .expect("invalid action tag regex")
        });
        if !regex.is_match(input) {
          return Err(anyhow!(
            "Action tags must be lowercase dotted segments"
          ));
        }
      }
    }
    Ok(())
  }
}

fn validate_no_control_chars(input: &str) -> anyhow::Result<()> {
  if input.chars().any(char::is_control) {
    return Err(anyhow!("Input must not contain control characters"));
  }
  Ok(())
}

pub fn validate_username(username: &str) -> anyhow::Result<()> {
  StringValidator::default()
    .min_length(1)
    .max_length(100)
    .matches(StringValidatorMatches::Username)
    .validate(username)
    .context("Invalid username")
}

pub fn validate_password(password: &str) -> anyhow::Result<()> {
  StringValidator::default()
    .min_length(8)
    .max_length(128)
    .validate(password)
    .context("Invalid password")
}

pub fn validate_resource_name(name: &str) -> anyhow::Result<()> {
  StringValidator::default()
    .min_length(1)
    .max_length(100)
    .matches(StringValidatorMatches::ResourceName)
    .validate(name)
    .context("Invalid name")
}

/// Host endpoints: a unix socket path, `tcp://host:port`,
/// or `ssh://[user@]host[:port]`.
pub fn validate_host_address(address: &str) -> anyhow::Result<()> {
  if address.is_empty() {
    return Err(anyhow!("Host address must not be empty"));
  }
  validate_no_control_chars(address)
    .context("Invalid host address")?;
  if address.starts_with('/') || address.starts_with("unix://") {
    return Ok(());
  }
  if let Some(rest) = address.strip_prefix("tcp://") {
    let url = url::Url::parse(&format!("tcp://{rest}"))
      .context("Invalid tcp host address")?;
    if url.host_str().is_none() {
      return Err(anyhow!("tcp address is missing a host part"));
    }
    return Ok(());
  }
  if let Some(rest) = address.strip_prefix("ssh://") {
    let url = url::Url::parse(&format!("ssh://{rest}"))
      .context("Invalid ssh host address")?;
    if url.host_str().is_none() {
      return Err(anyhow!("ssh address is missing a host part"));
    }
    return Ok(());
  }
  Err(anyhow!(
    "Host address must be a unix socket path, tcp://host:port, or ssh://user@host"
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn usernames() {
    assert!(validate_username("admin@localhost").is_ok());
    assert!(validate_username("first.last-01").is_ok());
    assert!(validate_username("").is_err());
    assert!(validate_username("has space").is_err());
    assert!(validate_username("semi;colon").is_err());
  }

  #[test]
  fn passwords() {
    assert!(validate_password("changeme123").is_ok());
    assert!(validate_password("short").is_err());
    assert!(validate_password("tab\tchar-long-enough").is_err());
  }

  #[test]
  fn resource_names() {
    assert!(validate_resource_name("prod swarm manager").is_ok());
    assert!(validate_resource_name("host-01").is_ok());
    assert!(validate_resource_name(" leading").is_err());
    assert!(validate_resource_name("semi;colon").is_err());
  }

  #[test]
  fn host_addresses() {
    assert!(validate_host_address("/var/run/docker.sock").is_ok());
    assert!(validate_host_address("unix:///run/docker.sock").is_ok());
    assert!(validate_host_address("tcp://10.1.2.3:2376").is_ok());
    assert!(validate_host_address("ssh://ops@build-host").is_ok());
    assert!(validate_host_address("").is_err());
    assert!(validate_host_address("ftp://nope").is_err());
  }
}
